// BP Node: sovereign bitcoin wallet backend.
//
// SPDX-License-Identifier: Apache-2.0
//
// Designed & written in 2020-2025 by
//     @will-bitlight <https://bitlightlabs.com>
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2025 LNP/BP Labs, InDCS, Switzerland. All rights reserved.
// Copyright (C) 2020-2025 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! The blocking call that actually crosses the wire (§4.5 `queryRPC`, §5). Modelled as a trait so
//! [`NodeClient`](crate::client::NodeClient) can be driven by a real HTTP socket in production and
//! by an in-memory stub (or the [`mock`](crate::mock) simulator) in tests, without the client
//! itself knowing the difference.

use std::io::Read;

use crate::error::TransportError;

/// One round-trip over the connection the client holds open to the node (§4.5, §5). A
/// `Transport` owns nothing about JSON-RPC semantics; it moves bytes and reports socket-level
/// failure. Implementations precache the `Authorization` header once on construction, mirroring
/// the source's `precacheHttpHeader`.
pub trait Transport {
    /// Sends `body` (a JSON-RPC request) and returns the raw response body. Socket and HTTP
    /// failures surface as [`TransportError`]; a non-2xx HTTP status is not itself an error here
    /// (the node reports RPC-level failure inside the JSON body), except for the auth probe that
    /// `HttpTransport::connect` performs up front.
    fn call(&self, body: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Whether the socket itself can be reached (§4.5 `testConnection`'s socket-level probe).
    fn is_reachable(&self) -> bool;
}

/// Production transport: a blocking HTTP client talking to `127.0.0.1:<rpc_port>` with a
/// precached `Basic` auth header (§4.5, §6 "RPC surface").
pub struct HttpTransport {
    url: String,
    auth_header: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Builds a transport bound to `rpc_port` on localhost, caching `auth_header` (the full
    /// `Basic ...` value produced by [`crate::auth::resolve_basic_auth`]) for every subsequent
    /// call.
    pub fn new(rpc_port: u16, auth_header: String) -> Self {
        HttpTransport {
            url: format!("http://127.0.0.1:{rpc_port}/"),
            auth_header,
            agent: ureq::Agent::new(),
        }
    }
}

impl Transport for HttpTransport {
    fn call(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &self.auth_header)
            .set("Content-Type", "application/json")
            .send_bytes(body)?;
        let mut buf = Vec::new();
        response.into_reader().read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn is_reachable(&self) -> bool {
        let addr = self.url.trim_start_matches("http://").trim_end_matches('/');
        std::net::TcpStream::connect(addr).is_ok()
    }
}
