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

/// Coarse connectivity status reported by [`crate::client::NodeClient`] (§7). All states but
/// `BadAuth` are recoverable on retry.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
pub enum NodeStatus {
    /// no transport reachable (socket-level failure).
    Disabled,
    /// transport reachable but credentials were rejected; requires re-running `setup`.
    BadAuth,
    /// the node is still loading/verifying blocks (RPC warm-up error code -28).
    Error28,
    Online,
}

/// Raised while reading `bitcoin.conf` or a `.cookie` file (§6 "Config/credentials").
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum AuthError {
    /// could not read credentials file: {0}
    #[from]
    Io(std::io::Error),

    /// cookie file did not contain exactly one line
    MalformedCookie,

    /// cookie line is missing the `__cookie__:` prefix
    MissingCookieTag,

    /// neither rpcuser/rpcpassword nor a readable .cookie file were found in {0}
    NoCredentials(String),
}

/// Raised by the [`crate::transport::Transport`] implementation used in production (§5).
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum TransportError {
    /// HTTP transport error: {0}
    #[from]
    Http(ureq::Error),

    /// could not read the response body: {0}
    #[from]
    Io(std::io::Error),
}

/// Raised by a [`crate::client::NodeClient`] operation (§4.5, §7).
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum RpcError {
    /// credentials could not be established: {0}
    #[from]
    Auth(AuthError),

    /// transport failure: {0}
    #[from]
    Transport(TransportError),

    /// node reported status {0}, refusing to issue the request
    NotOnline(NodeStatus),

    /// response id {got} did not match request id {expected}
    IdMismatch { expected: u64, got: u64 },

    /// node returned a JSON-RPC error: {0}
    NodeError(String),

    /// malformed JSON-RPC response: {0}
    MalformedResponse(String),
}
