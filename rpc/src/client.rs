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

//! Thin request/response client over an injected [`Transport`] (§4.5). Every public operation
//! takes the client's lock exactly once and delegates to lock-free private helpers — the §9
//! "RPC reentrancy" re-architecture note adopted directly rather than merely documented, since
//! nothing here needs one public operation to call a second public operation while already
//! holding the lock.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};

use crate::auth;
use crate::chain_state::ChainState;
use crate::error::{NodeStatus, RpcError};
use crate::messages::{IdSequence, Request};
use crate::transport::Transport;

/// Fee estimation strategy passed to `estimatesmartfee` (§4.5).
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
pub enum FeeStrategy {
    Conservative,
    Economical,
}

impl FeeStrategy {
    fn as_str(self) -> &'static str {
        match self {
            FeeStrategy::Conservative => "CONSERVATIVE",
            FeeStrategy::Economical => "ECONOMICAL",
        }
    }
}

/// Result of `getFeeByteSmart` (§4.5, §8 "Fee smart fallback").
#[derive(Clone, Debug, Default)]
pub struct FeeEstimate {
    pub fee_byte: f64,
    pub smart_fee: bool,
    pub blocks: Option<u64>,
    pub error: Option<String>,
}

/// Mutable state guarded by the client's single lock: the cached auth header, the last observed
/// [`NodeStatus`], the request-id sequence, and the [`ChainState`] tracker (§4.5, §4.6).
struct Inner {
    data_dir: PathBuf,
    auth_header: Option<String>,
    good_node: bool,
    previous_state: Option<NodeStatus>,
    ids: IdSequence,
    chain_state: ChainState,
}

/// Bitcoin Core JSON-RPC client (§4.5). Generic over [`Transport`] so production code wires in
/// [`crate::transport::HttpTransport`] and tests wire in a stub or the
/// [`mock`](crate::mock) simulator.
pub struct NodeClient<T: Transport> {
    transport: T,
    inner: Mutex<Inner>,
    on_state_change: Box<dyn Fn(NodeStatus) + Send + Sync>,
}

impl<T: Transport> NodeClient<T> {
    /// Builds a client bound to `transport` with credentials resolved from `data_dir` (§4.5,
    /// §6). The callback fires exactly once per observed state transition (§4.5 "State
    /// transitions fire a user callback exactly on edge").
    pub fn new(
        transport: T,
        data_dir: impl AsRef<Path>,
        on_state_change: impl Fn(NodeStatus) + Send + Sync + 'static,
    ) -> Self {
        NodeClient {
            transport,
            inner: Mutex::new(Inner {
                data_dir: data_dir.as_ref().to_path_buf(),
                auth_header: None,
                good_node: false,
                previous_state: None,
                ids: IdSequence::default(),
                chain_state: ChainState::new(),
            }),
            on_state_change: Box::new(on_state_change),
        }
    }

    /// Resolves credentials, probes the socket, and issues a first `getblockcount` (§4.5
    /// "setup"). Authentication failure from here is permanent until `setup` is called again.
    pub fn setup(&self) -> Result<NodeStatus, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");

        if !self.transport.is_reachable() {
            return Ok(self.transition(&mut inner, NodeStatus::Disabled));
        }

        let header = match auth::resolve_basic_auth(&inner.data_dir) {
            Ok(h) => h,
            Err(_) => return Ok(self.transition(&mut inner, NodeStatus::BadAuth)),
        };
        inner.auth_header = Some(header);
        inner.good_node = true;
        inner.chain_state.reset();

        let status = self.test_connection_locked(&mut inner)?;
        if status == NodeStatus::Online {
            info!("RPC connection established");
        }
        Ok(status)
    }

    /// Re-probes the connection with a `getblockcount` call (§4.5 "testConnection"). If `setup`
    /// was never called (or the last call observed the node as not-good), re-runs `setup`
    /// first, mirroring the source's `if (!goodNode_) state = setupConnection();`.
    pub fn test_connection(&self) -> Result<NodeStatus, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");
        if !inner.good_node {
            drop(inner);
            return self.setup();
        }
        self.test_connection_locked(&mut inner)
    }

    fn test_connection_locked(&self, inner: &mut Inner) -> Result<NodeStatus, RpcError> {
        inner.good_node = false;
        let request = self.build_request(inner, "getblockcount", Value::Null);
        let status = match self.send(inner, &request) {
            Ok(response) => {
                inner.good_node = true;
                let _ = response;
                NodeStatus::Online
            }
            Err(RpcError::NodeError(ref msg)) if msg.contains("-28") => NodeStatus::Error28,
            Err(RpcError::Transport(_)) => NodeStatus::Disabled,
            Err(_) => NodeStatus::BadAuth,
        };
        Ok(self.transition(inner, status))
    }

    /// Estimates a fee rate in BTC/kvB for confirmation within `blocks` (§4.5 `getFeeByte`). A
    /// node error is reported as `-1.0`, matching the source's sentinel.
    pub fn get_fee_byte(&self, blocks: u32) -> Result<f64, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");
        let request = self.build_request(&mut inner, "estimatefee", json!([blocks]));
        match self.send(&mut inner, &request) {
            Ok(result) => result.as_f64().ok_or_else(|| {
                RpcError::MalformedResponse("estimatefee result was not a number".into())
            }),
            Err(RpcError::NodeError(_)) => Ok(-1.0),
            Err(e) => Err(e),
        }
    }

    /// `estimatesmartfee`, falling back to `getFeeByte` when the node doesn't support the method
    /// (§4.5, §8 "Fee smart fallback").
    pub fn get_fee_byte_smart(&self, target: u32, strategy: FeeStrategy) -> Result<FeeEstimate, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");
        let params = json!([target, strategy.as_str()]);
        let request = self.build_request(&mut inner, "estimatesmartfee", params);

        match self.send_raw(&mut inner, &request) {
            Ok(response) => {
                let result = response.get("result").and_then(Value::as_object);
                let error = response.get("error").and_then(|e| {
                    e.as_str().map(str::to_string).or_else(|| e.get("message")?.as_str().map(str::to_string))
                });

                if let Some(obj) = result {
                    if let Some(rate) = obj.get("feerate").and_then(Value::as_f64) {
                        let blocks_back = obj.get("blocks").and_then(Value::as_u64);
                        if let Some(b) = blocks_back {
                            if b != target as u64 {
                                return Err(RpcError::MalformedResponse(
                                    "estimatesmartfee conf_target mismatch".into(),
                                ));
                            }
                        }
                        return Ok(FeeEstimate { fee_byte: rate, smart_fee: true, blocks: blocks_back, error });
                    }
                }

                if error.is_some() && result.is_none() {
                    drop(inner);
                    return self.fee_fallback(target);
                }

                Ok(FeeEstimate { smart_fee: true, error, ..Default::default() })
            }
            Err(e) => Err(e),
        }
    }

    fn fee_fallback(&self, target: u32) -> Result<FeeEstimate, RpcError> {
        let simple = self.get_fee_byte(target)?;
        Ok(FeeEstimate {
            fee_byte: simple,
            smart_fee: false,
            error: if simple < 0.0 { Some("error".to_string()) } else { None },
            blocks: None,
        })
    }

    /// Refreshes the node's reported chain tip and runs it through the chain-state tracker
    /// (§4.5 `updateChainStatus`, §4.6). Returns whether the sync state changed.
    pub fn update_chain_status(&self) -> Result<bool, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");

        let info_req = self.build_request(&mut inner, "getblockchaininfo", Value::Null);
        let info = self.send(&mut inner, &info_req)?;
        let info_obj = info.as_object().ok_or_else(|| {
            RpcError::MalformedResponse("getblockchaininfo result was not an object".into())
        })?;

        let Some(hash) = info_obj.get("bestblockhash").and_then(Value::as_str) else {
            return Ok(false);
        };

        let header_req =
            self.build_request(&mut inner, "getblockheader", json!([hash]));
        let header = self.send(&mut inner, &header_req)?;
        let header_obj = header
            .as_object()
            .ok_or_else(|| RpcError::MalformedResponse("getblockheader result was not an object".into()))?;

        let height = header_obj
            .get("height")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::MalformedResponse("getblockheader missing height".into()))?
            as u32;
        let time = header_obj
            .get("time")
            .and_then(Value::as_u64)
            .ok_or_else(|| RpcError::MalformedResponse("getblockheader missing time".into()))?;

        let now = now_secs();
        inner.chain_state.append_height_and_time(height, time, now);

        let progress = info_obj.get("verificationprogress").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(inner.chain_state.process_state(progress, now))
    }

    /// Current chain-state snapshot (§4.6).
    pub fn chain_status(&self) -> ChainState {
        self.inner.lock().expect("rpc client lock poisoned").chain_state.clone()
    }

    /// Submits a raw transaction; never raises on a protocol-valid node error, instead returning
    /// the node's own message verbatim (§4.5, §7).
    pub fn broadcast_tx(&self, raw_tx_hex: &str) -> Result<String, RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");
        let request =
            self.build_request(&mut inner, "sendrawtransaction", json!([raw_tx_hex]));
        match self.send(&mut inner, &request) {
            Ok(_) => Ok("success".to_string()),
            Err(RpcError::NodeError(msg)) => Ok(msg),
            Err(e) => Err(e),
        }
    }

    /// Requests the node shut down (§4.5 `shutdown`).
    pub fn shutdown(&self) -> Result<(), RpcError> {
        let mut inner = self.inner.lock().expect("rpc client lock poisoned");
        let request = self.build_request(&mut inner, "stop", Value::Null);
        let result = self.send(&mut inner, &request)?;
        if let Some(msg) = result.as_str() {
            info!("{msg}");
        }
        Ok(())
    }

    fn build_request(&self, inner: &mut Inner, method: &'static str, params: Value) -> Request {
        Request { method, params, id: inner.ids.next() }
    }

    /// Sends `request` and returns the unwrapped `result` value, or a [`RpcError::NodeError`]
    /// carrying the node's error message/code when `error` is non-null.
    fn send(&self, inner: &mut Inner, request: &Request) -> Result<Value, RpcError> {
        let response = self.send_raw(inner, request)?;
        let error = response.get("error").filter(|e| !e.is_null());
        if let Some(err) = error {
            let msg = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            let code = err.get("code").and_then(Value::as_i64);
            return Err(RpcError::NodeError(match code {
                Some(c) => format!("{msg} ({c})"),
                None => msg,
            }));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::MalformedResponse("response missing result".into()))
    }

    /// Sends `request` over the transport and returns the whole decoded response object
    /// (`result`, `error`, `id`), validating the request/response `id` match (§4.5, §6).
    fn send_raw(&self, inner: &mut Inner, request: &Request) -> Result<Value, RpcError> {
        if inner.auth_header.is_none() {
            return Err(RpcError::NotOnline(NodeStatus::BadAuth));
        }
        let body = serde_json::to_vec(request)
            .map_err(|e| RpcError::MalformedResponse(e.to_string()))?;
        let raw = self.transport.call(&body)?;
        let response: Value = serde_json::from_slice(&raw)
            .map_err(|e| RpcError::MalformedResponse(e.to_string()))?;
        let id = response.get("id").and_then(Value::as_u64).unwrap_or(0);
        if id != request.id {
            return Err(RpcError::IdMismatch { expected: request.id, got: id });
        }
        Ok(response)
    }

    /// Records `status`, firing the callback exactly when it differs from the previously
    /// observed state (§4.5 "fire a user callback exactly on edge").
    fn transition(&self, inner: &mut Inner, status: NodeStatus) -> NodeStatus {
        if inner.previous_state != Some(status) {
            inner.previous_state = Some(status);
            (self.on_state_change)(status);
        }
        status
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct StubTransport {
        reachable: bool,
        responses: RefCell<Vec<Value>>,
    }

    impl Transport for StubTransport {
        fn call(&self, body: &[u8]) -> Result<Vec<u8>, crate::error::TransportError> {
            let req: Value = serde_json::from_slice(body).unwrap();
            let id = req["id"].as_u64().unwrap();
            let mut next = self.responses.borrow_mut().remove(0);
            next["id"] = json!(id);
            Ok(serde_json::to_vec(&next).unwrap())
        }

        fn is_reachable(&self) -> bool { self.reachable }
    }

    fn client_with(
        responses: Vec<Value>,
        reachable: bool,
    ) -> (NodeClient<StubTransport>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bitcoin.conf"), "rpcuser=a\nrpcpassword=b\n").unwrap();
        let transport = StubTransport { reachable, responses: RefCell::new(responses) };
        let client = NodeClient::new(transport, dir.into_path(), move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        (client, calls)
    }

    #[test]
    fn setup_transitions_disabled_to_online_with_one_callback() {
        let (client, calls) = client_with(vec![json!({"result": 800_000, "error": null})], true);
        let status = client.setup().unwrap();
        assert_eq!(status, NodeStatus::Online);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreachable_socket_is_disabled() {
        let (client, _calls) = client_with(vec![], false);
        let status = client.setup().unwrap();
        assert_eq!(status, NodeStatus::Disabled);
    }

    #[test]
    fn node_error_28_maps_to_error28() {
        let (client, _) =
            client_with(vec![json!({"result": null, "error": {"code": -28, "message": "loading"}})], true);
        let mut inner = client.inner.lock().unwrap();
        inner.auth_header = Some("Basic x".into());
        inner.good_node = true;
        drop(inner);
        let status = client.test_connection().unwrap();
        assert_eq!(status, NodeStatus::Error28);
    }

    #[test]
    fn broadcast_returns_node_error_verbatim_without_raising() {
        let (client, _) =
            client_with(vec![json!({"result": null, "error": {"message": "tx-already-in-mempool"}})], true);
        let mut inner = client.inner.lock().unwrap();
        inner.auth_header = Some("Basic x".into());
        drop(inner);
        let msg = client.broadcast_tx("deadbeef").unwrap();
        assert_eq!(msg, "tx-already-in-mempool");
    }

    #[test]
    fn fee_smart_falls_back_when_method_missing() {
        let (client, _) = client_with(
            vec![
                json!({"result": null, "error": "Method not found"}),
                json!({"result": 0.0001, "error": null}),
            ],
            true,
        );
        let mut inner = client.inner.lock().unwrap();
        inner.auth_header = Some("Basic x".into());
        drop(inner);
        let fer = client.get_fee_byte_smart(6, FeeStrategy::Conservative).unwrap();
        assert!(!fer.smart_fee);
        assert_eq!(fer.fee_byte, 0.0001);
    }
}
