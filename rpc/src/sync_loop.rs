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

//! `waitOnChainSync` (§4.6, §9 "Cooperative polling loop"): a blocking, synchronous wait for the
//! peer node to finish its initial block download, composed from [`NodeClient`] calls. Kept
//! synchronous (no async runtime) to match the rest of this crate's RPC-facing code; cancellation
//! is cooperative via an explicit `crossbeam_channel::Receiver<()>`, observed between sleeps,
//! rather than blocking the caller forever.

use std::time::Duration;

use crossbeam_channel::Receiver;

use crate::chain_state::SyncState;
use crate::client::NodeClient;
use crate::error::{NodeStatus, RpcError};
use crate::transport::Transport;

/// Upper bound on the loop's sleep between `updateChainStatus` polls (§4.6).
const MAX_POLL_SECS: u64 = 5;

/// Outcome of [`wait_on_chain_sync`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
pub enum WaitOutcome {
    /// the node reported `Ready`.
    Ready,
    /// `shutdown` fired before the node became ready.
    ShutDown,
    /// the node went offline (not `Error28`) while waiting for it to come up.
    NodeUnavailable,
}

/// Blocks until the node reports `Ready`, invoking `cb` on entry, once the node comes online,
/// and on every chain-state transition thereafter (§4.6 "composes the above"). Returns early if
/// `shutdown` receives.
pub fn wait_on_chain_sync<T: Transport>(
    client: &NodeClient<T>,
    shutdown: &Receiver<()>,
    mut cb: impl FnMut(),
) -> Result<WaitOutcome, RpcError> {
    cb();

    loop {
        if shutdown.try_recv().is_ok() {
            return Ok(WaitOutcome::ShutDown);
        }
        let status = client.test_connection()?;
        if status != NodeStatus::Error28 {
            if status != NodeStatus::Online {
                return Ok(WaitOutcome::NodeUnavailable);
            }
            break;
        }
        if sleep_or_shutdown(shutdown, Duration::from_secs(1)) {
            return Ok(WaitOutcome::ShutDown);
        }
    }

    cb();

    loop {
        let changed = client.update_chain_status()?;
        if changed {
            cb();
        }

        let status = client.chain_status();
        if status.state() == SyncState::Ready {
            return Ok(WaitOutcome::Ready);
        }

        let speed = status.block_speed();
        let dur_secs = if speed > 0.0 {
            (1.0_f32 / speed).max(1.0).min(MAX_POLL_SECS as f32) as u64
        } else {
            1
        };
        if sleep_or_shutdown(shutdown, Duration::from_secs(dur_secs)) {
            return Ok(WaitOutcome::ShutDown);
        }
    }
}

/// Sleeps for `dur`, returning `true` early if `shutdown` fires during the wait.
fn sleep_or_shutdown(shutdown: &Receiver<()>, dur: Duration) -> bool {
    matches!(shutdown.recv_timeout(dur), Ok(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    struct FlakyThenOnlineTransport {
        calls: std::cell::Cell<u32>,
    }

    impl Transport for FlakyThenOnlineTransport {
        fn call(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
            let req: serde_json::Value = serde_json::from_slice(body).unwrap();
            let id = req["id"].as_u64().unwrap();
            let n = self.calls.get();
            self.calls.set(n + 1);
            let body = if n == 0 {
                serde_json::json!({"result": null, "error": {"code": -28, "message": "loading"}, "id": id})
            } else if req["method"] == "getblockcount" {
                serde_json::json!({"result": 100, "error": null, "id": id})
            } else if req["method"] == "getblockchaininfo" {
                serde_json::json!({
                    "result": {"verificationprogress": 0.9999, "bestblockhash": "abcd"},
                    "error": null, "id": id
                })
            } else {
                serde_json::json!({
                    "result": {"height": 100, "time": 1_700_000_000},
                    "error": null, "id": id
                })
            };
            Ok(serde_json::to_vec(&body).unwrap())
        }

        fn is_reachable(&self) -> bool { true }
    }

    #[test]
    fn reaches_ready_after_error28_then_online() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bitcoin.conf"), "rpcuser=a\nrpcpassword=b\n").unwrap();
        let transport = FlakyThenOnlineTransport { calls: std::cell::Cell::new(0) };
        let client = NodeClient::new(transport, dir.into_path(), |_| {});
        client.setup().ok();

        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut callback_count = 0;
        let outcome = wait_on_chain_sync(&client, &rx, || callback_count += 1).unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
        assert!(callback_count >= 2);
    }

    #[test]
    fn shutdown_signal_interrupts_the_loop() {
        struct AlwaysError28 {
            calls: std::cell::Cell<u32>,
        }
        impl Transport for AlwaysError28 {
            fn call(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
                self.calls.set(self.calls.get() + 1);
                let req: serde_json::Value = serde_json::from_slice(body).unwrap();
                let id = req["id"].as_u64().unwrap();
                Ok(serde_json::to_vec(&serde_json::json!({
                    "result": null, "error": {"code": -28, "message": "loading"}, "id": id
                }))
                .unwrap())
            }
            fn is_reachable(&self) -> bool { true }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bitcoin.conf"), "rpcuser=a\nrpcpassword=b\n").unwrap();
        let client = NodeClient::new(AlwaysError28 { calls: std::cell::Cell::new(0) }, dir.into_path(), |_| {});
        client.setup().ok();

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(()).unwrap();
        let outcome = wait_on_chain_sync(&client, &rx, || {}).unwrap();
        assert_eq!(outcome, WaitOutcome::ShutDown);
    }
}
