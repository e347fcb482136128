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

//! Bitcoin Core JSON-RPC client and node chain-state tracker (§4.5, §4.6): a thin
//! request/response client over an injected [`transport::Transport`], the rolling-window sync
//! tracker it drives, and the cooperative `waitOnChainSync` polling loop built on top of both.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;

pub mod auth;
pub mod chain_state;
pub mod client;
pub mod error;
pub mod messages;
#[cfg(feature = "mock")]
pub mod mock;
pub mod sync_loop;
pub mod transport;

pub use client::{FeeEstimate, FeeStrategy, NodeClient};
pub use error::{AuthError, NodeStatus, RpcError, TransportError};
pub use sync_loop::{wait_on_chain_sync, WaitOutcome};
