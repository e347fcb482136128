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

use std::path::PathBuf;

use bpwallet::Network;

use crate::policy::DbPolicy;

/// File name of the physical store holding headers and the height/hash indices (§4.8).
pub const HEADERS_STORE_FILE: &str = "headers.redb";
/// File name of the physical store holding transactions, outputs, script history, undo data and
/// tx hints (§4.8).
pub const BLKDATA_STORE_FILE: &str = "blkdata.redb";

/// Final configuration the storage engine is opened with, assembled from command-line options or
/// constructed directly by an embedding application (§4.9).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Config {
    /// Directory holding both physical store files.
    pub data_dir: PathBuf,
    pub network: Network,
    pub headers_store_file: String,
    pub blkdata_store_file: String,
    /// Storage policy installed at database open (§4.4).
    pub policy: DbPolicy,
}

impl Config {
    pub fn headers_path(&self) -> PathBuf { self.data_dir.join(&self.headers_store_file) }

    pub fn blkdata_path(&self) -> PathBuf { self.data_dir.join(&self.blkdata_store_file) }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from("."),
            network: Network::Mainnet,
            headers_store_file: HEADERS_STORE_FILE.to_string(),
            blkdata_store_file: BLKDATA_STORE_FILE.to_string(),
            policy: DbPolicy::default(),
        }
    }
}
