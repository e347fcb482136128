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

use bpstoredb::policy::{DbPolicy, DbProfile, PruneType};
use bpstoredb::Config;
use bpwallet::Network;
use clap::{Parser, Subcommand, ValueHint};

pub const BP_DATA_DIR_ENV: &str = "BP_STOREDB_DATA_DIR";
pub const BP_NETWORK_ENV: &str = "BP_STOREDB_NETWORK";

#[cfg(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
pub const BP_DATA_DIR: &str = "~/.local/share/bp-storedb";
#[cfg(target_os = "macos")]
pub const BP_DATA_DIR: &str = "~/Library/Application Support/BP Storedb";
#[cfg(target_os = "windows")]
pub const BP_DATA_DIR: &str = "~\\AppData\\Local\\BP Storedb";
#[cfg(target_os = "ios")]
pub const BP_DATA_DIR: &str = "~/Documents";
#[cfg(target_os = "android")]
pub const BP_DATA_DIR: &str = ".";

fn default_data_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg).join("bp-storedb")
    } else {
        PathBuf::from(BP_DATA_DIR)
    }
}

/// Command-line arguments for the `bp-storedb` maintenance binary.
#[derive(Parser, Clone, Eq, PartialEq, Debug)]
#[command(author, version, about)]
pub struct Opts {
    /// Set a verbosity level.
    ///
    /// Can be used multiple times to increase verbosity.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Location of the data directory holding both physical store files.
    #[arg(
        short,
        long,
        global = true,
        default_value_os_t = default_data_dir(),
        env = BP_DATA_DIR_ENV,
        value_hint = ValueHint::DirPath
    )]
    pub data_dir: PathBuf,

    /// Bitcoin network.
    #[arg(short, long, global = true, default_value = "testnet4", env = BP_NETWORK_ENV)]
    pub network: Network,

    /// Storage profile installed at database open.
    #[arg(long, global = true, default_value = "full")]
    pub profile: DbProfile,

    /// Prune policy installed at database open.
    #[arg(long, global = true, default_value = "none")]
    pub prune: PruneType,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Eq, PartialEq, Debug)]
pub enum Command {
    /// Create both physical stores (if absent) and write the initial DBInfo record.
    Init,
    /// Compact both `redb` files.
    Compact,
}

impl Opts {
    pub fn process(&mut self) {
        self.data_dir =
            PathBuf::from(shellexpand::tilde(&self.data_dir.display().to_string()).to_string());
    }

    pub fn base_dir(&self) -> PathBuf { self.data_dir.join(self.network.to_string()) }
}

impl From<Opts> for Config {
    fn from(opts: Opts) -> Self {
        Config {
            data_dir: opts.base_dir(),
            network: opts.network,
            policy: DbPolicy { profile: opts.profile, prune: opts.prune },
            ..Config::default()
        }
    }
}
