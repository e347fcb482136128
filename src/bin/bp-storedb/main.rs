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

//! Maintenance CLI for the block-chain storage engine: creates a fresh pair of physical stores
//! or compacts an existing one.

#[macro_use]
extern crate log;

mod opts;

use std::fs;

use bpstoredb::db::{open_blkdata_store, open_headers_store, write_dbinfo};
use bpstoredb::records::DbInfo;
use bpstoredb::Config;
use clap::Parser;
use microservices::UService;

use crate::opts::{Command, Opts};

fn main() {
    let mut opts = Opts::parse();
    loglevel::LogLevel::from_verbosity_flag_count(opts.verbose).apply();
    trace!("command-line arguments: {:?}", opts);
    opts.process();
    trace!("processed arguments: {:?}", opts);

    let command = opts.command.clone();
    let config = Config::from(opts);
    trace!("configuration: {:?}", config);

    match command {
        Command::Init => init(&config),
        Command::Compact => compact(&config),
    }
}

/// Bitcoin network magic bytes, read big-endian the way [`DbInfo::serialize_db_value`] writes
/// them. `bpwallet::Network` carries no public accessor for these, so they are looked up here by
/// the network's canonical name.
fn network_magic(network: &bpwallet::Network) -> u32 {
    match network.to_string().as_str() {
        "mainnet" => 0xD9B4_BEF9,
        "testnet3" => 0x0709_110B,
        "testnet4" => 0x283F_161C,
        "signet" => 0x40CF_030A,
        "regtest" => 0xDAB5_BFFA,
        other => {
            warn!("unrecognised network {other:?}, falling back to the regtest magic");
            0xDAB5_BFFA
        }
    }
}

fn init(config: &Config) {
    info!("initialising data directory {}", config.data_dir.display());
    if let Err(err) = fs::create_dir_all(&config.data_dir) {
        eprintln!("failed to create data directory: {err}");
        std::process::exit(1);
    }

    let headers = open_headers_store(config.headers_path());
    let blkdata = open_blkdata_store(config.blkdata_path());

    let magic = network_magic(&config.network);
    let info = DbInfo::new(magic, config.policy.profile, config.policy.prune);

    for store in [&headers, &blkdata] {
        let tx = match store.begin_write() {
            Ok(tx) => tx,
            Err(err) => {
                eprintln!("failed to open write transaction: {err}");
                std::process::exit(1);
            }
        };
        if let Err(err) = write_dbinfo(&tx, &info) {
            eprintln!("failed to write DBInfo record: {err}");
            std::process::exit(1);
        }
        if let Err(err) = tx.commit() {
            eprintln!("failed to commit DBInfo write: {err}");
            std::process::exit(1);
        }
    }

    info!("data directory initialised");
}

fn compact(config: &Config) {
    info!("compacting stores in {}", config.data_dir.display());
    let mut headers = open_headers_store(config.headers_path());
    let mut blkdata = open_blkdata_store(config.blkdata_path());
    UService::terminate(&mut headers);
    UService::terminate(&mut blkdata);
    info!("compaction complete");
}
