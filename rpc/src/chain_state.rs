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

//! Tracks the peer node's sync progress from a rolling window of `getblockchaininfo` samples
//! (§4.6). Lives entirely inside [`crate::client::NodeClient`]'s critical section; nothing here
//! is independently concurrent.

use std::collections::VecDeque;

/// Maximum number of `(height, node_time, wall_time)` samples retained (§4.6: "up to 20").
const MAX_SAMPLES: usize = 20;

/// Node is considered caught up once `verificationprogress` reaches this fraction (§4.6, §8).
const READY_THRESHOLD: f64 = 0.9995;

/// Nominal Bitcoin block interval in seconds, used to translate a timestamp gap into a rough
/// block count (§4.6 step 2).
const NOMINAL_BLOCK_INTERVAL_SECS: u64 = 600;

/// Coarse sync state derived by [`ChainState::process_state`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
pub enum SyncState {
    /// no sample has been processed yet.
    Unknown,
    /// still behind; `blocks_left`/`block_speed`/`eta` are populated when computable.
    Syncing,
    /// `verificationprogress >= 0.9995`; terminal, the tracker stops recomputing after this.
    Ready,
}

/// One `(height, node_reported_time, wall_clock_time)` sample (§4.6).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
struct Sample {
    height: u32,
    node_time: u64,
    wall_time: u64,
}

/// Rolling window over the peer node's reported chain height and the derived sync status
/// (§4.6). `wall_time` is supplied by the caller on every append rather than read from the
/// system clock internally, which is what lets [`ChainState::process_state`] stay a pure
/// function over its inputs and be exercised deterministically in tests.
#[derive(Clone, Debug)]
pub struct ChainState {
    samples: VecDeque<Sample>,
    state: SyncState,
    prev_permille: u32,
    block_speed: f32,
    blocks_left: u64,
    eta: u64,
}

impl Default for ChainState {
    fn default() -> Self { Self::new() }
}

impl ChainState {
    pub fn new() -> Self {
        ChainState {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            state: SyncState::Unknown,
            prev_permille: u32::MAX,
            block_speed: 0.0,
            blocks_left: 0,
            eta: 0,
        }
    }

    /// Drops all samples and returns to `Unknown`, as `NodeChainState::reset` does on a fresh
    /// `setupConnection` (§4.6, source `nodeRPC.cpp`).
    pub fn reset(&mut self) {
        self.samples.clear();
        self.state = SyncState::Unknown;
        self.prev_permille = u32::MAX;
        self.block_speed = 0.0;
        self.blocks_left = 0;
        self.eta = 0;
    }

    pub fn state(&self) -> SyncState { self.state }

    pub fn block_speed(&self) -> f32 { self.block_speed }

    pub fn blocks_left(&self) -> u64 { self.blocks_left }

    pub fn eta(&self) -> u64 { self.eta }

    fn top_height(&self) -> Option<u32> { self.samples.back().map(|s| s.height) }

    /// Appends a new `(height, node_time)` sample stamped with `wall_time`; a repeat of the
    /// latest stored height is discarded (§4.6 step 1). Trims the deque back to
    /// [`MAX_SAMPLES`].
    pub fn append_height_and_time(&mut self, height: u32, node_time: u64, wall_time: u64) {
        if self.top_height() == Some(height) {
            return;
        }
        self.samples.push_back(Sample { height, node_time, wall_time });
        while self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    /// Derives sync state from a node's `verificationprogress` figure and the current wall
    /// clock, returning whether the state changed (§4.6 step 1-3, §8 "Chain-state Ready").
    /// Mirrors `NodeChainState::processState`: once `Ready`, further calls are no-ops.
    pub fn process_state(&mut self, verification_progress: f64, now: u64) -> bool {
        if matches!(self.state, SyncState::Ready) {
            return false;
        }

        let pct = verification_progress.clamp(0.0, 1.0);
        let permille = (pct * 10_000.0) as u32;
        if permille != self.prev_permille {
            info!("waiting on node sync: {:.2}%", pct * 100.0);
            self.prev_permille = permille;
        }

        if pct >= READY_THRESHOLD {
            self.state = SyncState::Ready;
            return true;
        }

        let Some(latest) = self.samples.back() else { return false };
        self.state = SyncState::Syncing;

        let diff = now.saturating_sub(latest.node_time);
        self.blocks_left = diff / NOMINAL_BLOCK_INTERVAL_SECS;

        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return false;
        };
        if last.wall_time <= first.wall_time {
            return false;
        }
        let block_diff = last.height.saturating_sub(first.height);
        if block_diff == 0 {
            return false;
        }
        let time_diff = last.wall_time - first.wall_time;

        self.block_speed = block_diff as f32 / time_diff as f32;
        // Source formula: `eta = blocksLeft * blockSpeed`. Units are suspect (blockSpeed is
        // blocks/second, so this yields blocks^2/s rather than a duration) but preserved
        // literally per the open question this carries forward (§9).
        self.eta = (self.blocks_left as f32 * self.block_speed) as u64;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_height_is_discarded() {
        let mut cs = ChainState::new();
        cs.append_height_and_time(100, 1_000, 2_000);
        cs.append_height_and_time(100, 1_500, 2_500);
        assert_eq!(cs.samples.len(), 1);
        assert_eq!(cs.samples.back().unwrap().node_time, 1_000);
    }

    #[test]
    fn trims_to_twenty_samples() {
        let mut cs = ChainState::new();
        for h in 0..25u32 {
            cs.append_height_and_time(h, h as u64 * 600, h as u64 * 600);
        }
        assert_eq!(cs.samples.len(), MAX_SAMPLES);
        assert_eq!(cs.samples.front().unwrap().height, 5);
    }

    #[test]
    fn ready_above_threshold() {
        let mut cs = ChainState::new();
        cs.append_height_and_time(800_000, 1_700_000_000, 1_700_000_000);
        let changed = cs.process_state(0.9996, 1_700_000_000);
        assert!(changed);
        assert_eq!(cs.state(), SyncState::Ready);
    }

    #[test]
    fn ready_is_terminal() {
        let mut cs = ChainState::new();
        cs.append_height_and_time(800_000, 1_700_000_000, 1_700_000_000);
        assert!(cs.process_state(0.9996, 1_700_000_000));
        assert!(!cs.process_state(0.5, 1_700_000_100));
        assert_eq!(cs.state(), SyncState::Ready);
    }

    #[test]
    fn syncing_computes_block_speed_and_eta() {
        let mut cs = ChainState::new();
        cs.append_height_and_time(100, 1_000_000, 10_000);
        cs.append_height_and_time(110, 1_000_600, 10_100);
        let changed = cs.process_state(0.5, 1_001_600);
        assert!(changed);
        assert_eq!(cs.state(), SyncState::Syncing);
        // 10 blocks over 100s wall-clock => 0.1 blocks/s
        assert!((cs.block_speed() - 0.1).abs() < 1e-6);
        // diff = now - latest.node_time = 1_001_600 - 1_000_600 = 1000s => blocksLeft = 1
        assert_eq!(cs.blocks_left(), 1);
    }

    #[test]
    fn no_samples_cannot_sync() {
        let mut cs = ChainState::new();
        let changed = cs.process_state(0.5, 1_000_000);
        assert!(!changed);
        assert_eq!(cs.state(), SyncState::Unknown);
    }
}
