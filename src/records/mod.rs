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

//! The seven on-disk record kinds (§3.2) plus their shared flags/error vocabulary.

mod dbinfo;
mod headhgt;
mod header;
mod hints;
mod ssh;
mod tx;
mod txout;
mod undo;

pub use dbinfo::DbInfo;
pub use headhgt::StoredHeadHgtList;
pub use header::StoredHeader;
pub use hints::StoredTxHints;
pub use ssh::{StoredScriptHistory, TxIoPair};
pub use tx::{DbTxAvail, StoredTx};
pub use txout::{Spentness, StoredTxOut};
pub use undo::StoredUndoData;

use crate::codec::ShortRead;

/// Version of this engine's own serialisation, recorded in every value layout's flags so a
/// cross-check can tell which code wrote a given record. Not enforced by any codec; purely
/// informational (§4.3 "recording fields").
pub const ENGINE_VERSION: u8 = 1;

/// Packs four bytes into a little-endian `u32`, least-significant byte first, matching every
/// `flags(u32 LE: ...)` layout in §6.
pub fn pack_flags_le(b0: u8, b1: u8, b2: u8, b3: u8) -> u32 {
    u32::from_le_bytes([b0, b1, b2, b3])
}

/// Inverse of [`pack_flags_le`].
pub fn unpack_flags_le(flags: u32) -> [u8; 4] { flags.to_le_bytes() }

/// Fields every value layout's `flags` word carries back on deserialisation, available for
/// migration logging and cross-checks but never enforced by the record itself (§4.3, §9 "Variant
/// records with recording fields").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct RecordingFields {
    pub engine_version: u8,
    pub db_type: u8,
    pub prune_type: u8,
}

/// Errors surfaced while decoding a record value (§7).
#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum RecordError {
    /// short read while decoding a record: {0}
    #[from]
    ShortRead(ShortRead),

    /// record failed an internal invariant: {0}
    Invariant(String),

    /// unrecognised enum discriminant {0} in field `{1}`
    BadDiscriminant(u8, &'static str),
}

impl RecordError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self { Self::Invariant(msg.into()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_roundtrip() {
        let flags = pack_flags_le(1, 2, 3, 4);
        assert_eq!(unpack_flags_le(flags), [1, 2, 3, 4]);
    }
}
