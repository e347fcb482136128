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

use crate::codec::{Reader, Writer};
use crate::policy::{DbPolicy, DbProfile, PruneType};
use crate::records::RecordError;

/// Global database metadata (§3.2): exists iff the database has been initialised. `top_hash`
/// must agree with the header stored at `(top_height, preferred_dup)`, an invariant enforced by
/// the storage engine façade rather than this codec (a single record cannot check a cross-table
/// fact).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct DbInfo {
    pub magic: u32,
    pub top_height: u32,
    pub top_hash: [u8; 32],
    pub engine_version: u32,
    pub profile: DbProfile,
    pub prune: PruneType,
}

impl DbInfo {
    pub fn new(magic: u32, profile: DbProfile, prune: PruneType) -> Self {
        Self {
            magic,
            top_height: 0,
            top_hash: [0u8; 32],
            engine_version: u32::from(super::ENGINE_VERSION),
            profile,
            prune,
        }
    }

    pub fn policy(&self) -> DbPolicy { DbPolicy { profile: self.profile, prune: self.prune } }

    /// `magic(4) | top_height(u32 LE) | top_hash(32) | engine_version(u32 LE) | db_type(u8) |
    /// prune_type(u8)`.
    pub fn serialize_db_value(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(4 + 4 + 32 + 4 + 1 + 1);
        w.put_u32_be(self.magic)
            .put_u32_le(self.top_height)
            .put_bytes(self.top_hash)
            .put_u32_le(self.engine_version)
            .put_u8(self.profile.to_u8())
            .put_u8(self.prune.to_u8());
        w.into_vec()
    }

    pub fn unserialize_db_value(data: &[u8]) -> Result<Self, RecordError> {
        let mut r = Reader::new(data);
        let magic = r.get_u32_be()?;
        let top_height = r.get_u32_le()?;
        let top_hash = r.get_array::<32>()?;
        let engine_version = r.get_u32_le()?;
        let profile_byte = r.get_u8()?;
        let prune_byte = r.get_u8()?;
        let profile = DbProfile::from_u8(profile_byte)
            .ok_or(RecordError::BadDiscriminant(profile_byte, "db_type"))?;
        let prune = PruneType::from_u8(prune_byte)
            .ok_or(RecordError::BadDiscriminant(prune_byte, "prune_type"))?;
        Ok(Self { magic, top_height, top_hash, engine_version, profile, prune })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DbInfo {
        let mut info = DbInfo::new(0xD9B4_BEF9, DbProfile::Full, PruneType::PruneNone);
        info.top_height = 800_000;
        info.top_hash = [0x42; 32];
        info
    }

    #[test]
    fn roundtrip() {
        let info = sample();
        let bytes = info.serialize_db_value();
        assert_eq!(bytes.len(), 4 + 4 + 32 + 4 + 1 + 1);
        let back = DbInfo::unserialize_db_value(&bytes).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn stable_bytes() {
        let info = sample();
        assert_eq!(info.serialize_db_value(), sample().serialize_db_value());
    }

    #[test]
    fn rejects_short_read() {
        let bytes = [0u8; 3];
        assert!(DbInfo::unserialize_db_value(&bytes).is_err());
    }
}
