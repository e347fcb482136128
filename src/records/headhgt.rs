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
use crate::keys::get_head_hgt_key;
use crate::records::RecordError;

/// All known blocks at one height, with the dup chosen as the main branch (§3.2). At most one
/// entry per dup; the preferred dup must be in the list whenever the list is non-empty.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredHeadHgtList {
    pub height: u32,
    pub entries: Vec<(u8, [u8; 32])>,
    pub preferred_dup: Option<u8>,
}

/// Raised by [`StoredHeadHgtList::insert`] when a dup already present in the list is reinserted
/// with a conflicting hash (§4.3 "HeadHgtList update", §7 "Invariant violation"). The caller must
/// reconcile the two branches; this engine replaces the entry but surfaces the conflict so the
/// write is not silently accepted.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("dup {dup} already present at height {height} with a different hash")]
pub struct DupConflict {
    pub height: u32,
    pub dup: u8,
}

impl StoredHeadHgtList {
    pub fn new(height: u32) -> Self { Self { height, entries: Vec::new(), preferred_dup: None } }

    pub fn db_key(&self) -> [u8; 5] { get_head_hgt_key(self.height) }

    /// `true` iff `preferred_dup` is in `entries` exactly when `entries` is non-empty, and no dup
    /// appears twice (§3.2).
    pub fn invariant_holds(&self) -> bool {
        let mut dups: Vec<u8> = self.entries.iter().map(|(dup, _)| *dup).collect();
        dups.sort_unstable();
        let no_duplicate_dups = dups.windows(2).all(|w| w[0] != w[1]);
        let preferred_ok = match self.preferred_dup {
            None => self.entries.is_empty(),
            Some(dup) => self.entries.iter().any(|(d, _)| *d == dup),
        };
        no_duplicate_dups && preferred_ok
    }

    /// Inserts `(dup, hash)` (§4.3 "HeadHgtList update"): no-op if an identical entry already
    /// exists, appended if `dup` is new, rejected with [`DupConflict`] — but the entry is still
    /// replaced, matching the source's "replaced AND an error is reported" (§8) — if `dup` is
    /// present with a different hash.
    pub fn insert(&mut self, dup: u8, hash: [u8; 32]) -> Result<(), DupConflict> {
        if let Some(existing) = self.entries.iter_mut().find(|(d, _)| *d == dup) {
            if existing.1 == hash {
                return Ok(());
            }
            existing.1 = hash;
            return Err(DupConflict { height: self.height, dup });
        }
        self.entries.push((dup, hash));
        Ok(())
    }

    /// `num_entries(u8) | (dup(u8) | hash(32))* | preferred_dup(u8)`. `preferred_dup` is encoded
    /// as [`crate::keys::DUP_UNSET`] when absent.
    pub fn serialize_db_value(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(1 + self.entries.len() * 33 + 1);
        w.put_u8(self.entries.len() as u8);
        for (dup, hash) in &self.entries {
            w.put_u8(*dup).put_bytes(hash);
        }
        w.put_u8(self.preferred_dup.unwrap_or(crate::keys::DUP_UNSET));
        w.into_vec()
    }

    pub fn unserialize_db_value(data: &[u8], height: u32) -> Result<Self, RecordError> {
        let mut r = Reader::new(data);
        let count = r.get_u8()?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let dup = r.get_u8()?;
            let hash = r.get_array::<32>()?;
            entries.push((dup, hash));
        }
        let preferred_byte = r.get_u8()?;
        let preferred_dup = if preferred_byte == crate::keys::DUP_UNSET { None } else { Some(preferred_byte) };
        let list = Self { height, entries, preferred_dup };
        if !list.invariant_holds() {
            return Err(RecordError::invariant(
                "decoded HeadHgtList violates the preferred-dup/no-duplicate-dup invariant",
            ));
        }
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_identical_insert_is_noop() {
        let mut list = StoredHeadHgtList::new(800_000);
        list.insert(0, [0x11; 32]).unwrap();
        list.insert(0, [0x11; 32]).unwrap();
        list.insert(1, [0x22; 32]).unwrap();
        assert_eq!(list.entries, vec![(0, [0x11; 32]), (1, [0x22; 32])]);
    }

    #[test]
    fn conflicting_insert_replaces_and_errors() {
        let mut list = StoredHeadHgtList::new(800_000);
        list.insert(0, [0x11; 32]).unwrap();
        let err = list.insert(0, [0x22; 32]).unwrap_err();
        assert_eq!(err, DupConflict { height: 800_000, dup: 0 });
        assert_eq!(list.entries, vec![(0, [0x22; 32])]);
    }

    #[test]
    fn roundtrip_with_preferred() {
        let mut list = StoredHeadHgtList::new(800_000);
        list.insert(0, [0x11; 32]).unwrap();
        list.insert(1, [0x22; 32]).unwrap();
        list.preferred_dup = Some(1);
        let bytes = list.serialize_db_value();
        let back = StoredHeadHgtList::unserialize_db_value(&bytes, 800_000).unwrap();
        assert_eq!(back, list);
    }

    #[test]
    fn roundtrip_empty_has_no_preferred() {
        let list = StoredHeadHgtList::new(800_000);
        let bytes = list.serialize_db_value();
        let back = StoredHeadHgtList::unserialize_db_value(&bytes, 800_000).unwrap();
        assert_eq!(back.preferred_dup, None);
    }
}
