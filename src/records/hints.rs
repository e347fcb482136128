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
use crate::keys::get_tx_hints_key;
use crate::records::RecordError;

/// Disambiguates a tx hash's 4-byte prefix to the full set of dbkeys that share it, with a
/// "preferred" choice when more than one branch holds the same tx (§3.2).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredTxHints {
    pub hash_prefix: [u8; 4],
    /// 6-byte `hgtx+txIdx` dbkeys (no prefix byte) sharing `hash_prefix`.
    pub dbkeys: Vec<Vec<u8>>,
    pub preferred_dbkey: Option<Vec<u8>>,
}

impl StoredTxHints {
    pub fn new(hash_prefix: [u8; 4]) -> Self {
        Self { hash_prefix, dbkeys: Vec::new(), preferred_dbkey: None }
    }

    pub fn db_key(&self) -> [u8; 5] { get_tx_hints_key(self.hash_prefix) }

    /// `true` iff `preferred_dbkey` appears in `dbkeys` whenever it is set (§3.2).
    pub fn invariant_preferred_in_list(&self) -> bool {
        match &self.preferred_dbkey {
            None => true,
            Some(preferred) => self.dbkeys.iter().any(|k| k == preferred),
        }
    }

    pub fn push(&mut self, dbkey: Vec<u8>) {
        if !self.dbkeys.contains(&dbkey) {
            self.dbkeys.push(dbkey);
        }
    }

    /// `num_hints(varint) | (6B dbkey)* | preferred_dbkey(6B or empty)`.
    pub fn serialize_db_value(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_var_int(self.dbkeys.len() as u64);
        for key in &self.dbkeys {
            w.put_bytes(key);
        }
        match &self.preferred_dbkey {
            Some(key) => w.put_sized_bytes(key),
            None => w.put_sized_bytes(&[]),
        };
        w.into_vec()
    }

    pub fn unserialize_db_value(data: &[u8], hash_prefix: [u8; 4]) -> Result<Self, RecordError> {
        let mut r = Reader::new(data);
        let count = r.get_var_int()?;
        let mut dbkeys = Vec::with_capacity(count as usize);
        for _ in 0..count {
            dbkeys.push(r.get_array::<6>()?.to_vec());
        }
        let preferred_bytes = r.get_sized_bytes()?.to_vec();
        let preferred_dbkey = if preferred_bytes.is_empty() { None } else { Some(preferred_bytes) };
        let hints = Self { hash_prefix, dbkeys, preferred_dbkey };
        if !hints.invariant_preferred_in_list() {
            return Err(RecordError::invariant(
                "preferred_dbkey is not present among this record's dbkeys",
            ));
        }
        Ok(hints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut hints = StoredTxHints::new([0x01, 0x02, 0x03, 0x04]);
        hints.push(vec![0u8; 6]);
        hints.push(vec![1u8; 6]);
        hints.preferred_dbkey = Some(vec![1u8; 6]);
        let bytes = hints.serialize_db_value();
        let back = StoredTxHints::unserialize_db_value(&bytes, hints.hash_prefix).unwrap();
        assert_eq!(back.dbkeys.len(), 2);
        assert_eq!(back.preferred_dbkey, Some(vec![1u8; 6]));
    }

    #[test]
    fn preferred_must_be_in_list() {
        let mut hints = StoredTxHints::new([0; 4]);
        hints.push(vec![0u8; 6]);
        hints.preferred_dbkey = Some(vec![9u8; 6]);
        assert!(!hints.invariant_preferred_in_list());
    }
}
