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
use crate::keys::get_script_key;
use crate::policy::DbPolicy;
use crate::records::{pack_flags_le, unpack_flags_le, RecordError, RecordingFields};

/// One receipt/spend cross-reference row of a [`StoredScriptHistory`] (§3.2, GLOSSARY). The
/// "received-at" key always points at a [`crate::records::StoredTxOut`]; "spent-at" is present
/// only once that output has been spent.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct TxIoPair {
    /// `hgtx+txIdx+txOutIdx` dbkey (no prefix byte) of the output this entry receives.
    pub dbkey_received: Vec<u8>,
    /// `hgtx+txIdx` dbkey (no prefix byte) of the txin that spends it, once spent.
    pub dbkey_spent: Option<Vec<u8>>,
    pub height: u32,
    pub tx_idx: u16,
    pub tx_out_idx: u16,
}

impl TxIoPair {
    pub fn new(dbkey_received: Vec<u8>, height: u32, tx_idx: u16, tx_out_idx: u16) -> Self {
        Self { dbkey_received, dbkey_spent: None, height, tx_idx, tx_out_idx }
    }

    /// Chronological sort key: `(height, tx_idx, tx_out_idx)`, the ordering invariant §4.3 "SSH
    /// tie-breaks" requires of `txioVect_`.
    fn order_key(&self) -> (u32, u16, u16) { (self.height, self.tx_idx, self.tx_out_idx) }

    fn write(&self, w: &mut Writer) {
        w.put_sized_bytes(&self.dbkey_received);
        match &self.dbkey_spent {
            Some(key) => w.put_sized_bytes(key),
            None => w.put_sized_bytes(&[]),
        };
    }

    fn read(r: &mut Reader) -> Result<Self, RecordError> {
        let dbkey_received = r.get_sized_bytes()?.to_vec();
        let spent_bytes = r.get_sized_bytes()?.to_vec();
        let dbkey_spent = if spent_bytes.is_empty() { None } else { Some(spent_bytes) };
        let (_, parsed) = crate::keys::read_blk_data_key(&{
            let mut with_prefix = vec![crate::keys::PrefixByte::TxData.to_u8()];
            with_prefix.extend_from_slice(&dbkey_received);
            with_prefix
        });
        let parsed = parsed.ok_or_else(|| {
            RecordError::invariant("txio received dbkey is not a valid TXDATA txout key")
        })?;
        let tx_idx = parsed.tx_idx.ok_or_else(|| RecordError::invariant("txio key missing tx_idx"))?;
        let tx_out_idx = parsed
            .tx_out_idx
            .ok_or_else(|| RecordError::invariant("txio key missing tx_out_idx"))?;
        Ok(Self { dbkey_received, dbkey_spent, height: parsed.height, tx_idx, tx_out_idx })
    }
}

/// Per-script transaction history (§3.2, GLOSSARY "SSH"): every receipt/spend event touching one
/// script, in chronological order. Duplicate entries at the same `(height, tx_idx, tx_out_idx)`
/// are forbidden (§4.3).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredScriptHistory {
    /// Unique key bytes (including the SCRIPT prefix byte) identifying this script.
    pub unique_key: Vec<u8>,
    pub version: u8,
    pub already_scanned_up_to_block: u32,
    pub txio_vect: Vec<TxIoPair>,
    pub multisig_dbkeys: Vec<Vec<u8>>,
}

impl StoredScriptHistory {
    pub fn new(script_key: &[u8]) -> Self {
        Self {
            unique_key: get_script_key(script_key),
            version: 1,
            already_scanned_up_to_block: 0,
            txio_vect: Vec::new(),
            multisig_dbkeys: Vec::new(),
        }
    }

    /// Inserts a txio entry at its chronologically-sorted position. Rejects an entry that would
    /// duplicate an existing `(height, tx_idx, tx_out_idx)` (§4.3, §8 "SSH monotonicity").
    pub fn insert_txio(&mut self, entry: TxIoPair) -> Result<(), RecordError> {
        let key = entry.order_key();
        match self.txio_vect.binary_search_by_key(&key, TxIoPair::order_key) {
            Ok(_) => Err(RecordError::invariant(format!(
                "duplicate txio entry at height {}, tx {}, out {}",
                key.0, key.1, key.2
            ))),
            Err(pos) => {
                self.txio_vect.insert(pos, entry);
                Ok(())
            }
        }
    }

    /// `true` iff `txio_vect` is sorted by `(height, tx_idx, tx_out_idx)` with no duplicates —
    /// the invariant [`Self::insert_txio`] maintains incrementally (§8 "SSH monotonicity").
    pub fn is_chronologically_sorted(&self) -> bool {
        self.txio_vect.windows(2).all(|w| w[0].order_key() < w[1].order_key())
    }

    fn flags(&self, policy: DbPolicy) -> u32 {
        pack_flags_le(super::ENGINE_VERSION, policy.profile.to_u8(), policy.prune.to_u8(), self.version)
    }

    /// `flags(u32 LE) | already_scanned_up_to(u32 LE) | txio_count(varint) | (txio_record)* |
    /// multisig_count(varint) | (dbkey)*`.
    pub fn serialize_db_value(&self, override_policy: Option<DbPolicy>) -> Vec<u8> {
        let policy = crate::policy::resolve_policy(override_policy);
        let mut w = Writer::new();
        w.put_u32_le(self.flags(policy)).put_u32_le(self.already_scanned_up_to_block);
        w.put_var_int(self.txio_vect.len() as u64);
        for entry in &self.txio_vect {
            entry.write(&mut w);
        }
        w.put_var_int(self.multisig_dbkeys.len() as u64);
        for key in &self.multisig_dbkeys {
            w.put_sized_bytes(key);
        }
        w.into_vec()
    }

    pub fn unserialize_db_value(
        data: &[u8],
        unique_key: Vec<u8>,
    ) -> Result<(Self, RecordingFields), RecordError> {
        let mut r = Reader::new(data);
        let flags = r.get_u32_le()?;
        let [engine_version, db_type, prune_type, version] = unpack_flags_le(flags);
        let already_scanned_up_to_block = r.get_u32_le()?;
        let txio_count = r.get_var_int()?;
        let mut txio_vect = Vec::with_capacity(txio_count as usize);
        for _ in 0..txio_count {
            txio_vect.push(TxIoPair::read(&mut r)?);
        }
        let multisig_count = r.get_var_int()?;
        let mut multisig_dbkeys = Vec::with_capacity(multisig_count as usize);
        for _ in 0..multisig_count {
            multisig_dbkeys.push(r.get_sized_bytes()?.to_vec());
        }
        let ssh = Self { unique_key, version, already_scanned_up_to_block, txio_vect, multisig_dbkeys };
        if !ssh.is_chronologically_sorted() {
            return Err(RecordError::invariant("decoded SSH txio_vect is not chronologically sorted"));
        }
        Ok((ssh, RecordingFields { engine_version, db_type, prune_type }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{get_blk_data_key_no_prefix, PrefixByte};

    fn received_key(height: u32, tx_idx: u16, tx_out_idx: u16) -> Vec<u8> {
        get_blk_data_key_no_prefix(height, 0, Some(tx_idx), Some(tx_out_idx))
    }

    #[test]
    fn insert_keeps_chronological_order() {
        let mut ssh = StoredScriptHistory::new(&[0x01, 0x02]);
        ssh.insert_txio(TxIoPair::new(received_key(200, 1, 0), 200, 1, 0)).unwrap();
        ssh.insert_txio(TxIoPair::new(received_key(100, 2, 0), 100, 2, 0)).unwrap();
        ssh.insert_txio(TxIoPair::new(received_key(100, 1, 0), 100, 1, 0)).unwrap();
        assert!(ssh.is_chronologically_sorted());
        assert_eq!(ssh.txio_vect[0].height, 100);
        assert_eq!(ssh.txio_vect[0].tx_idx, 1);
        assert_eq!(ssh.txio_vect[2].height, 200);
    }

    #[test]
    fn duplicate_entry_rejected() {
        let mut ssh = StoredScriptHistory::new(&[0x01]);
        ssh.insert_txio(TxIoPair::new(received_key(100, 1, 0), 100, 1, 0)).unwrap();
        let err = ssh.insert_txio(TxIoPair::new(received_key(100, 1, 0), 100, 1, 0)).unwrap_err();
        assert!(matches!(err, RecordError::Invariant(_)));
    }

    #[test]
    fn roundtrip() {
        let mut ssh = StoredScriptHistory::new(&[0xAA, 0xBB]);
        ssh.already_scanned_up_to_block = 500_000;
        ssh.insert_txio(TxIoPair::new(received_key(100, 0, 0), 100, 0, 0)).unwrap();
        ssh.multisig_dbkeys.push(vec![PrefixByte::Script.to_u8(), 0x01]);
        let bytes = ssh.serialize_db_value(None);
        let (back, _) = StoredScriptHistory::unserialize_db_value(&bytes, ssh.unique_key.clone()).unwrap();
        assert_eq!(back.already_scanned_up_to_block, 500_000);
        assert_eq!(back.txio_vect.len(), 1);
        assert_eq!(back.multisig_dbkeys, ssh.multisig_dbkeys);
    }
}
