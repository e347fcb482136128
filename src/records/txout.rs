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
use crate::keys::{get_blk_data_key_no_prefix, PrefixByte};
use crate::policy::DbPolicy;
use crate::records::{pack_flags_le, unpack_flags_le, RecordError, RecordingFields};

/// Spentness state of a [`StoredTxOut`] (§3.2).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Spentness {
    Unspent,
    Spent,
    /// Known to be spent, but by a transaction this engine has not indexed (e.g. under `LITE`).
    SpentUnknown,
}

impl Spentness {
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Unspent => 0,
            Self::Spent => 1,
            Self::SpentUnknown => 2,
        }
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Unspent,
            1 => Self::Spent,
            2 => Self::SpentUnknown,
            _ => return None,
        })
    }
}

/// A dbkey reference to the txin that spends an output: the 6-byte `hgtx+txIdx` key of the
/// spending transaction, or the 8-byte `hgtx+txIdx+txOutIdx` key when the engine also wants to
/// remember which of the spender's own outputs is relevant (never required for correctness, but
/// kept so callers need not re-derive it).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SpentByTxinKey(Vec<u8>);

impl SpentByTxinKey {
    /// Builds the 6-byte form: the spending tx's own dbkey (no outpoint, it is a spender not a
    /// spendee here).
    pub fn of_tx(height: u32, dup: u8, tx_idx: u16) -> Self {
        Self(get_blk_data_key_no_prefix(height, dup, Some(tx_idx), None))
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    fn from_bytes(bytes: Vec<u8>) -> Result<Self, RecordError> {
        match bytes.len() {
            6 | 8 => Ok(Self(bytes)),
            n => Err(RecordError::invariant(format!(
                "spent_by_txin_key must be 6 or 8 bytes, got {n}"
            ))),
        }
    }
}

/// A stored transaction output (§3.2): raw bytes, position, spentness, and (if spent) a
/// back-reference to the spending txin — by key, never by pointer (§3.3, §9).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredTxOut {
    pub parent_tx_hash: [u8; 32],
    pub height: u32,
    pub dup: u8,
    pub tx_idx: u16,
    pub tx_out_idx: u16,
    /// `value(8 LE) || script_len(varint) || script`.
    pub txout_raw: Vec<u8>,
    pub is_coinbase: bool,
    pub spentness: Spentness,
    pub spent_by_txin_key: Option<SpentByTxinKey>,
}

impl StoredTxOut {
    pub fn new(
        parent_tx_hash: [u8; 32],
        height: u32,
        dup: u8,
        tx_idx: u16,
        tx_out_idx: u16,
        txout_raw: Vec<u8>,
        is_coinbase: bool,
    ) -> Self {
        Self {
            parent_tx_hash,
            height,
            dup,
            tx_idx,
            tx_out_idx,
            txout_raw,
            is_coinbase,
            spentness: Spentness::Unspent,
            spent_by_txin_key: None,
        }
    }

    pub fn prefixed_key(&self) -> Vec<u8> {
        crate::keys::get_blk_data_key(
            PrefixByte::TxData,
            self.height,
            self.dup,
            Some(self.tx_idx),
            Some(self.tx_out_idx),
        )
    }

    /// Reads the 8-byte little-endian satoshi amount straight out of `txout_raw`, returning
    /// `u64::MAX` (never a real amount) if the buffer is too short to contain one (§9 "Open
    /// Questions"). Callers must not treat `u64::MAX` as a value.
    pub fn get_value(&self) -> u64 {
        if self.txout_raw.len() < 8 {
            return u64::MAX;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.txout_raw[..8]);
        u64::from_le_bytes(buf)
    }

    fn flags(&self, policy: DbPolicy) -> u32 {
        pack_flags_le(
            super::ENGINE_VERSION,
            policy.profile.to_u8(),
            self.is_coinbase as u8,
            self.spentness.to_u8(),
        )
    }

    /// `flags(u32 LE) | txout_raw(sized) | [spent_by_txin_key(6-8B) if spent or forced]`.
    ///
    /// `force_save_spent` emits the spent-by field even when `spentness == Unspent`, used when
    /// atomically pre-writing a record that will be patched to `Spent` shortly after (§4.3).
    pub fn serialize_db_value(&self, force_save_spent: bool, override_policy: Option<DbPolicy>) -> Vec<u8> {
        let policy = crate::policy::resolve_policy(override_policy);
        let mut w = Writer::new();
        w.put_u32_le(self.flags(policy)).put_sized_bytes(&self.txout_raw);
        let emit_spent_by = force_save_spent || !matches!(self.spentness, Spentness::Unspent);
        if emit_spent_by {
            if let Some(key) = &self.spent_by_txin_key {
                w.put_sized_bytes(key.as_bytes());
            } else {
                w.put_sized_bytes(&[]);
            }
        }
        w.into_vec()
    }

    pub fn unserialize_db_value(
        data: &[u8],
        parent_tx_hash: [u8; 32],
        height: u32,
        dup: u8,
        tx_idx: u16,
        tx_out_idx: u16,
    ) -> Result<(Self, RecordingFields), RecordError> {
        let mut r = Reader::new(data);
        let flags = r.get_u32_le()?;
        let [engine_version, db_type, is_coinbase, spentness_byte] = unpack_flags_le(flags);
        let spentness = Spentness::from_u8(spentness_byte)
            .ok_or(RecordError::BadDiscriminant(spentness_byte, "spentness"))?;
        let txout_raw = r.get_sized_bytes()?.to_vec();
        let spent_by_txin_key = if r.remaining() > 0 {
            let bytes = r.get_sized_bytes()?.to_vec();
            if bytes.is_empty() { None } else { Some(SpentByTxinKey::from_bytes(bytes)?) }
        } else {
            None
        };
        if matches!(spentness, Spentness::Spent) && spent_by_txin_key.is_none() {
            return Err(RecordError::invariant(
                "spentness is SPENT but no spent_by_txin_key is present",
            ));
        }
        if matches!(spentness, Spentness::Unspent) && spent_by_txin_key.is_some() {
            return Err(RecordError::invariant(
                "spentness is UNSPENT but a spent_by_txin_key is present",
            ));
        }
        let txout = Self {
            parent_tx_hash,
            height,
            dup,
            tx_idx,
            tx_out_idx,
            txout_raw,
            is_coinbase: is_coinbase != 0,
            spentness,
            spent_by_txin_key,
        };
        Ok((txout, RecordingFields { engine_version, db_type, prune_type: 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u64_le(50_000).put_sized_bytes(&[0x76, 0xA9, 0x14]);
        w.into_vec()
    }

    fn sample() -> StoredTxOut {
        StoredTxOut::new([0xAB; 32], 700_000, 0, 1, 0, sample_raw(), false)
    }

    #[test]
    fn unspent_roundtrip_has_no_spent_by() {
        let txout = sample();
        let bytes = txout.serialize_db_value(false, None);
        let (back, _) =
            StoredTxOut::unserialize_db_value(&bytes, [0xAB; 32], 700_000, 0, 1, 0).unwrap();
        assert_eq!(back.spentness, Spentness::Unspent);
        assert!(back.spent_by_txin_key.is_none());
    }

    #[test]
    fn spent_roundtrip_keeps_spent_by() {
        let mut txout = sample();
        txout.spentness = Spentness::Spent;
        txout.spent_by_txin_key = Some(SpentByTxinKey::of_tx(700_001, 0, 4));
        let bytes = txout.serialize_db_value(false, None);
        let (back, _) =
            StoredTxOut::unserialize_db_value(&bytes, [0xAB; 32], 700_000, 0, 1, 0).unwrap();
        assert_eq!(back.spentness, Spentness::Spent);
        assert_eq!(
            back.spent_by_txin_key.unwrap().as_bytes(),
            get_blk_data_key_no_prefix(700_001, 0, Some(4), None)
        );
    }

    #[test]
    fn force_save_spent_emits_empty_field_when_unspent() {
        let txout = sample();
        let bytes = txout.serialize_db_value(true, None);
        let (back, _) =
            StoredTxOut::unserialize_db_value(&bytes, [0xAB; 32], 700_000, 0, 1, 0).unwrap();
        assert_eq!(back.spentness, Spentness::Unspent);
        assert!(back.spent_by_txin_key.is_none());
    }

    #[test]
    fn get_value_sentinel_on_short_data() {
        let mut txout = sample();
        txout.txout_raw = vec![0x01, 0x02];
        assert_eq!(txout.get_value(), u64::MAX);
    }

    #[test]
    fn get_value_reads_amount() {
        assert_eq!(sample().get_value(), 50_000);
    }
}
