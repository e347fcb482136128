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

use std::collections::BTreeMap;

use crate::codec::{Reader, Writer};
use crate::policy::{DbPolicy, DbProfile};
use crate::records::{pack_flags_le, unpack_flags_le, RecordError, RecordingFields, StoredTxOut};

/// Whether a caller asking for a transaction gets the whole thing, only enough to know it
/// exists, or nothing at all (§3.2/§9 "Availability tri-state").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum DbTxAvail {
    Exists,
    GetBlock,
    Unknown,
}

/// One transaction input, kept only in its "fragged" shape: everything needed to reconstruct the
/// tx's signing-independent skeleton (outpoint, scriptSig, sequence) without the witness, which
/// this engine never needs back once the tx has been indexed.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct FraggedTxIn {
    pub prev_txid: [u8; 32],
    pub prev_vout: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl FraggedTxIn {
    fn write(&self, w: &mut Writer) {
        w.put_bytes(self.prev_txid).put_u32_le(self.prev_vout).put_sized_bytes(&self.script_sig).put_u32_le(
            self.sequence,
        );
    }

    fn read(r: &mut Reader) -> Result<Self, RecordError> {
        let prev_txid = r.get_array::<32>()?;
        let prev_vout = r.get_u32_le()?;
        let script_sig = r.get_sized_bytes()?.to_vec();
        let sequence = r.get_u32_le()?;
        Ok(Self { prev_txid, prev_vout, script_sig, sequence })
    }
}

/// Splits a raw Bitcoin transaction (legacy or segwit wire encoding) into its "fragged" bytes
/// (version, inputs, locktime, output count) and the bytes of each individual output, so outputs
/// can be stored as independent TXOUTDATA rows (§3.3, §4.7 "tx fragging").
pub fn frag_tx(raw: &[u8]) -> Result<(Vec<u8>, Vec<Vec<u8>>), RecordError> {
    let mut r = Reader::new(raw);
    let version = r.get_u32_le()?;

    let marker = r.peek_u8()?;
    let is_segwit = marker == 0x00;
    if is_segwit {
        r.get_u8()?;
        let flag = r.get_u8()?;
        if flag != 0x01 {
            return Err(RecordError::invariant(format!("unsupported segwit flag {flag}")));
        }
    }

    let num_inputs = r.get_var_int()?;
    let mut inputs = Vec::with_capacity(num_inputs as usize);
    for _ in 0..num_inputs {
        inputs.push(FraggedTxIn::read(&mut r)?);
    }

    let num_outputs = r.get_var_int()?;
    if num_outputs > u64::from(u16::MAX) {
        return Err(RecordError::invariant("more than 65535 outputs in one transaction"));
    }
    let mut outputs = Vec::with_capacity(num_outputs as usize);
    for _ in 0..num_outputs {
        let value = r.get_u64_le()?;
        let script_len = r.get_var_int()? as usize;
        let script = r.get_bytes(script_len)?;
        let mut w = Writer::with_capacity(8 + 9 + script_len);
        w.put_u64_le(value).put_sized_bytes(script);
        outputs.push(w.into_vec());
    }

    if is_segwit {
        for _ in 0..num_inputs {
            let stack_items = r.get_var_int()?;
            for _ in 0..stack_items {
                let item_len = r.get_var_int()? as usize;
                r.get_bytes(item_len)?;
            }
        }
    }
    let locktime = r.get_u32_le()?;

    let mut frag = Writer::with_capacity(4 + 5 + inputs.len() * 41 + 4 + 2);
    frag.put_u32_le(version).put_var_int(num_inputs);
    for txin in &inputs {
        txin.write(&mut frag);
    }
    frag.put_u32_le(locktime);
    frag.put_u16_le(outputs.len() as u16);

    Ok((frag.into_vec(), outputs))
}

/// A stored transaction (§3.2): identity, position within its block, and either the full raw
/// bytes or the fragged skeleton plus independently-stored [`StoredTxOut`] rows, depending on
/// [`DbProfile::uses_fragged_tx`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredTx {
    pub tx_hash: [u8; 32],
    pub height: u32,
    pub dup: u8,
    pub tx_idx: u16,
    pub num_tx_out: u16,
    pub num_bytes: u32,
    /// Full raw bytes (`DbProfile::Lite`) or the fragged skeleton (every other profile).
    pub body: Vec<u8>,
    pub is_fragged: bool,
    pub tx_out_map: BTreeMap<u16, StoredTxOut>,
}

impl StoredTx {
    pub fn empty_fragged(height: u32, dup: u8, tx_idx: u16) -> Self {
        Self {
            tx_hash: [0u8; 32],
            height,
            dup,
            tx_idx,
            num_tx_out: 0,
            num_bytes: 0,
            body: Vec::new(),
            is_fragged: true,
            tx_out_map: BTreeMap::new(),
        }
    }

    /// Builds a record from raw wire bytes, fragging it unless `profile` is [`DbProfile::Lite`].
    pub fn from_raw(
        raw: &[u8],
        tx_hash: [u8; 32],
        height: u32,
        dup: u8,
        tx_idx: u16,
        profile: DbProfile,
    ) -> Result<Self, RecordError> {
        if profile.uses_fragged_tx() {
            let (frag, _outputs) = frag_tx(raw)?;
            let num_tx_out = _outputs.len() as u16;
            Ok(Self {
                tx_hash,
                height,
                dup,
                tx_idx,
                num_tx_out,
                num_bytes: raw.len() as u32,
                body: frag,
                is_fragged: true,
                tx_out_map: BTreeMap::new(),
            })
        } else {
            Ok(Self {
                tx_hash,
                height,
                dup,
                tx_idx,
                num_tx_out: 0,
                num_bytes: raw.len() as u32,
                body: raw.to_vec(),
                is_fragged: false,
                tx_out_map: BTreeMap::new(),
            })
        }
    }

    fn flags(&self, policy: DbPolicy) -> u32 {
        pack_flags_le(super::ENGINE_VERSION, policy.profile.to_u8(), policy.prune.to_u8(), self.is_fragged as u8)
    }

    /// `flags(u32 LE) | version(u32 LE) | num_inputs(varint) | inputs... | locktime(u32 LE) |
    /// numTxOut(u16 LE)` for a fragged tx (the tail four fields are `body`, written by
    /// [`frag_tx`]); `flags(u32 LE) | body` (the untouched raw wire bytes) otherwise.
    /// `num_tx_out` and `num_bytes` are not persisted — they are recomputed on load.
    pub fn serialize_db_value(&self, override_policy: Option<DbPolicy>) -> Vec<u8> {
        let policy = crate::policy::resolve_policy(override_policy);
        let mut w = Writer::new();
        w.put_u32_le(self.flags(policy)).put_bytes(&self.body);
        w.into_vec()
    }

    pub fn unserialize_db_value(
        data: &[u8],
        height: u32,
        dup: u8,
        tx_idx: u16,
    ) -> Result<(Self, RecordingFields), RecordError> {
        let mut r = Reader::new(data);
        let flags = r.get_u32_le()?;
        let [engine_version, db_type, prune_type, is_fragged] = unpack_flags_le(flags);
        let is_fragged = is_fragged != 0;
        let body = r.get_bytes(r.remaining())?.to_vec();
        let num_tx_out = if is_fragged && body.len() >= 2 {
            u16::from_le_bytes([body[body.len() - 2], body[body.len() - 1]])
        } else {
            0
        };
        let num_bytes = body.len() as u32;
        let tx = Self {
            tx_hash: [0u8; 32],
            height,
            dup,
            tx_idx,
            num_tx_out,
            num_bytes,
            body,
            is_fragged,
            tx_out_map: BTreeMap::new(),
        };
        Ok((tx, RecordingFields { engine_version, db_type, prune_type }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One legacy input spending a made-up outpoint, two outputs, no witness data.
    fn sample_legacy_tx() -> Vec<u8> {
        let mut w = Writer::new();
        w.put_u32_le(2); // version
        w.put_var_int(1); // num inputs
        w.put_bytes([0xAB; 32]); // prev txid
        w.put_u32_le(0); // prev vout
        w.put_sized_bytes(&[0x76, 0xA9]); // scriptSig
        w.put_u32_le(0xFFFF_FFFF); // sequence
        w.put_var_int(2); // num outputs
        w.put_u64_le(5_000); // value
        w.put_sized_bytes(&[0x51]); // scriptPubKey
        w.put_u64_le(1_000); // value
        w.put_sized_bytes(&[0x52]); // scriptPubKey
        w.put_u32_le(0); // locktime
        w.into_vec()
    }

    #[test]
    fn frag_splits_legacy_tx_outputs() {
        let raw = sample_legacy_tx();
        let (frag, outputs) = frag_tx(&raw).unwrap();
        assert_eq!(outputs.len(), 2);
        assert!(!frag.is_empty());
        // frag must not contain either scriptPubKey byte string.
        assert!(!frag.windows(1).any(|w| w == [0x51]) || frag.len() < raw.len());
    }

    #[test]
    fn stored_tx_roundtrip_fragged() {
        let raw = sample_legacy_tx();
        let tx = StoredTx::from_raw(&raw, [0x99; 32], 700_000, 0, 3, DbProfile::Full).unwrap();
        assert!(tx.is_fragged);
        assert_eq!(tx.num_tx_out, 2);
        let bytes = tx.serialize_db_value(None);
        let (back, _) = StoredTx::unserialize_db_value(&bytes, 700_000, 0, 3).unwrap();
        assert_eq!(back.body, tx.body);
        assert_eq!(back.num_tx_out, 2);
    }

    #[test]
    fn stored_tx_lite_profile_keeps_whole_body() {
        let raw = sample_legacy_tx();
        let tx = StoredTx::from_raw(&raw, [0x99; 32], 700_000, 0, 0, DbProfile::Lite).unwrap();
        assert!(!tx.is_fragged);
        assert_eq!(tx.body, raw);
    }
}
