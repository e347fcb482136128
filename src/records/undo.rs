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
use crate::keys::get_undo_key;
use crate::records::RecordError;

/// One output consumed by the block being applied, recorded so it can be restored on rewind
/// (§3.2).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RemovedStxo {
    pub tx_idx: u16,
    pub tx_out_idx: u16,
    pub parent_tx_hash: [u8; 32],
    /// `value(8 LE) || script_len(varint) || script`, identical layout to a live
    /// [`crate::records::StoredTxOut::txout_raw`] so it can be reinserted verbatim.
    pub txout_raw: Vec<u8>,
    pub is_coinbase: bool,
}

impl RemovedStxo {
    fn write(&self, w: &mut Writer) {
        w.put_u16_be(self.tx_idx)
            .put_u16_be(self.tx_out_idx)
            .put_bytes(self.parent_tx_hash)
            .put_u8(self.is_coinbase as u8)
            .put_sized_bytes(&self.txout_raw);
    }

    fn read(r: &mut Reader) -> Result<Self, RecordError> {
        let tx_idx = r.get_u16_be()?;
        let tx_out_idx = r.get_u16_be()?;
        let parent_tx_hash = r.get_array::<32>()?;
        let is_coinbase = r.get_u8()? != 0;
        let txout_raw = r.get_sized_bytes()?.to_vec();
        Ok(Self { tx_idx, tx_out_idx, parent_tx_hash, txout_raw, is_coinbase })
    }
}

/// An outpoint created by the block being applied, recorded so the fresh UTXO can be deleted
/// again on rewind (§3.2).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct CreatedOutpoint {
    pub tx_idx: u16,
    pub tx_out_idx: u16,
}

impl CreatedOutpoint {
    fn write(&self, w: &mut Writer) { w.put_u16_be(self.tx_idx).put_u16_be(self.tx_out_idx); }

    fn read(r: &mut Reader) -> Result<Self, RecordError> {
        Ok(Self { tx_idx: r.get_u16_be()?, tx_out_idx: r.get_u16_be()? })
    }
}

/// Per-block undo data (§3.2): everything needed to reverse one block's effect on the UTXO set
/// during a reorg. Written once per applied block; consumed and deleted on rewind (§3.3).
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct StoredUndoData {
    pub block_hash: [u8; 32],
    pub height: u32,
    pub dup: u8,
    pub stxo_removed: Vec<RemovedStxo>,
    pub outpoints_added: Vec<CreatedOutpoint>,
}

impl StoredUndoData {
    pub fn new(block_hash: [u8; 32], height: u32, dup: u8) -> Self {
        Self { block_hash, height, dup, stxo_removed: Vec::new(), outpoints_added: Vec::new() }
    }

    pub fn db_key(&self) -> [u8; 5] { get_undo_key(self.height, self.dup) }

    /// `block_hash(32) | num_stxo_removed(varint) | (stxo_record)* | num_outpoints_added(varint) |
    /// (outpoint)*`.
    pub fn serialize_db_value(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.put_bytes(self.block_hash);
        w.put_var_int(self.stxo_removed.len() as u64);
        for stxo in &self.stxo_removed {
            stxo.write(&mut w);
        }
        w.put_var_int(self.outpoints_added.len() as u64);
        for outpoint in &self.outpoints_added {
            outpoint.write(&mut w);
        }
        w.into_vec()
    }

    pub fn unserialize_db_value(data: &[u8], height: u32, dup: u8) -> Result<Self, RecordError> {
        let mut r = Reader::new(data);
        let block_hash = r.get_array::<32>()?;
        let num_removed = r.get_var_int()?;
        let mut stxo_removed = Vec::with_capacity(num_removed as usize);
        for _ in 0..num_removed {
            stxo_removed.push(RemovedStxo::read(&mut r)?);
        }
        let num_added = r.get_var_int()?;
        let mut outpoints_added = Vec::with_capacity(num_added as usize);
        for _ in 0..num_added {
            outpoints_added.push(CreatedOutpoint::read(&mut r)?);
        }
        Ok(Self { block_hash, height, dup, stxo_removed, outpoints_added })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StoredUndoData {
        let mut undo = StoredUndoData::new([0x77; 32], 700_000, 0);
        undo.stxo_removed.push(RemovedStxo {
            tx_idx: 1,
            tx_out_idx: 0,
            parent_tx_hash: [0x11; 32],
            txout_raw: vec![0u8; 8],
            is_coinbase: false,
        });
        undo.outpoints_added.push(CreatedOutpoint { tx_idx: 2, tx_out_idx: 0 });
        undo
    }

    #[test]
    fn roundtrip() {
        let undo = sample();
        let bytes = undo.serialize_db_value();
        let back = StoredUndoData::unserialize_db_value(&bytes, 700_000, 0).unwrap();
        assert_eq!(back.block_hash, undo.block_hash);
        assert_eq!(back.stxo_removed.len(), 1);
        assert_eq!(back.outpoints_added, undo.outpoints_added);
    }

    #[test]
    fn db_key_matches_undodata_prefix() {
        let undo = sample();
        let key = undo.db_key();
        assert_eq!(key[0], crate::keys::PrefixByte::UndoData.to_u8());
    }
}
