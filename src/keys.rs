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

//! Composite key shapes used to order records inside each logical table (§3.1). All multi-byte
//! fields are big-endian so that lexicographic byte ordering matches the intended iteration
//! order: by height, then by dup, then by position inside the block.

use crate::codec::ShortRead;

/// Table-naming prefix byte that every on-disk key begins with.
///
/// Assignments are stable across database versions: adding a new table requires a new prefix and
/// a version bump in [`crate::records::DbInfo`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
#[display(Debug)]
#[repr(u8)]
pub enum PrefixByte {
    DbInfo = 0x00,
    HeadHash = 0x01,
    HeadHgt = 0x02,
    TxData = 0x03,
    TxHints = 0x04,
    Script = 0x05,
    UndoData = 0x06,
    /// Reserved for an authenticated index; no record type is defined for it by this engine.
    TrieNodes = 0x07,
}

impl PrefixByte {
    pub fn to_u8(self) -> u8 { self as u8 }

    pub fn from_u8(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::DbInfo,
            0x01 => Self::HeadHash,
            0x02 => Self::HeadHgt,
            0x03 => Self::TxData,
            0x04 => Self::TxHints,
            0x05 => Self::Script,
            0x06 => Self::UndoData,
            0x07 => Self::TrieNodes,
            _ => return None,
        })
    }
}

/// Reported when a prefix byte read from a key does not match what the caller expected.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("expected prefix {expected}, found {found:#04x}")]
pub struct PrefixMismatch {
    pub expected: PrefixByte,
    pub found: u8,
}

/// Peeks the first byte of `data` without consuming it, for callers that need to dispatch a read
/// by table before picking a decoder.
pub fn check_prefix_byte(data: &[u8]) -> Result<u8, ShortRead> {
    data.first().copied().ok_or(ShortRead { requested: 1, available: 0 })
}

/// As [`check_prefix_byte`] but fails with [`PrefixMismatch`] unless the byte equals `expected`.
pub fn check_prefix_byte_w_error(
    data: &[u8],
    expected: PrefixByte,
) -> Result<(), PrefixMismatchError> {
    let found = check_prefix_byte(data)?;
    if found != expected.to_u8() {
        return Err(PrefixMismatch { expected, found }.into());
    }
    Ok(())
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(inner)]
pub enum PrefixMismatchError {
    #[from]
    ShortRead(ShortRead),
    #[from]
    Mismatch(PrefixMismatch),
}

/// Height value that marks an hgtx field as "unset" (all bits of the 24-bit height set).
pub const HEIGHT_UNSET: u32 = 0x00FF_FFFF;
/// Dup value that marks an hgtx field as "unset".
pub const DUP_UNSET: u8 = 0xFF;

/// Packs a block height and duplicate ID into the 4-byte `hgtx` composite: the 24-bit height
/// occupies the three most significant bytes, the dup ID the least significant byte.
///
/// `heightAndDupToHgtx(123456, 2)` produces `01 E2 40 02`.
pub fn height_and_dup_to_hgtx(height: u32, dup: u8) -> [u8; 4] {
    debug_assert!(height <= 0x00FF_FFFF, "height does not fit in 24 bits");
    let h = height.to_be_bytes();
    [h[1], h[2], h[3], dup]
}

pub fn hgtx_to_height(hgtx: [u8; 4]) -> u32 {
    u32::from_be_bytes([0, hgtx[0], hgtx[1], hgtx[2]])
}

pub fn hgtx_to_dup_id(hgtx: [u8; 4]) -> u8 { hgtx[3] }

pub fn hgtx_is_unset(hgtx: [u8; 4]) -> bool {
    hgtx_to_height(hgtx) == HEIGHT_UNSET && hgtx_to_dup_id(hgtx) == DUP_UNSET
}

pub const HGTX_UNSET: [u8; 4] = height_and_dup_to_hgtx_const(HEIGHT_UNSET, DUP_UNSET);

// `height_and_dup_to_hgtx` itself cannot be `const fn` because of the `debug_assert!`; this twin
// is used only to build the UNSET sentinel at compile time.
const fn height_and_dup_to_hgtx_const(height: u32, dup: u8) -> [u8; 4] {
    let h = height.to_be_bytes();
    [h[1], h[2], h[3], dup]
}

/// Tag returned by [`read_blk_data_key`], inferred from the total key length.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
#[display(Debug)]
pub enum BlkDataKeyKind {
    NotBlkData,
    BlkDataHeader,
    BlkDataTx,
    BlkDataTxOut,
}

/// The parsed body of a TXDATA-family key: an `hgtx` plus the optional tx/txout indices that
/// extend it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BlkDataKey {
    pub height: u32,
    pub dup: u8,
    pub tx_idx: Option<u16>,
    pub tx_out_idx: Option<u16>,
}

/// Builds a TXDATA-family key (prefix byte included) for a block, tx, or txout, depending on
/// which of `tx_idx`/`tx_out_idx` are supplied. A txout key requires a tx index too.
pub fn get_blk_data_key(
    prefix: PrefixByte,
    height: u32,
    dup: u8,
    tx_idx: Option<u16>,
    tx_out_idx: Option<u16>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(prefix.to_u8());
    out.extend_from_slice(&get_blk_data_key_no_prefix(height, dup, tx_idx, tx_out_idx));
    out
}

/// As [`get_blk_data_key`] but without the leading prefix byte, for in-record cross-references
/// (e.g. a `spent_by_txin_key`) that are always read back through a table whose identity is
/// already known.
pub fn get_blk_data_key_no_prefix(
    height: u32,
    dup: u8,
    tx_idx: Option<u16>,
    tx_out_idx: Option<u16>,
) -> Vec<u8> {
    assert!(
        tx_out_idx.is_none() || tx_idx.is_some(),
        "a txout key requires a tx index"
    );
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&height_and_dup_to_hgtx(height, dup));
    if let Some(idx) = tx_idx {
        out.extend_from_slice(&idx.to_be_bytes());
    }
    if let Some(idx) = tx_out_idx {
        out.extend_from_slice(&idx.to_be_bytes());
    }
    out
}

/// Parses a TXDATA-family key (prefix byte included) and reports which of header/tx/txout shape
/// it has, based on total length: 5 bytes → header, 7 → tx, 9 → txout. Any other length is
/// reported as [`BlkDataKeyKind::NotBlkData`] with an empty key.
pub fn read_blk_data_key(data: &[u8]) -> (BlkDataKeyKind, Option<BlkDataKey>) {
    if data.is_empty() {
        return (BlkDataKeyKind::NotBlkData, None);
    }
    let body = &data[1..];
    let kind = match data.len() {
        5 => BlkDataKeyKind::BlkDataHeader,
        7 => BlkDataKeyKind::BlkDataTx,
        9 => BlkDataKeyKind::BlkDataTxOut,
        _ => return (BlkDataKeyKind::NotBlkData, None),
    };
    let mut hgtx = [0u8; 4];
    hgtx.copy_from_slice(&body[..4]);
    let tx_idx = if body.len() >= 6 { Some(u16::from_be_bytes([body[4], body[5]])) } else { None };
    let tx_out_idx =
        if body.len() >= 8 { Some(u16::from_be_bytes([body[6], body[7]])) } else { None };
    (
        kind,
        Some(BlkDataKey {
            height: hgtx_to_height(hgtx),
            dup: hgtx_to_dup_id(hgtx),
            tx_idx,
            tx_out_idx,
        }),
    )
}

/// Builds the 5-byte HEADHGT key (prefix + 4-byte big-endian height).
pub fn get_head_hgt_key(height: u32) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[0] = PrefixByte::HeadHgt.to_u8();
    out[1..].copy_from_slice(&height.to_be_bytes());
    out
}

/// Builds the 33-byte HEADHASH key (prefix + 32-byte block hash).
pub fn get_head_hash_key(hash: &[u8; 32]) -> [u8; 33] {
    let mut out = [0u8; 33];
    out[0] = PrefixByte::HeadHash.to_u8();
    out[1..].copy_from_slice(hash);
    out
}

/// Builds the 5-byte UNDODATA key (prefix + `hgtx`), identical in shape to a block's TXDATA key
/// but under its own prefix/table.
pub fn get_undo_key(height: u32, dup: u8) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[0] = PrefixByte::UndoData.to_u8();
    out[1..].copy_from_slice(&height_and_dup_to_hgtx(height, dup));
    out
}

/// Builds the 5-byte TXHINTS key (prefix + 4-byte tx-hash prefix).
pub fn get_tx_hints_key(hash_prefix: [u8; 4]) -> [u8; 5] {
    let mut out = [0u8; 5];
    out[0] = PrefixByte::TxHints.to_u8();
    out[1..].copy_from_slice(&hash_prefix);
    out
}

/// Builds a SCRIPT key: prefix byte followed by the caller-supplied unique script key bytes
/// (which themselves start with a type byte per the source format, opaque to this codec).
pub fn get_script_key(script_key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + script_key.len());
    out.push(PrefixByte::Script.to_u8());
    out.extend_from_slice(script_key);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hgtx_roundtrip() {
        let hgtx = height_and_dup_to_hgtx(123456, 2);
        assert_eq!(hgtx, [0x01, 0xE2, 0x40, 0x02]);
        assert_eq!(hgtx_to_height(hgtx), 123456);
        assert_eq!(hgtx_to_dup_id(hgtx), 2);
    }

    #[test]
    fn hgtx_unset_sentinel() {
        assert!(hgtx_is_unset(HGTX_UNSET));
        assert!(!hgtx_is_unset(height_and_dup_to_hgtx(0, 0)));
    }

    #[test]
    fn blk_data_key_with_outpoint() {
        let key = get_blk_data_key(PrefixByte::TxData, 123456, 2, Some(7), Some(3));
        let mut expected = vec![PrefixByte::TxData.to_u8()];
        expected.extend_from_slice(&[0x01, 0xE2, 0x40, 0x02]);
        expected.extend_from_slice(&[0x00, 0x07]);
        expected.extend_from_slice(&[0x00, 0x03]);
        assert_eq!(key, expected);

        let (kind, parsed) = read_blk_data_key(&key);
        assert!(matches!(kind, BlkDataKeyKind::BlkDataTxOut));
        let parsed = parsed.unwrap();
        assert_eq!(parsed.height, 123456);
        assert_eq!(parsed.dup, 2);
        assert_eq!(parsed.tx_idx, Some(7));
        assert_eq!(parsed.tx_out_idx, Some(3));
    }

    #[test]
    fn prefix_dispatch_by_length() {
        let header_key = get_blk_data_key(PrefixByte::TxData, 1, 0, None, None);
        assert_eq!(header_key.len(), 5);
        assert!(matches!(read_blk_data_key(&header_key).0, BlkDataKeyKind::BlkDataHeader));

        let tx_key = get_blk_data_key(PrefixByte::TxData, 1, 0, Some(0), None);
        assert_eq!(tx_key.len(), 7);
        assert!(matches!(read_blk_data_key(&tx_key).0, BlkDataKeyKind::BlkDataTx));

        let other = vec![PrefixByte::TxData.to_u8(), 0, 0];
        assert!(matches!(read_blk_data_key(&other).0, BlkDataKeyKind::NotBlkData));
    }

    #[test]
    fn key_monotonicity() {
        let a = get_blk_data_key(PrefixByte::TxData, 100, 0, None, None);
        let b = get_blk_data_key(PrefixByte::TxData, 100, 1, None, None);
        let c = get_blk_data_key(PrefixByte::TxData, 101, 0, None, None);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn prefix_mismatch_reported() {
        let key = get_head_hgt_key(5);
        let err = check_prefix_byte_w_error(&key, PrefixByte::TxData).unwrap_err();
        assert!(matches!(
            err,
            PrefixMismatchError::Mismatch(PrefixMismatch { expected: PrefixByte::TxData, .. })
        ));
    }
}
