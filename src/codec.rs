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

//! Binary codec primitives shared by every on-disk record: a write buffer, a
//! read cursor with rewind, and the Satoshi-style variable-length integer.

/// The only error this layer can produce: a read requested more bytes than remained in the
/// cursor.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("short read: requested {requested} bytes, only {available} available")]
pub struct ShortRead {
    pub requested: usize,
    pub available: usize,
}

/// Append-only little-/big-endian byte buffer builder used by every record's `serializeDBValue`.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct Writer(Vec<u8>);

impl Writer {
    pub fn new() -> Self { Self(Vec::new()) }

    pub fn with_capacity(cap: usize) -> Self { Self(Vec::with_capacity(cap)) }

    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }

    pub fn put_u16_le(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u32_le(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u64_le(&mut self, v: u64) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn put_u16_be(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn put_u32_be(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Satoshi-style variable-length integer: 1 byte for values below `0xFD`, otherwise a marker
    /// byte (`0xFD`/`0xFE`/`0xFF`) followed by 2/4/8 little-endian bytes.
    pub fn put_var_int(&mut self, v: u64) -> &mut Self {
        match v {
            0..=0xFC => {
                self.put_u8(v as u8);
            }
            0xFD..=0xFFFF => {
                self.put_u8(0xFD);
                self.put_u16_le(v as u16);
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.put_u8(0xFE);
                self.put_u32_le(v as u32);
            }
            _ => {
                self.put_u8(0xFF);
                self.put_u64_le(v);
            }
        }
        self
    }

    /// Appends raw bytes with no length prefix.
    pub fn put_bytes(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        self.0.extend_from_slice(bytes.as_ref());
        self
    }

    /// Appends a var-int length prefix followed by the bytes themselves.
    pub fn put_sized_bytes(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        self.put_var_int(bytes.len() as u64);
        self.put_bytes(bytes)
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn into_vec(self) -> Vec<u8> { self.0 }

    pub fn as_slice(&self) -> &[u8] { &self.0 }
}

/// Cursor-style reader over a borrowed byte slice, mirroring [`Writer`]. Every `get_*` method
/// advances the cursor; [`Reader::rewind`] steps it back so a prefix byte can be peeked without
/// being consumed.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0 } }

    pub fn position(&self) -> usize { self.pos }

    pub fn remaining(&self) -> usize { self.data.len() - self.pos }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ShortRead> {
        if self.remaining() < n {
            return Err(ShortRead { requested: n, available: self.remaining() });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Steps the cursor back by `n` bytes, used to peek a prefix byte and put it back.
    pub fn rewind(&mut self, n: usize) { self.pos = self.pos.saturating_sub(n); }

    pub fn get_u8(&mut self) -> Result<u8, ShortRead> { Ok(self.take(1)?[0]) }

    pub fn peek_u8(&mut self) -> Result<u8, ShortRead> {
        let byte = self.get_u8()?;
        self.rewind(1);
        Ok(byte)
    }

    pub fn get_u16_le(&mut self) -> Result<u16, ShortRead> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32_le(&mut self) -> Result<u32, ShortRead> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64_le(&mut self) -> Result<u64, ShortRead> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn get_u16_be(&mut self) -> Result<u16, ShortRead> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32_be(&mut self) -> Result<u32, ShortRead> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_var_int(&mut self) -> Result<u64, ShortRead> {
        Ok(match self.get_u8()? {
            0xFD => self.get_u16_le()? as u64,
            0xFE => self.get_u32_le()? as u64,
            0xFF => self.get_u64_le()?,
            n => n as u64,
        })
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], ShortRead> { self.take(n) }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], ShortRead> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    /// Reads a var-int length prefix followed by that many bytes.
    pub fn get_sized_bytes(&mut self) -> Result<&'a [u8], ShortRead> {
        let len = self.get_var_int()? as usize;
        self.get_bytes(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_fixed_width() {
        let mut w = Writer::new();
        w.put_u8(0xAB).put_u16_le(0x1234).put_u32_be(0xDEAD_BEEF).put_u64_le(0x0102_0304_0506_0708);
        let bytes = w.into_vec();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_u8().unwrap(), 0xAB);
        assert_eq!(r.get_u16_le().unwrap(), 0x1234);
        assert_eq!(r.get_u32_be().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.get_u64_le().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn var_int_boundaries() {
        let cases: [(u64, usize); 4] = [(0xFC, 1), (0xFD, 3), (0x1_0000, 5), (0x1_0000_0000, 9)];
        for (v, expected_len) in cases {
            let mut w = Writer::new();
            w.put_var_int(v);
            let bytes = w.into_vec();
            assert_eq!(bytes.len(), expected_len, "encoding length for {v}");
            let mut r = Reader::new(&bytes);
            assert_eq!(r.get_var_int().unwrap(), v);
        }
    }

    #[test]
    fn rewind_peeks_without_consuming() {
        let bytes = [0x07, 0x11, 0x22];
        let mut r = Reader::new(&bytes);
        assert_eq!(r.peek_u8().unwrap(), 0x07);
        assert_eq!(r.get_u8().unwrap(), 0x07);
        assert_eq!(r.get_u16_le().unwrap(), 0x2211);
    }

    #[test]
    fn short_read_is_reported() {
        let bytes = [0x01];
        let mut r = Reader::new(&bytes);
        let err = r.get_u32_le().unwrap_err();
        assert_eq!(err, ShortRead { requested: 4, available: 1 });
    }

    #[test]
    fn sized_bytes_roundtrip() {
        let mut w = Writer::new();
        w.put_sized_bytes(b"hello");
        let bytes = w.into_vec();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_sized_bytes().unwrap(), b"hello");
    }
}
