// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Variable length integers: unsigned LEB128 and zig-zag signed.

use std::{
    io::{Read, Write},
    ops::Deref,
};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::instrument;

use super::ByteSize;
use crate::{Decode, Encode, Error, Result};

const CONTINUATION: u8 = 0b1000_0000;
const MASK: u8 = 0b0111_1111;

/// The maximum number of bytes in an encoded 64 bit varint.
const MAX_LONG_BYTES: u32 = 10;

/// The maximum number of bytes in an encoded 32 bit varint.
const MAX_BYTES: u32 = 5;

fn unsigned_size(mut v: u64) -> usize {
    let mut size = 1;

    while v >= u64::from(CONTINUATION) {
        v >>= 7;
        size += 1;
    }

    size
}

/// Append an unsigned varint.
pub fn put_unsigned(encoded: &mut impl BufMut, mut v: u64) {
    while v >= u64::from(CONTINUATION) {
        #[allow(clippy::cast_possible_truncation)]
        encoded.put_u8(v as u8 | CONTINUATION);
        v >>= 7;
    }

    #[allow(clippy::cast_possible_truncation)]
    encoded.put_u8(v as u8);
}

/// Consume an unsigned varint of at most `max_bytes`.
pub fn get_unsigned(encoded: &mut impl Buf, max_bytes: u32) -> Result<u64> {
    let mut shift = 0u32;
    let mut accumulator = 0u64;

    for _ in 0..max_bytes {
        let byte = encoded.try_get_u8()?;
        accumulator |= u64::from(byte & MASK) << shift;

        if byte & CONTINUATION == 0 {
            return Ok(accumulator);
        }

        shift += 7;
    }

    Err(Error::VarIntOverflow)
}

/// Write an unsigned varint to a writer.
pub fn write_unsigned(writer: &mut dyn Write, v: u32) -> Result<()> {
    let mut encoded = BytesMut::with_capacity(unsigned_size(u64::from(v)));
    put_unsigned(&mut encoded, u64::from(v));
    writer.write_all(&encoded[..]).map_err(Into::into)
}

/// Read an unsigned varint from a reader.
pub fn read_unsigned(reader: &mut dyn Read) -> Result<u32> {
    let mut shift = 0u32;
    let mut accumulator = 0u32;

    for _ in 0..MAX_BYTES {
        let mut buf = [0u8; 1];
        reader.read_exact(&mut buf)?;
        accumulator |= u32::from(buf[0] & MASK) << shift;

        if buf[0] & CONTINUATION == 0 {
            return Ok(accumulator);
        }

        shift += 7;
    }

    Err(Error::VarIntOverflow)
}

/// A zig-zag encoded signed 32 bit integer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VarInt(pub i32);

impl From<VarInt> for i32 {
    fn from(value: VarInt) -> Self {
        value.0
    }
}

impl Deref for VarInt {
    type Target = i32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl VarInt {
    #[allow(clippy::cast_sign_loss)]
    fn en_zigzag(decoded: i32) -> u32 {
        ((decoded << 1) ^ (decoded >> 31)) as u32
    }

    #[allow(clippy::cast_possible_wrap)]
    fn de_zigzag(encoded: u32) -> i32 {
        ((encoded >> 1) as i32) ^ -((encoded & 1) as i32)
    }

    pub fn put(&self, encoded: &mut impl BufMut) {
        put_unsigned(encoded, u64::from(Self::en_zigzag(self.0)));
    }
}

impl ByteSize for VarInt {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(unsigned_size(u64::from(Self::en_zigzag(self.0))))
    }
}

impl Decode for VarInt {
    #[instrument(skip_all)]
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        get_unsigned(encoded, MAX_BYTES)
            .and_then(|unsigned| u32::try_from(unsigned).map_err(Into::into))
            .map(Self::de_zigzag)
            .map(Self)
    }
}

impl Encode for VarInt {
    fn encode(&self) -> Result<Bytes> {
        let mut encoded = self.size_in_bytes().map(BytesMut::with_capacity)?;
        self.put(&mut encoded);
        Ok(encoded.freeze())
    }
}

/// A zig-zag encoded signed 64 bit integer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LongVarInt(pub i64);

impl From<LongVarInt> for i64 {
    fn from(value: LongVarInt) -> Self {
        value.0
    }
}

impl Deref for LongVarInt {
    type Target = i64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl LongVarInt {
    #[allow(clippy::cast_sign_loss)]
    fn en_zigzag(decoded: i64) -> u64 {
        ((decoded << 1) ^ (decoded >> 63)) as u64
    }

    #[allow(clippy::cast_possible_wrap)]
    fn de_zigzag(encoded: u64) -> i64 {
        ((encoded >> 1) as i64) ^ -((encoded & 1) as i64)
    }

    pub fn put(&self, encoded: &mut impl BufMut) {
        put_unsigned(encoded, Self::en_zigzag(self.0));
    }
}

impl ByteSize for LongVarInt {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(unsigned_size(Self::en_zigzag(self.0)))
    }
}

impl Decode for LongVarInt {
    #[instrument(skip_all)]
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        get_unsigned(encoded, MAX_LONG_BYTES)
            .map(Self::de_zigzag)
            .map(Self)
    }
}

impl Encode for LongVarInt {
    fn encode(&self) -> Result<Bytes> {
        let mut encoded = self.size_in_bytes().map(BytesMut::with_capacity)?;
        self.put(&mut encoded);
        Ok(encoded.freeze())
    }
}

/// An unsigned 32 bit varint, as used by compact lengths and tag buffers.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnsignedVarInt(pub u32);

impl ByteSize for UnsignedVarInt {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(unsigned_size(u64::from(self.0)))
    }
}

impl Decode for UnsignedVarInt {
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        get_unsigned(encoded, MAX_BYTES)
            .and_then(|unsigned| u32::try_from(unsigned).map_err(Into::into))
            .map(Self)
    }
}

impl Encode for UnsignedVarInt {
    fn encode(&self) -> Result<Bytes> {
        let mut encoded = self.size_in_bytes().map(BytesMut::with_capacity)?;
        put_unsigned(&mut encoded, u64::from(self.0));
        Ok(encoded.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zigzag_var_int() -> Result<()> {
        for (decoded, encoded) in [
            (0, &b"\x00"[..]),
            (-1, &b"\x01"[..]),
            (1, &b"\x02"[..]),
            (-2, &b"\x03"[..]),
            (63, &b"\x7e"[..]),
            (-64, &b"\x7f"[..]),
            (64, &b"\x80\x01"[..]),
            (300, &b"\xd8\x04"[..]),
            (i32::MAX, &b"\xfe\xff\xff\xff\x0f"[..]),
            (i32::MIN, &b"\xff\xff\xff\xff\x0f"[..]),
        ] {
            assert_eq!(encoded, &VarInt(decoded).encode()?[..], "{decoded}");
            assert_eq!(
                VarInt(decoded),
                VarInt::decode(&mut Bytes::copy_from_slice(encoded))?
            );
            assert_eq!(encoded.len(), VarInt(decoded).size_in_bytes()?);
        }

        Ok(())
    }

    #[test]
    fn zigzag_long_var_int() -> Result<()> {
        for decoded in [0, -1, 1, 1_707_058_170_165, i64::MAX, i64::MIN] {
            let encoded = LongVarInt(decoded).encode()?;
            assert_eq!(encoded.len(), LongVarInt(decoded).size_in_bytes()?);
            assert_eq!(LongVarInt(decoded), LongVarInt::decode(&mut encoded.clone())?);
        }

        Ok(())
    }

    #[test]
    fn unsigned_reader_writer() -> Result<()> {
        let mut encoded = vec![];
        write_unsigned(&mut encoded, 16_384)?;
        assert_eq!(vec![0x80, 0x80, 0x01], encoded);
        assert_eq!(16_384, read_unsigned(&mut &encoded[..])?);
        Ok(())
    }

    #[test]
    fn overflow_is_an_error() {
        let mut encoded = Bytes::from_static(b"\xff\xff\xff\xff\xff\xff");
        assert!(matches!(
            VarInt::decode(&mut encoded),
            Err(Error::VarIntOverflow)
        ));
    }

    #[test]
    fn truncated_is_an_error() {
        let mut encoded = Bytes::from_static(b"\x80");
        assert!(VarInt::decode(&mut encoded).is_err());
    }
}
