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

//! Kafka records.
//!
//! A [`Record`] is built with field update builders, and collected into an
//! [`inflated::Batch`]. A batch is [`deflated`] into its wire form before it
//! is placed into a produce request or fetch response:
//!
//! ```
//! use bytes::Bytes;
//! use mimic_sans_io::record::{Header, Record, deflated, inflated};
//!
//! let batch = inflated::Batch::builder()
//!     .record(
//!         Record::builder()
//!             .value(Some(Bytes::from_static(b"hello world!")))
//!             .header(Header::default().key(Some(Bytes::from_static(b"format")))),
//!     )
//!     .build()
//!     .and_then(deflated::Batch::try_from)?;
//!
//! assert_eq!(1, batch.record_count);
//! # Ok::<(), mimic_sans_io::Error>(())
//! ```

pub mod deflated;
pub mod inflated;

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::instrument;

use crate::{
    Decode, Encode, Error, Result,
    primitive::{
        ByteSize,
        varint::{LongVarInt, VarInt},
    },
};

/// Varint length prefixed bytes, with a length of -1 for null.
fn octets_size(octets: Option<&Bytes>) -> Result<usize> {
    match octets {
        None => VarInt(-1).size_in_bytes(),
        Some(octets) => i32::try_from(octets.len())
            .map_err(Into::into)
            .and_then(|length| VarInt(length).size_in_bytes())
            .map(|size| size + octets.len()),
    }
}

fn put_octets(encoded: &mut BytesMut, octets: Option<&Bytes>) -> Result<()> {
    match octets {
        None => VarInt(-1).put(encoded),
        Some(octets) => {
            VarInt(i32::try_from(octets.len())?).put(encoded);
            encoded.put_slice(octets);
        }
    }

    Ok(())
}

fn get_octets(encoded: &mut Bytes) -> Result<Option<Bytes>> {
    let length = VarInt::decode(encoded).map(i32::from)?;

    if length < 0 {
        return Ok(None);
    }

    let length = usize::try_from(length)?;

    if encoded.remaining() < length {
        Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
    } else {
        Ok(Some(encoded.split_to(length)))
    }
}

/// A record header.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Header {
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
}

impl Header {
    #[must_use]
    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    #[must_use]
    pub fn value(self, value: Option<Bytes>) -> Self {
        Self { value, ..self }
    }
}

impl ByteSize for Header {
    fn size_in_bytes(&self) -> Result<usize> {
        Ok(octets_size(self.key.as_ref())? + octets_size(self.value.as_ref())?)
    }
}

/// A record within a v2 batch.
///
/// Timestamps and offsets are deltas from the base of the batch.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Record {
    pub attributes: u8,
    pub timestamp_delta: i64,
    pub offset_delta: i32,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attributes(self, attributes: u8) -> Self {
        Self { attributes, ..self }
    }

    #[must_use]
    pub fn timestamp_delta(self, timestamp_delta: i64) -> Self {
        Self {
            timestamp_delta,
            ..self
        }
    }

    #[must_use]
    pub fn offset_delta(self, offset_delta: i32) -> Self {
        Self {
            offset_delta,
            ..self
        }
    }

    #[must_use]
    pub fn key(self, key: Option<Bytes>) -> Self {
        Self { key, ..self }
    }

    #[must_use]
    pub fn value(self, value: Option<Bytes>) -> Self {
        Self { value, ..self }
    }

    #[must_use]
    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    /// The encoded size of this record excluding its length prefix.
    fn body_size(&self) -> Result<usize> {
        let mut size = size_of::<u8>()
            + LongVarInt(self.timestamp_delta).size_in_bytes()?
            + VarInt(self.offset_delta).size_in_bytes()?
            + octets_size(self.key.as_ref())?
            + octets_size(self.value.as_ref())?
            + VarInt(i32::try_from(self.headers.len())?).size_in_bytes()?;

        for header in &self.headers {
            size += header.size_in_bytes()?;
        }

        Ok(size)
    }
}

impl ByteSize for Record {
    fn size_in_bytes(&self) -> Result<usize> {
        let body = self.body_size()?;
        VarInt(i32::try_from(body)?)
            .size_in_bytes()
            .map(|prefix| prefix + body)
    }
}

impl Encode for Record {
    fn encode(&self) -> Result<Bytes> {
        let mut encoded = self.size_in_bytes().map(BytesMut::with_capacity)?;

        VarInt(i32::try_from(self.body_size()?)?).put(&mut encoded);
        encoded.put_u8(self.attributes);
        LongVarInt(self.timestamp_delta).put(&mut encoded);
        VarInt(self.offset_delta).put(&mut encoded);
        put_octets(&mut encoded, self.key.as_ref())?;
        put_octets(&mut encoded, self.value.as_ref())?;

        VarInt(i32::try_from(self.headers.len())?).put(&mut encoded);
        for header in &self.headers {
            put_octets(&mut encoded, header.key.as_ref())?;
            put_octets(&mut encoded, header.value.as_ref())?;
        }

        Ok(encoded.freeze())
    }
}

impl Decode for Record {
    #[instrument(skip_all)]
    fn decode(encoded: &mut Bytes) -> Result<Self> {
        let length = VarInt::decode(encoded)
            .map(i32::from)
            .and_then(|length| usize::try_from(length).map_err(Into::into))?;

        if encoded.remaining() < length {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }

        let mut body = encoded.split_to(length);

        let attributes = body.try_get_u8()?;
        let timestamp_delta = LongVarInt::decode(&mut body).map(i64::from)?;
        let offset_delta = VarInt::decode(&mut body).map(i32::from)?;
        let key = get_octets(&mut body)?;
        let value = get_octets(&mut body)?;

        let count = VarInt::decode(&mut body)
            .map(i32::from)
            .and_then(|count| usize::try_from(count).map_err(Error::from))?;

        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            headers.push(Header {
                key: get_octets(&mut body)?,
                value: get_octets(&mut body)?,
            });
        }

        Ok(Self {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_size() -> Result<()> {
        let record = Record::builder().value(Some(Bytes::from_static(b"def")));
        assert_eq!(10, record.size_in_bytes()?);
        Ok(())
    }

    #[test]
    fn encode_record() -> Result<()> {
        let record = Record::builder().value(Some(Bytes::from_static(b"def")));

        assert_eq!(
            Bytes::from_static(&[18, 0, 0, 0, 1, 6, 100, 101, 102, 0]),
            record.encode()?
        );
        Ok(())
    }

    #[test]
    fn decode_record_with_headers() -> Result<()> {
        let record = Record::builder()
            .timestamp_delta(-3)
            .offset_delta(7)
            .key(Some(Bytes::from_static(b"k")))
            .value(None)
            .header(
                Header::default()
                    .key(Some(Bytes::from_static(b"format")))
                    .value(Some(Bytes::from_static(b"text"))),
            );

        let mut encoded = record.encode()?;
        assert_eq!(record, Record::decode(&mut encoded)?);
        assert!(encoded.is_empty());
        Ok(())
    }

    #[test]
    fn truncated_record() {
        let mut encoded = Bytes::from_static(&[18, 0, 0, 0, 1, 6, 100]);
        assert!(Record::decode(&mut encoded).is_err());
    }
}
