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

//! Record batches in their wire form.
//!
//! Decoding accepts v2 record batches and legacy v0/v1 message sets, the
//! latter converted into v2 batches. Encoding only writes v2.

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};
use crc::{CRC_32_ISCSI, CRC_32_ISO_HDLC, Crc};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use tracing::{debug, instrument, warn};

use crate::{BatchAttribute, Compression, Encode as _, Error, Result, buffer::Paged};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);
const IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Base offset and batch length.
const LOG_OVERHEAD: usize = 12;

/// Where the magic byte lives, in both batches and message sets.
const MAGIC_OFFSET: usize = 16;

/// Where the CRC lives in a v2 batch.
const CRC_OFFSET: usize = 17;

/// The CRC of a v2 batch covers everything from the attributes onwards.
const ATTRIBUTES_OFFSET: usize = 21;

/// The fixed size of a v2 batch header, from the attributes to the record count.
const FIXED_BATCH_LENGTH: usize = 40;

/// One or more record batches.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Frame {
    pub batches: Vec<Batch>,
}

/// A v2 batch: header fields and the still encoded records.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Batch {
    pub base_offset: i64,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub record_count: u32,
    pub record_data: Bytes,
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            magic: 2,
            attributes: 0,
            last_offset_delta: 0,
            base_timestamp: 0,
            max_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            record_count: 0,
            record_data: Bytes::new(),
        }
    }
}

impl Batch {
    /// The encoded size of this batch.
    #[must_use]
    pub fn size(&self) -> usize {
        LOG_OVERHEAD + size_of::<i32>() + 1 + size_of::<u32>() + FIXED_BATCH_LENGTH
            + self.record_data.len()
    }

    #[must_use]
    pub fn max_offset(&self) -> i64 {
        self.base_offset + i64::from(self.last_offset_delta)
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::try_from(self.attributes)
    }

    pub fn attribute(&self) -> Result<BatchAttribute> {
        BatchAttribute::try_from(self.attributes)
    }

    pub fn is_transactional(&self) -> bool {
        self.attribute().is_ok_and(|attribute| attribute.transaction)
    }

    pub fn is_control(&self) -> bool {
        self.attribute().is_ok_and(|attribute| attribute.control)
    }

    /// Append this batch, back-patching the length and CRC.
    pub fn write_into(&self, paged: &mut Paged) -> Result<()> {
        let start = paged.len();

        paged.put_i64(self.base_offset);
        paged.put_i32(0);
        paged.put_i32(self.partition_leader_epoch);
        paged.put_i8(2);
        paged.put_u32(0);
        paged.put_i16(self.attributes);
        paged.put_i32(self.last_offset_delta);
        paged.put_i64(self.base_timestamp);
        paged.put_i64(self.max_timestamp);
        paged.put_i64(self.producer_id);
        paged.put_i16(self.producer_epoch);
        paged.put_i32(self.base_sequence);
        paged.put_u32(self.record_count);
        paged.put_slice(&self.record_data);

        let end = paged.len();

        let batch_length = i32::try_from(end - start - LOG_OVERHEAD)?;
        paged.patch(start + 8, &batch_length.to_be_bytes())?;

        let mut digest = CASTAGNOLI.digest();
        for chunk in paged.chunks(start + ATTRIBUTES_OFFSET..end) {
            digest.update(chunk);
        }
        let crc = digest.finalize();
        debug!(batch_length, crc);

        paged.patch(start + CRC_OFFSET, &crc.to_be_bytes())
    }

    fn read_v2(mut encoded: Bytes) -> Result<Self> {
        let base_offset = encoded.try_get_i64()?;
        let _batch_length = encoded.try_get_i32()?;
        let partition_leader_epoch = encoded.try_get_i32()?;
        let magic = encoded.try_get_i8()?;
        let expected = encoded.try_get_u32()?;

        let computed = CASTAGNOLI.checksum(&encoded[..]);
        if computed != expected {
            return Err(Error::InvalidCrc { expected, computed });
        }

        let attributes = encoded.try_get_i16()?;
        let last_offset_delta = encoded.try_get_i32()?;
        let base_timestamp = encoded.try_get_i64()?;
        let max_timestamp = encoded.try_get_i64()?;
        let producer_id = encoded.try_get_i64()?;
        let producer_epoch = encoded.try_get_i16()?;
        let base_sequence = encoded.try_get_i32()?;
        let record_count = encoded.try_get_u32()?;

        Ok(Self {
            base_offset,
            partition_leader_epoch,
            magic,
            attributes,
            last_offset_delta,
            base_timestamp,
            max_timestamp,
            producer_id,
            producer_epoch,
            base_sequence,
            record_count,
            record_data: encoded,
        })
    }
}

/// A legacy message from a v0 or v1 message set.
#[derive(Debug)]
struct Legacy {
    offset: i64,
    timestamp: Option<i64>,
    key: Option<Bytes>,
    value: Option<Bytes>,
}

impl Legacy {
    fn octets(encoded: &mut Bytes) -> Result<Option<Bytes>> {
        let length = encoded.try_get_i32()?;

        if length < 0 {
            Ok(None)
        } else {
            let length = usize::try_from(length)?;

            if encoded.remaining() < length {
                Err(Error::Message(format!(
                    "legacy message truncated: {length} > {}",
                    encoded.remaining()
                )))
            } else {
                Ok(Some(encoded.split_to(length)))
            }
        }
    }

    fn read(mut encoded: Bytes) -> Result<Self> {
        let offset = encoded.try_get_i64()?;
        let _size = encoded.try_get_i32()?;
        let expected = encoded.try_get_u32()?;

        let computed = IEEE.checksum(&encoded[..]);
        if computed != expected {
            warn!(offset, expected, computed);
        }

        let magic = encoded.try_get_i8()?;
        let attributes = encoded.try_get_i8()?;

        let compression = Compression::try_from(i16::from(attributes))?;
        if compression != Compression::None {
            return Err(Error::CompressionNotSupported(compression));
        }

        let timestamp = if magic == 1 {
            Some(encoded.try_get_i64()?)
        } else {
            None
        };

        let key = Self::octets(&mut encoded)?;
        let value = Self::octets(&mut encoded)?;

        Ok(Self {
            offset,
            timestamp,
            key,
            value,
        })
    }
}

/// Convert consecutive legacy messages into a single v2 batch.
fn from_legacy(messages: Vec<Legacy>) -> Result<Batch> {
    let base_offset = messages.first().map_or(0, |message| message.offset);
    let base_timestamp = messages
        .iter()
        .filter_map(|message| message.timestamp)
        .min()
        .unwrap_or_default();

    let mut records = Vec::with_capacity(messages.len());

    for (index, message) in messages.into_iter().enumerate() {
        let timestamp = message.timestamp.unwrap_or(base_timestamp);

        records.push(
            super::Record::builder()
                .offset_delta(i32::try_from(index)?)
                .timestamp_delta(timestamp - base_timestamp)
                .key(message.key)
                .value(message.value),
        );
    }

    super::inflated::Batch::builder()
        .base_offset(base_offset)
        .base_timestamp(base_timestamp)
        .records(records)
        .build()
        .and_then(Batch::try_from)
}

impl Frame {
    #[must_use]
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.batches.iter().map(Batch::size).sum()
    }

    /// The total number of records in every batch.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.batches
            .iter()
            .map(|batch| usize::try_from(batch.record_count).unwrap_or_default())
            .sum()
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut paged = Paged::new();

        for batch in &self.batches {
            batch.write_into(&mut paged)?;
        }

        Ok(paged.freeze().into_bytes())
    }

    /// Decode batches, ignoring an incomplete trailing batch.
    #[instrument(skip_all)]
    pub fn decode(encoded: &mut Bytes) -> Result<Self> {
        let mut batches = vec![];
        let mut legacy = vec![];

        while encoded.remaining() > MAGIC_OFFSET {
            let length = i32::from_be_bytes([encoded[8], encoded[9], encoded[10], encoded[11]]);
            let length = usize::try_from(length)?;

            if encoded.remaining() < LOG_OVERHEAD + length {
                debug!(length, remaining = encoded.remaining());
                break;
            }

            #[allow(clippy::cast_possible_wrap)]
            match encoded[MAGIC_OFFSET] as i8 {
                2 => {
                    if !legacy.is_empty() {
                        batches.push(from_legacy(std::mem::take(&mut legacy))?);
                    }

                    Batch::read_v2(encoded.split_to(LOG_OVERHEAD + length))
                        .map(|batch| batches.push(batch))?;
                }

                0 | 1 => {
                    Legacy::read(encoded.split_to(LOG_OVERHEAD + length))
                        .map(|message| legacy.push(message))?;
                }

                otherwise => return Err(Error::UnknownMagic(otherwise)),
            }
        }

        if !legacy.is_empty() {
            batches.push(from_legacy(legacy)?);
        }

        encoded.advance(encoded.remaining());

        Ok(Self { batches })
    }
}

impl Serialize for Frame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.encode()
            .map_err(serde::ser::Error::custom)
            .and_then(|encoded| serializer.serialize_bytes(&encoded))
    }
}

struct FrameVisitor;

impl Visitor<'_> for FrameVisitor {
    type Value = Frame;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("record batches")
    }

    fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Frame::decode(&mut Bytes::copy_from_slice(v)).map_err(de::Error::custom)
    }

    fn visit_byte_buf<E>(self, v: Vec<u8>) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Frame::decode(&mut Bytes::from(v)).map_err(de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_byte_buf(FrameVisitor)
    }
}

/// Encode records without compression into record data.
pub(crate) fn into_record_data(records: &[super::Record]) -> Result<Bytes> {
    let mut record_data = BytesMut::new();

    for record in records {
        record_data.extend_from_slice(&record.encode()?);
    }

    Ok(record_data.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, inflated};
    use pretty_assertions::assert_eq;

    fn batch() -> Result<Batch> {
        inflated::Batch::builder()
            .base_timestamp(1_707_058_170_165)
            .record(Record::builder().value(Some(Bytes::from_static(b"def"))))
            .build()
            .and_then(Batch::try_from)
    }

    #[test]
    fn crc_check() {
        assert_eq!(
            1_126_819_645,
            CASTAGNOLI.checksum(&[
                0, 0, 0, 0, 0, 0, 0, 0, 1, 141, 116, 152, 137, 53, 0, 0, 1, 141, 116, 152, 137,
                53, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1, 18, 0, 0, 0, 1, 6, 100,
                101, 102, 0,
            ])
        );
    }

    #[test]
    fn batch_round_trip() -> Result<()> {
        let frame = Frame::new(vec![batch()?]);
        let mut encoded = frame.encode()?;

        assert_eq!(frame.size(), encoded.len());
        assert_eq!(2, encoded[MAGIC_OFFSET]);

        assert_eq!(frame, Frame::decode(&mut encoded)?);
        Ok(())
    }

    #[test]
    fn corrupt_crc_is_an_error() -> Result<()> {
        let encoded = Frame::new(vec![batch()?]).encode()?;

        let mut corrupt = BytesMut::from(&encoded[..]);
        let last = corrupt.len() - 2;
        corrupt[last] ^= 0xff;

        assert!(matches!(
            Frame::decode(&mut corrupt.freeze()),
            Err(Error::InvalidCrc { .. })
        ));
        Ok(())
    }

    #[test]
    fn incomplete_trailing_batch_is_ignored() -> Result<()> {
        let first = batch()?;
        let encoded = Frame::new(vec![first.clone(), first.clone()]).encode()?;

        let mut truncated = encoded.slice(..encoded.len() - 5);
        assert_eq!(Frame::new(vec![first]), Frame::decode(&mut truncated)?);
        Ok(())
    }

    #[test]
    fn legacy_v1_message_set() -> Result<()> {
        let mut message = BytesMut::new();
        // magic, attributes, timestamp, null key, value
        message.extend_from_slice(&[1, 0]);
        message.extend_from_slice(&1_707_058_170_165i64.to_be_bytes());
        message.extend_from_slice(&(-1i32).to_be_bytes());
        message.extend_from_slice(&3i32.to_be_bytes());
        message.extend_from_slice(b"abc");

        let crc = IEEE.checksum(&message[..]);

        let mut encoded = BytesMut::new();
        for offset in [5i64, 6] {
            encoded.extend_from_slice(&offset.to_be_bytes());
            encoded.extend_from_slice(&i32::try_from(message.len() + 4)?.to_be_bytes());
            encoded.extend_from_slice(&crc.to_be_bytes());
            encoded.extend_from_slice(&message[..]);
        }

        let frame = Frame::decode(&mut encoded.freeze())?;
        assert_eq!(1, frame.batches.len());

        let batch = inflated::Batch::try_from(&frame.batches[0])?;
        assert_eq!(5, batch.base_offset);
        assert_eq!(1_707_058_170_165, batch.base_timestamp);
        assert_eq!(
            vec![0, 1],
            batch
                .records
                .iter()
                .map(|record| record.offset_delta)
                .collect::<Vec<_>>()
        );
        assert_eq!(Some(Bytes::from_static(b"abc")), batch.records[1].value);
        Ok(())
    }

    #[test]
    fn compressed_legacy_message_is_rejected() -> Result<()> {
        let message = [0u8, 1, 255, 255, 255, 255, 255, 255, 255, 255];
        let crc = IEEE.checksum(&message);

        let mut encoded = BytesMut::new();
        encoded.extend_from_slice(&0i64.to_be_bytes());
        encoded.extend_from_slice(&i32::try_from(message.len() + 4)?.to_be_bytes());
        encoded.extend_from_slice(&crc.to_be_bytes());
        encoded.extend_from_slice(&message);

        assert!(matches!(
            Frame::decode(&mut encoded.freeze()),
            Err(Error::CompressionNotSupported(Compression::Gzip))
        ));
        Ok(())
    }
}
