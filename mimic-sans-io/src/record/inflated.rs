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

//! Record batches with their records decoded.

use tracing::debug;

use super::{Record, deflated};
use crate::{Compression, Decode as _, Error, Result};

/// Batches of decoded records.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Frame {
    pub batches: Vec<Batch>,
}

impl TryFrom<&deflated::Frame> for Frame {
    type Error = Error;

    fn try_from(deflated: &deflated::Frame) -> Result<Self, Self::Error> {
        deflated
            .batches
            .iter()
            .map(Batch::try_from)
            .collect::<Result<Vec<_>>>()
            .map(|batches| Self { batches })
    }
}

impl TryFrom<Frame> for deflated::Frame {
    type Error = Error;

    fn try_from(inflated: Frame) -> Result<Self, Self::Error> {
        inflated
            .batches
            .into_iter()
            .map(deflated::Batch::try_from)
            .collect::<Result<Vec<_>>>()
            .map(deflated::Frame::new)
    }
}

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
    pub records: Vec<Record>,
}

impl Batch {
    #[must_use]
    pub fn builder() -> Builder {
        Builder::default()
    }

    #[must_use]
    pub fn max_offset(&self) -> i64 {
        self.base_offset + i64::from(self.last_offset_delta)
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::try_from(self.attributes)
    }

    /// The absolute offset and timestamp of every record.
    pub fn offsets_and_timestamps(&self) -> impl Iterator<Item = (i64, i64, &Record)> {
        self.records.iter().map(|record| {
            (
                self.base_offset + i64::from(record.offset_delta),
                self.base_timestamp + record.timestamp_delta,
                record,
            )
        })
    }
}

impl TryFrom<&deflated::Batch> for Batch {
    type Error = Error;

    fn try_from(deflated: &deflated::Batch) -> Result<Self, Self::Error> {
        let compression = deflated.compression()?;

        if compression != Compression::None {
            return Err(Error::CompressionNotSupported(compression));
        }

        let mut record_data = deflated.record_data.clone();
        let mut records = Vec::with_capacity(usize::try_from(deflated.record_count)?);

        for _ in 0..deflated.record_count {
            records.push(Record::decode(&mut record_data)?);
        }

        if !record_data.is_empty() {
            debug!(trailing = record_data.len());
        }

        Ok(Self {
            base_offset: deflated.base_offset,
            partition_leader_epoch: deflated.partition_leader_epoch,
            magic: deflated.magic,
            attributes: deflated.attributes,
            last_offset_delta: deflated.last_offset_delta,
            base_timestamp: deflated.base_timestamp,
            max_timestamp: deflated.max_timestamp,
            producer_id: deflated.producer_id,
            producer_epoch: deflated.producer_epoch,
            base_sequence: deflated.base_sequence,
            records,
        })
    }
}

impl TryFrom<Batch> for deflated::Batch {
    type Error = Error;

    fn try_from(inflated: Batch) -> Result<Self, Self::Error> {
        let compression = inflated.compression()?;

        if compression != Compression::None {
            return Err(Error::CompressionNotSupported(compression));
        }

        Ok(Self {
            base_offset: inflated.base_offset,
            partition_leader_epoch: inflated.partition_leader_epoch,
            magic: 2,
            attributes: inflated.attributes,
            last_offset_delta: inflated.last_offset_delta,
            base_timestamp: inflated.base_timestamp,
            max_timestamp: inflated.max_timestamp,
            producer_id: inflated.producer_id,
            producer_epoch: inflated.producer_epoch,
            base_sequence: inflated.base_sequence,
            record_count: u32::try_from(inflated.records.len())?,
            record_data: deflated::into_record_data(&inflated.records[..])?,
        })
    }
}

/// Builds a batch, deriving the last offset delta and maximum timestamp
/// from its records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Builder {
    base_offset: i64,
    partition_leader_epoch: i32,
    attributes: i16,
    base_timestamp: i64,
    producer_id: i64,
    producer_epoch: i16,
    base_sequence: i32,
    records: Vec<Record>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            base_offset: 0,
            partition_leader_epoch: -1,
            attributes: 0,
            base_timestamp: 0,
            producer_id: -1,
            producer_epoch: -1,
            base_sequence: -1,
            records: vec![],
        }
    }
}

impl Builder {
    #[must_use]
    pub fn base_offset(self, base_offset: i64) -> Self {
        Self {
            base_offset,
            ..self
        }
    }

    #[must_use]
    pub fn partition_leader_epoch(self, partition_leader_epoch: i32) -> Self {
        Self {
            partition_leader_epoch,
            ..self
        }
    }

    #[must_use]
    pub fn attributes(self, attributes: i16) -> Self {
        Self { attributes, ..self }
    }

    #[must_use]
    pub fn base_timestamp(self, base_timestamp: i64) -> Self {
        Self {
            base_timestamp,
            ..self
        }
    }

    #[must_use]
    pub fn producer_id(self, producer_id: i64) -> Self {
        Self {
            producer_id,
            ..self
        }
    }

    #[must_use]
    pub fn producer_epoch(self, producer_epoch: i16) -> Self {
        Self {
            producer_epoch,
            ..self
        }
    }

    #[must_use]
    pub fn base_sequence(self, base_sequence: i32) -> Self {
        Self {
            base_sequence,
            ..self
        }
    }

    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    #[must_use]
    pub fn records(self, records: Vec<Record>) -> Self {
        Self { records, ..self }
    }

    pub fn build(self) -> Result<Batch> {
        let last_offset_delta = self
            .records
            .iter()
            .map(|record| record.offset_delta)
            .max()
            .unwrap_or_default();

        let max_timestamp = self
            .records
            .iter()
            .map(|record| self.base_timestamp + record.timestamp_delta)
            .max()
            .unwrap_or(self.base_timestamp);

        Ok(Batch {
            base_offset: self.base_offset,
            partition_leader_epoch: self.partition_leader_epoch,
            magic: 2,
            attributes: self.attributes,
            last_offset_delta,
            base_timestamp: self.base_timestamp,
            max_timestamp,
            producer_id: self.producer_id,
            producer_epoch: self.producer_epoch,
            base_sequence: self.base_sequence,
            records: self.records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchAttribute;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_derives_deltas() -> Result<()> {
        let batch = Batch::builder()
            .base_offset(10)
            .base_timestamp(1_000)
            .record(Record::builder().offset_delta(0).timestamp_delta(5))
            .record(Record::builder().offset_delta(1).timestamp_delta(3))
            .build()?;

        assert_eq!(1, batch.last_offset_delta);
        assert_eq!(1_005, batch.max_timestamp);
        assert_eq!(11, batch.max_offset());
        assert_eq!(
            vec![(10, 1_005), (11, 1_003)],
            batch
                .offsets_and_timestamps()
                .map(|(offset, timestamp, _)| (offset, timestamp))
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[test]
    fn deflate_and_inflate() -> Result<()> {
        let inflated = Batch::builder()
            .record(Record::builder().value(Some(Bytes::from_static(b"abc"))))
            .record(
                Record::builder()
                    .offset_delta(1)
                    .key(Some(Bytes::from_static(b"k"))),
            )
            .build()?;

        let deflated = deflated::Batch::try_from(inflated.clone())?;
        assert_eq!(2, deflated.record_count);
        assert_eq!(inflated, Batch::try_from(&deflated)?);
        Ok(())
    }

    #[test]
    fn compression_is_rejected() -> Result<()> {
        let batch = Batch::builder()
            .attributes(BatchAttribute::default().compression(Compression::Zstd).into())
            .record(Record::builder())
            .build()?;

        assert!(matches!(
            deflated::Batch::try_from(batch),
            Err(Error::CompressionNotSupported(Compression::Zstd))
        ));
        Ok(())
    }
}
