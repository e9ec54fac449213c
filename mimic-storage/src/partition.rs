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

use std::{
    fmt::{self, Debug, Formatter},
    sync::{Arc, RwLock},
    time::SystemTime,
};

use mimic_sans_io::{ErrorCode, record::inflated::Batch, to_timestamp};
use mimic_schema::Validator;
use opentelemetry::KeyValue;
use tracing::{debug, instrument, warn};

use crate::{
    Error, FETCHED_RECORDS, PRODUCED_RECORDS, REJECTED_BATCHES, Result,
    segment::{Segment, Stored},
};

#[derive(Debug)]
struct Log {
    head: i64,
    tail: i64,
    segment_bytes: usize,
    segments: Vec<Segment>,
}

impl Log {
    fn is_empty(&self) -> bool {
        self.tail < self.head
    }

    fn append(&mut self, stored: Stored) {
        let offset = stored.offset;

        match self.segments.last_mut() {
            Some(segment) if segment.has_room_for(stored.size()) => segment.append(stored),

            _ => {
                debug!(offset, segments = self.segments.len());
                let mut segment = Segment::new(offset, self.segment_bytes);
                segment.append(stored);
                self.segments.push(segment);
            }
        }

        self.tail = offset;
    }
}

/// A partition of a topic: an append only log of records.
///
/// Writers are exclusive, readers run concurrently.
pub struct Partition {
    topic: String,
    index: i32,
    leader: i32,
    replicas: Vec<i32>,
    validator: Option<Arc<dyn Validator + Send + Sync>>,
    log: RwLock<Log>,
}

impl Debug for Partition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(Partition))
            .field("topic", &self.topic)
            .field("index", &self.index)
            .field("leader", &self.leader)
            .field("replicas", &self.replicas)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl Partition {
    pub fn new(
        topic: impl Into<String>,
        index: i32,
        leader: i32,
        replicas: Vec<i32>,
        segment_bytes: usize,
    ) -> Self {
        Self {
            topic: topic.into(),
            index,
            leader,
            replicas,
            validator: None,
            log: RwLock::new(Log {
                head: 0,
                tail: -1,
                segment_bytes,
                segments: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_validator(self, validator: Option<Arc<dyn Validator + Send + Sync>>) -> Self {
        Self { validator, ..self }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn leader(&self) -> i32 {
        self.leader
    }

    pub fn replicas(&self) -> &[i32] {
        &self.replicas
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Append the records of a batch, returning the first offset assigned.
    ///
    /// Offsets are assigned consecutively from the current tail, ignoring
    /// the offsets supplied by the client. Records without a time are
    /// stamped with the wall clock. A batch failing validation is rejected
    /// as a whole with [`ErrorCode::CorruptMessage`].
    #[instrument(skip(self, batch), fields(topic = %self.topic, index = self.index))]
    pub fn write(&self, batch: &Batch) -> Result<i64> {
        if let Some(ref validator) = self.validator {
            validator
                .validate(batch)
                .inspect_err(|err| {
                    warn!(?err);
                    REJECTED_BATCHES.add(1, &[KeyValue::new("topic", self.topic.clone())]);
                })
                .map_err(|_err| Error::Api(ErrorCode::CorruptMessage))?;
        }

        let now = to_timestamp(&SystemTime::now())?;

        let mut log = self.log.write()?;
        let base_offset = log.tail + 1;

        let stored = batch
            .offsets_and_timestamps()
            .zip(base_offset..)
            .map(|((_, timestamp, record), offset)| {
                Stored::new(offset, if timestamp > 0 { timestamp } else { now }, record)
            })
            .collect::<Result<Vec<_>>>()?;

        let count = stored.len();
        stored.into_iter().for_each(|record| log.append(record));

        PRODUCED_RECORDS.add(
            u64::try_from(count)?,
            &[KeyValue::new("topic", self.topic.clone())],
        );

        debug!(base_offset, count, tail = log.tail);
        Ok(base_offset)
    }

    /// Records from `offset` until `max_bytes` have been accumulated.
    ///
    /// The first available record is always returned whatever its size.
    /// Reading at the high watermark, or from an empty partition, gives an
    /// empty batch.
    #[instrument(skip(self), fields(topic = %self.topic, index = self.index))]
    pub fn read(&self, offset: i64, max_bytes: usize) -> Result<Batch> {
        let log = self.log.read()?;

        if log.is_empty() {
            return Batch::builder().base_offset(offset).build().map_err(Into::into);
        }

        if offset < log.head || offset > log.tail + 1 {
            debug!(offset, head = log.head, tail = log.tail);
            return Err(Error::Api(ErrorCode::OffsetOutOfRange));
        }

        let mut bytes = 0;
        let mut selected = Vec::new();

        'segments: for segment in log
            .segments
            .iter()
            .filter(|segment| segment.max_offset().is_some_and(|max| max >= offset))
        {
            for stored in segment.from_offset(offset) {
                if !selected.is_empty() && bytes + stored.size() > max_bytes {
                    break 'segments;
                }

                bytes += stored.size();
                selected.push(stored);
            }
        }

        let Some(first) = selected.first() else {
            return Batch::builder().base_offset(offset).build().map_err(Into::into);
        };

        let (base_offset, base_timestamp) = (first.offset, first.timestamp);

        let records = selected
            .iter()
            .map(|stored| stored.relative_to(base_offset, base_timestamp))
            .collect::<Result<Vec<_>>>()?;

        FETCHED_RECORDS.add(
            u64::try_from(records.len())?,
            &[KeyValue::new("topic", self.topic.clone())],
        );

        Batch::builder()
            .base_offset(base_offset)
            .base_timestamp(base_timestamp)
            .records(records)
            .build()
            .map_err(Into::into)
    }

    /// The last assigned offset, -1 when nothing has been written.
    pub fn offset(&self) -> Result<i64> {
        self.log.read().map(|log| log.tail).map_err(Into::into)
    }

    /// The first retained offset, -1 when empty.
    pub fn start_offset(&self) -> Result<i64> {
        self.log
            .read()
            .map(|log| if log.is_empty() { -1 } else { log.head })
            .map_err(Into::into)
    }

    /// The offset that the next record will be given.
    pub fn high_watermark(&self) -> Result<i64> {
        self.log
            .read()
            .map(|log| log.tail + 1)
            .map_err(Into::into)
    }

    /// The first offset with a time at or after `timestamp`, or -1.
    pub fn offset_for_timestamp(&self, timestamp: i64) -> Result<i64> {
        self.log
            .read()
            .map(|log| {
                log.segments
                    .iter()
                    .find_map(|segment| segment.at_or_after(timestamp))
                    .map_or(-1, |stored| stored.offset)
            })
            .map_err(Into::into)
    }

    /// The number of segments currently held.
    pub fn segments(&self) -> Result<usize> {
        self.log
            .read()
            .map(|log| log.segments.len())
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_SEGMENT_BYTES;
    use bytes::Bytes;
    use mimic_sans_io::record::Record;
    use pretty_assertions::assert_eq;

    fn batch(values: &[&'static [u8]]) -> Result<Batch> {
        values
            .iter()
            .zip(0..)
            .fold(Batch::builder(), |builder, (value, delta)| {
                builder.record(
                    Record::builder()
                        .offset_delta(delta)
                        .value(Some(Bytes::from_static(value))),
                )
            })
            .build()
            .map_err(Into::into)
    }

    fn values(batch: &Batch) -> Vec<(i64, Option<Bytes>)> {
        batch
            .offsets_and_timestamps()
            .map(|(offset, _, record)| (offset, record.value.clone()))
            .collect()
    }

    #[test]
    fn empty_partition() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], DEFAULT_SEGMENT_BYTES);

        assert_eq!(-1, partition.offset()?);
        assert_eq!(-1, partition.start_offset()?);
        assert_eq!(0, partition.high_watermark()?);
        assert!(partition.read(0, 1024)?.records.is_empty());
        assert!(partition.read(123, 1024)?.records.is_empty());
        Ok(())
    }

    #[test]
    fn offsets_are_consecutive() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], DEFAULT_SEGMENT_BYTES);

        assert_eq!(0, partition.write(&batch(&[b"a", b"b"])?)?);
        assert_eq!(2, partition.write(&batch(&[b"c"])?)?);
        assert_eq!(2, partition.offset()?);
        assert_eq!(0, partition.start_offset()?);
        assert_eq!(3, partition.high_watermark()?);

        let read = partition.read(1, 1024)?;
        assert_eq!(
            vec![
                (1, Some(Bytes::from_static(b"b"))),
                (2, Some(Bytes::from_static(b"c")))
            ],
            values(&read)
        );
        Ok(())
    }

    #[test]
    fn missing_timestamps_are_stamped() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], DEFAULT_SEGMENT_BYTES);
        let before = to_timestamp(&SystemTime::now())?;

        _ = partition.write(&batch(&[b"a"])?)?;

        let read = partition.read(0, 1024)?;
        assert!(read.base_timestamp >= before);
        assert_eq!(0, partition.offset_for_timestamp(before)?);
        assert_eq!(-1, partition.offset_for_timestamp(i64::MAX)?);
        Ok(())
    }

    #[test]
    fn high_watermark_and_out_of_range() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], DEFAULT_SEGMENT_BYTES);
        _ = partition.write(&batch(&[b"a", b"b"])?)?;

        assert!(partition.read(2, 1024)?.records.is_empty());
        assert!(matches!(
            partition.read(3, 1024),
            Err(Error::Api(ErrorCode::OffsetOutOfRange))
        ));
        assert!(matches!(
            partition.read(-1, 1024),
            Err(Error::Api(ErrorCode::OffsetOutOfRange))
        ));
        Ok(())
    }

    #[test]
    fn first_record_always_returned() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], DEFAULT_SEGMENT_BYTES);
        _ = partition.write(&batch(&[b"abcdef", b"ghijkl"])?)?;

        let read = partition.read(0, 1)?;
        assert_eq!(vec![(0, Some(Bytes::from_static(b"abcdef")))], values(&read));
        Ok(())
    }

    #[test]
    fn reads_span_segments() -> Result<()> {
        let partition = Partition::new("t", 0, 0, vec![0], 16);

        for _ in 0..5 {
            _ = partition.write(&batch(&[b"0123456789"])?)?;
        }

        assert_eq!(5, partition.segments()?);

        let read = partition.read(1, 1024)?;
        assert_eq!(
            vec![1, 2, 3, 4],
            values(&read)
                .into_iter()
                .map(|(offset, _)| offset)
                .collect::<Vec<_>>()
        );
        Ok(())
    }
}
