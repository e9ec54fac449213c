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

use bytes::Bytes;
use mimic_sans_io::{
    primitive::ByteSize as _,
    record::{Header, Record},
};

use crate::Result;

/// The default capacity of a segment.
pub const DEFAULT_SEGMENT_BYTES: usize = 1024 * 1024;

/// A record at its assigned offset and time.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Stored {
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
    size: usize,
}

impl Stored {
    pub fn new(offset: i64, timestamp: i64, record: &Record) -> Result<Self> {
        record.size_in_bytes().map_err(Into::into).map(|size| Self {
            offset,
            timestamp,
            key: record.key.clone(),
            value: record.value.clone(),
            headers: record.headers.clone(),
            size,
        })
    }

    /// The encoded size of the record.
    pub fn size(&self) -> usize {
        self.size
    }

    /// This record relative to a batch starting at `base_offset` and
    /// `base_timestamp`.
    pub fn relative_to(&self, base_offset: i64, base_timestamp: i64) -> Result<Record> {
        i32::try_from(self.offset - base_offset)
            .map_err(Into::into)
            .map(|offset_delta| Record {
                attributes: 0,
                timestamp_delta: self.timestamp - base_timestamp,
                offset_delta,
                key: self.key.clone(),
                value: self.value.clone(),
                headers: self.headers.clone(),
            })
    }
}

/// A byte bounded window of consecutive records.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    base_offset: i64,
    capacity: usize,
    bytes: usize,
    records: Vec<Stored>,
}

impl Segment {
    pub fn new(base_offset: i64, capacity: usize) -> Self {
        Self {
            base_offset,
            capacity,
            bytes: 0,
            records: Vec::new(),
        }
    }

    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// The last offset held, if any.
    pub fn max_offset(&self) -> Option<i64> {
        self.records.last().map(|record| record.offset)
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// An empty segment always accepts a record, however large.
    pub fn has_room_for(&self, size: usize) -> bool {
        self.records.is_empty() || self.bytes + size <= self.capacity
    }

    pub fn append(&mut self, stored: Stored) {
        self.bytes += stored.size;
        self.records.push(stored);
    }

    /// Records from `offset` onwards.
    pub fn from_offset(&self, offset: i64) -> &[Stored] {
        let start = self.records.partition_point(|record| record.offset < offset);
        &self.records[start..]
    }

    /// The first record with a time at or after `timestamp`.
    pub fn at_or_after(&self, timestamp: i64) -> Option<&Stored> {
        self.records
            .iter()
            .find(|record| record.timestamp >= timestamp)
    }
}
