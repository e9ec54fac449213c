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

//! Storage
//!
//! An in memory Kafka store of brokers, topics, partitions and consumer
//! groups. Records are kept in byte bounded segments, nothing is written
//! to disk.

use std::{
    fmt::{self, Display, Formatter},
    io,
    sync::{Arc, LazyLock, PoisonError},
    time::SystemTimeError,
};

use mimic_sans_io::ErrorCode;
use opentelemetry::{
    InstrumentationScope, global,
    metrics::{Counter, Meter},
};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use regex::Regex;

mod group;
mod partition;
mod segment;
mod store;

pub use group::{Commit, Group, GroupState, Snapshot};
pub use partition::Partition;
pub use segment::{DEFAULT_SEGMENT_BYTES, Segment, Stored};
pub use store::{Broker, Builder, Store, Topic};

/// Storage Errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    Api(ErrorCode),
    Io(Arc<io::Error>),
    KafkaSansIo(#[from] mimic_sans_io::Error),
    Message(String),
    Poison,
    Regex(#[from] regex::Error),
    Schema(Arc<mimic_schema::Error>),
    SystemTime(#[from] SystemTimeError),
    TryFromInt(#[from] std::num::TryFromIntError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            error => write!(f, "{error:?}"),
        }
    }
}

impl Error {
    /// The error code reported to a Kafka client for this error.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Api(error_code) => *error_code,
            _ => ErrorCode::UnknownServerError,
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<mimic_schema::Error> for Error {
    fn from(value: mimic_schema::Error) -> Self {
        if let mimic_schema::Error::Api(error_code) = value {
            Self::Api(error_code)
        } else {
            Self::Schema(Arc::new(value))
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The longest permitted topic name.
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

/// Topic Partition (topition)
///
/// A topic partition pair.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Topition {
    topic: String,
    partition: i32,
}

impl Topition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        let topic = topic.into();
        Self { topic, partition }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl Display for Topition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

static TOPIC_NAME: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$"));

/// Topic names are made of `[A-Za-z0-9._-]`, between 1 and 249 characters
/// long, and are neither `.` nor `..`.
pub fn validate_topic_name(name: &str) -> Result<()> {
    let valid = TOPIC_NAME.as_ref().map_err(Clone::clone)?;

    if name.len() > MAX_TOPIC_NAME_LENGTH
        || name == "."
        || name == ".."
        || !valid.is_match(name)
    {
        Err(Error::Api(ErrorCode::InvalidTopicException))
    } else {
        Ok(())
    }
}

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| {
    global::meter_with_scope(
        InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
});

pub(crate) static PRODUCED_RECORDS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mimic_storage_produced_records")
        .with_description("The number of records appended to a partition")
        .build()
});

pub(crate) static REJECTED_BATCHES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mimic_storage_rejected_batches")
        .with_description("The number of batches rejected by a partition validator")
        .build()
});

pub(crate) static FETCHED_RECORDS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mimic_storage_fetched_records")
        .with_description("The number of records read from a partition")
        .build()
});
