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

//! Schema
//!
//! Schema includes the following:
//! - Validation of values against an OpenAPI schema
//! - Generation of example values from an OpenAPI schema
//! - Validation of Kafka record payloads with a message schema

use std::{
    fmt::{self, Display, Formatter},
    sync::{LazyLock, PoisonError},
};

use mimic_sans_io::{ErrorCode, record::inflated::Batch};
use opentelemetry::{
    InstrumentationScope, global,
    metrics::{Counter, Meter},
};
use opentelemetry_semantic_conventions::SCHEMA_URL;

pub mod generate;
pub mod json;
pub mod payload;

pub use generate::{Generator, generate};
pub use json::{to_json_schema, validate};
pub use payload::PayloadValidator;

/// Error
#[derive(thiserror::Error, Debug)]
pub enum Error {
    Api(ErrorCode),

    Invalid { location: String, message: String },

    InvalidSchema(String),

    Message(String),

    Poison,

    SerdeJson(#[from] serde_json::Error),

    Time(#[from] time::error::Format),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { location, message } if location.is_empty() => write!(f, "{message}"),
            Self::Invalid { location, message } => write!(f, "{message} at '{location}'"),
            Self::Message(msg) => write!(f, "{msg}"),
            error => write!(f, "{error:?}"),
        }
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Validate a Batch with a Schema
pub trait Validator {
    fn validate(&self, batch: &Batch) -> Result<()>;
}

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| {
    global::meter_with_scope(
        InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
});

pub(crate) static VALIDATION_ERROR: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("schema_validation_error")
        .with_description("The schema validation error count")
        .build()
});
