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

//! Broker
//!
//! A Kafka broker speaking the wire protocol over TCP, backed by the in
//! memory [`mimic_storage::Store`]. Consumer groups are balanced by one
//! task per group, see [`coordinator::group`].

use std::{
    fmt, io,
    num::TryFromIntError,
    result,
    sync::{Arc, LazyLock, PoisonError},
};

use mimic_sans_io::ErrorCode;
use opentelemetry::{InstrumentationScope, global, metrics::Meter};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use thiserror::Error;
use tokio::{sync::oneshot::error::RecvError, task::JoinError};
use url::Url;

pub mod asyncapi;
pub mod broker;
pub mod coordinator;

pub use asyncapi::Bootstrap;
pub use broker::{Broker, ClientContext};
pub use coordinator::group::{Controller, Coordinator};

/// The node id of a broker that was not given one.
pub const NODE_ID: i32 = 111;

pub(crate) static METER: LazyLock<Meter> = LazyLock::new(|| {
    global::meter_with_scope(
        InstrumentationScope::builder(env!("CARGO_PKG_NAME"))
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
});

#[derive(Error, Debug)]
pub enum Error {
    Api(ErrorCode),
    BalancerStopped(String),
    Config(Box<mimic_config::Error>),
    Io(Arc<io::Error>),
    Join(#[from] JoinError),
    KafkaSansIo(#[from] mimic_sans_io::Error),
    Message(String),
    Poison,
    Recv(#[from] RecvError),
    Schema(Box<mimic_schema::Error>),
    Storage(#[from] mimic_storage::Error),
    TryFromInt(#[from] TryFromIntError),
    UnsupportedListener(Url),
    Url(#[from] url::ParseError),
}

impl From<mimic_config::Error> for Error {
    fn from(value: mimic_config::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

impl From<mimic_schema::Error> for Error {
    fn from(value: mimic_schema::Error) -> Self {
        Self::Schema(Box::new(value))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_value: PoisonError<T>) -> Self {
        Self::Poison
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => write!(f, "{msg}"),
            Self::Config(error) => write!(f, "{error}"),
            error => write!(f, "{error:?}"),
        }
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
