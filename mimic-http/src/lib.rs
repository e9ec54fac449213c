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

//! HTTP
//!
//! A mock HTTP service driven by an OpenAPI description:
//! - requests are routed to an operation by path template and method
//! - parameters and bodies are parsed and validated by schema
//! - responses are negotiated against `Accept`
//! - an [`EventEmitter`] shapes the response before it is rendered

use std::{
    fmt::{self, Display, Formatter},
    io,
    string::FromUtf8Error,
    sync::{Arc, LazyLock, PoisonError},
};

use hyper::StatusCode;
use opentelemetry::{InstrumentationScope, global, metrics::Meter};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use thiserror::Error;

pub mod body;
pub mod engine;
pub mod event;
pub mod media;
pub mod param;
pub mod render;
pub mod route;
pub mod xml;

pub use engine::Engine;
pub use event::{Action, EventEmitter, Handler, Noop, RequestEvent, ResponseDraft};
pub use media::MediaType;
pub use route::Router;

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
    BadRequest(String),
    Config(Box<mimic_config::Error>),
    Emitter(String),
    Http(#[from] hyper::http::Error),
    Hyper(#[from] hyper::Error),
    Internal(String),
    Io(Arc<io::Error>),
    Json(#[from] serde_json::Error),
    Message(String),
    NotFound(String),
    NotAcceptable(String),
    Poison,
    Schema(Box<mimic_schema::Error>),
    UnknownStatus(u16),
    Utf8(#[from] FromUtf8Error),
    Xml(#[from] quick_xml::Error),
}

impl Error {
    /// The status of the response answering a request that failed with
    /// this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotAcceptable(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
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

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest(msg)
            | Self::Emitter(msg)
            | Self::Internal(msg)
            | Self::Message(msg)
            | Self::NotAcceptable(msg)
            | Self::NotFound(msg) => write!(f, "{msg}"),
            Self::Schema(error) => write!(f, "{error}"),
            Self::UnknownStatus(status) => write!(f, "no response defined for status {status}"),
            error => write!(f, "{error:?}"),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
