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

//! Configuration
//!
//! Typed OpenAPI 3, Swagger 2 and AsyncAPI 2 descriptions:
//! - loaded through a [`Reader`]
//! - with Swagger 2 normalised into OpenAPI 3
//! - with every `$ref` resolved, across documents
//! - with components shared by every reference to them
//! - composed from a primary and patches with [`patch()`]

use std::{
    fmt::{self, Display, Formatter},
    io,
    sync::Arc,
};

use serde_json::Value;
use tracing::debug;
use url::Url;

pub mod asyncapi;
pub mod openapi;
pub mod patch;
pub mod reader;
mod reference;
pub mod resolve;
pub mod schema;
pub mod swagger;

pub use asyncapi::AsyncApi;
pub use openapi::OpenApi;
pub use patch::{Patch, patch};
pub use reader::{FileReader, MemoryReader, Reader};
pub use reference::Reference;
pub use resolve::{Resolve, parse};
pub use schema::Schema;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Context { context: String, source: Box<Error> },
    Io(Arc<io::Error>),
    Json(#[from] serde_json::Error),
    Message(String),
    MissingTitle,
    NotFound(Url),
    UnknownDocument,
    UnknownMethod(String),
    UnresolvedReference { url: Url, fragment: String },
    UnsupportedScheme(Url),
    UnsupportedVersion(String),
    Url(#[from] url::ParseError),
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap with the context in which this error occurred.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context { context, source } => write!(f, "{context} failed: {source}"),
            Self::Message(msg) => write!(f, "{msg}"),
            Self::UnresolvedReference { url, fragment } => {
                write!(f, "unable to resolve '{fragment}' in {url}")
            }
            error => write!(f, "{error:?}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DocumentKind {
    AsyncApi,
    OpenApi,
    Swagger,
}

/// A description with every reference resolved.
#[derive(Clone, Debug, PartialEq)]
pub enum Document {
    AsyncApi(Arc<AsyncApi>),
    OpenApi(Arc<OpenApi>),
}

impl Document {
    /// Classify a raw document by its version marker.
    pub fn detect(document: &Value) -> Result<DocumentKind> {
        let marker = |name| document.get(name).and_then(Value::as_str);

        if marker("openapi").is_some() {
            Ok(DocumentKind::OpenApi)
        } else if marker("swagger").is_some() {
            Ok(DocumentKind::Swagger)
        } else if marker("asyncapi").is_some() {
            Ok(DocumentKind::AsyncApi)
        } else {
            Err(Error::UnknownDocument)
        }
    }

    /// Read and parse the description at `source`.
    pub fn load(source: &Url, reader: &dyn Reader) -> Result<Self> {
        reader
            .read(source)
            .and_then(|document| Self::parse(source, document, reader))
    }

    /// Parse a decoded description, resolving references through `reader`.
    pub fn parse(source: &Url, document: Value, reader: &dyn Reader) -> Result<Self> {
        let kind = Self::detect(&document)?;
        debug!(%source, ?kind);

        match kind {
            DocumentKind::Swagger => {
                let version = document
                    .get("swagger")
                    .and_then(Value::as_str)
                    .unwrap_or_default();

                if version != "2.0" {
                    return Err(Error::UnsupportedVersion(version.to_owned()));
                }

                swagger::convert(document)
                    .and_then(|document| Self::parse_openapi(source, document, reader))
            }

            DocumentKind::OpenApi => Self::parse_openapi(source, document, reader),

            DocumentKind::AsyncApi => {
                let mut asyncapi = serde_json::from_value::<AsyncApi>(document.clone())?;
                asyncapi.check()?;
                parse(&mut asyncapi, source, document, reader)?;
                asyncapi.link()?;
                Ok(Self::AsyncApi(Arc::new(asyncapi)))
            }
        }
    }

    fn parse_openapi(source: &Url, document: Value, reader: &dyn Reader) -> Result<Self> {
        let mut openapi = serde_json::from_value::<OpenApi>(document.clone())?;
        openapi.check()?;
        parse(&mut openapi, source, document, reader)?;
        openapi.link()?;
        Ok(Self::OpenApi(Arc::new(openapi)))
    }

    pub fn kind(&self) -> DocumentKind {
        match self {
            Self::AsyncApi(_) => DocumentKind::AsyncApi,
            Self::OpenApi(_) => DocumentKind::OpenApi,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::AsyncApi(asyncapi) => asyncapi.info.title.as_str(),
            Self::OpenApi(openapi) => openapi.info.title.as_str(),
        }
    }
}
