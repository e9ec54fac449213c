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

//! The `mimic` command line.
//!
//! Descriptions are loaded from files, those sharing a kind and title are
//! patched into one, and each is then served: OpenAPI descriptions by an
//! HTTP engine and AsyncAPI descriptions by Kafka brokers.

use std::{
    collections::HashMap, convert::Infallible, env::vars, fmt, io, path::Path, result,
    str::FromStr, sync::Arc,
};

use mimic_config::{AsyncApi, Document, DocumentKind, FileReader, OpenApi, patch, reader::file_url};
use opentelemetry_otlp::ExporterBuildError;
use regex::{Regex, Replacer};
use tokio::task::JoinError;
use tracing::debug;

mod cli;
mod otel;

pub use cli::Cli;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    Broker(Box<mimic_broker::Error>),
    Config(Box<mimic_config::Error>),
    DotEnv(#[from] dotenv::Error),
    ExporterBuild(#[from] ExporterBuildError),
    Http(Box<mimic_http::Error>),
    Io(#[from] io::Error),
    Join(#[from] JoinError),
    Message(String),
    Regex(#[from] regex::Error),
    Url(#[from] url::ParseError),
}

impl From<mimic_broker::Error> for Error {
    fn from(value: mimic_broker::Error) -> Self {
        Self::Broker(Box::new(value))
    }
}

impl From<mimic_config::Error> for Error {
    fn from(value: mimic_config::Error) -> Self {
        Self::Config(Box::new(value))
    }
}

impl From<mimic_http::Error> for Error {
    fn from(value: mimic_http::Error) -> Self {
        Self::Http(Box::new(value))
    }
}

impl From<Infallible> for Error {
    fn from(value: Infallible) -> Self {
        match value {}
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

#[derive(Clone, Debug)]
pub struct VarRep(HashMap<String, String>);

impl From<HashMap<String, String>> for VarRep {
    fn from(value: HashMap<String, String>) -> Self {
        Self(value)
    }
}

impl VarRep {
    fn replace(&self, haystack: &str) -> Result<String> {
        Regex::new(r"\$\{(?<var>[^\}]+)\}")
            .map(|re| re.replace_all(haystack, self).into_owned())
            .map_err(Into::into)
    }
}

impl Replacer for &VarRep {
    fn replace_append(&mut self, caps: &regex::Captures<'_>, dst: &mut String) {
        if let Some(value) = caps
            .name("var")
            .and_then(|variable| self.0.get(variable.as_str()))
        {
            dst.push_str(value);
        }
    }
}

/// A value parsed after expanding `${VAR}` from the environment.
#[derive(Clone, Debug)]
pub struct EnvVarExp<T>(T);

impl<T> EnvVarExp<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> FromStr for EnvVarExp<T>
where
    T: FromStr,
    Error: From<<T as FromStr>::Err>,
{
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VarRep::from(vars().collect::<HashMap<_, _>>())
            .replace(s)
            .and_then(|s| T::from_str(&s).map_err(Into::into))
            .map(|t| Self(t))
    }
}

/// Load the descriptions at `paths`, patching every description into
/// the first one loaded with the same kind and title.
pub fn load<I, P>(paths: I) -> Result<Vec<Document>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut groups: Vec<(DocumentKind, String, Vec<Document>)> = Vec::new();

    for path in paths {
        let source = file_url(path)?;
        let document = Document::load(&source, &FileReader)?;
        let (kind, title) = (document.kind(), document.title().to_owned());
        debug!(%source, ?kind, %title);

        match groups
            .iter_mut()
            .find(|(group_kind, group_title, _)| *group_kind == kind && *group_title == title)
        {
            Some((_, _, documents)) => documents.push(document),
            None => groups.push((kind, title, vec![document])),
        }
    }

    Ok(groups
        .into_iter()
        .filter_map(|(_, _, documents)| merge(documents))
        .collect())
}

fn merge(documents: Vec<Document>) -> Option<Document> {
    let mut documents = documents.into_iter();

    match documents.next()? {
        Document::OpenApi(primary) => {
            let patches = documents.filter_map(|document| match document {
                Document::OpenApi(openapi) => Some(Arc::unwrap_or_clone(openapi)),
                Document::AsyncApi(_) => None,
            });

            Some(Document::OpenApi(Arc::new(patch::<OpenApi, _>(
                Arc::unwrap_or_clone(primary),
                patches,
            ))))
        }

        Document::AsyncApi(primary) => {
            let patches = documents.filter_map(|document| match document {
                Document::AsyncApi(asyncapi) => Some(Arc::unwrap_or_clone(asyncapi)),
                Document::OpenApi(_) => None,
            });

            Some(Document::AsyncApi(Arc::new(patch::<AsyncApi, _>(
                Arc::unwrap_or_clone(primary),
                patches,
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::fs;

    #[test]
    fn expand_variables() -> Result<()> {
        let rep = VarRep::from(HashMap::from([
            (String::from("HOST"), String::from("localhost")),
            (String::from("PORT"), String::from("9092")),
        ]));

        assert_eq!("tcp://localhost:9092", rep.replace("tcp://${HOST}:${PORT}")?);
        assert_eq!("tcp://:1", rep.replace("tcp://${MISSING}:1")?);
        Ok(())
    }

    #[test]
    fn patches_share_kind_and_title() -> Result<()> {
        let dir = tempfile::tempdir()?;

        let write = |name: &str, document: serde_json::Value| {
            let path = dir.path().join(name);
            fs::write(&path, document.to_string()).map(|()| path)
        };

        let primary = write(
            "pets.json",
            json!({
                "openapi": "3.0.3",
                "info": {"title": "pets", "version": "1"},
                "paths": {"/pets": {"get": {"responses": {"200": {"description": "pets"}}}}}
            }),
        )?;

        let patch = write(
            "pets-patch.json",
            json!({
                "openapi": "3.0.3",
                "info": {"title": "pets", "version": "1"},
                "paths": {"/owners": {"get": {"responses": {"200": {"description": "owners"}}}}}
            }),
        )?;

        let other = write(
            "orders.json",
            json!({
                "openapi": "3.0.3",
                "info": {"title": "orders", "version": "1"},
                "paths": {}
            }),
        )?;

        let documents = load([primary, patch, other])?;
        assert_eq!(2, documents.len());

        let Document::OpenApi(ref pets) = documents[0] else {
            return Err(Error::Message(String::from("expected openapi")));
        };

        assert_eq!(
            vec!["/pets", "/owners"],
            pets.paths.keys().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!("orders", documents[1].title());
        Ok(())
    }
}
