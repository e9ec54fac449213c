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

//! Sources of description documents.

use std::{collections::BTreeMap, fs, path::Path, sync::Arc};

use serde_json::{Map, Number, Value};
use tracing::debug;
use url::Url;

use crate::{Error, Result};

/// Loads the document found at a URL.
pub trait Reader: Send + Sync {
    fn read(&self, url: &Url) -> Result<Value>;
}

impl<T: Reader + ?Sized> Reader for Arc<T> {
    fn read(&self, url: &Url) -> Result<Value> {
        (**self).read(url)
    }
}

/// Reads `file://` URLs from the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileReader;

impl Reader for FileReader {
    fn read(&self, url: &Url) -> Result<Value> {
        debug!(%url);

        if url.scheme() != "file" {
            return Err(Error::UnsupportedScheme(url.clone()));
        }

        let path = url
            .to_file_path()
            .map_err(|()| Error::UnsupportedScheme(url.clone()))?;

        fs::read_to_string(&path)
            .map_err(Into::into)
            .and_then(|content| parse(&path, &content))
    }
}

/// A URL for a path, relative to the current directory.
pub fn file_url(path: impl AsRef<Path>) -> Result<Url> {
    let path = path.as_ref();

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Url::from_file_path(&absolute).map_err(|()| Error::Message(format!("{}", absolute.display())))
}

/// Parse document content as JSON, or YAML.
pub fn parse(path: &Path, content: &str) -> Result<Value> {
    let yaml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| matches!(extension, "yaml" | "yml"));

    if yaml {
        from_yaml(content)
    } else {
        serde_json::from_str(content)
            .map_err(Error::from)
            .or_else(|_| from_yaml(content))
    }
}

pub fn from_yaml(content: &str) -> Result<Value> {
    serde_yaml::from_str::<serde_yaml::Value>(content)
        .map_err(Into::into)
        .and_then(yaml_to_json)
}

fn yaml_key(key: serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(key) => Ok(key),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        serde_yaml::Value::Bool(flag) => Ok(flag.to_string()),
        serde_yaml::Value::Null => Ok("null".into()),
        otherwise => Err(Error::Message(format!("unsupported key: {otherwise:?}"))),
    }
}

// mapping keys are stringified, so that `200:` addresses a response
fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Null),
        serde_yaml::Value::Bool(flag) => Ok(Value::Bool(flag)),
        serde_yaml::Value::Number(number) => Ok(if let Some(n) = number.as_i64() {
            Value::from(n)
        } else if let Some(n) = number.as_u64() {
            Value::from(n)
        } else {
            number
                .as_f64()
                .and_then(Number::from_f64)
                .map_or(Value::Null, Value::Number)
        }),
        serde_yaml::Value::String(s) => Ok(Value::String(s)),
        serde_yaml::Value::Sequence(sequence) => sequence
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        serde_yaml::Value::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| {
                yaml_key(key).and_then(|key| yaml_to_json(value).map(|value| (key, value)))
            })
            .collect::<Result<Map<_, _>>>()
            .map(Value::Object),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Documents held in memory, keyed by URL.
#[derive(Clone, Debug, Default)]
pub struct MemoryReader {
    documents: BTreeMap<Url, Value>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: Url, document: Value) -> Self {
        _ = self.documents.insert(url, document);
        self
    }
}

impl Reader for MemoryReader {
    fn read(&self, url: &Url) -> Result<Value> {
        let mut document = url.clone();
        document.set_fragment(None);

        self.documents
            .get(&document)
            .cloned()
            .ok_or(Error::NotFound(document))
    }
}
