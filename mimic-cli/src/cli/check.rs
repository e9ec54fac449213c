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

use crate::{EnvVarExp, Result};
use clap::Parser;
use mimic_config::{Document, openapi::Method};

#[derive(Clone, Debug, Parser)]
pub(super) struct Arg {
    /// OpenAPI, Swagger or AsyncAPI descriptions in JSON or YAML
    #[arg(long = "config", env = "MIMIC_CONFIG", value_delimiter = ',', required = true)]
    configs: Vec<EnvVarExp<String>>,
}

impl Arg {
    pub(super) fn main(self) -> Result<()> {
        for document in crate::load(self.configs.into_iter().map(EnvVarExp::into_inner))? {
            for line in summary(&document) {
                println!("{line}");
            }
        }

        Ok(())
    }
}

/// One line per endpoint or topic of a description, after a heading.
fn summary(document: &Document) -> Vec<String> {
    match document {
        Document::OpenApi(openapi) => {
            let mut lines = vec![format!(
                "openapi {}: {} {}",
                openapi.openapi, openapi.info.title, openapi.info.version
            )];

            for (path, item) in &openapi.paths {
                for method in Method::ALL {
                    if let Some(operation) = item.operation(method) {
                        lines.push(format!(
                            "  {method} {path}{}",
                            operation
                                .operation_id
                                .as_deref()
                                .map(|id| format!(" ({id})"))
                                .unwrap_or_default()
                        ));
                    }
                }
            }

            lines
        }

        Document::AsyncApi(asyncapi) => {
            let mut lines = vec![format!(
                "asyncapi {}: {} {}",
                asyncapi.asyncapi, asyncapi.info.title, asyncapi.info.version
            )];

            lines.extend(
                asyncapi
                    .servers
                    .iter()
                    .map(|(name, server)| format!("  server {name}: {}", server.url)),
            );

            lines.extend(
                asyncapi
                    .channels
                    .iter()
                    .map(|(name, channel)| format!("  topic {}", channel.topic().unwrap_or(name))),
            );

            lines
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_config::MemoryReader;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    #[test]
    fn summarise_openapi() -> crate::Result<()> {
        let document = Document::parse(
            &Url::parse("memory:///pets.json")?,
            json!({
                "openapi": "3.0.3",
                "info": {"title": "pets", "version": "1.0"},
                "paths": {
                    "/pets": {
                        "post": {"responses": {"201": {"description": "created"}}},
                        "get": {"operationId": "listPets", "responses": {"200": {"description": "pets"}}}
                    }
                }
            }),
            &MemoryReader::new(),
        )?;

        assert_eq!(
            vec![
                "openapi 3.0.3: pets 1.0",
                "  GET /pets (listPets)",
                "  POST /pets",
            ],
            summary(&document)
        );
        Ok(())
    }
}
