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

use std::{sync::Arc, time::Duration};

use crate::{EnvVarExp, Error, Result, otel};
use clap::Parser;
use mimic_broker::Bootstrap;
use mimic_config::{Document, OpenApi};
use mimic_http::Engine;
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use url::Url;

const DEFAULT_HTTP_LISTENER: &str = "tcp://0.0.0.0:8080";

#[derive(Clone, Debug, Parser)]
pub(super) struct Arg {
    /// OpenAPI, Swagger or AsyncAPI descriptions in JSON or YAML
    #[arg(long = "config", env = "MIMIC_CONFIG", value_delimiter = ',')]
    configs: Vec<EnvVarExp<String>>,

    /// HTTP mocks listen here, unless their first server names a port
    #[arg(long, env = "HTTP_LISTENER_URL", default_value = DEFAULT_HTTP_LISTENER)]
    http_listener_url: EnvVarExp<Url>,

    /// Serve HTTP mocks under this path instead of the path of their first server
    #[arg(long, env = "BASE_PATH")]
    base_path: Option<String>,

    /// How long a consumer group waits for members to join a rebalance
    #[arg(long, env = "JOIN_WINDOW_MS")]
    join_window_ms: Option<u64>,

    /// OTEL Exporter OTLP endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint_url: Option<EnvVarExp<Url>>,
}

impl Arg {
    pub(super) async fn main(self) -> Result<()> {
        let meter_provider = self
            .otlp_endpoint_url
            .clone()
            .map(|url| otel::meter_provider(url.into_inner(), env!("CARGO_PKG_NAME")))
            .transpose()?;

        let outcome = self.serve().await;

        if let Some(meter_provider) = meter_provider {
            _ = meter_provider
                .shutdown()
                .inspect_err(|err| error!(?err));
        }

        outcome
    }

    async fn serve(self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(Error::Message(String::from(
                "no configuration: use --config or MIMIC_CONFIG",
            )));
        }

        let documents = crate::load(self.configs.into_iter().map(EnvVarExp::into_inner))?;
        let http_listener = self.http_listener_url.into_inner();

        let cancellation = CancellationToken::new();
        let mut set = JoinSet::new();

        for document in documents {
            match document {
                Document::OpenApi(openapi) => {
                    let listener = listener(&openapi, &http_listener)?;
                    info!(title = %openapi.info.title, %listener);

                    let engine = match self.base_path.as_deref() {
                        Some(base_path) => Engine::new(openapi).base_path(base_path),
                        None => Engine::new(openapi),
                    };

                    let cancellation = cancellation.clone();

                    _ = set.spawn(async move {
                        Arc::new(engine)
                            .listen(&listener, cancellation)
                            .await
                            .map_err(Error::from)
                    });
                }

                Document::AsyncApi(asyncapi) => {
                    info!(title = %asyncapi.info.title, servers = asyncapi.servers.len());

                    let bootstrap = Bootstrap::new(&asyncapi)?.cancellation(cancellation.clone());

                    let bootstrap = match self.join_window_ms {
                        Some(join_window_ms) => {
                            bootstrap.join_window(Duration::from_millis(join_window_ms))
                        }
                        None => bootstrap,
                    };

                    _ = set.spawn(async move { bootstrap.main().await.map_err(Error::from) });
                }
            }
        }

        let outcome = tokio::select! {
            joined = set.join_next() => match joined {
                Some(Ok(served)) => served,
                Some(Err(err)) => Err(err.into()),
                None => Ok(()),
            },

            interrupted = signal::ctrl_c() => {
                info!("interrupted");
                interrupted.map_err(Into::into)
            }
        };

        cancellation.cancel();

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(?err),
                Err(err) => debug!(?err),
            }
        }

        outcome
    }
}

/// The listener for a description: the port of its first server on all
/// interfaces, otherwise `default`.
fn listener(openapi: &OpenApi, default: &Url) -> Result<Url> {
    match openapi
        .servers
        .first()
        .and_then(|server| Url::parse(&server.url).ok())
        .and_then(|url| url.port())
    {
        Some(port) => Url::parse(&format!("tcp://0.0.0.0:{port}")).map_err(Into::into),
        None => Ok(default.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_config::openapi::Server;
    use pretty_assertions::assert_eq;

    #[test]
    fn listener_from_server_port() -> Result<()> {
        let default = Url::parse(DEFAULT_HTTP_LISTENER)?;

        let mut openapi = OpenApi::default();
        assert_eq!(default, listener(&openapi, &default)?);

        openapi.servers.push(Server {
            url: String::from("/api/v3"),
            ..Server::default()
        });
        assert_eq!(default, listener(&openapi, &default)?);

        openapi.servers.insert(
            0,
            Server {
                url: String::from("http://petstore.example:18080/api/v3"),
                ..Server::default()
            },
        );
        assert_eq!(
            Url::parse("tcp://0.0.0.0:18080")?,
            listener(&openapi, &default)?
        );
        Ok(())
    }
}
