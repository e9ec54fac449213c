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

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use mimic_config::{Document, FileReader, OpenApi, reader::file_url};
use mimic_http::{Engine, Error, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_tracing() -> Result<DefaultGuard> {
    use std::{fs::File, thread};

    Ok(tracing::subscriber::set_default(
        tracing_subscriber::fmt()
            .with_level(true)
            .with_line_number(true)
            .with_thread_names(false)
            .with_target(true)
            .with_env_filter(
                EnvFilter::from_default_env()
                    .add_directive(
                        format!("{}=debug", env!("CARGO_PKG_NAME").replace("-", "_"))
                            .parse()
                            .map_err(|err| Error::Message(format!("{err}")))?,
                    ),
            )
            .with_writer(
                thread::current()
                    .name()
                    .ok_or(Error::Message(String::from("unnamed thread")))
                    .and_then(|name| {
                        std::fs::create_dir_all(format!("../logs/{}", env!("CARGO_PKG_NAME")))
                            .and_then(|()| {
                                File::create(format!(
                                    "../logs/{}/{}::{name}.log",
                                    env!("CARGO_PKG_NAME"),
                                    env!("CARGO_CRATE_NAME")
                                ))
                            })
                            .map_err(Into::into)
                    })
                    .map(Arc::new)?,
            )
            .finish(),
    ))
}

/// The description of a fixture, with every reference resolved.
pub(crate) fn fixture(name: &str) -> Result<Arc<OpenApi>> {
    match Document::load(&file_url(format!("tests/fixtures/{name}"))?, &FileReader)? {
        Document::OpenApi(openapi) => Ok(openapi),
        otherwise => Err(Error::Message(format!("not openapi: {}", otherwise.title()))),
    }
}

/// An engine serving on an ephemeral local port.
pub(crate) async fn start(
    engine: Engine,
    cancellation: CancellationToken,
) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local = listener.local_addr()?;

    Ok((
        local,
        tokio::spawn(Arc::new(engine).serve(listener, cancellation)),
    ))
}

/// A response as read off the wire.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Exchange {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Exchange {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Send a request on a new connection and read the whole response.
pub(crate) async fn send(
    addr: SocketAddr,
    request_line: &str,
    headers: &[(&str, &str)],
) -> Result<Exchange> {
    let mut stream = TcpStream::connect(addr).await?;

    let mut request = format!("{request_line} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    _ = stream.read_to_end(&mut response).await?;
    let response = String::from_utf8(response)?;

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::Message(format!("no header terminator: {response}")))?;

    let mut lines = head.lines();

    let status = lines
        .next()
        .and_then(|status| status.split_whitespace().nth(1))
        .and_then(|status| status.parse().ok())
        .ok_or_else(|| Error::Message(format!("no status: {head}")))?;

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
        .collect();

    Ok(Exchange {
        status,
        headers,
        body: body.to_owned(),
    })
}
