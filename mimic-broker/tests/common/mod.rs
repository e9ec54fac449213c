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

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use mimic_broker::{Broker, Error, Result};
use mimic_sans_io::{Body, Frame, Header};
use mimic_storage::{Broker as Node, Store};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;
use url::Url;

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

/// A broker for `store`, serving on an ephemeral local port.
pub(crate) async fn start(
    store: Arc<Store>,
    join_window: Duration,
) -> Result<(SocketAddr, Broker)> {
    let broker = Broker::builder()
        .node_id(store.coordinator().id())
        .listener(Url::parse("tcp://127.0.0.1:0")?)
        .store(store)
        .join_window(join_window)
        .build()?;

    let listener = broker.bind().await?;
    let local = listener.local_addr()?;

    _ = tokio::spawn(broker.clone().serve(listener));

    Ok((local, broker))
}

pub(crate) fn store() -> Result<Arc<Store>> {
    Store::builder()
        .cluster_id("mimic")
        .broker(Node::new(1, "127.0.0.1", 9092))
        .build()
        .map(Arc::new)
        .map_err(Into::into)
}

/// A client speaking the wire protocol over a single connection.
#[derive(Debug)]
pub(crate) struct Client {
    stream: TcpStream,
    correlation_id: i32,
}

impl Client {
    pub(crate) async fn connect(addr: SocketAddr) -> Result<Self> {
        TcpStream::connect(addr)
            .await
            .map(|stream| Self {
                stream,
                correlation_id: 0,
            })
            .map_err(Into::into)
    }

    pub(crate) async fn call<Q, R>(&mut self, api_version: i16, request: Q) -> Result<R>
    where
        Q: Into<Body>,
        R: TryFrom<Body, Error = mimic_sans_io::Error>,
    {
        let body = request.into();
        let api_key = body.api_key();

        self.correlation_id += 1;
        let correlation_id = self.correlation_id;

        let encoded = Frame::request(
            Header::Request {
                api_key,
                api_version,
                correlation_id,
                client_id: Some(String::from("mimic-test")),
            },
            body,
        )?;

        self.stream.write_all(&encoded).await?;

        let mut size = [0u8; 4];
        _ = self.stream.read_exact(&mut size).await?;

        let mut response = vec![0u8; usize::try_from(i32::from_be_bytes(size))?];
        _ = self.stream.read_exact(&mut response).await?;

        let mut frame = BytesMut::with_capacity(size.len() + response.len());
        frame.extend_from_slice(&size);
        frame.extend_from_slice(&response);

        Frame::correlated_response_from_bytes(frame.freeze(), api_key, api_version, correlation_id)
            .and_then(|frame| R::try_from(frame.body))
            .map_err(Into::into)
    }
}
