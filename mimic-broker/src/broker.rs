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

mod api_versions;
mod context;
mod create_topic;
mod fetch;
mod find_coordinator;
mod group;
mod init_producer_id;
mod list_groups;
mod list_offsets;
mod metadata;
mod produce;

use std::{
    io::ErrorKind,
    marker::PhantomData,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    sync::{Arc, LazyLock},
    time::{Duration, SystemTime},
};

use api_versions::ApiVersionsRequest;
use bytes::Bytes;
use create_topic::CreateTopic;
use fetch::FetchRequest;
use find_coordinator::FindCoordinatorRequest;
use init_producer_id::InitProducerIdRequest;
use list_groups::ListGroupsRequest;
use list_offsets::ListOffsetsRequest;
use metadata::MetadataRequest;
use mimic_sans_io::{Body, CreateTopicsResponse, ErrorCode, Frame, Header, RootMessageMeta};
use mimic_storage::Store;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram},
};
use produce::ProduceRequest;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, debug_span, error, warn};
use url::{Host, Url};

pub use context::ClientContext;

use crate::{
    Error, METER, Result,
    coordinator::group::{Controller, Coordinator, DEFAULT_JOIN_WINDOW, Join, OffsetCommit},
};

const DEFAULT_PORT: u16 = 9092;

static API_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mimic_api_requests")
        .with_description("The number of API requests made")
        .build()
});

static REQUEST_SIZE: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("mimic_request_size")
        .with_unit("By")
        .with_description("The API request size in bytes")
        .build()
});

static RESPONSE_SIZE: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("mimic_response_size")
        .with_unit("By")
        .with_description("The API response size in bytes")
        .build()
});

static REQUEST_DURATION: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("mimic_request_duration")
        .with_unit("ms")
        .with_description("The API request latencies in milliseconds")
        .build()
});

#[derive(Clone, Debug)]
pub struct Broker<G = Controller> {
    node_id: i32,
    listener: Url,
    store: Arc<Store>,
    groups: G,
    cancellation: CancellationToken,
}

impl Broker<Controller> {
    pub fn builder() -> PhantomBuilder {
        Builder {
            node_id: PhantomData,
            listener: PhantomData,
            store: PhantomData,
            join_window: DEFAULT_JOIN_WINDOW,
            cancellation: None,
        }
    }
}

impl<G> Broker<G>
where
    G: Coordinator + Clone + 'static,
{
    pub fn new(
        node_id: i32,
        listener: Url,
        store: Arc<Store>,
        groups: G,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            node_id,
            listener,
            store,
            groups,
            cancellation,
        }
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn listener(&self) -> &Url {
        &self.listener
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Stop accepting connections, closing those already open.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let port = self.listener.port().unwrap_or(DEFAULT_PORT);

        match self.listener.host() {
            None => {
                TcpListener::bind(SocketAddr::from((IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)))
                    .await
            }

            Some(Host::Domain(domain)) => TcpListener::bind((domain, port)).await,

            Some(Host::Ipv4(ipv4_addr)) => {
                TcpListener::bind(SocketAddr::from((IpAddr::V4(ipv4_addr), port))).await
            }

            Some(Host::Ipv6(ipv6_addr)) => {
                TcpListener::bind(SocketAddr::from((IpAddr::V6(ipv6_addr), port))).await
            }
        }
        .inspect_err(|err| error!(?err, listener = %self.listener))
        .map_err(Into::into)
    }

    pub async fn listen(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve connections accepted by `listener` until shutdown.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        debug!(node_id = self.node_id, listener = %self.listener, local = ?listener.local_addr());

        let mut set = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.inspect_err(|err| error!(?err))?;
                    debug!(%peer);

                    let mut broker = self.clone();
                    let span = debug_span!("peer", %peer, node_id = self.node_id);

                    _ = set.spawn(async move {
                        match broker.stream_handler(peer, stream).await {
                            Err(Error::Io(ref io))
                                if io.kind() == ErrorKind::UnexpectedEof
                                    || io.kind() == ErrorKind::BrokenPipe
                                    || io.kind() == ErrorKind::ConnectionReset => {}

                            Err(error) => {
                                error!(?error);
                            }

                            Ok(()) => {}
                        }
                    }
                    .instrument(span));
                }

                Some(joined) = set.join_next() => {
                    if let Err(err) = joined {
                        debug!(?err);
                    }
                }

                _ = self.cancellation.cancelled() => {
                    debug!(node_id = self.node_id, "cancelled");
                    break;
                }
            }
        }

        set.shutdown().await;
        Ok(())
    }

    async fn stream_handler(&mut self, peer: SocketAddr, mut stream: TcpStream) -> Result<()> {
        let mut context = ClientContext::new(peer);
        let mut size = [0u8; 4];

        loop {
            tokio::select! {
                read = stream.read_exact(&mut size) => {
                    _ = read.inspect_err(|error| match error.kind() {
                        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset => (),
                        _ => error!(?error),
                    })?;
                }

                _ = self.cancellation.cancelled() => return Ok(()),
            }

            let length = usize::try_from(i32::from_be_bytes(size))?;

            if length == 0 {
                debug!("empty frame");
                continue;
            }

            let mut request = vec![0u8; length + size.len()];
            request[..size.len()].copy_from_slice(&size[..]);

            _ = stream
                .read_exact(&mut request[size.len()..])
                .await
                .inspect_err(|error| error!(length, ?error))?;

            let request_start = SystemTime::now();

            REQUEST_SIZE.record(u64::try_from(request.len())?, &[]);

            let response = self
                .process_request(&mut context, &request)
                .await
                .inspect_err(|error| error!(?error))?;

            if let Some(response) = response {
                RESPONSE_SIZE.record(u64::try_from(response.len())?, &[]);

                stream
                    .write_all(&response)
                    .await
                    .inspect_err(|error| error!(?error))?;
            }

            REQUEST_DURATION.record(
                request_start
                    .elapsed()
                    .map_or(0, |duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
                &[],
            );
        }
    }

    /// Decode a request frame and encode its response, if one is due.
    ///
    /// A produce with `acks` of 0 has no response. An ApiVersions request
    /// of an unsupported version is answered at version 0.
    async fn process_request(
        &mut self,
        context: &mut ClientContext,
        input: &[u8],
    ) -> Result<Option<Bytes>> {
        let Frame {
            header:
                Header::Request {
                    api_key,
                    api_version,
                    correlation_id,
                    client_id,
                },
            body,
            ..
        } = Frame::request_from_bytes(input)?
        else {
            return Err(Error::Message(String::from("expecting a request frame")));
        };

        context.identify(client_id);

        API_REQUESTS.add(1, &attributes(api_key, api_version, &body));

        let span = request_span(api_key, api_version, correlation_id, &body);

        let supported = RootMessageMeta::messages()
            .requests()
            .get(&api_key)
            .is_some_and(|meta| meta.is_valid(api_version));

        let silent = matches!(&body, Body::ProduceRequest(produce) if produce.acks == 0);

        async move {
            let (body, api_version) = if supported {
                let body = self
                    .response_for(context, body)
                    .await
                    .inspect(|body| debug!(?body))
                    .inspect_err(|err| error!(?err))?;

                (body, api_version)
            } else {
                warn!(api_key, api_version, "unsupported version");
                (
                    ApiVersionsRequest.response(ErrorCode::UnsupportedVersion).into(),
                    0,
                )
            };

            if silent {
                return Ok(None);
            }

            Frame::response(
                Header::Response { correlation_id },
                body,
                api_key,
                api_version,
            )
            .map(Some)
            .inspect_err(|err| error!(?err))
            .map_err(Into::into)
        }
        .instrument(span)
        .await
    }

    pub async fn response_for(&mut self, context: &mut ClientContext, body: Body) -> Result<Body> {
        match body {
            Body::ApiVersionsRequest(request) => {
                context.software(
                    &request.client_software_name,
                    &request.client_software_version,
                );

                Ok(ApiVersionsRequest.response(ErrorCode::None).into())
            }

            Body::CreateTopicsRequest(request) => CreateTopic::with_store(self.store.clone())
                .response(request.topics.as_deref(), request.validate_only)
                .map(|topics| CreateTopicsResponse::default().topics(Some(topics)).into()),

            Body::FetchRequest(request) => {
                debug!(
                    max_wait_ms = request.max_wait_ms,
                    min_bytes = request.min_bytes,
                    max_bytes = request.max_bytes
                );

                FetchRequest::with_store(self.store.clone())
                    .response(
                        request.max_wait_ms,
                        request.min_bytes,
                        request.max_bytes,
                        request.topics.as_deref(),
                        &self.cancellation,
                    )
                    .await
                    .map(Body::from)
            }

            Body::FindCoordinatorRequest(request) => {
                FindCoordinatorRequest::with_store(self.store.clone())
                    .response(&request.key, request.key_type)
                    .map(Body::from)
            }

            Body::InitProducerIdRequest(request) => {
                Ok(InitProducerIdRequest::with_store(self.store.clone())
                    .response(request.transactional_id.as_deref())
                    .into())
            }

            Body::ListGroupsRequest(request) => ListGroupsRequest::with_store(self.store.clone())
                .response(request.states_filter.as_deref())
                .map(Body::from),

            Body::ListOffsetsRequest(request) => ListOffsetsRequest::with_store(self.store.clone())
                .response(request.topics.as_deref())
                .map(Body::from),

            Body::MetadataRequest(request) => MetadataRequest::with_store(self.store.clone())
                .response(request.topics.as_deref())
                .map(Body::from),

            Body::ProduceRequest(request) => ProduceRequest::with_store(self.store.clone())
                .response(
                    request.transactional_id.as_deref(),
                    request.acks,
                    request.topic_data.as_deref(),
                )
                .map(Body::from),

            request @ (Body::JoinGroupRequest(_)
            | Body::SyncGroupRequest(_)
            | Body::HeartbeatRequest(_)
            | Body::LeaveGroupRequest(_)
            | Body::OffsetCommitRequest(_)
            | Body::OffsetFetchRequest(_)) => self.group(context, request).await,

            response => Err(Error::Message(format!(
                "not a request: {}",
                response.api_name()
            ))),
        }
    }

    /// Consumer group requests, served only by the coordinator.
    async fn group(&mut self, context: &mut ClientContext, request: Body) -> Result<Body> {
        let coordinator = self.store.coordinator().id();

        if let Some(error_code) =
            group::refusal(group::group_id(&request), self.node_id, coordinator)
        {
            debug!(node_id = self.node_id, coordinator, ?error_code);
            return group::refused(&request, error_code);
        }

        match request {
            Body::JoinGroupRequest(join) => {
                let member_id = context.join(&join.group_id, &join.member_id);

                self.groups
                    .join(Join {
                        group_id: &join.group_id,
                        session_timeout_ms: join.session_timeout_ms,
                        rebalance_timeout_ms: join.rebalance_timeout_ms,
                        member_id: &member_id,
                        group_instance_id: join.group_instance_id.as_deref(),
                        protocol_type: &join.protocol_type,
                        protocols: join.protocols.as_deref(),
                    })
                    .await
            }

            Body::SyncGroupRequest(sync) => {
                self.groups
                    .sync(
                        &sync.group_id,
                        sync.generation_id,
                        &sync.member_id,
                        sync.assignments.as_deref(),
                    )
                    .await
            }

            Body::HeartbeatRequest(heartbeat) => {
                context.heartbeat();

                self.groups
                    .heartbeat(
                        &heartbeat.group_id,
                        heartbeat.generation_id,
                        &heartbeat.member_id,
                    )
                    .await
            }

            Body::LeaveGroupRequest(leave) => {
                context.leave(&leave.group_id);

                self.groups
                    .leave(
                        &leave.group_id,
                        Some(leave.member_id.as_str()).filter(|member_id| !member_id.is_empty()),
                        leave.members.as_deref(),
                    )
                    .await
            }

            Body::OffsetCommitRequest(commit) => {
                self.groups
                    .offset_commit(OffsetCommit {
                        group_id: &commit.group_id,
                        generation_id_or_member_epoch: commit.generation_id_or_member_epoch,
                        member_id: &commit.member_id,
                        topics: commit.topics.as_deref(),
                    })
                    .await
            }

            Body::OffsetFetchRequest(fetch) => {
                self.groups
                    .offset_fetch(&fetch.group_id, fetch.topics.as_deref())
                    .await
            }

            otherwise => group::refused(&otherwise, ErrorCode::InvalidRequest),
        }
    }
}

fn attributes(api_key: i16, api_version: i16, body: &Body) -> Vec<KeyValue> {
    vec![
        KeyValue::new("api_key", i64::from(api_key)),
        KeyValue::new("api_version", i64::from(api_version)),
        KeyValue::new("api_name", body.api_name()),
    ]
}

fn request_span(api_key: i16, api_version: i16, correlation_id: i32, body: &Body) -> Span {
    match body {
        Body::FetchRequest(_) => debug_span!("fetch", api_key, api_version, correlation_id),

        Body::JoinGroupRequest(join) => debug_span!(
            "join_group",
            api_key,
            api_version,
            correlation_id,
            group_id = join.group_id,
            member_id = join.member_id
        ),

        Body::SyncGroupRequest(sync) => debug_span!(
            "sync_group",
            api_key,
            api_version,
            correlation_id,
            group_id = sync.group_id,
            generation_id = sync.generation_id,
            member_id = sync.member_id
        ),

        Body::HeartbeatRequest(heartbeat) => debug_span!(
            "heartbeat",
            api_key,
            api_version,
            correlation_id,
            group_id = heartbeat.group_id,
            generation_id = heartbeat.generation_id,
            member_id = heartbeat.member_id
        ),

        Body::ProduceRequest(produce) => debug_span!(
            "produce",
            api_key,
            api_version,
            correlation_id,
            acks = produce.acks
        ),

        otherwise => debug_span!(
            "request",
            api_name = otherwise.api_name(),
            api_key,
            api_version,
            correlation_id
        ),
    }
}

#[derive(Clone, Debug)]
pub struct Builder<N, L, S> {
    node_id: N,
    listener: L,
    store: S,
    join_window: Duration,
    cancellation: Option<CancellationToken>,
}

pub type PhantomBuilder = Builder<PhantomData<i32>, PhantomData<Url>, PhantomData<Arc<Store>>>;

impl<N, L, S> Builder<N, L, S> {
    pub fn node_id(self, node_id: i32) -> Builder<i32, L, S> {
        Builder {
            node_id,
            listener: self.listener,
            store: self.store,
            join_window: self.join_window,
            cancellation: self.cancellation,
        }
    }

    pub fn listener(self, listener: Url) -> Builder<N, Url, S> {
        Builder {
            node_id: self.node_id,
            listener,
            store: self.store,
            join_window: self.join_window,
            cancellation: self.cancellation,
        }
    }

    pub fn store(self, store: Arc<Store>) -> Builder<N, L, Arc<Store>> {
        Builder {
            node_id: self.node_id,
            listener: self.listener,
            store,
            join_window: self.join_window,
            cancellation: self.cancellation,
        }
    }

    pub fn join_window(self, join_window: Duration) -> Self {
        Self {
            join_window,
            ..self
        }
    }

    /// Shut down with `cancellation` rather than a token of its own.
    pub fn cancellation(self, cancellation: CancellationToken) -> Self {
        Self {
            cancellation: Some(cancellation),
            ..self
        }
    }
}

impl Builder<i32, Url, Arc<Store>> {
    pub fn build(self) -> Result<Broker<Controller>> {
        if !matches!(self.listener.scheme(), "tcp" | "kafka") {
            return Err(Error::UnsupportedListener(self.listener));
        }

        let cancellation = self.cancellation.unwrap_or_default();

        let groups = Controller::new(self.store.clone(), cancellation.child_token())
            .join_window(self.join_window);

        Ok(Broker::new(
            self.node_id,
            self.listener,
            self.store,
            groups,
            cancellation,
        ))
    }
}
