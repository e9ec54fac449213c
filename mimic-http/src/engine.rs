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

//! The HTTP mock engine.
//!
//! Every request is routed to an operation, its parameters and body are
//! parsed and validated, a response is negotiated against `Accept` and a
//! draft is offered to the [`EventEmitter`] before being rendered. Errors
//! are answered with their status and message, and every request is
//! logged and measured.

use std::{
    convert::Infallible,
    fmt::Display,
    net::{IpAddr, Ipv6Addr, SocketAddr},
    sync::{Arc, LazyLock, PoisonError, RwLock},
    time::{Duration, Instant},
};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{
    Request, Response, StatusCode,
    body::Body,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
    http::request::Parts,
    service::service_fn,
};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
};
use mimic_config::{
    OpenApi, Reference,
    openapi::{self, DEFAULT_STATUS, Method},
};
use mimic_schema::Generator;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram},
};
use serde_json::Value;
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, warn};
use url::{Host, Url};

use crate::{
    Action, Error, EventEmitter, METER, Noop, RequestEvent, ResponseDraft, Result,
    body, event,
    media::{self, APPLICATION_JSON, MediaType, Negotiated},
    param, render,
    route::Router,
};

const DEFAULT_PORT: u16 = 8080;

static HTTP_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("mimic_http_requests")
        .with_description("The number of HTTP requests handled")
        .build()
});

static HTTP_REQUEST_DURATION: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("mimic_http_request_duration")
        .with_unit("ms")
        .with_description("The HTTP request latencies in milliseconds")
        .build()
});

#[derive(Debug)]
pub struct Engine {
    base_path: String,
    router: RwLock<Arc<Router>>,
    emitter: Arc<dyn EventEmitter>,
    generator: Generator,
}

impl Engine {
    /// An engine serving `openapi`, under the path of its first server.
    pub fn new(openapi: Arc<OpenApi>) -> Self {
        let base_path = server_path(&openapi);

        Self {
            router: RwLock::new(Arc::new(Router::new(openapi, &base_path))),
            base_path,
            emitter: Arc::new(Noop),
            generator: Generator::new(),
        }
    }

    pub fn base_path(self, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();

        let router = self
            .router
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        Self {
            router: RwLock::new(Arc::new(Router::new(router.openapi().clone(), &base_path))),
            base_path,
            ..self
        }
    }

    pub fn emitter(self, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { emitter, ..self }
    }

    pub fn generator(self, generator: Generator) -> Self {
        Self { generator, ..self }
    }

    fn router(&self) -> Result<Arc<Router>> {
        self.router
            .read()
            .map(|router| router.clone())
            .map_err(Into::into)
    }

    pub fn openapi(&self) -> Result<Arc<OpenApi>> {
        self.router().map(|router| router.openapi().clone())
    }

    /// Replace the description, requests in flight keep the one they
    /// started with.
    pub fn update(&self, openapi: Arc<OpenApi>) -> Result<()> {
        let router = Arc::new(Router::new(openapi, &self.base_path));
        debug!(base_path = %self.base_path, endpoints = router.openapi().paths.len());

        self.router
            .write()
            .map(|mut current| *current = router)
            .map_err(Into::into)
    }

    /// Answer a request, never failing: errors become responses.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let mut actions = Vec::new();

        let outcome = match body.collect().await {
            Ok(collected) => self.respond(&parts, collected.to_bytes(), &mut actions).await,
            Err(err) => Err(Error::BadRequest(format!("unreadable request body: {err}"))),
        };

        let (response, error) = match outcome {
            Ok(response) => (response, None),
            Err(error) => (failure(&error), Some(error)),
        };

        record(&parts, response.status(), start.elapsed(), &actions, error.as_ref());
        response
    }

    async fn respond(
        &self,
        parts: &Parts,
        bytes: Bytes,
        actions: &mut Vec<Action>,
    ) -> Result<Response<Full<Bytes>>> {
        let router = self.router()?;
        let url = parts.uri.to_string();
        let not_found = || Error::NotFound(format!("no matching endpoint found at {url}"));

        let method = parts
            .method
            .as_str()
            .parse::<Method>()
            .map_err(|_| not_found())?;

        let route = router
            .resolve(method, parts.uri.path())
            .ok_or_else(not_found)?;
        debug!(key = %route.key());

        let parameters = param::parse(&route, parts.uri.query(), &parts.headers)?;

        let body = match route.operation.request_body.as_ref() {
            Some(declaration) => {
                let declaration = resolved(declaration, "request body")?;
                body::parse(&declaration, header(&parts.headers, &CONTENT_TYPE), &bytes)?
            }

            None => None,
        };

        let (status, response) = route
            .operation
            .responses
            .success()
            .ok_or_else(|| Error::Internal(format!("no response defined for {}", route.key())))?;
        let response = resolved(response, "response")?;

        let accept = header(&parts.headers, &ACCEPT).unwrap_or_default();

        let mut draft = ResponseDraft {
            status: if status == DEFAULT_STATUS {
                StatusCode::OK.as_u16()
            } else {
                status
            },
            ..ResponseDraft::default()
        };

        if !response.content.is_empty() {
            let negotiated = negotiate(&response, accept)?;
            draft.set_header(CONTENT_TYPE.as_str(), negotiated.content_type);

            if let Some(media) = response.content.get(negotiated.declared) {
                draft.data = self.example(media)?;
            }
        }

        let request = RequestEvent {
            method: parts.method.to_string(),
            url,
            body,
            operation_id: route.operation.operation_id.clone(),
            key: route.key(),
            ..RequestEvent::default()
        }
        .with_parameters(parameters);

        actions.extend(
            self.emitter
                .emit(event::HTTP, &request, &mut draft)
                .await?,
        );

        let response = route
            .operation
            .responses
            .for_status(draft.status)
            .ok_or(Error::UnknownStatus(draft.status))
            .and_then(|response| resolved(response, "response"))?;

        if draft.header(CONTENT_TYPE.as_str()).is_none() && !response.content.is_empty() {
            let negotiated = negotiate(&response, accept)?;
            draft.set_header(CONTENT_TYPE.as_str(), negotiated.content_type);
        }

        let payload = match (draft.body.take(), draft.data.as_ref()) {
            (Some(body), _) => body.into_bytes(),
            (None, Some(data)) => marshal(&response, &draft, data)
                .map_err(|err| Error::Internal(format!("marshal: {err}")))?,
            (None, None) => Vec::new(),
        };

        for (name, declared) in &response.headers {
            if draft.header(name).is_some() || name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }

            let declared = resolved(declared, "header")?;

            if let Some(value) = render::header_value(&declared, &self.generator)? {
                draft.set_header(name, value);
            }
        }

        let mut builder = Response::builder().status(
            StatusCode::from_u16(draft.status).map_err(|_| Error::UnknownStatus(draft.status))?,
        );

        for (name, value) in &draft.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(Full::new(Bytes::from(payload)))
            .map_err(Into::into)
    }

    /// The example of a response media type, or data generated from its
    /// schema.
    fn example(&self, media: &openapi::MediaType) -> Result<Option<Value>> {
        if let Some(example) = media.example.as_ref() {
            return Ok(Some(example.clone()));
        }

        if let Some(example) = media
            .examples
            .values()
            .filter_map(Reference::value)
            .find_map(|example| example.value.clone())
        {
            return Ok(Some(example));
        }

        media
            .schema
            .as_ref()
            .map(|schema| self.generator.generate_reference(schema))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn listen(
        self: Arc<Self>,
        listener: &Url,
        cancellation: CancellationToken,
    ) -> Result<()> {
        let port = listener.port().unwrap_or(DEFAULT_PORT);

        let bound = match listener.host() {
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
        .inspect_err(|err| error!(?err, %listener))?;

        self.serve(bound, cancellation).await
    }

    /// Serve connections accepted by `listener` until cancelled.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        cancellation: CancellationToken,
    ) -> Result<()> {
        debug!(local = ?listener.local_addr(), base_path = %self.base_path);

        let mut set = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.inspect_err(|err| error!(?err))?;
                    let engine = self.clone();
                    let span = debug_span!("peer", %peer);

                    _ = set.spawn(async move {
                        let service = service_fn(move |request| {
                            let engine = engine.clone();
                            async move { Ok::<_, Infallible>(engine.handle(request).await) }
                        });

                        if let Err(err) = Builder::new(TokioExecutor::new())
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            debug!(?err);
                        }
                    }
                    .instrument(span));
                }

                Some(joined) = set.join_next() => {
                    if let Err(err) = joined {
                        debug!(?err);
                    }
                }

                _ = cancellation.cancelled() => {
                    debug!("cancelled");
                    break;
                }
            }
        }

        set.shutdown().await;
        Ok(())
    }
}

/// The path of the first server, with any variables at their defaults.
fn server_path(openapi: &OpenApi) -> String {
    openapi
        .servers
        .first()
        .map(|server| {
            let url = server
                .variables
                .iter()
                .fold(server.url.clone(), |url, (name, variable)| {
                    url.replace(&format!("{{{name}}}"), &variable.default)
                });

            Url::parse(&url).map_or(url, |parsed| parsed.path().to_owned())
        })
        .map(|path| path.trim_end_matches('/').to_owned())
        .unwrap_or_default()
}

fn header<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn resolved<T>(reference: &Reference<T>, kind: &str) -> Result<Arc<T>> {
    reference.value().ok_or_else(|| {
        Error::Internal(format!(
            "unresolved {kind}: {}",
            reference.reference().unwrap_or_default()
        ))
    })
}

fn negotiate<'a>(response: &'a openapi::Response, accept: &str) -> Result<Negotiated<'a>> {
    media::negotiate(response.content.keys().map(String::as_str), accept).ok_or_else(|| {
        Error::NotAcceptable(format!(
            "none of requests content type(s) are supported: \"{accept}\""
        ))
    })
}

fn marshal(
    response: &openapi::Response,
    draft: &ResponseDraft,
    data: &Value,
) -> Result<Vec<u8>> {
    let content_type = draft
        .header(CONTENT_TYPE.as_str())
        .unwrap_or(APPLICATION_JSON)
        .parse::<MediaType>()?;

    let schema = media::best_match(response.content.keys().map(String::as_str), &content_type)
        .and_then(|declared| response.content.get(declared))
        .and_then(|media| media.schema.as_ref());

    render::marshal(
        data,
        schema.and_then(Reference::value).as_deref(),
        &content_type,
        render::root_name(schema),
    )
}

fn failure(error: &Error) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(error.to_string())));
    *response.status_mut() = error.status();
    _ = response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

fn record(
    parts: &Parts,
    status: StatusCode,
    duration: Duration,
    actions: &[Action],
    error: Option<&Error>,
) {
    let attributes = [
        KeyValue::new("method", parts.method.to_string()),
        KeyValue::new("status", i64::from(status.as_u16())),
    ];

    HTTP_REQUESTS.add(1, &attributes);
    HTTP_REQUEST_DURATION.record(
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        &attributes,
    );

    let duration_ms = duration.as_secs_f64() * 1_000.0;
    let status = status.as_u16();

    match error {
        Some(error) => warn!(
            method = %parts.method,
            url = %parts.uri,
            status,
            duration_ms,
            ?actions,
            %error
        ),
        None => info!(
            method = %parts.method,
            url = %parts.uri,
            status,
            duration_ms,
            ?actions
        ),
    }
}
