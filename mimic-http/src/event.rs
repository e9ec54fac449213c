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

//! Events raised while handling a request.
//!
//! An [`EventEmitter`] receives the parsed request together with the
//! response draft and may change its status, headers, body or data
//! before the response is rendered.

use std::{
    fmt::{self, Debug, Formatter},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::{Result, param::Parameters};

/// The event name under which HTTP requests are emitted.
pub const HTTP: &str = "http";

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub method: String,
    pub url: String,
    pub path: IndexMap<String, Value>,
    pub query: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
    pub body: Option<Value>,
    pub operation_id: Option<String>,
    pub key: String,
}

impl RequestEvent {
    pub(crate) fn with_parameters(self, parameters: Parameters) -> Self {
        Self {
            path: parameters.path,
            query: parameters.query,
            header: parameters.header,
            cookie: parameters.cookie,
            ..self
        }
    }
}

/// The response as it will be rendered.
///
/// An explicit `body` is written as is, otherwise `data` is marshalled
/// by the schema of the response.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResponseDraft {
    pub status: u16,
    pub headers: IndexMap<String, String>,
    pub body: Option<String>,
    pub data: Option<Value>,
}

impl ResponseDraft {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .retain(|key, _| !key.eq_ignore_ascii_case(name));
        _ = self.headers.insert(name.to_owned(), value.into());
    }
}

/// A handler that ran for an event.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Action {
    pub name: String,
    pub duration: Duration,
    pub error: Option<String>,
}

#[async_trait]
pub trait EventEmitter: Debug + Send + Sync {
    async fn emit(
        &self,
        event: &str,
        request: &RequestEvent,
        response: &mut ResponseDraft,
    ) -> Result<Vec<Action>>;
}

/// Leaves every response draft untouched.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Noop;

#[async_trait]
impl EventEmitter for Noop {
    async fn emit(
        &self,
        _event: &str,
        _request: &RequestEvent,
        _response: &mut ResponseDraft,
    ) -> Result<Vec<Action>> {
        Ok(vec![])
    }
}

/// A named closure handling every event.
pub struct Handler<F> {
    name: String,
    handler: F,
}

impl<F> Handler<F>
where
    F: Fn(&str, &RequestEvent, &mut ResponseDraft) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> Debug for Handler<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> EventEmitter for Handler<F>
where
    F: Fn(&str, &RequestEvent, &mut ResponseDraft) -> Result<()> + Send + Sync,
{
    async fn emit(
        &self,
        event: &str,
        request: &RequestEvent,
        response: &mut ResponseDraft,
    ) -> Result<Vec<Action>> {
        let start = Instant::now();
        let outcome = (self.handler)(event, request, response);

        Ok(vec![Action {
            name: self.name.clone(),
            duration: start.elapsed(),
            error: outcome.err().map(|err| err.to_string()),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn handler_shapes_draft() -> Result<()> {
        let emitter = Handler::new(
            "teapot",
            |event: &str, request: &RequestEvent, response: &mut ResponseDraft| {
                assert_eq!(HTTP, event);
                response.status = 418;
                response.data = Some(json!({"key": request.key}));
                Ok(())
            },
        );

        let request = RequestEvent {
            key: String::from("GET /tea"),
            ..RequestEvent::default()
        };

        let mut response = ResponseDraft {
            status: 200,
            ..ResponseDraft::default()
        };

        let actions = emitter.emit(HTTP, &request, &mut response).await?;

        assert_eq!(1, actions.len());
        assert_eq!("teapot", actions[0].name);
        assert_eq!(None, actions[0].error);
        assert_eq!(418, response.status);
        assert_eq!(Some(json!({"key": "GET /tea"})), response.data);
        Ok(())
    }

    #[tokio::test]
    async fn noop_leaves_draft() -> Result<()> {
        let mut response = ResponseDraft::default();
        response.set_header("Content-Type", "text/plain");
        response.set_header("content-type", "application/json");

        assert!(
            Noop.emit(HTTP, &RequestEvent::default(), &mut response)
                .await?
                .is_empty()
        );
        assert_eq!(1, response.headers.len());
        assert_eq!(Some("application/json"), response.header("CONTENT-TYPE"));
        Ok(())
    }
}
