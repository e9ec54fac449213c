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

//! Endpoint resolution.
//!
//! A request path and an endpoint template are both split by `/`. They
//! match when they have the same number of segments, and every static
//! segment of the template is equal to the path segment in the same
//! position. A `{name}` segment matches anything, its value being parsed
//! later as the path parameter `name`.
//!
//! When several endpoints match, the one with a static segment at the
//! first position where they differ wins, so that `/pet/findByStatus` is
//! preferred to `/pet/{id}`.

use std::sync::Arc;

use mimic_config::{
    OpenApi,
    openapi::{Method, Operation, PathItem},
};
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
enum Segment {
    Static(String),
    Wildcard(String),
}

impl Segment {
    fn parse(segment: &str) -> Self {
        segment
            .strip_prefix('{')
            .and_then(|rest| rest.split_once('}'))
            .map_or_else(
                || Self::Static(segment.to_owned()),
                |(name, _)| Self::Wildcard(name.to_owned()),
            )
    }

    fn is_static(&self) -> bool {
        matches!(self, Self::Static(_))
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Static(expected) => expected == segment,
            Self::Wildcard(_) => true,
        }
    }
}

#[derive(Clone, Debug)]
struct Endpoint {
    path: String,
    segments: Vec<Segment>,
}

/// The endpoints of a description, under an optional base path.
#[derive(Clone, Debug)]
pub struct Router {
    openapi: Arc<OpenApi>,
    endpoints: Vec<Endpoint>,
}

/// An operation matched by a request.
#[derive(Clone, Debug)]
pub struct Route<'a> {
    pub method: Method,
    pub path: &'a str,
    pub item: &'a PathItem,
    pub operation: &'a Operation,
    pub segments: Vec<(&'a str, String)>,
}

impl Route<'_> {
    /// The raw value of the path segment matched by `{name}`.
    pub fn segment(&self, name: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(wildcard, _)| *wildcard == name)
            .map(|(_, value)| value.as_str())
    }

    /// `<METHOD> <path>`, identifying the endpoint.
    pub fn key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

impl Router {
    pub fn new(openapi: Arc<OpenApi>, base_path: &str) -> Self {
        let base_path = base_path.trim_end_matches('/');

        let endpoints = openapi
            .paths
            .keys()
            .map(|path| Endpoint {
                path: path.clone(),
                segments: format!("{base_path}{path}")
                    .split('/')
                    .map(Segment::parse)
                    .collect(),
            })
            .collect();

        Self { openapi, endpoints }
    }

    pub fn openapi(&self) -> &Arc<OpenApi> {
        &self.openapi
    }

    /// The operation for `method` at `path`, if any endpoint defines one.
    pub fn resolve(&self, method: Method, path: &str) -> Option<Route<'_>> {
        let segments = path.split('/').collect::<Vec<_>>();

        let (endpoint, item, operation) = self
            .endpoints
            .iter()
            .filter(|endpoint| {
                endpoint.segments.len() == segments.len()
                    && endpoint
                        .segments
                        .iter()
                        .zip(&segments)
                        .all(|(expected, actual)| expected.matches(actual))
            })
            .filter_map(|endpoint| {
                self.openapi.paths.get(&endpoint.path).and_then(|item| {
                    item.operation(method)
                        .map(|operation| (endpoint, item, operation))
                })
            })
            .reduce(|current, candidate| {
                if more_specific(candidate.0, current.0) {
                    candidate
                } else {
                    current
                }
            })?;

        debug!(%method, path, endpoint = %endpoint.path);

        Some(Route {
            method,
            path: &endpoint.path,
            item,
            operation,
            segments: endpoint
                .segments
                .iter()
                .zip(segments)
                .filter_map(|(expected, actual)| match expected {
                    Segment::Wildcard(name) => Some((name.as_str(), percent_decode(actual))),
                    Segment::Static(_) => None,
                })
                .collect(),
        })
    }
}

/// Whether `candidate` has a static segment where `current` first has a
/// wildcard.
fn more_specific(candidate: &Endpoint, current: &Endpoint) -> bool {
    candidate
        .segments
        .iter()
        .zip(&current.segments)
        .find(|(candidate, current)| candidate.is_static() != current.is_static())
        .is_some_and(|(candidate, _)| candidate.is_static())
}

/// Decode `%XX` escapes, leaving malformed escapes as they are.
pub(crate) fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let escaped = (bytes[i] == b'%')
            .then(|| bytes.get(i + 1..i + 3))
            .flatten()
            .and_then(|hex| std::str::from_utf8(hex).ok())
            .and_then(|hex| u8::from_str_radix(hex, 16).ok());

        if let Some(byte) = escaped {
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_config::{Document, MemoryReader};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use url::Url;

    fn petstore() -> Arc<OpenApi> {
        let source = Url::parse("memory:///petstore.json").unwrap();

        let document = json!({
            "openapi": "3.0.3",
            "info": {"title": "petstore", "version": "1"},
            "paths": {
                "/pet/{id}": {
                    "get": {"operationId": "getPet", "responses": {"200": {"description": "ok"}}},
                    "delete": {"operationId": "deletePet", "responses": {"200": {"description": "ok"}}}
                },
                "/pet/findByStatus": {
                    "get": {"operationId": "findByStatus", "responses": {"200": {"description": "ok"}}}
                },
                "/store/{store}/pet/{id}": {
                    "get": {"operationId": "storePet", "responses": {"200": {"description": "ok"}}}
                }
            }
        });

        match Document::parse(&source, document, &MemoryReader::new()).unwrap() {
            Document::OpenApi(openapi) => openapi,
            Document::AsyncApi(_) => unreachable!(),
        }
    }

    fn operation_id(router: &Router, method: Method, path: &str) -> Option<String> {
        router
            .resolve(method, path)
            .and_then(|route| route.operation.operation_id.clone())
    }

    #[test]
    fn static_segments_win() {
        let router = Router::new(petstore(), "");

        assert_eq!(
            Some("findByStatus".into()),
            operation_id(&router, Method::Get, "/pet/findByStatus")
        );
        assert_eq!(
            Some("getPet".into()),
            operation_id(&router, Method::Get, "/pet/42")
        );
    }

    #[test]
    fn method_must_be_defined() {
        let router = Router::new(petstore(), "");

        assert_eq!(
            Some("deletePet".into()),
            operation_id(&router, Method::Delete, "/pet/findByStatus")
        );
        assert_eq!(None, operation_id(&router, Method::Post, "/pet/42"));
        assert_eq!(None, operation_id(&router, Method::Get, "/pet"));
        assert_eq!(None, operation_id(&router, Method::Get, "/pet/42/extra"));
    }

    #[test]
    fn wildcards_capture_segments() {
        let router = Router::new(petstore(), "/api/v3/");

        let route = router
            .resolve(Method::Get, "/api/v3/store/north%20side/pet/7")
            .unwrap();

        assert_eq!("/store/{store}/pet/{id}", route.path);
        assert_eq!(Some("north side"), route.segment("store"));
        assert_eq!(Some("7"), route.segment("id"));
        assert_eq!(None, route.segment("missing"));
        assert_eq!("GET /store/{store}/pet/{id}", route.key());

        assert!(router.resolve(Method::Get, "/store/a/pet/7").is_none());
    }

    #[test]
    fn percent_decoding() {
        assert_eq!("a b", percent_decode("a%20b"));
        assert_eq!("100%", percent_decode("100%"));
        assert_eq!("%zz", percent_decode("%zz"));
    }
}
