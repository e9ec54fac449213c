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

//! Composition of a primary description with patches.
//!
//! Missing values are copied from the patch, keyed maps merge recursively,
//! and booleans only ever change to true. Insertion order of the primary
//! is preserved, with new keys appended in patch order. Once merged, the
//! references of a description are linked again to its components, so a
//! patched component is seen wherever it is referenced.

use std::{hash::Hash, sync::Arc};

use indexmap::IndexMap;
use serde_json::Value;
use tracing::warn;

use crate::{
    Reference,
    asyncapi::{self, AsyncApi, Channel, ChannelBindings, KafkaChannelBinding, Message},
    openapi::{
        Components, Example, Header, Info, Location, MediaType, OpenApi, Operation,
        Parameter, PathItem, RequestBody, Response, Responses, Server, ServerVariable, Style, Tag,
    },
    schema::{AdditionalProperties, Schema, SchemaType, Xml},
};

pub trait Patch {
    fn patch(&mut self, other: &Self);
}

/// Fold each patch into the primary.
pub fn patch<T, I>(primary: T, patches: I) -> T
where
    T: Patch,
    I: IntoIterator<Item = T>,
{
    patches.into_iter().fold(primary, |mut primary, patch| {
        primary.patch(&patch);
        primary
    })
}

macro_rules! keep {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Patch for $ty {
                fn patch(&mut self, _other: &Self) {}
            }
        )+
    };
}

keep!(
    f64,
    i16,
    i32,
    u64,
    Value,
    Location,
    Style,
    SchemaType,
    AdditionalProperties,
);

impl Patch for bool {
    fn patch(&mut self, other: &Self) {
        *self |= *other;
    }
}

impl Patch for String {
    fn patch(&mut self, other: &Self) {
        if self.is_empty() {
            self.clone_from(other);
        }
    }
}

impl<T: Patch + Clone> Patch for Option<T> {
    fn patch(&mut self, other: &Self) {
        match (self.as_mut(), other) {
            (Some(this), Some(other)) => this.patch(other),
            (None, Some(other)) => *self = Some(other.clone()),
            (_, None) => (),
        }
    }
}

impl<K, V> Patch for IndexMap<K, V>
where
    K: Clone + Eq + Hash,
    V: Patch + Clone,
{
    fn patch(&mut self, other: &Self) {
        for (key, value) in other {
            if let Some(existing) = self.get_mut(key) {
                existing.patch(value);
            } else {
                _ = self.insert(key.clone(), value.clone());
            }
        }
    }
}

impl<T: Clone> Patch for Vec<T> {
    fn patch(&mut self, other: &Self) {
        if self.is_empty() {
            self.clone_from(other);
        }
    }
}

// inline values patch in place, a reference patched by an inline value
// becomes inline when that changes what it refers to
impl<T: Patch + Clone + PartialEq> Patch for Reference<T> {
    fn patch(&mut self, other: &Self) {
        match self {
            Self::Inline(this) => {
                if let Some(other) = other.value() {
                    if !Arc::ptr_eq(this, &other) {
                        Arc::make_mut(this).patch(&other);
                    }
                }
            }

            Self::Ref { target, .. } => {
                let (Self::Inline(other), Some(value)) = (other, target.value()) else {
                    return;
                };

                let mut patched = T::clone(&value);
                patched.patch(other);

                if patched != *value {
                    *self = Self::Inline(Arc::new(patched));
                }
            }
        }
    }
}

fn patch_servers(servers: &mut Vec<Server>, other: &[Server]) {
    for candidate in other {
        if let Some(existing) = servers.iter_mut().find(|server| server.url == candidate.url) {
            existing.patch(candidate);
        } else {
            servers.push(candidate.clone());
        }
    }
}

fn parameter_key(parameter: &Reference<Parameter>) -> Option<(String, Location)> {
    parameter
        .value()
        .map(|parameter| (parameter.name.clone(), parameter.location))
}

fn patch_parameters(parameters: &mut Vec<Reference<Parameter>>, other: &[Reference<Parameter>]) {
    for candidate in other {
        let key = parameter_key(candidate);

        if let Some(existing) = parameters.iter_mut().find(|parameter| {
            (key.is_some() && parameter_key(parameter) == key)
                || (parameter.reference().is_some()
                    && parameter.reference() == candidate.reference())
        }) {
            existing.patch(candidate);
        } else {
            parameters.push(candidate.clone());
        }
    }
}

impl Patch for OpenApi {
    fn patch(&mut self, other: &Self) {
        self.openapi.patch(&other.openapi);
        self.info.patch(&other.info);
        patch_servers(&mut self.servers, &other.servers);
        self.paths.patch(&other.paths);
        self.components.patch(&other.components);
        self.tags.patch(&other.tags);

        _ = self.link().inspect_err(|err| warn!(?err));
    }
}

impl Patch for Info {
    fn patch(&mut self, other: &Self) {
        self.title.patch(&other.title);
        self.description.patch(&other.description);
        self.version.patch(&other.version);
    }
}

impl Patch for Tag {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
    }
}

impl Patch for Server {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.variables.patch(&other.variables);
    }
}

impl Patch for ServerVariable {
    fn patch(&mut self, other: &Self) {
        self.default.patch(&other.default);
        self.enumeration.patch(&other.enumeration);
        self.description.patch(&other.description);
    }
}

impl Patch for PathItem {
    fn patch(&mut self, other: &Self) {
        self.summary.patch(&other.summary);
        self.description.patch(&other.description);
        patch_servers(&mut self.servers, &other.servers);
        patch_parameters(&mut self.parameters, &other.parameters);
        self.operations.patch(&other.operations);
    }
}

impl Patch for Operation {
    fn patch(&mut self, other: &Self) {
        self.tags.patch(&other.tags);
        self.summary.patch(&other.summary);
        self.description.patch(&other.description);
        self.operation_id.patch(&other.operation_id);
        self.deprecated.patch(&other.deprecated);
        patch_parameters(&mut self.parameters, &other.parameters);
        self.request_body.patch(&other.request_body);
        self.responses.patch(&other.responses);
        patch_servers(&mut self.servers, &other.servers);
    }
}

impl Patch for Responses {
    fn patch(&mut self, other: &Self) {
        self.0.patch(&other.0);
    }
}

impl Patch for Parameter {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.required.patch(&other.required);
        self.deprecated.patch(&other.deprecated);
        self.style.patch(&other.style);
        self.explode.patch(&other.explode);
        self.schema.patch(&other.schema);
        self.example.patch(&other.example);
        self.examples.patch(&other.examples);
        self.content.patch(&other.content);
    }
}

impl Patch for RequestBody {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.content.patch(&other.content);
        self.required.patch(&other.required);
    }
}

impl Patch for MediaType {
    fn patch(&mut self, other: &Self) {
        self.schema.patch(&other.schema);
        self.example.patch(&other.example);
        self.examples.patch(&other.examples);
    }
}

impl Patch for Response {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.headers.patch(&other.headers);
        self.content.patch(&other.content);
    }
}

impl Patch for Header {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.required.patch(&other.required);
        self.deprecated.patch(&other.deprecated);
        self.schema.patch(&other.schema);
        self.example.patch(&other.example);
    }
}

impl Patch for Example {
    fn patch(&mut self, other: &Self) {
        self.summary.patch(&other.summary);
        self.description.patch(&other.description);
        self.value.patch(&other.value);
        self.external_value.patch(&other.external_value);
    }
}

impl Patch for Components {
    fn patch(&mut self, other: &Self) {
        self.schemas.patch(&other.schemas);
        self.responses.patch(&other.responses);
        self.parameters.patch(&other.parameters);
        self.examples.patch(&other.examples);
        self.request_bodies.patch(&other.request_bodies);
        self.headers.patch(&other.headers);
    }
}

impl Patch for Xml {
    fn patch(&mut self, other: &Self) {
        self.name.patch(&other.name);
        self.namespace.patch(&other.namespace);
        self.prefix.patch(&other.prefix);
        self.attribute.patch(&other.attribute);
        self.wrapped.patch(&other.wrapped);
        self.cdata.patch(&other.cdata);
    }
}

impl Patch for Schema {
    fn patch(&mut self, other: &Self) {
        self.kind.patch(&other.kind);
        self.title.patch(&other.title);
        self.description.patch(&other.description);
        self.format.patch(&other.format);
        self.pattern.patch(&other.pattern);
        self.enumeration.patch(&other.enumeration);
        self.minimum.patch(&other.minimum);
        self.maximum.patch(&other.maximum);
        self.exclusive_minimum.patch(&other.exclusive_minimum);
        self.exclusive_maximum.patch(&other.exclusive_maximum);
        self.multiple_of.patch(&other.multiple_of);
        self.min_length.patch(&other.min_length);
        self.max_length.patch(&other.max_length);
        self.items.patch(&other.items);
        self.min_items.patch(&other.min_items);
        self.max_items.patch(&other.max_items);
        self.unique_items.patch(&other.unique_items);
        self.properties.patch(&other.properties);
        self.required.patch(&other.required);
        self.additional_properties.patch(&other.additional_properties);
        self.min_properties.patch(&other.min_properties);
        self.max_properties.patch(&other.max_properties);
        self.any_of.patch(&other.any_of);
        self.all_of.patch(&other.all_of);
        self.one_of.patch(&other.one_of);
        self.nullable.patch(&other.nullable);
        self.read_only.patch(&other.read_only);
        self.write_only.patch(&other.write_only);
        self.deprecated.patch(&other.deprecated);
        self.example.patch(&other.example);
        self.default.patch(&other.default);
        self.xml.patch(&other.xml);
        self.faker.patch(&other.faker);
        self.shuffle_items.patch(&other.shuffle_items);
    }
}

impl Patch for AsyncApi {
    fn patch(&mut self, other: &Self) {
        self.asyncapi.patch(&other.asyncapi);
        self.info.patch(&other.info);
        self.servers.patch(&other.servers);
        self.channels.patch(&other.channels);
        self.components.patch(&other.components);

        _ = self.link().inspect_err(|err| warn!(?err));
    }
}

impl Patch for asyncapi::Server {
    fn patch(&mut self, other: &Self) {
        self.url.patch(&other.url);
        self.protocol.patch(&other.protocol);
        self.description.patch(&other.description);
    }
}

impl Patch for Channel {
    fn patch(&mut self, other: &Self) {
        self.description.patch(&other.description);
        self.publish.patch(&other.publish);
        self.subscribe.patch(&other.subscribe);
        self.bindings.patch(&other.bindings);
    }
}

impl Patch for ChannelBindings {
    fn patch(&mut self, other: &Self) {
        self.kafka.patch(&other.kafka);
    }
}

impl Patch for KafkaChannelBinding {
    fn patch(&mut self, other: &Self) {
        self.topic.patch(&other.topic);
        self.partitions.patch(&other.partitions);
        self.replicas.patch(&other.replicas);
    }
}

impl Patch for asyncapi::Operation {
    fn patch(&mut self, other: &Self) {
        self.operation_id.patch(&other.operation_id);
        self.summary.patch(&other.summary);
        self.message.patch(&other.message);
    }
}

impl Patch for Message {
    fn patch(&mut self, other: &Self) {
        self.name.patch(&other.name);
        self.title.patch(&other.title);
        self.content_type.patch(&other.content_type);
        self.payload.patch(&other.payload);
    }
}

impl Patch for asyncapi::Components {
    fn patch(&mut self, other: &Self) {
        self.schemas.patch(&other.schemas);
        self.messages.patch(&other.messages);
    }
}
