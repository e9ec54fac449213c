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

//! `$ref` resolution.
//!
//! A freshly decoded description is walked by [`Resolve`]. Every unresolved
//! [`Reference`] is looked up, relative to the URL of the document it was
//! found in, by loading that document through a [`Reader`] and following
//! the JSON pointer in its fragment. The loaded target is then resolved in
//! turn, relative to its own document.
//!
//! Once resolved, references to `#/components/...` are linked to the
//! components of the description itself, so that a component and every
//! reference to it share one value. Linking is repeated after patching,
//! which is how a patched component reaches the operations using it.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::{
    Document, DocumentKind, Error, Reader, Reference, Result,
    asyncapi::{
        AsyncApi, Channel, Components as AsyncComponents, Message, Operation as AsyncOperation,
    },
    openapi::{
        Components, Example, Header, MediaType, OpenApi, Operation, Parameter, PathItem,
        RequestBody, Response, Responses, status_name,
    },
    reference::{Arena, Slot, Target},
    schema::{AdditionalProperties, Schema},
    swagger,
};

pub trait Resolve {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()>;
}

type Key = (TypeId, Url, String);

type Pointer = (TypeId, String);

pub struct Resolver<'a> {
    reader: Option<&'a dyn Reader>,
    base: Option<Url>,
    documents: HashMap<Url, Arc<Value>>,
    slots: HashMap<Key, Box<dyn Any>>,
    components: HashMap<Pointer, Box<dyn Any>>,
    linked: HashMap<Pointer, Box<dyn Any>>,
    arena: Arena,
}

fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn lookup<'a>(document: &'a Value, fragment: &str) -> Option<&'a Value> {
    if fragment.is_empty() {
        Some(document)
    } else {
        document.pointer(fragment)
    }
}

fn pointer(kind: &str, name: &str) -> String {
    format!(
        "#/components/{kind}/{}",
        name.replace('~', "~0").replace('/', "~1")
    )
}

impl<'a> Resolver<'a> {
    pub fn new(reader: &'a dyn Reader) -> Self {
        Self {
            reader: Some(reader),
            ..Self::linker()
        }
    }

    /// A resolver that only links component references.
    fn linker() -> Self {
        Self {
            reader: None,
            base: None,
            documents: HashMap::new(),
            slots: HashMap::new(),
            components: HashMap::new(),
            linked: HashMap::new(),
            arena: Arena::default(),
        }
    }

    /// Use an already loaded document for `url`, resolving relative to it.
    pub fn with_document(mut self, url: &Url, document: Value) -> Self {
        let url = without_fragment(url);
        _ = self.documents.insert(url.clone(), Arc::new(document));
        self.base = Some(url);
        self
    }

    fn is_linking(&self) -> bool {
        self.reader.is_none()
    }

    fn document(&mut self, url: &Url) -> Result<Arc<Value>> {
        if let Some(document) = self.documents.get(url) {
            return Ok(document.clone());
        }

        debug!(%url);

        let document = self
            .reader
            .ok_or_else(|| Error::NotFound(url.clone()))?
            .read(url)?;
        let document = match Document::detect(&document) {
            Ok(DocumentKind::Swagger) => swagger::convert(document)?,
            _ => document,
        };

        let document = Arc::new(document);
        _ = self.documents.insert(url.clone(), document.clone());
        Ok(document)
    }

    /// Resolve `reference` found in the current document.
    pub(crate) fn reference<T>(&mut self, reference: &str) -> Result<Target<T>>
    where
        T: Resolve + DeserializeOwned + 'static,
    {
        let (location, fragment) = reference.split_once('#').unwrap_or((reference, ""));

        let base = self
            .base
            .clone()
            .ok_or_else(|| Error::Message(format!("no document to resolve '{reference}' in")))?;

        let url = if location.is_empty() {
            base
        } else {
            base.join(location).map(|url| without_fragment(&url))?
        };

        let key = (TypeId::of::<T>(), url.clone(), fragment.to_owned());

        if let Some(slot) = self
            .slots
            .get(&key)
            .and_then(|slot| slot.downcast_ref::<Slot<T>>())
        {
            return Ok(if slot.get().is_some() {
                Target::Resolved(slot.clone())
            } else {
                debug!(%url, fragment, "back reference");
                Target::Back(Arc::downgrade(slot))
            });
        }

        let slot: Slot<T> = Arc::new(OnceLock::new());
        _ = self.slots.insert(key, Box::new(slot.clone()));

        let document = self.document(&url)?;
        let target = lookup(&document, fragment).ok_or_else(|| Error::UnresolvedReference {
            url: url.clone(),
            fragment: fragment.to_owned(),
        })?;

        let previous = self.base.replace(url.clone());

        let outcome = match target.get("$ref").and_then(Value::as_str) {
            Some(chained) => self.reference::<T>(chained).inspect(|resolved| {
                if let Some(value) = resolved.value() {
                    _ = slot.set(value);
                }
            }),

            None => serde_json::from_value::<T>(target.clone())
                .map_err(Error::from)
                .and_then(|mut value| {
                    value.resolve(self)?;
                    _ = slot.set(Arc::new(value));
                    Ok(Target::Resolved(slot))
                }),
        };

        self.base = previous;
        outcome
    }

    fn register<T>(&mut self, kind: &str, components: &IndexMap<String, Reference<T>>)
    where
        T: 'static,
    {
        for (name, component) in components {
            _ = self.components.insert(
                (TypeId::of::<T>(), pointer(kind, name)),
                Box::new(component.clone()),
            );
        }
    }

    /// Link `reference` to the component it names, if any.
    fn link<T>(&mut self, reference: &str) -> Result<Option<Target<T>>>
    where
        T: Resolve + Clone + Send + Sync + 'static,
    {
        let key = (TypeId::of::<T>(), reference.to_owned());

        if let Some(slot) = self
            .linked
            .get(&key)
            .and_then(|slot| slot.downcast_ref::<Slot<T>>())
        {
            return Ok(Some(if slot.get().is_some() {
                Target::Resolved(slot.clone())
            } else {
                Target::Back(Arc::downgrade(slot))
            }));
        }

        let Some(component) = self
            .components
            .get(&key)
            .and_then(|component| component.downcast_ref::<Reference<T>>())
            .cloned()
        else {
            return Ok(None);
        };

        let slot: Slot<T> = Arc::new(OnceLock::new());
        _ = self.linked.insert(key, Box::new(slot.clone()));
        self.arena.keep(slot.clone());

        match component {
            Reference::Inline(value) => {
                let mut value = Arc::unwrap_or_clone(value);
                value.resolve(self)?;
                _ = slot.set(Arc::new(value));
                Ok(Some(Target::Resolved(slot)))
            }

            Reference::Ref { reference, target } => {
                let target = self.link::<T>(&reference)?.unwrap_or(target);

                if let Some(value) = target.value() {
                    _ = slot.set(value);
                }

                Ok(Some(target))
            }
        }
    }

    /// Replace each inline component by the value its references share.
    fn share<T>(
        &mut self,
        kind: &str,
        components: &mut IndexMap<String, Reference<T>>,
    ) -> Result<()>
    where
        T: Resolve + Clone + Send + Sync + 'static,
    {
        for (name, component) in components.iter_mut() {
            if !matches!(component, Reference::Inline(_)) {
                continue;
            }

            if let Some(value) = self
                .link::<T>(&pointer(kind, name))?
                .and_then(|target| target.value())
            {
                *component = Reference::Inline(value);
            }
        }

        Ok(())
    }
}

/// Resolve every reference in `description`, loaded from `source`.
pub fn parse<T>(
    description: &mut T,
    source: &Url,
    document: Value,
    reader: &dyn Reader,
) -> Result<()>
where
    T: Resolve,
{
    let mut resolver = Resolver::new(reader).with_document(source, document);
    description.resolve(&mut resolver)
}

impl OpenApi {
    /// Link references to `#/components/...` with the components themselves.
    pub(crate) fn link(&mut self) -> Result<()> {
        let mut linker = Resolver::linker();

        if let Some(components) = self.components.as_ref() {
            linker.register("schemas", &components.schemas);
            linker.register("responses", &components.responses);
            linker.register("parameters", &components.parameters);
            linker.register("examples", &components.examples);
            linker.register("requestBodies", &components.request_bodies);
            linker.register("headers", &components.headers);
        }

        self.resolve(&mut linker)?;

        if let Some(components) = self.components.as_mut() {
            linker.share("schemas", &mut components.schemas)?;
            linker.share("responses", &mut components.responses)?;
            linker.share("parameters", &mut components.parameters)?;
            linker.share("examples", &mut components.examples)?;
            linker.share("requestBodies", &mut components.request_bodies)?;
            linker.share("headers", &mut components.headers)?;
        }

        self.arena = linker.arena;
        Ok(())
    }
}

impl AsyncApi {
    /// Link references to `#/components/...` with the components themselves.
    pub(crate) fn link(&mut self) -> Result<()> {
        let mut linker = Resolver::linker();

        if let Some(components) = self.components.as_ref() {
            linker.register("schemas", &components.schemas);
            linker.register("messages", &components.messages);
        }

        self.resolve(&mut linker)?;

        if let Some(components) = self.components.as_mut() {
            linker.share("schemas", &mut components.schemas)?;
            linker.share("messages", &mut components.messages)?;
        }

        self.arena = linker.arena;
        Ok(())
    }
}

impl<T> Resolve for Reference<T>
where
    T: Resolve + Clone + DeserializeOwned + Send + Sync + 'static,
{
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        match self {
            Self::Inline(value) => Arc::make_mut(value).resolve(resolver),

            Self::Ref { reference, target } => {
                if resolver.is_linking() {
                    if let Some(linked) = resolver.link::<T>(reference)? {
                        *target = linked;
                    }
                } else if matches!(target, Target::Unresolved) {
                    *target = resolver
                        .reference::<T>(reference)
                        .map_err(|err| err.context(format!("resolve reference '{reference}'")))?;
                }

                Ok(())
            }
        }
    }
}

impl<T: Resolve> Resolve for Option<T> {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.as_mut()
            .map_or(Ok(()), |value| value.resolve(resolver))
    }
}

fn resolve_map<T: Resolve>(
    map: &mut IndexMap<String, T>,
    kind: &str,
    resolver: &mut Resolver<'_>,
) -> Result<()> {
    for (name, value) in map.iter_mut() {
        value
            .resolve(resolver)
            .map_err(|err| err.context(format!("parse {kind} '{name}'")))?;
    }

    Ok(())
}

fn resolve_list<T: Resolve>(list: &mut [T], kind: &str, resolver: &mut Resolver<'_>) -> Result<()> {
    for (index, value) in list.iter_mut().enumerate() {
        value
            .resolve(resolver)
            .map_err(|err| err.context(format!("parse {kind} {index}")))?;
    }

    Ok(())
}

impl Resolve for OpenApi {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        for (path, item) in self.paths.iter_mut() {
            item.resolve(resolver)
                .map_err(|err| err.context(format!("parse path '{path}'")))?;
        }

        self.components
            .resolve(resolver)
            .map_err(|err| err.context("parse components"))
    }
}

impl Resolve for PathItem {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_list(&mut self.parameters, "parameter", resolver)?;

        for (method, operation) in self.operations.iter_mut() {
            operation
                .resolve(resolver)
                .map_err(|err| err.context(format!("parse operation '{method}'")))?;
        }

        Ok(())
    }
}

impl Resolve for Operation {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_list(&mut self.parameters, "parameter", resolver)?;

        self.request_body
            .resolve(resolver)
            .map_err(|err| err.context("parse request body"))?;

        self.responses.resolve(resolver)
    }
}

impl Resolve for Responses {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        for (status, response) in self.0.iter_mut() {
            response.resolve(resolver).map_err(|err| {
                err.context(format!("parse response '{}'", status_name(*status)))
            })?;
        }

        Ok(())
    }
}

impl Resolve for Parameter {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        if self.location == crate::openapi::Location::Path {
            self.required = true;
        }

        self.schema
            .resolve(resolver)
            .map_err(|err| err.context("parse schema"))?;
        resolve_map(&mut self.examples, "example", resolver)?;
        resolve_map(&mut self.content, "content", resolver)
    }
}

impl Resolve for RequestBody {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_map(&mut self.content, "content", resolver)
    }
}

impl Resolve for MediaType {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.schema
            .resolve(resolver)
            .map_err(|err| err.context("parse schema"))?;
        resolve_map(&mut self.examples, "example", resolver)
    }
}

impl Resolve for Response {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_map(&mut self.headers, "header", resolver)?;
        resolve_map(&mut self.content, "content", resolver)
    }
}

impl Resolve for Header {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.schema
            .resolve(resolver)
            .map_err(|err| err.context("parse schema"))
    }
}

impl Resolve for Example {
    fn resolve(&mut self, _resolver: &mut Resolver<'_>) -> Result<()> {
        Ok(())
    }
}

impl Resolve for Components {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_map(&mut self.schemas, "schema", resolver)?;
        resolve_map(&mut self.responses, "response", resolver)?;
        resolve_map(&mut self.parameters, "parameter", resolver)?;
        resolve_map(&mut self.examples, "example", resolver)?;
        resolve_map(&mut self.request_bodies, "request body", resolver)?;
        resolve_map(&mut self.headers, "header", resolver)
    }
}

impl Resolve for Schema {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.items
            .resolve(resolver)
            .map_err(|err| err.context("parse items"))?;

        resolve_map(&mut self.properties, "property", resolver)?;

        if let Some(AdditionalProperties::Schema(additional)) = self.additional_properties.as_mut()
        {
            additional
                .resolve(resolver)
                .map_err(|err| err.context("parse additional properties"))?;
        }

        resolve_list(&mut self.any_of, "any of", resolver)?;
        resolve_list(&mut self.all_of, "all of", resolver)?;
        resolve_list(&mut self.one_of, "one of", resolver)
    }
}

impl Resolve for AsyncApi {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_map(&mut self.channels, "channel", resolver)?;
        self.components
            .resolve(resolver)
            .map_err(|err| err.context("parse components"))
    }
}

impl Resolve for Channel {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.publish
            .resolve(resolver)
            .map_err(|err| err.context("parse publish"))?;
        self.subscribe
            .resolve(resolver)
            .map_err(|err| err.context("parse subscribe"))
    }
}

impl Resolve for AsyncOperation {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.message
            .resolve(resolver)
            .map_err(|err| err.context("parse message"))
    }
}

impl Resolve for Message {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        self.payload
            .resolve(resolver)
            .map_err(|err| err.context("parse payload"))
    }
}

impl Resolve for AsyncComponents {
    fn resolve(&mut self, resolver: &mut Resolver<'_>) -> Result<()> {
        resolve_map(&mut self.schemas, "schema", resolver)?;
        resolve_map(&mut self.messages, "message", resolver)
    }
}

impl<T> Reference<T> {
    /// Whether both resolve to the same shared value.
    pub fn shares_target(&self, other: &Self) -> bool {
        match (self.slot(), other.slot()) {
            (Some(this), Some(other)) => Arc::ptr_eq(&this, &other),
            _ => false,
        }
    }
}
