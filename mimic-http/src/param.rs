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

//! Parameter parsing.
//!
//! Each parameter of an operation is extracted from its location, split
//! according to its `style` and `explode`, coerced to the type of its
//! schema and then validated against that schema.

use std::sync::Arc;

use hyper::http::{HeaderMap, header::COOKIE};
use indexmap::IndexMap;
use mimic_config::{
    Reference, Schema,
    openapi::{Location, Parameter, Style},
    schema::SchemaType,
};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::debug;
use url::form_urlencoded;

use crate::{Error, Result, route::Route};

/// Parsed parameters by location.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Parameters {
    pub path: IndexMap<String, Value>,
    pub query: IndexMap<String, Value>,
    pub header: IndexMap<String, Value>,
    pub cookie: IndexMap<String, Value>,
}

impl Parameters {
    fn insert(&mut self, location: Location, name: String, value: Value) {
        _ = match location {
            Location::Path => self.path.insert(name, value),
            Location::Query => self.query.insert(name, value),
            Location::Header => self.header.insert(name, value),
            Location::Cookie => self.cookie.insert(name, value),
        };
    }
}

/// The query of a request, decoded into pairs.
pub fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|query| {
            form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// The cookies of a request, in order.
pub fn cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| cookie.split_once('='))
        .map(|(name, value)| (name.trim().to_owned(), value.trim().to_owned()))
        .collect()
}

/// The parameters of an operation, operation level parameters replacing
/// path level parameters with the same name and location.
pub fn declared(route: &Route<'_>) -> Result<Vec<Arc<Parameter>>> {
    let mut parameters: Vec<Arc<Parameter>> = Vec::new();

    for reference in route.item.parameters.iter().chain(&route.operation.parameters) {
        let parameter = resolved(reference)?;

        if let Some(existing) = parameters.iter_mut().find(|existing| {
            existing.name == parameter.name && existing.location == parameter.location
        }) {
            *existing = parameter;
        } else {
            parameters.push(parameter);
        }
    }

    Ok(parameters)
}

fn resolved(reference: &Reference<Parameter>) -> Result<Arc<Parameter>> {
    reference.value().ok_or_else(|| {
        Error::Internal(format!(
            "unresolved parameter: {}",
            reference.reference().unwrap_or_default()
        ))
    })
}

/// Parse and validate every parameter of `route`.
pub fn parse(route: &Route<'_>, query: Option<&str>, headers: &HeaderMap) -> Result<Parameters> {
    let query = query_pairs(query);
    let cookies = cookies(headers);

    let mut parameters = Parameters::default();

    for parameter in declared(route)? {
        let schema = schema(&parameter);
        let name = parameter.name.as_str();
        let location = parameter.location;

        let value = match location {
            Location::Path => {
                let segment = route.segment(name).ok_or_else(|| {
                    Error::BadRequest(format!("required path parameter {name} not present"))
                })?;
                path(&parameter, schema.as_deref(), segment)
            }

            Location::Query => self::query(&parameter, schema.as_deref(), &query),

            Location::Header => {
                let values = headers
                    .get_all(name)
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .collect::<Vec<_>>();

                (!values.is_empty())
                    .then(|| simple(&parameter, schema.as_deref(), &values.join(",")))
            }

            Location::Cookie => cookies
                .iter()
                .find(|(cookie, _)| cookie == name)
                .map(|(_, value)| delimited(schema.as_deref(), value, ',')),
        };

        debug!(name, %location, ?value);

        let Some(value) = value else {
            if parameter.required || location == Location::Path {
                return Err(Error::BadRequest(format!(
                    "{location} parameter {name}: required parameter not found"
                )));
            }

            continue;
        };

        if let Some(ref schema) = schema {
            mimic_schema::validate(&value, schema)
                .map_err(|err| Error::BadRequest(format!("{location} parameter {name}: {err}")))?;
        }

        parameters.insert(location, parameter.name.clone(), value);
    }

    Ok(parameters)
}

/// The schema of a parameter, either direct or of its content.
fn schema(parameter: &Parameter) -> Option<Arc<Schema>> {
    parameter.schema.as_ref().and_then(Reference::value).or_else(|| {
        parameter
            .content
            .values()
            .next()
            .and_then(|media| media.schema.as_ref())
            .and_then(Reference::value)
    })
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Shape {
    Primitive,
    Array,
    Object,
}

fn shape(schema: Option<&Schema>) -> Shape {
    match schema {
        Some(schema) if schema.is(SchemaType::Array) || schema.items.is_some() => Shape::Array,
        Some(schema) if schema.is(SchemaType::Object) || !schema.properties.is_empty() => {
            Shape::Object
        }
        _ => Shape::Primitive,
    }
}

fn path(parameter: &Parameter, schema: Option<&Schema>, segment: &str) -> Option<Value> {
    let name = parameter.name.as_str();
    let explode = parameter.effective_explode();

    match parameter.effective_style() {
        Style::Label => {
            let value = segment.strip_prefix('.').unwrap_or(segment);

            match shape(schema) {
                Shape::Primitive => Some(coerce(value, schema)),
                Shape::Array => Some(array(
                    value.split(if explode { '.' } else { ',' }),
                    schema,
                )),
                Shape::Object if explode => Some(assigned(value.split('.'), schema)),
                Shape::Object => Some(paired(value.split(','), schema)),
            }
        }

        Style::Matrix => {
            let prefix = format!(";{name}=");

            match shape(schema) {
                Shape::Primitive => segment
                    .strip_prefix(prefix.as_str())
                    .map(|value| coerce(value, schema)),

                Shape::Array if explode => Some(array(
                    segment
                        .split(';')
                        .filter_map(|part| part.strip_prefix(&prefix[1..])),
                    schema,
                )),

                Shape::Array => segment
                    .strip_prefix(prefix.as_str())
                    .map(|value| array(value.split(','), schema)),

                Shape::Object if explode => Some(assigned(
                    segment.split(';').filter(|part| !part.is_empty()),
                    schema,
                )),

                Shape::Object => segment
                    .strip_prefix(prefix.as_str())
                    .map(|value| paired(value.split(','), schema)),
            }
        }

        _ => Some(simple(parameter, schema, segment)),
    }
}

fn simple(parameter: &Parameter, schema: Option<&Schema>, value: &str) -> Value {
    match shape(schema) {
        Shape::Primitive => coerce(value.trim(), schema),
        Shape::Array => array(value.split(',').map(str::trim), schema),
        Shape::Object if parameter.effective_explode() => assigned(value.split(','), schema),
        Shape::Object => paired(value.split(','), schema),
    }
}

fn delimited(schema: Option<&Schema>, value: &str, delimiter: char) -> Value {
    match shape(schema) {
        Shape::Primitive => coerce(value, schema),
        Shape::Array => array(value.split(delimiter), schema),
        Shape::Object => paired(value.split(delimiter), schema),
    }
}

fn query(
    parameter: &Parameter,
    schema: Option<&Schema>,
    pairs: &[(String, String)],
) -> Option<Value> {
    let name = parameter.name.as_str();
    let explode = parameter.effective_explode();

    let mut named = pairs
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
        .peekable();

    match (parameter.effective_style(), shape(schema)) {
        (Style::DeepObject, _) => {
            let prefix = format!("{name}[");

            let properties = pairs
                .iter()
                .filter_map(|(key, value)| {
                    key.strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_suffix(']'))
                        .map(|property| (property, value.as_str()))
                })
                .collect::<Vec<_>>();

            (!properties.is_empty()).then(|| object(properties, schema))
        }

        (_, Shape::Primitive) => named.next().map(|value| coerce(value, schema)),

        (Style::SpaceDelimited, Shape::Array) if !explode => {
            named.next().map(|value| delimited(schema, value, ' '))
        }

        (Style::PipeDelimited, Shape::Array) if !explode => {
            named.next().map(|value| delimited(schema, value, '|'))
        }

        (_, Shape::Array) if explode => {
            named.peek().is_some().then(|| array(named, schema))
        }

        (_, Shape::Array) => named.next().map(|value| delimited(schema, value, ',')),

        (_, Shape::Object) if explode => {
            let properties = pairs
                .iter()
                .filter(|(key, _)| {
                    schema.is_none_or(|schema| {
                        schema.properties.is_empty() || schema.property_named(key).is_some()
                    })
                })
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect::<Vec<_>>();

            (!properties.is_empty()).then(|| object(properties, schema))
        }

        (_, Shape::Object) => named.next().map(|value| delimited(schema, value, ',')),
    }
}

/// Convert a raw value to the type of `schema`, leaving it a string when
/// it does not convert so that validation reports the mismatch.
pub(crate) fn coerce(value: &str, schema: Option<&Schema>) -> Value {
    let kind = schema.and_then(|schema| schema.kind);

    match kind {
        Some(SchemaType::Integer) => value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(value.to_owned())),

        Some(SchemaType::Number) => value
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or_else(|| Value::String(value.to_owned()), Value::Number),

        Some(SchemaType::Boolean) => match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(value.to_owned()),
        },

        Some(SchemaType::Null) if value.is_empty() || value == "null" => Value::Null,

        _ if value == "null" && schema.is_some_and(|schema| schema.nullable) => Value::Null,

        _ => Value::String(value.to_owned()),
    }
}

fn array<'a>(values: impl Iterator<Item = &'a str>, schema: Option<&Schema>) -> Value {
    let items = schema
        .and_then(|schema| schema.items.as_ref())
        .and_then(Reference::value);

    Value::Array(
        values
            .filter(|value| !value.is_empty())
            .map(|value| coerce(value, items.as_deref()))
            .collect(),
    )
}

fn object<'a>(
    properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    schema: Option<&Schema>,
) -> Value {
    let mut object = Map::new();

    for (name, value) in properties {
        let property = schema
            .and_then(|schema| schema.property_named(name))
            .and_then(|(_, property)| property.value());

        let value = match shape(property.as_deref()) {
            Shape::Array => array(value.split(','), property.as_deref()),
            _ => coerce(value, property.as_deref()),
        };

        _ = object.insert(name.to_owned(), value);
    }

    Value::Object(object)
}

/// `key=value` items, as in `role=admin,firstName=Alex`.
fn assigned<'a>(items: impl Iterator<Item = &'a str>, schema: Option<&Schema>) -> Value {
    object(
        items
            .filter_map(|item| item.split_once('='))
            .collect::<Vec<_>>(),
        schema,
    )
}

/// Alternating keys and values, as in `role,admin,firstName,Alex`.
fn paired<'a>(items: impl Iterator<Item = &'a str>, schema: Option<&Schema>) -> Value {
    let items = items.collect::<Vec<_>>();

    object(
        items
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect::<Vec<_>>(),
        schema,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_config::{
        OpenApi,
        openapi::{Method, Operation, PathItem},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::route::Router;

    fn openapi(path: &str, parameters: Value) -> Arc<OpenApi> {
        let mut item = PathItem::default();
        _ = item.operations.insert(
            Method::Get,
            Operation {
                parameters: serde_json::from_value(parameters).unwrap(),
                ..Operation::default()
            },
        );

        let mut openapi = OpenApi::default();
        _ = openapi.paths.insert(path.into(), item);
        Arc::new(openapi)
    }

    fn parsed(
        template: &str,
        parameters: Value,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Parameters> {
        let router = Router::new(openapi(template, parameters), "");
        let route = router
            .resolve(Method::Get, path)
            .ok_or_else(|| Error::NotFound(path.into()))?;
        parse(&route, query, headers)
    }

    #[test]
    fn path_styles() -> Result<()> {
        let parameters = json!([
            {"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}},
            {"name": "tags", "in": "path", "required": true, "style": "label",
             "schema": {"type": "array", "items": {"type": "string"}}},
            {"name": "point", "in": "path", "required": true, "style": "matrix", "explode": true,
             "schema": {"type": "object", "properties": {"x": {"type": "integer"}, "y": {"type": "integer"}}}}
        ]);

        let parsed = parsed(
            "/item/{id}/{tags}/{point}",
            parameters,
            "/item/42/.red,green/;x=1;y=2",
            None,
            &HeaderMap::new(),
        )?;

        assert_eq!(Some(&json!(42)), parsed.path.get("id"));
        assert_eq!(Some(&json!(["red", "green"])), parsed.path.get("tags"));
        assert_eq!(Some(&json!({"x": 1, "y": 2})), parsed.path.get("point"));
        Ok(())
    }

    #[test]
    fn query_styles() -> Result<()> {
        let parameters = json!([
            {"name": "id", "in": "query", "schema": {"type": "array", "items": {"type": "integer"}}},
            {"name": "csv", "in": "query", "explode": false, "schema": {"type": "array", "items": {"type": "string"}}},
            {"name": "piped", "in": "query", "style": "pipeDelimited", "explode": false,
             "schema": {"type": "array", "items": {"type": "string"}}},
            {"name": "filter", "in": "query", "style": "deepObject", "explode": true,
             "schema": {"type": "object", "properties": {"status": {"type": "string"}, "limit": {"type": "integer"}}}},
            {"name": "flag", "in": "query", "schema": {"type": "boolean"}}
        ]);

        let parsed = parsed(
            "/search",
            parameters,
            "/search",
            Some("id=3&id=4&csv=a,b&piped=x|y&filter[status]=sold&filter[limit]=5&flag=true"),
            &HeaderMap::new(),
        )?;

        assert_eq!(Some(&json!([3, 4])), parsed.query.get("id"));
        assert_eq!(Some(&json!(["a", "b"])), parsed.query.get("csv"));
        assert_eq!(Some(&json!(["x", "y"])), parsed.query.get("piped"));
        assert_eq!(
            Some(&json!({"status": "sold", "limit": 5})),
            parsed.query.get("filter")
        );
        assert_eq!(Some(&json!(true)), parsed.query.get("flag"));
        Ok(())
    }

    #[test]
    fn optional_query_absent() -> Result<()> {
        let parsed = parsed(
            "/foo",
            json!([{"name": "id", "in": "query", "schema": {"type": "string"}}]),
            "/foo",
            None,
            &HeaderMap::new(),
        )?;

        assert!(parsed.query.is_empty());
        Ok(())
    }

    #[test]
    fn required_parameters() {
        let missing = parsed(
            "/foo",
            json!([{"name": "X-Request-Id", "in": "header", "required": true, "schema": {"type": "string"}}]),
            "/foo",
            None,
            &HeaderMap::new(),
        );

        assert_eq!(
            Some("header parameter X-Request-Id: required parameter not found".to_owned()),
            missing.err().map(|err| err.to_string())
        );

        let undeclared = parsed(
            "/foo",
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}]),
            "/foo",
            None,
            &HeaderMap::new(),
        );

        assert_eq!(
            Some("required path parameter id not present".to_owned()),
            undeclared.err().map(|err| err.to_string())
        );
    }

    #[test]
    fn invalid_value() {
        let invalid = parsed(
            "/item/{id}",
            json!([{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}]),
            "/item/abc",
            None,
            &HeaderMap::new(),
        );

        assert!(matches!(
            invalid,
            Err(Error::BadRequest(ref message)) if message.starts_with("path parameter id:")
        ));
    }

    #[test]
    fn headers_and_cookies() -> Result<()> {
        let mut headers = HeaderMap::new();
        _ = headers.insert("x-ids", "1, 2".parse().unwrap());
        _ = headers.insert(COOKIE, "session=abc; theme=dark".parse().unwrap());

        let parsed = parsed(
            "/foo",
            json!([
                {"name": "X-Ids", "in": "header", "schema": {"type": "array", "items": {"type": "integer"}}},
                {"name": "session", "in": "cookie", "required": true, "schema": {"type": "string"}}
            ]),
            "/foo",
            None,
            &headers,
        )?;

        assert_eq!(Some(&json!([1, 2])), parsed.header.get("X-Ids"));
        assert_eq!(Some(&json!("abc")), parsed.cookie.get("session"));
        Ok(())
    }

    #[test]
    fn operation_overrides_path_level() -> Result<()> {
        let mut item = PathItem::default();
        item.parameters = serde_json::from_value(json!([
            {"name": "limit", "in": "query", "required": true, "schema": {"type": "integer"}}
        ]))?;
        _ = item.operations.insert(
            Method::Get,
            Operation {
                parameters: serde_json::from_value(json!([
                    {"name": "limit", "in": "query", "schema": {"type": "integer"}}
                ]))?,
                ..Operation::default()
            },
        );

        let mut openapi = OpenApi::default();
        _ = openapi.paths.insert("/list".into(), item);

        let router = Router::new(Arc::new(openapi), "");
        let route = router
            .resolve(Method::Get, "/list")
            .ok_or_else(|| Error::NotFound("/list".into()))?;

        assert_eq!(1, declared(&route)?.len());
        assert!(parse(&route, None, &HeaderMap::new())?.query.is_empty());
        Ok(())
    }
}
