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

//! Request bodies.
//!
//! The declared media type best matching the `Content-Type` of a request
//! selects the schema used to read and then validate the body.

use std::sync::Arc;

use bytes::Bytes;
use mimic_config::{Reference, Schema, openapi::RequestBody, schema::SchemaType};
use serde_json::{Map, Value};
use tracing::debug;
use url::form_urlencoded;

use crate::{
    Error, Result,
    media::{self, MediaType},
    param::coerce,
    xml,
};

/// Parse and validate a request body against its declaration.
///
/// An empty body is `None` unless the body is required. Without a
/// `Content-Type` the first declared media type is assumed.
pub fn parse(
    declaration: &RequestBody,
    content_type: Option<&str>,
    body: &Bytes,
) -> Result<Option<Value>> {
    if body.is_empty() {
        return if declaration.required {
            Err(Error::BadRequest(String::from("request body is required")))
        } else {
            Ok(None)
        };
    }

    let requested = match content_type {
        Some(content_type) => content_type.parse::<MediaType>()?,
        None => declaration
            .content
            .keys()
            .next()
            .ok_or_else(|| Error::BadRequest(String::from("no request body expected")))?
            .parse::<MediaType>()?,
    };

    let key = media::best_match(declaration.content.keys().map(String::as_str), &requested)
        .ok_or_else(|| Error::BadRequest(format!("unsupported content type: {requested}")))?;
    debug!(%requested, key);

    let schema = declaration
        .content
        .get(key)
        .and_then(|media| media.schema.as_ref())
        .and_then(Reference::value);

    let value = read(&requested, schema.as_deref(), body)?;

    if let Some(schema) = schema.as_deref() {
        mimic_schema::validate(&value, schema)
            .map_err(|err| Error::BadRequest(format!("request body: {err}")))?;
    }

    Ok(Some(value))
}

fn is_object(schema: Option<&Schema>) -> bool {
    schema.is_some_and(|schema| schema.is(SchemaType::Object) || !schema.properties.is_empty())
}

fn read(media: &MediaType, schema: Option<&Schema>, body: &Bytes) -> Result<Value> {
    if media.is_multipart() && is_object(schema) {
        let boundary = media
            .parameter("boundary")
            .ok_or_else(|| Error::BadRequest(String::from("multipart boundary missing")))?;

        multipart(body, boundary, schema)
    } else if media.is_form() {
        Ok(form(body, schema))
    } else if media.is_json() {
        serde_json::from_slice(body)
            .map_err(|err| Error::BadRequest(format!("invalid json: {err}")))
    } else if media.is_xml() {
        xml::from_xml(body, schema).map_err(|err| Error::BadRequest(format!("invalid xml: {err}")))
    } else {
        Ok(Value::String(String::from_utf8_lossy(body).into_owned()))
    }
}

fn property(schema: Option<&Schema>, name: &str) -> Option<Arc<Schema>> {
    schema
        .and_then(|schema| schema.property_named(name))
        .and_then(|(_, property)| property.value())
}

fn is_array(schema: Option<&Schema>) -> bool {
    schema.is_some_and(|schema| schema.is(SchemaType::Array) || schema.items.is_some())
}

/// Add a field, collecting repeats into an array when the property is one.
fn insert(object: &mut Map<String, Value>, name: &str, value: Value, property: Option<&Schema>) {
    if is_array(property) {
        match object
            .entry(name.to_owned())
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            Value::Array(values) => values.push(value),
            existing => *existing = value,
        }
    } else {
        _ = object.insert(name.to_owned(), value);
    }
}

fn items(schema: Option<&Schema>) -> Option<Arc<Schema>> {
    schema
        .and_then(|schema| schema.items.as_ref())
        .and_then(Reference::value)
}

fn form(body: &[u8], schema: Option<&Schema>) -> Value {
    let mut object = Map::new();

    for (name, value) in form_urlencoded::parse(body) {
        let property = property(schema, &name);

        let value = if is_array(property.as_deref()) {
            coerce(&value, items(property.as_deref()).as_deref())
        } else {
            coerce(&value, property.as_deref())
        };

        insert(&mut object, &name, value, property.as_deref());
    }

    Value::Object(object)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn strip_line_end(part: &[u8]) -> &[u8] {
    part.strip_suffix(b"\r\n")
        .or_else(|| part.strip_suffix(b"\n"))
        .unwrap_or(part)
}

/// A part of a multipart body.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Part<'a> {
    name: Option<String>,
    content_type: Option<String>,
    content: &'a [u8],
}

impl<'a> Part<'a> {
    fn new(part: &'a [u8]) -> Result<Self> {
        let part = part
            .strip_prefix(b"\r\n")
            .or_else(|| part.strip_prefix(b"\n"))
            .unwrap_or(part);

        let (headers, content) = find(part, b"\r\n\r\n")
            .map(|at| (&part[..at], &part[at + 4..]))
            .or_else(|| find(part, b"\n\n").map(|at| (&part[..at], &part[at + 2..])))
            .ok_or_else(|| Error::BadRequest(String::from("multipart part without headers")))?;

        let mut this = Self {
            content: strip_line_end(content),
            ..Self::default()
        };

        for header in String::from_utf8_lossy(headers).lines() {
            let Some((name, value)) = header.split_once(':') else {
                continue;
            };

            if name.trim().eq_ignore_ascii_case("content-disposition") {
                this.name = value.split(';').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("name=")
                        .map(|name| name.trim_matches('"').to_owned())
                });
            } else if name.trim().eq_ignore_ascii_case("content-type") {
                this.content_type = Some(value.trim().to_owned());
            }
        }

        Ok(this)
    }

    fn value(&self, schema: Option<&Schema>) -> Value {
        let is_json = self
            .content_type
            .as_deref()
            .and_then(|content_type| content_type.parse::<MediaType>().ok())
            .is_some_and(|media| media.is_json());

        if is_json || is_object(schema) {
            if let Ok(value) = serde_json::from_slice(self.content) {
                return value;
            }
        }

        coerce(&String::from_utf8_lossy(self.content), schema)
    }
}

fn multipart(body: &[u8], boundary: &str, schema: Option<&Schema>) -> Result<Value> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    let mut remaining = find(body, delimiter)
        .map(|at| &body[at + delimiter.len()..])
        .ok_or_else(|| Error::BadRequest(String::from("multipart boundary not found")))?;

    let mut object = Map::new();

    while !remaining.starts_with(b"--") {
        let end = find(remaining, delimiter)
            .ok_or_else(|| Error::BadRequest(String::from("multipart body not terminated")))?;

        let part = Part::new(&remaining[..end])?;

        if let Some(name) = part.name.as_deref() {
            let property = property(schema, name);

            let value = if is_array(property.as_deref()) {
                part.value(items(property.as_deref()).as_deref())
            } else {
                part.value(property.as_deref())
            };

            insert(&mut object, name, value, property.as_deref());
        }

        remaining = &remaining[end + delimiter.len()..];
    }

    Ok(Value::Object(object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_config::openapi::MediaType as Content;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn declaration(required: bool, content: &[(&str, Value)]) -> RequestBody {
        RequestBody {
            required,
            content: content
                .iter()
                .map(|(key, schema)| {
                    (
                        (*key).to_owned(),
                        Content {
                            schema: Some(Reference::Inline(Arc::new(
                                serde_json::from_value(schema.clone()).unwrap(),
                            ))),
                            ..Content::default()
                        },
                    )
                })
                .collect(),
            ..RequestBody::default()
        }
    }

    fn pet() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        })
    }

    #[test]
    fn empty_body() -> Result<()> {
        let optional = declaration(false, &[("application/json", pet())]);
        assert_eq!(None, parse(&optional, None, &Bytes::new())?);

        let required = declaration(true, &[("application/json", pet())]);
        assert!(matches!(
            parse(&required, Some("application/json"), &Bytes::new()),
            Err(Error::BadRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn json() -> Result<()> {
        let declaration = declaration(true, &[("application/json", pet())]);

        assert_eq!(
            Some(json!({"id": 3, "name": "kitty"})),
            parse(
                &declaration,
                Some("application/json; charset=utf-8"),
                &Bytes::from_static(br#"{"id": 3, "name": "kitty"}"#)
            )?
        );

        assert!(matches!(
            parse(
                &declaration,
                Some("application/json"),
                &Bytes::from_static(br#"{"id": 3}"#)
            ),
            Err(Error::BadRequest(_))
        ));

        assert!(matches!(
            parse(
                &declaration,
                Some("application/json"),
                &Bytes::from_static(b"{")
            ),
            Err(Error::BadRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn unmatched_content_type() {
        let declaration = declaration(false, &[("application/json", pet())]);

        assert!(matches!(
            parse(
                &declaration,
                Some("text/plain"),
                &Bytes::from_static(b"kitty")
            ),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn text_passthrough() -> Result<()> {
        let declaration = declaration(false, &[("text/*", json!({"type": "string"}))]);

        assert_eq!(
            Some(json!("hello")),
            parse(&declaration, Some("text/plain"), &Bytes::from_static(b"hello"))?
        );
        Ok(())
    }

    #[test]
    fn form_urlencoded() -> Result<()> {
        let declaration = declaration(false, &[("application/x-www-form-urlencoded", pet())]);

        assert_eq!(
            Some(json!({"id": 7, "name": "Rex Dog", "tags": ["a", "b"]})),
            parse(
                &declaration,
                Some("application/x-www-form-urlencoded"),
                &Bytes::from_static(b"id=7&name=Rex+Dog&tags=a&tags=b")
            )?
        );
        Ok(())
    }

    #[test]
    fn multipart_by_property() -> Result<()> {
        let declaration = declaration(false, &[("multipart/form-data", pet())]);

        let body = concat!(
            "--xyz\r\n",
            "Content-Disposition: form-data; name=\"id\"\r\n",
            "\r\n",
            "12\r\n",
            "--xyz\r\n",
            "Content-Disposition: form-data; name=\"name\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Fido\r\n",
            "--xyz\r\n",
            "Content-Disposition: form-data; name=\"tags\"\r\n",
            "\r\n",
            "small\r\n",
            "--xyz--\r\n",
        );

        assert_eq!(
            Some(json!({"id": 12, "name": "Fido", "tags": ["small"]})),
            parse(
                &declaration,
                Some("multipart/form-data; boundary=xyz"),
                &Bytes::from_static(body.as_bytes())
            )?
        );

        assert!(matches!(
            parse(
                &declaration,
                Some("multipart/form-data"),
                &Bytes::from_static(body.as_bytes())
            ),
            Err(Error::BadRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn xml_by_schema() -> Result<()> {
        let declaration = declaration(false, &[("application/xml", pet())]);

        assert_eq!(
            Some(json!({"id": 1, "name": "Tom", "tags": ["cat"]})),
            parse(
                &declaration,
                Some("application/xml"),
                &Bytes::from_static(b"<Pet><id>1</id><name>Tom</name><tags>cat</tags></Pet>")
            )?
        );
        Ok(())
    }
}
