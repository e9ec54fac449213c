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

//! Rendering response data.

use mimic_config::{Reference, Schema, openapi::Header};
use mimic_schema::Generator;
use serde_json::{Map, Value};

use crate::{Result, media::MediaType, xml};

/// The root element name used when a schema names none.
const ROOT: &str = "root";

/// Rename object properties to their declared names, matched ignoring
/// case, and order them as the schema declares them. Properties the
/// schema does not declare follow in their original order.
pub fn conform(value: &Value, schema: Option<&Schema>) -> Value {
    let Some(schema) = schema else {
        return value.clone();
    };

    match value {
        Value::Object(object) if !schema.properties.is_empty() => {
            let mut conformed = Map::new();
            let mut remaining = object.clone();

            for (name, property) in &schema.properties {
                let found = remaining
                    .keys()
                    .find(|key| *key == name)
                    .or_else(|| {
                        remaining
                            .keys()
                            .find(|key| key.eq_ignore_ascii_case(name))
                    })
                    .cloned();

                if let Some(key) = found {
                    if let Some(value) = remaining.remove(&key) {
                        let property = property.value();
                        _ = conformed.insert(name.clone(), conform(&value, property.as_deref()));
                    }
                }
            }

            conformed.extend(remaining);
            Value::Object(conformed)
        }

        Value::Array(values) => {
            let items = schema.items.as_ref().and_then(Reference::value);

            Value::Array(
                values
                    .iter()
                    .map(|value| conform(value, items.as_deref()))
                    .collect(),
            )
        }

        otherwise => otherwise.clone(),
    }
}

/// The element name for the root of an XML document: the last segment
/// of a schema reference.
pub fn root_name(schema: Option<&Reference<Schema>>) -> &str {
    schema
        .and_then(Reference::reference)
        .and_then(|reference| reference.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or(ROOT)
}

/// Serialize data for `media`, validating it against the schema first.
pub fn marshal(
    data: &Value,
    schema: Option<&Schema>,
    media: &MediaType,
    root: &str,
) -> Result<Vec<u8>> {
    let data = conform(data, schema);

    if let Some(schema) = schema {
        mimic_schema::validate(&data, schema)?;
    }

    if media.is_xml() {
        xml::to_xml(&data, schema, root)
    } else if media.is_json() {
        serde_json::to_vec(&data).map_err(Into::into)
    } else {
        match data {
            Value::String(text) => Ok(text.into_bytes()),
            Value::Null => Ok(Vec::new()),
            otherwise => serde_json::to_vec(&otherwise).map_err(Into::into),
        }
    }
}

/// A value for a declared response header, from its example or
/// generated from its schema.
pub fn header_value(header: &Header, generator: &Generator) -> Result<Option<String>> {
    let value = match (header.example.as_ref(), header.schema.as_ref()) {
        (Some(example), _) => example.clone(),
        (None, Some(schema)) => generator.generate_reference(schema)?,
        (None, None) => return Ok(None),
    };

    Ok(match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        Value::Array(values) => Some(
            values
                .iter()
                .map(|value| match value {
                    Value::String(text) => text.clone(),
                    otherwise => otherwise.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        otherwise => Some(otherwise.to_string()),
    })
}
