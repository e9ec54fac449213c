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

//! JSON schema

use mimic_config::{
    Reference, Schema,
    schema::{AdditionalProperties, SchemaType},
};
use opentelemetry::KeyValue;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::{Error, Result, VALIDATION_ERROR};

const DEFINITIONS: &str = "definitions";

#[derive(Debug, Default)]
struct Converter {
    definitions: Map<String, Value>,
}

fn definition_name(reference: &str) -> String {
    reference
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Converter {
    fn reference(&mut self, schema: &Reference<Schema>) -> Value {
        let Some(reference) = schema.reference() else {
            return schema
                .value()
                .map_or_else(|| json!({}), |schema| self.schema(&schema));
        };

        let name = definition_name(reference);

        if !self.definitions.contains_key(&name) {
            // placeholder, until the target is converted
            _ = self.definitions.insert(name.clone(), Value::Bool(true));

            let converted = schema.value().map_or_else(
                || {
                    warn!(reference, "unresolved");
                    json!({})
                },
                |schema| self.schema(&schema),
            );

            _ = self.definitions.insert(name.clone(), converted);
        }

        json!({"$ref": format!("#/{DEFINITIONS}/{name}")})
    }

    fn schema(&mut self, schema: &Schema) -> Value {
        let mut converted = Map::new();

        if let Some(kind) = schema.kind {
            if kind == SchemaType::Integer && schema.format.as_deref() == Some("int32") {
                _ = converted.insert("minimum".into(), json!(i32::MIN));
                _ = converted.insert("maximum".into(), json!(i32::MAX));
            }

            _ = converted.insert(
                "type".into(),
                if schema.nullable {
                    json!([kind.as_str(), "null"])
                } else {
                    json!(kind.as_str())
                },
            );
        }

        if let Some(format) = schema.format.as_deref() {
            _ = converted.insert("format".into(), json!(format));
        }

        if let Some(pattern) = schema.pattern.as_deref() {
            _ = converted.insert("pattern".into(), json!(pattern));
        }

        if let Some(enumeration) = schema.enumeration.as_ref() {
            let mut enumeration = enumeration.clone();

            if schema.nullable && !enumeration.contains(&Value::Null) {
                enumeration.push(Value::Null);
            }

            _ = converted.insert("enum".into(), Value::Array(enumeration));
        }

        if let Some(minimum) = schema.minimum {
            _ = converted.insert(
                if schema.exclusive_minimum {
                    "exclusiveMinimum"
                } else {
                    "minimum"
                }
                .into(),
                json!(minimum),
            );
        }

        if let Some(maximum) = schema.maximum {
            _ = converted.insert(
                if schema.exclusive_maximum {
                    "exclusiveMaximum"
                } else {
                    "maximum"
                }
                .into(),
                json!(maximum),
            );
        }

        let counts = [
            ("multipleOf", schema.multiple_of.map(Value::from)),
            ("minLength", schema.min_length.map(Value::from)),
            ("maxLength", schema.max_length.map(Value::from)),
            ("minItems", schema.min_items.map(Value::from)),
            ("maxItems", schema.max_items.map(Value::from)),
            ("minProperties", schema.min_properties.map(Value::from)),
            ("maxProperties", schema.max_properties.map(Value::from)),
        ];

        for (keyword, value) in counts {
            if let Some(value) = value {
                _ = converted.insert(keyword.into(), value);
            }
        }

        if schema.unique_items {
            _ = converted.insert("uniqueItems".into(), Value::Bool(true));
        }

        if let Some(items) = schema.items.as_ref() {
            let items = self.reference(items);
            _ = converted.insert("items".into(), items);
        }

        if !schema.properties.is_empty() {
            let mut properties = Map::new();

            for (name, property) in &schema.properties {
                _ = properties.insert(name.clone(), self.reference(property));
            }

            _ = converted.insert("properties".into(), Value::Object(properties));
        }

        if !schema.required.is_empty() {
            _ = converted.insert("required".into(), json!(schema.required));
        }

        match schema.additional_properties.as_ref() {
            Some(AdditionalProperties::Allowed(allowed)) => {
                _ = converted.insert("additionalProperties".into(), Value::Bool(*allowed));
            }

            Some(AdditionalProperties::Schema(additional)) => {
                let additional = self.reference(additional);
                _ = converted.insert("additionalProperties".into(), additional);
            }

            None => (),
        }

        Value::Object(converted)
    }
}

/// Convert an OpenAPI schema into a JSON schema.
///
/// Referenced schemas become `definitions` of the root, so that recursive
/// schemas convert to recursive references.
pub fn to_json_schema(schema: &Schema) -> Value {
    let mut converter = Converter::default();
    let mut converted = converter.schema(schema);

    if let Value::Object(ref mut object) = converted {
        if !converter.definitions.is_empty() {
            _ = object.insert(DEFINITIONS.into(), Value::Object(converter.definitions));
        }
    }

    converted
}

/// Validate `instance` against `schema`.
pub fn validate(instance: &Value, schema: &Schema) -> Result<()> {
    let converted = to_json_schema(schema);
    debug!(%converted, %instance);

    let validator = jsonschema::draft7::new(&converted)
        .map_err(|err| Error::InvalidSchema(err.to_string()))?;

    validator
        .validate(instance)
        .map_err(|err| Error::Invalid {
            location: err.instance_path.to_string(),
            message: err.to_string(),
        })
        .inspect_err(|err| {
            warn!(?err, %instance);
            VALIDATION_ERROR.add(1, &[KeyValue::new("kind", "value")]);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema(value: Value) -> Schema {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn nullable_and_exclusive_bounds() {
        let converted = to_json_schema(&schema(json!({
            "type": "integer",
            "nullable": true,
            "minimum": 1,
            "exclusiveMinimum": true,
            "maximum": 10
        })));

        assert_eq!(
            json!({
                "type": ["integer", "null"],
                "exclusiveMinimum": 1.0,
                "maximum": 10.0
            }),
            converted
        );
    }

    #[test]
    fn nullable_enum_allows_null() -> Result<()> {
        let colour = schema(json!({"type": "string", "enum": ["red", "green"], "nullable": true}));

        validate(&json!("red"), &colour)?;
        validate(&Value::Null, &colour)?;
        assert!(validate(&json!("blue"), &colour).is_err());
        Ok(())
    }

    #[test]
    fn object_properties() -> Result<()> {
        let pet = schema(json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "tag": {"type": "string", "nullable": true},
                "age": {"type": "integer", "format": "int32", "minimum": 0}
            },
            "additionalProperties": false
        }));

        validate(&json!({"name": "rex", "tag": null, "age": 3}), &pet)?;

        let Err(Error::Invalid { location, .. }) =
            validate(&json!({"name": "rex", "age": -1}), &pet)
        else {
            panic!("expected invalid")
        };
        assert_eq!("/age", location);

        assert!(validate(&json!({"tag": "x"}), &pet).is_err());
        assert!(validate(&json!({"name": "rex", "colour": "red"}), &pet).is_err());
        assert!(validate(&json!({"name": "rex", "age": 4_294_967_296_i64}), &pet).is_err());
        Ok(())
    }

    #[test]
    fn formats_are_asserted() -> Result<()> {
        let email = schema(json!({"type": "string", "format": "email"}));
        validate(&json!("alice@example.com"), &email)?;
        assert!(validate(&json!("alice"), &email).is_err());

        let date = schema(json!({"type": "string", "format": "date"}));
        validate(&json!("2024-02-29"), &date)?;
        assert!(validate(&json!("29/02/2024"), &date).is_err());
        Ok(())
    }

    #[test]
    fn referenced_schemas_become_definitions() {
        let mut list = schema(json!({"type": "array"}));
        list.items = Some(Reference::to("#/components/schemas/Pet"));

        assert_eq!(
            json!({
                "type": "array",
                "items": {"$ref": "#/definitions/__components_schemas_Pet"},
                "definitions": {"__components_schemas_Pet": {}}
            }),
            to_json_schema(&list)
        );
    }
}
