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

//! Schema objects shared by OpenAPI and AsyncAPI descriptions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Reference;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Array,
    Boolean,
    Integer,
    Null,
    Number,
    Object,
    String,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Null => "null",
            Self::Number => "number",
            Self::Object => "object",
            Self::String => "string",
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Xml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub attribute: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub wrapped: bool,
    #[serde(rename = "x-cdata", skip_serializing_if = "is_false")]
    pub cdata: bool,
}

/// Either a schema for additional properties, or whether they are allowed.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Reference<Schema>),
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "is_false")]
    pub exclusive_minimum: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub exclusive_maximum: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Reference<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub unique_items: bool,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, Reference<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_properties: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_properties: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<Reference<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<Reference<Schema>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Reference<Schema>>,

    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub write_only: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub deprecated: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml: Option<Xml>,

    #[serde(rename = "x-faker", skip_serializing_if = "Option::is_none")]
    pub faker: Option<String>,
    #[serde(rename = "x-shuffleItems", skip_serializing_if = "is_false")]
    pub shuffle_items: bool,
}

impl Schema {
    pub fn kind(self, kind: SchemaType) -> Self {
        Self {
            kind: Some(kind),
            ..self
        }
    }

    pub fn format(self, format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..self
        }
    }

    pub fn nullable(self, nullable: bool) -> Self {
        Self { nullable, ..self }
    }

    pub fn items(self, items: impl Into<Reference<Schema>>) -> Self {
        Self {
            items: Some(items.into()),
            ..self
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        schema: impl Into<Reference<Schema>>,
    ) -> Self {
        _ = self.properties.insert(name.into(), schema.into());
        self
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn is(&self, kind: SchemaType) -> bool {
        self.kind == Some(kind)
    }

    pub fn is_required(&self, property: &str) -> bool {
        self.required.iter().any(|required| required == property)
    }

    /// The declared name of a property, matched ignoring case.
    pub fn property_named(&self, name: &str) -> Option<(&String, &Reference<Schema>)> {
        self.properties
            .get_key_value(name)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(property, _)| property.eq_ignore_ascii_case(name))
            })
    }
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn properties_keep_declaration_order() -> Result<(), serde_json::Error> {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "properties": {
                "zebra": {"type": "string"},
                "apple": {"type": "integer"},
                "mango": {"$ref": "#/components/schemas/Mango"}
            },
            "additionalProperties": false,
            "x-faker": "name.firstName"
        }))?;

        assert_eq!(
            vec!["zebra", "apple", "mango"],
            schema.properties.keys().map(String::as_str).collect::<Vec<_>>()
        );
        assert_eq!(
            Some(AdditionalProperties::Allowed(false)),
            schema.additional_properties
        );
        assert_eq!(Some("name.firstName"), schema.faker.as_deref());
        Ok(())
    }

    #[test]
    fn additional_properties_schema() -> Result<(), serde_json::Error> {
        let schema: Schema = serde_json::from_value(json!({
            "type": "object",
            "additionalProperties": {"type": "string"}
        }))?;

        let Some(AdditionalProperties::Schema(additional)) = schema.additional_properties else {
            panic!("expected schema")
        };
        assert_eq!(
            Some(SchemaType::String),
            additional.value().and_then(|schema| schema.kind)
        );
        Ok(())
    }

    #[test]
    fn property_named_ignores_case() {
        let schema = Schema::default()
            .kind(SchemaType::Object)
            .property("foo", Schema::default().kind(SchemaType::String));

        assert_eq!(
            Some("foo"),
            schema.property_named("Foo").map(|(name, _)| name.as_str())
        );
        assert!(schema.property_named("bar").is_none());
    }
}
