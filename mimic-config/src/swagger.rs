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

//! Normalisation of Swagger 2 documents into OpenAPI 3.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::{Error, Result};

const REWRITES: [(&str, &str); 3] = [
    ("#/definitions/", "#/components/schemas/"),
    ("#/responses/", "#/components/responses/"),
    ("#/parameters/", "#/components/parameters/"),
];

const SCHEMA_KEYWORDS: [&str; 17] = [
    "type",
    "format",
    "items",
    "enum",
    "default",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minLength",
    "maxLength",
    "pattern",
    "minItems",
    "maxItems",
    "uniqueItems",
    "multipleOf",
    "x-faker",
];

const METHODS: [&str; 7] = ["get", "put", "post", "delete", "options", "head", "patch"];

/// Rewrite `$ref` targets into their OpenAPI 3 locations.
pub fn rewrite_reference(reference: &str) -> String {
    for (from, to) in REWRITES {
        if let Some(position) = reference.find(from) {
            return format!(
                "{}{to}{}",
                &reference[..position],
                &reference[position + from.len()..]
            );
        }
    }

    reference.to_owned()
}

fn rewrite_references(value: &mut Value) {
    match value {
        Value::Object(object) => {
            for (key, value) in object.iter_mut() {
                if key == "$ref" {
                    if let Value::String(reference) = value {
                        *reference = rewrite_reference(reference);
                    }
                } else {
                    rewrite_references(value);
                }
            }
        }

        Value::Array(array) => array.iter_mut().for_each(rewrite_references),

        _ => (),
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(|item| item.as_str().map(ToOwned::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

fn servers(swagger: &Map<String, Value>) -> Vec<Value> {
    let Some(host) = swagger.get("host").and_then(Value::as_str) else {
        return swagger
            .get("basePath")
            .and_then(Value::as_str)
            .map(|base_path| vec![json!({"url": base_path})])
            .unwrap_or_default();
    };

    let base_path = swagger
        .get("basePath")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut schemes = strings(swagger.get("schemes"));
    if schemes.is_empty() {
        schemes.push("http".into());
    }

    schemes
        .into_iter()
        .map(|scheme| json!({"url": format!("{scheme}://{host}{base_path}")}))
        .collect()
}

// a non-body parameter keeps its schema keywords under `schema`
fn parameter(parameter: &Value) -> Value {
    let Some(object) = parameter.as_object() else {
        return parameter.clone();
    };

    if object.contains_key("$ref") {
        return parameter.clone();
    }

    let mut converted = Map::new();
    let mut schema = Map::new();

    for (key, value) in object {
        if SCHEMA_KEYWORDS.contains(&key.as_str()) {
            _ = schema.insert(key.clone(), value.clone());
        } else if key == "collectionFormat" {
            let (style, explode) = match value.as_str() {
                Some("ssv") => ("spaceDelimited", false),
                Some("pipes") => ("pipeDelimited", false),
                Some("multi") => ("form", true),
                _ => ("form", false),
            };
            _ = converted.insert("style".into(), json!(style));
            _ = converted.insert("explode".into(), json!(explode));
        } else if key != "allowEmptyValue" {
            _ = converted.insert(key.clone(), value.clone());
        }
    }

    if !schema.is_empty() {
        _ = converted.insert("schema".into(), Value::Object(schema));
    }

    Value::Object(converted)
}

fn media_types(declared: &[String], fallback: &[String]) -> Vec<String> {
    if !declared.is_empty() {
        declared.to_vec()
    } else if !fallback.is_empty() {
        fallback.to_vec()
    } else {
        vec!["application/json".into()]
    }
}

fn response(response: &Value, produces: &[String]) -> Value {
    let Some(object) = response.as_object() else {
        return response.clone();
    };

    if object.contains_key("$ref") {
        return response.clone();
    }

    let mut converted = Map::new();

    for (key, value) in object {
        match key.as_str() {
            "schema" => {
                let content = produces
                    .iter()
                    .map(|media_type| (media_type.clone(), json!({"schema": value})))
                    .collect::<Map<_, _>>();
                _ = converted.insert("content".into(), Value::Object(content));
            }

            "headers" => {
                let headers = value
                    .as_object()
                    .map(|headers| {
                        headers
                            .iter()
                            .map(|(name, header)| (name.clone(), header_schema(header)))
                            .collect::<Map<_, _>>()
                    })
                    .unwrap_or_default();
                _ = converted.insert("headers".into(), Value::Object(headers));
            }

            "examples" => (),

            _ => {
                _ = converted.insert(key.clone(), value.clone());
            }
        }
    }

    if !converted.contains_key("description") {
        _ = converted.insert("description".into(), json!(""));
    }

    Value::Object(converted)
}

fn header_schema(header: &Value) -> Value {
    let Some(object) = header.as_object() else {
        return header.clone();
    };

    let mut converted = Map::new();
    let mut schema = Map::new();

    for (key, value) in object {
        if SCHEMA_KEYWORDS.contains(&key.as_str()) {
            _ = schema.insert(key.clone(), value.clone());
        } else {
            _ = converted.insert(key.clone(), value.clone());
        }
    }

    _ = converted.insert("schema".into(), Value::Object(schema));
    Value::Object(converted)
}

fn operation(
    operation: &Map<String, Value>,
    consumes: &[String],
    produces: &[String],
    shared: &[Value],
) -> Value {
    let consumes = media_types(&strings(operation.get("consumes")), consumes);
    let produces = media_types(&strings(operation.get("produces")), produces);

    let mut converted = Map::new();
    let mut parameters = Vec::new();
    let mut form = Map::new();
    let mut form_required = Vec::new();

    let declared = operation
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for candidate in shared.iter().chain(declared.iter()) {
        match candidate.get("in").and_then(Value::as_str) {
            Some("body") => {
                let schema = candidate.get("schema").cloned().unwrap_or(json!({}));
                let content = consumes
                    .iter()
                    .map(|media_type| (media_type.clone(), json!({"schema": schema})))
                    .collect::<Map<_, _>>();

                let mut body = Map::new();
                _ = body.insert("content".into(), Value::Object(content));

                if let Some(required) = candidate.get("required") {
                    _ = body.insert("required".into(), required.clone());
                }

                if let Some(description) = candidate.get("description") {
                    _ = body.insert("description".into(), description.clone());
                }

                _ = converted.insert("requestBody".into(), Value::Object(body));
            }

            Some("formData") => {
                if let Some(name) = candidate.get("name").and_then(Value::as_str) {
                    let property = parameter(candidate)
                        .get("schema")
                        .cloned()
                        .unwrap_or(json!({"type": "string"}));
                    let property =
                        if candidate.get("type").and_then(Value::as_str) == Some("file") {
                            json!({"type": "string", "format": "binary"})
                        } else {
                            property
                        };

                    _ = form.insert(name.to_owned(), property);

                    if candidate.get("required").and_then(Value::as_bool) == Some(true) {
                        form_required.push(json!(name));
                    }
                }
            }

            _ => parameters.push(parameter(candidate)),
        }
    }

    if !form.is_empty() {
        let media_type = if consumes.iter().any(|media_type| media_type == "multipart/form-data") {
            "multipart/form-data"
        } else {
            "application/x-www-form-urlencoded"
        };

        let mut schema = Map::new();
        _ = schema.insert("type".into(), json!("object"));
        _ = schema.insert("properties".into(), Value::Object(form));
        if !form_required.is_empty() {
            _ = schema.insert("required".into(), Value::Array(form_required));
        }

        _ = converted.insert(
            "requestBody".into(),
            json!({"content": {media_type: {"schema": schema}}}),
        );
    }

    for (key, value) in operation {
        match key.as_str() {
            "consumes" | "produces" | "parameters" | "schemes" | "security" => (),

            "responses" => {
                let responses = value
                    .as_object()
                    .map(|responses| {
                        responses
                            .iter()
                            .map(|(status, item)| (status.clone(), response(item, &produces)))
                            .collect::<Map<_, _>>()
                    })
                    .unwrap_or_default();
                _ = converted.insert("responses".into(), Value::Object(responses));
            }

            _ => {
                _ = converted.insert(key.clone(), value.clone());
            }
        }
    }

    if !parameters.is_empty() {
        _ = converted.insert("parameters".into(), Value::Array(parameters));
    }

    Value::Object(converted)
}

/// Convert a Swagger 2 document into an OpenAPI 3 document.
pub fn convert(swagger: Value) -> Result<Value> {
    let Value::Object(swagger) = swagger else {
        return Err(Error::Message("swagger document is not an object".into()));
    };

    debug!(version = ?swagger.get("swagger"));

    let consumes = strings(swagger.get("consumes"));
    let produces = strings(swagger.get("produces"));

    let mut openapi = Map::new();
    _ = openapi.insert("openapi".into(), json!("3.0.0"));

    if let Some(info) = swagger.get("info") {
        _ = openapi.insert("info".into(), info.clone());
    }

    let servers = servers(&swagger);
    if !servers.is_empty() {
        _ = openapi.insert("servers".into(), Value::Array(servers));
    }

    let mut paths = Map::new();
    for (path, item) in swagger
        .get("paths")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
    {
        let Some(item) = item.as_object() else {
            continue;
        };

        // body and form parameters move into each operation
        let shared = item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let (moved, kept): (Vec<_>, Vec<_>) = shared.into_iter().partition(|candidate| {
            matches!(
                candidate.get("in").and_then(Value::as_str),
                Some("body" | "formData")
            )
        });

        let mut converted = Map::new();

        for (key, value) in item {
            if METHODS.contains(&key.as_str()) {
                if let Some(candidate) = value.as_object() {
                    _ = converted.insert(
                        key.clone(),
                        operation(candidate, &consumes, &produces, &moved),
                    );
                }
            } else if key == "parameters" {
                if !kept.is_empty() {
                    _ = converted.insert(
                        key.clone(),
                        Value::Array(kept.iter().map(parameter).collect()),
                    );
                }
            } else {
                _ = converted.insert(key.clone(), value.clone());
            }
        }

        _ = paths.insert(path.clone(), Value::Object(converted));
    }
    _ = openapi.insert("paths".into(), Value::Object(paths));

    let mut components = Map::new();

    if let Some(definitions) = swagger.get("definitions") {
        _ = components.insert("schemas".into(), definitions.clone());
    }

    if let Some(parameters) = swagger.get("parameters").and_then(Value::as_object) {
        _ = components.insert(
            "parameters".into(),
            Value::Object(
                parameters
                    .iter()
                    .filter(|(_, candidate)| {
                        !matches!(
                            candidate.get("in").and_then(Value::as_str),
                            Some("body" | "formData")
                        )
                    })
                    .map(|(name, candidate)| (name.clone(), parameter(candidate)))
                    .collect(),
            ),
        );
    }

    if let Some(responses) = swagger.get("responses").and_then(Value::as_object) {
        _ = components.insert(
            "responses".into(),
            Value::Object(
                responses
                    .iter()
                    .map(|(name, item)| {
                        (name.clone(), response(item, &media_types(&produces, &[])))
                    })
                    .collect(),
            ),
        );
    }

    if !components.is_empty() {
        _ = openapi.insert("components".into(), Value::Object(components));
    }

    if let Some(tags) = swagger.get("tags") {
        _ = openapi.insert("tags".into(), tags.clone());
    }

    let mut openapi = Value::Object(openapi);
    rewrite_references(&mut openapi);
    Ok(openapi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn references() {
        assert_eq!(
            "#/components/schemas/Pet",
            rewrite_reference("#/definitions/Pet")
        );
        assert_eq!(
            "common.json#/components/responses/NotFound",
            rewrite_reference("common.json#/responses/NotFound")
        );
        assert_eq!(
            "#/components/parameters/limit",
            rewrite_reference("#/parameters/limit")
        );
        assert_eq!("#/paths/~1pets", rewrite_reference("#/paths/~1pets"));
    }

    #[test]
    fn petstore() -> Result<()> {
        let swagger = json!({
            "swagger": "2.0",
            "info": {"title": "Petstore", "version": "1.0"},
            "host": "petstore.swagger.io",
            "basePath": "/v2",
            "schemes": ["https", "http"],
            "consumes": ["application/json"],
            "produces": ["application/json", "application/xml"],
            "paths": {
                "/pet": {
                    "post": {
                        "operationId": "addPet",
                        "parameters": [{
                            "in": "body",
                            "name": "body",
                            "required": true,
                            "schema": {"$ref": "#/definitions/Pet"}
                        }],
                        "responses": {"405": {"description": "Invalid input"}}
                    }
                },
                "/pet/{petId}": {
                    "get": {
                        "parameters": [{
                            "name": "petId",
                            "in": "path",
                            "required": true,
                            "type": "integer",
                            "format": "int64"
                        }],
                        "responses": {
                            "200": {
                                "description": "ok",
                                "schema": {"$ref": "#/definitions/Pet"},
                                "headers": {"X-Rate-Limit": {"type": "integer"}}
                            }
                        }
                    },
                    "post": {
                        "consumes": ["application/x-www-form-urlencoded"],
                        "parameters": [
                            {"name": "name", "in": "formData", "type": "string", "required": true},
                            {"name": "status", "in": "formData", "type": "string"}
                        ],
                        "responses": {"405": {"description": "Invalid input"}}
                    }
                }
            },
            "definitions": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}}
        });

        let openapi = convert(swagger)?;

        assert_eq!(
            json!([
                {"url": "https://petstore.swagger.io/v2"},
                {"url": "http://petstore.swagger.io/v2"}
            ]),
            openapi["servers"]
        );

        assert_eq!(
            json!({
                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}},
                "required": true
            }),
            openapi["paths"]["/pet"]["post"]["requestBody"]
        );

        assert_eq!(
            json!({"type": "integer", "format": "int64"}),
            openapi["paths"]["/pet/{petId}"]["get"]["parameters"][0]["schema"]
        );

        assert_eq!(
            json!({
                "application/json": {"schema": {"$ref": "#/components/schemas/Pet"}},
                "application/xml": {"schema": {"$ref": "#/components/schemas/Pet"}}
            }),
            openapi["paths"]["/pet/{petId}"]["get"]["responses"]["200"]["content"]
        );

        assert_eq!(
            json!({"schema": {"type": "integer"}}),
            openapi["paths"]["/pet/{petId}"]["get"]["responses"]["200"]["headers"]["X-Rate-Limit"]
        );

        assert_eq!(
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "status": {"type": "string"}},
                "required": ["name"]
            }),
            openapi["paths"]["/pet/{petId}"]["post"]["requestBody"]["content"]
                ["application/x-www-form-urlencoded"]["schema"]
        );

        assert!(openapi["components"]["schemas"]["Pet"].is_object());
        Ok(())
    }
}
