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

use std::{io::Write, sync::Arc};

use common::init_tracing;
use mimic_config::{
    Document, Error, FileReader, MemoryReader, Reference, Result,
    openapi::{Location, Method, OpenApi},
    patch, reader,
    schema::{Schema, SchemaType},
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;

pub mod common;

fn openapi(document: &Document) -> Result<Arc<OpenApi>> {
    match document {
        Document::OpenApi(openapi) => Ok(openapi.clone()),
        otherwise => Err(Error::Message(format!("{otherwise:?}"))),
    }
}

fn component(openapi: &OpenApi, name: &str) -> Option<Arc<Schema>> {
    openapi
        .components
        .as_ref()
        .and_then(|components| components.schemas.get(name))
        .and_then(Reference::value)
}

fn response_schema(openapi: &OpenApi, path: &str, status: u16) -> Option<Reference<Schema>> {
    openapi.paths[path]
        .operation(Method::Get)
        .and_then(|operation| operation.responses.get(status))
        .and_then(Reference::value)
        .and_then(|response| {
            response
                .content
                .get("application/json")
                .and_then(|media_type| media_type.schema.clone())
        })
}

fn petstore() -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Petstore", "version": "1.0"},
        "paths": {
            "/pets": {
                "get": {
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pets"}}}
                        }
                    }
                }
            },
            "/pets/{id}": {
                "parameters": [{"$ref": "common.json#/components/parameters/id"}],
                "get": {
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Pet"}}}
                        },
                        "default": {"$ref": "common.json#/components/responses/Error"}
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Pet": {
                    "type": "object",
                    "required": ["id"],
                    "properties": {
                        "id": {"type": "integer", "format": "int64"},
                        "name": {"type": "string"},
                        "owner": {"$ref": "people.json"}
                    }
                },
                "Pets": {"type": "array", "items": {"$ref": "#/components/schemas/Pet"}}
            }
        }
    })
}

fn common() -> Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Common"},
        "components": {
            "parameters": {
                "id": {"name": "id", "in": "path", "schema": {"type": "integer"}}
            },
            "responses": {
                "Error": {
                    "description": "error",
                    "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Error"}}}
                }
            },
            "schemas": {
                "Error": {"type": "object", "properties": {"message": {"type": "string"}}}
            }
        }
    })
}

fn documents(base: &Url) -> Result<MemoryReader> {
    Ok(MemoryReader::new()
        .with(base.join("petstore.json")?, petstore())
        .with(base.join("common.json")?, common())
        .with(
            base.join("people.json")?,
            json!({"type": "object", "properties": {"email": {"type": "string", "format": "email"}}}),
        ))
}

#[test]
fn local_references_share_their_target() -> Result<()> {
    let _guard = init_tracing()?;

    let base = Url::parse("file:///specs/")?;
    let source = base.join("petstore.json")?;
    let openapi = openapi(&Document::load(&source, &documents(&base)?)?)?;

    let pets = response_schema(&openapi, "/pets", 200)
        .and_then(|schema| schema.value())
        .ok_or(Error::Message("pets".into()))?;
    assert_eq!(Some(SchemaType::Array), pets.kind);

    let item = pets.items.clone().ok_or(Error::Message("items".into()))?;
    let pet = response_schema(&openapi, "/pets/{id}", 200).ok_or(Error::Message("pet".into()))?;

    assert!(item.shares_target(&pet));
    assert!(Arc::ptr_eq(
        &item.value().ok_or(Error::Message("item".into()))?,
        &pet.value().ok_or(Error::Message("pet".into()))?
    ));

    // the very schema declared under components
    assert!(Arc::ptr_eq(
        &component(&openapi, "Pet").ok_or(Error::Message("component".into()))?,
        &pet.value().ok_or(Error::Message("pet".into()))?
    ));
    Ok(())
}

#[test]
fn cross_document_references() -> Result<()> {
    let _guard = init_tracing()?;

    let base = Url::parse("file:///specs/")?;
    let source = base.join("petstore.json")?;
    let openapi = openapi(&Document::load(&source, &documents(&base)?)?)?;

    let item = &openapi.paths["/pets/{id}"];
    let id = item.parameters[0]
        .value()
        .ok_or(Error::Message("id".into()))?;
    assert_eq!("id", id.name);
    assert_eq!(Location::Path, id.location);
    assert!(id.required);

    // a local reference within the other document resolves in that document
    let error = item
        .operation(Method::Get)
        .and_then(|operation| operation.responses.for_status(500))
        .and_then(Reference::value)
        .ok_or(Error::Message("error".into()))?;
    assert_eq!("error", error.description);

    let message = error.content["application/json"]
        .schema
        .as_ref()
        .and_then(Reference::value)
        .and_then(|schema| schema.properties.get("message").and_then(Reference::value))
        .ok_or(Error::Message("message".into()))?;
    assert_eq!(Some(SchemaType::String), message.kind);

    // a reference without fragment binds the whole document
    let owner = component(&openapi, "Pet")
        .and_then(|pet| pet.properties.get("owner").and_then(Reference::value))
        .ok_or(Error::Message("owner".into()))?;
    assert_eq!(
        Some("email"),
        owner
            .properties
            .get("email")
            .and_then(Reference::value)
            .and_then(|email| email.format.clone())
            .as_deref()
    );

    Ok(())
}

#[test]
fn recursive_schema_terminates() -> Result<()> {
    let _guard = init_tracing()?;

    let source = Url::parse("file:///specs/tree.json")?;
    let document = json!({
        "openapi": "3.0.0",
        "info": {"title": "Tree"},
        "paths": {
            "/tree": {
                "get": {
                    "responses": {
                        "200": {
                            "description": "ok",
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/Node"}}}
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": {"type": "string"},
                        "children": {"type": "array", "items": {"$ref": "#/components/schemas/Node"}}
                    }
                }
            }
        }
    });

    let openapi = openapi(&Document::parse(&source, document, &MemoryReader::new())?)?;
    let node = component(&openapi, "Node").ok_or(Error::Message("node".into()))?;

    let tree = response_schema(&openapi, "/tree", 200).ok_or(Error::Message("tree".into()))?;
    assert!(!tree.is_back_reference());
    assert!(Arc::ptr_eq(
        &node,
        &tree.value().ok_or(Error::Message("tree".into()))?
    ));

    // within the component, the reference to itself is a back reference
    let items = node.properties["children"]
        .value()
        .and_then(|children| children.items.clone())
        .ok_or(Error::Message("items".into()))?;

    assert!(items.is_back_reference());
    assert!(Arc::ptr_eq(
        &node,
        &items.value().ok_or(Error::Message("back".into()))?
    ));
    Ok(())
}

#[test]
fn unresolvable_reference_names_its_location() -> Result<()> {
    let _guard = init_tracing()?;

    let source = Url::parse("file:///specs/broken.json")?;
    let document = json!({
        "openapi": "3.0.0",
        "info": {"title": "Broken"},
        "paths": {
            "/foo": {
                "get": {
                    "responses": {"200": {"$ref": "#/components/responses/Missing"}}
                }
            }
        }
    });

    let error = Document::parse(&source, document, &MemoryReader::new())
        .err()
        .ok_or(Error::Message("expected failure".into()))?;

    assert_eq!(
        "parse path '/foo' failed: parse operation 'GET' failed: parse response '200' failed: \
         resolve reference '#/components/responses/Missing' failed: \
         unable to resolve '/components/responses/Missing' in file:///specs/broken.json",
        error.to_string()
    );
    Ok(())
}

#[test]
fn missing_title_and_unsupported_version() -> Result<()> {
    let _guard = init_tracing()?;

    let source = Url::parse("file:///specs/a.json")?;

    assert!(matches!(
        Document::parse(
            &source,
            json!({"openapi": "3.0.0", "info": {"title": ""}}),
            &MemoryReader::new()
        ),
        Err(Error::MissingTitle)
    ));

    assert!(
        Document::parse(
            &source,
            json!({"openapi": "3.0.0", "info": {"version": "1"}}),
            &MemoryReader::new()
        )
        .is_err()
    );

    assert!(matches!(
        Document::parse(
            &source,
            json!({"openapi": "2.5", "info": {"title": "a"}}),
            &MemoryReader::new()
        ),
        Err(Error::UnsupportedVersion(_))
    ));

    // an empty description is fine
    let empty = Document::parse(
        &source,
        json!({"openapi": "3.0.0", "info": {"title": "empty"}}),
        &MemoryReader::new(),
    )?;
    assert_eq!("empty", empty.title());
    Ok(())
}

#[test]
fn swagger_from_yaml_file() -> Result<()> {
    let _guard = init_tracing()?;

    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile()?;
    write!(
        file,
        r##"
swagger: "2.0"
info:
  title: Petstore
  version: "1.0"
host: localhost:8080
basePath: /v2
produces:
  - application/json
paths:
  /pet/{{petId}}:
    get:
      parameters:
        - name: petId
          in: path
          required: true
          type: integer
      responses:
        200:
          description: ok
          schema:
            $ref: "#/definitions/Pet"
definitions:
  Pet:
    type: object
    properties:
      name:
        type: string
"##
    )?;

    let source = reader::file_url(file.path())?;
    let openapi = openapi(&Document::load(&source, &FileReader)?)?;

    assert_eq!("http://localhost:8080/v2", openapi.servers[0].url);

    let pet = response_schema(&openapi, "/pet/{petId}", 200)
        .ok_or(Error::Message("pet".into()))?;
    assert_eq!(Some("#/components/schemas/Pet"), pet.reference());
    assert_eq!(component(&openapi, "Pet"), pet.value());
    Ok(())
}

#[test]
fn patch_of_resolved_description_with_itself() -> Result<()> {
    let _guard = init_tracing()?;

    let base = Url::parse("file:///specs/")?;
    let source = base.join("petstore.json")?;
    let openapi = openapi(&Document::load(&source, &documents(&base)?)?)?;

    let patched = patch(openapi.as_ref().clone(), [openapi.as_ref().clone()]);
    assert_eq!(openapi.as_ref(), &patched);
    Ok(())
}

#[test]
fn patched_component_reaches_resolved_references() -> Result<()> {
    let _guard = init_tracing()?;

    let base = Url::parse("file:///specs/")?;
    let source = base.join("petstore.json")?;
    let reader = documents(&base)?;
    let primary = openapi(&Document::load(&source, &reader)?)?;

    let addition = openapi(&Document::parse(
        &base.join("petstore-patch.json")?,
        json!({
            "openapi": "3.0.0",
            "info": {"title": "Petstore"},
            "components": {
                "schemas": {
                    "Pet": {"properties": {"tag": {"type": "string"}}}
                }
            }
        }),
        &reader,
    )?)?;

    let patched = patch(primary.as_ref().clone(), [addition.as_ref().clone()]);

    let pet = response_schema(&patched, "/pets/{id}", 200)
        .and_then(|schema| schema.value())
        .ok_or(Error::Message("pet".into()))?;
    assert_eq!(
        vec!["id", "name", "owner", "tag"],
        pet.properties.keys().map(String::as_str).collect::<Vec<_>>()
    );

    let item = response_schema(&patched, "/pets", 200)
        .and_then(|schema| schema.value())
        .and_then(|pets| pets.items.as_ref().and_then(Reference::value))
        .ok_or(Error::Message("item".into()))?;
    assert!(Arc::ptr_eq(&pet, &item));

    // the primary snapshot is left as it was
    let before = response_schema(&primary, "/pets/{id}", 200)
        .and_then(|schema| schema.value())
        .ok_or(Error::Message("before".into()))?;
    assert!(!before.properties.contains_key("tag"));

    // a reference to another document is kept
    assert!(
        pet.properties["owner"]
            .value()
            .is_some_and(|owner| owner.properties.contains_key("email"))
    );
    Ok(())
}

#[test]
fn asyncapi_channels() -> Result<()> {
    let _guard = init_tracing()?;

    let source = Url::parse("file:///specs/events.json")?;
    let document = json!({
        "asyncapi": "2.6.0",
        "info": {"title": "Events", "version": "1.0"},
        "servers": {"broker": {"url": "localhost:9092", "protocol": "kafka"}},
        "channels": {
            "orders": {
                "bindings": {"kafka": {"partitions": 2}},
                "publish": {"message": {"$ref": "#/components/messages/Order"}}
            }
        },
        "components": {
            "messages": {
                "Order": {
                    "contentType": "application/json",
                    "payload": {"type": "object", "properties": {"id": {"type": "string"}}}
                }
            }
        }
    });

    let Document::AsyncApi(asyncapi) = Document::parse(&source, document, &MemoryReader::new())?
    else {
        return Err(Error::Message("expected asyncapi".into()));
    };

    let orders = &asyncapi.channels["orders"];
    assert_eq!(2, orders.partitions());

    let message = orders
        .publish
        .as_ref()
        .and_then(|publish| publish.message.as_ref())
        .and_then(Reference::value)
        .ok_or(Error::Message("message".into()))?;
    assert_eq!(Some("application/json"), message.content_type.as_deref());
    assert!(message.payload.as_ref().and_then(Reference::value).is_some());

    let order = asyncapi
        .components
        .as_ref()
        .and_then(|components| components.messages.get("Order"))
        .and_then(Reference::value)
        .ok_or(Error::Message("order".into()))?;
    assert!(Arc::ptr_eq(&order, &message));
    Ok(())
}
