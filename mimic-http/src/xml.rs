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

//! XML bodies, read into and written from JSON values by schema.
//!
//! Element and attribute names follow the `xml` object of each schema:
//! `name` renames, `attribute` moves a property into an attribute,
//! `wrapped` encloses array items in an element of the array's own name,
//! and `x-cdata` writes text as a CDATA section.

use std::sync::Arc;

use mimic_config::{
    Reference, Schema,
    schema::{SchemaType, Xml},
};
use quick_xml::{
    Reader, Writer,
    events::{BytesCData, BytesEnd, BytesStart, BytesText, Event},
};
use serde_json::{Map, Value};

use crate::{Error, Result, param::coerce};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn new(start: &BytesStart<'_>) -> Result<Self> {
        let attributes = start
            .attributes()
            .map(|attribute| {
                let attribute = attribute.map_err(quick_xml::Error::from)?;

                Ok((
                    String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned(),
                    attribute.unescape_value()?.into_owned(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute == name)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// Parse the root element of a document.
pub fn parse(xml: &[u8]) -> Result<Element> {
    let mut reader = Reader::from_reader(xml);
    _ = reader.config_mut().trim_text(true);

    let mut open: Vec<Element> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => open.push(Element::new(&start)?),

            Event::Empty(start) => {
                let element = Element::new(&start)?;

                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }

            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| Error::BadRequest(String::from("unbalanced xml")))?;

                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }

            Event::Text(text) => {
                if let Some(element) = open.last_mut() {
                    element.text.push_str(&text.unescape()?);
                }
            }

            Event::CData(cdata) => {
                if let Some(element) = open.last_mut() {
                    element
                        .text
                        .push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }

            Event::Eof => return Err(Error::BadRequest(String::from("no xml root element"))),

            _ => {}
        }
    }
}

/// Read a document as a value of `schema`.
pub fn from_xml(xml: &[u8], schema: Option<&Schema>) -> Result<Value> {
    parse(xml).map(|root| value(&root, schema))
}

fn xml(schema: Option<&Schema>) -> Option<&Xml> {
    schema.and_then(|schema| schema.xml.as_ref())
}

fn items(schema: Option<&Schema>) -> Option<Arc<Schema>> {
    schema
        .and_then(|schema| schema.items.as_ref())
        .and_then(Reference::value)
}

fn is_array(schema: Option<&Schema>) -> bool {
    schema.is_some_and(|schema| schema.is(SchemaType::Array) || schema.items.is_some())
}

fn is_object(schema: Option<&Schema>) -> bool {
    schema.is_some_and(|schema| schema.is(SchemaType::Object) || !schema.properties.is_empty())
}

/// The element name of a property, or of the items of an array property.
fn element_name<'a>(property: &'a str, schema: Option<&'a Schema>) -> &'a str {
    xml(schema)
        .and_then(|xml| xml.name.as_deref())
        .unwrap_or(property)
}

fn value(element: &Element, schema: Option<&Schema>) -> Value {
    if is_array(schema) {
        let items = items(schema);
        return Value::Array(
            element
                .children
                .iter()
                .map(|child| value(child, items.as_deref()))
                .collect(),
        );
    }

    let Some(schema) = schema.filter(|schema| is_object(Some(schema))) else {
        if element.children.is_empty() {
            return coerce(&element.text, schema);
        }

        return Value::Object(
            element
                .children
                .iter()
                .map(|child| (child.name.clone(), value(child, None)))
                .collect(),
        );
    };

    let mut object = Map::new();

    for (name, property) in &schema.properties {
        let property = property.value();
        let property = property.as_deref();
        let tag = element_name(name, property);

        let found = if xml(property).is_some_and(|xml| xml.attribute) {
            element
                .attribute(tag)
                .map(|attribute| coerce(attribute, property))
        } else if is_array(property) {
            let items = items(property);
            let item_tag = element_name(tag, items.as_deref());

            if xml(property).is_some_and(|xml| xml.wrapped) {
                element.child(tag).map(|wrapper| {
                    Value::Array(
                        wrapper
                            .named(item_tag)
                            .map(|item| value(item, items.as_deref()))
                            .collect(),
                    )
                })
            } else {
                let found = element
                    .named(item_tag)
                    .map(|item| value(item, items.as_deref()))
                    .collect::<Vec<_>>();
                (!found.is_empty()).then_some(Value::Array(found))
            }
        } else {
            element.child(tag).map(|child| value(child, property))
        };

        if let Some(found) = found {
            _ = object.insert(name.clone(), found);
        }
    }

    Value::Object(object)
}

/// Write `value` as a document whose root element is named by `schema`,
/// or `root` when the schema does not name it.
pub fn to_xml(value: &Value, schema: Option<&Schema>, root: &str) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    let name = qualified(element_name(root, schema), xml(schema));
    write(&mut writer, &name, value, schema)?;
    Ok(writer.into_inner())
}

fn qualified(name: &str, xml: Option<&Xml>) -> String {
    match xml.and_then(|xml| xml.prefix.as_deref()) {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}:{name}"),
        _ => name.to_owned(),
    }
}

fn start<'a>(name: &'a str, schema: Option<&Schema>) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);

    if let Some(namespace) = xml(schema).and_then(|xml| xml.namespace.as_deref()) {
        match xml(schema).and_then(|xml| xml.prefix.as_deref()) {
            Some(prefix) if !prefix.is_empty() => {
                start.push_attribute((format!("xmlns:{prefix}").as_str(), namespace));
            }
            _ => start.push_attribute(("xmlns", namespace)),
        }
    }

    start
}

fn text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        otherwise => otherwise.to_string(),
    }
}

fn write(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    schema: Option<&Schema>,
) -> Result<()> {
    match value {
        Value::Array(values) => {
            let items = items(schema);
            let item_name = qualified(element_name(name, items.as_deref()), xml(items.as_deref()));

            writer.write_event(Event::Start(start(name, schema)))?;
            for item in values {
                write(writer, &item_name, item, items.as_deref())?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }

        Value::Object(object) => {
            let mut element = start(name, schema);
            let mut children = Vec::new();

            for (key, value) in object {
                let property = schema
                    .and_then(|schema| schema.property_named(key))
                    .and_then(|(_, property)| property.value());

                if xml(property.as_deref()).is_some_and(|xml| xml.attribute) {
                    let attribute = element_name(key, property.as_deref()).to_owned();
                    element.push_attribute((attribute.as_str(), text(value).as_str()));
                } else {
                    children.push((key, value, property));
                }
            }

            if children.is_empty() {
                writer.write_event(Event::Empty(element))?;
                return Ok(());
            }

            writer.write_event(Event::Start(element))?;

            for (key, value, property) in children {
                let property = property.as_deref();
                let tag = qualified(element_name(key, property), xml(property));

                match value {
                    Value::Array(values) if !xml(property).is_some_and(|xml| xml.wrapped) => {
                        let items = items(property);
                        let item_tag =
                            qualified(element_name(&tag, items.as_deref()), xml(items.as_deref()));

                        for item in values {
                            write(writer, &item_tag, item, items.as_deref())?;
                        }
                    }

                    _ => write(writer, &tag, value, property)?,
                }
            }

            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }

        Value::Null => {
            writer.write_event(Event::Empty(start(name, schema)))?;
        }

        scalar => {
            let content = text(scalar);

            writer.write_event(Event::Start(start(name, schema)))?;

            if xml(schema).is_some_and(|xml| xml.cdata) {
                writer.write_event(Event::CData(BytesCData::new(content.as_str())))?;
            } else {
                writer.write_event(Event::Text(BytesText::new(content.as_str())))?;
            }

            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pet() -> Schema {
        serde_json::from_value(json!({
            "type": "object",
            "xml": {"name": "pet"},
            "properties": {
                "id": {"type": "integer", "xml": {"attribute": true}},
                "name": {"type": "string"},
                "tags": {
                    "type": "array",
                    "xml": {"name": "tags", "wrapped": true},
                    "items": {"type": "string", "xml": {"name": "tag"}}
                },
                "photoUrls": {
                    "type": "array",
                    "items": {"type": "string", "xml": {"name": "photoUrl"}}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn read_by_schema() -> Result<()> {
        let xml = br#"<?xml version="1.0"?>
            <pet id="7">
                <name>Rex &amp; co</name>
                <tags><tag>good</tag><tag>dog</tag></tags>
                <photoUrl>a.png</photoUrl>
                <photoUrl><![CDATA[b.png]]></photoUrl>
            </pet>"#;

        assert_eq!(
            json!({
                "id": 7,
                "name": "Rex & co",
                "tags": ["good", "dog"],
                "photoUrls": ["a.png", "b.png"]
            }),
            from_xml(xml, Some(&pet()))?
        );
        Ok(())
    }

    #[test]
    fn write_by_schema() -> Result<()> {
        let written = to_xml(
            &json!({"id": 7, "name": "Rex", "tags": ["good"], "photoUrls": ["a.png", "b.png"]}),
            Some(&pet()),
            "Pet",
        )?;

        assert_eq!(
            r#"<pet id="7"><name>Rex</name><tags><tag>good</tag></tags><photoUrl>a.png</photoUrl><photoUrl>b.png</photoUrl></pet>"#,
            String::from_utf8(written)?
        );
        Ok(())
    }

    #[test]
    fn cdata_and_namespace() -> Result<()> {
        let schema: Schema = serde_json::from_value(json!({
            "type": "string",
            "xml": {"name": "note", "prefix": "m", "namespace": "urn:mimic", "x-cdata": true}
        }))?;

        assert_eq!(
            r#"<m:note xmlns:m="urn:mimic"><![CDATA[a < b]]></m:note>"#,
            String::from_utf8(to_xml(&json!("a < b"), Some(&schema), "root")?)?
        );
        Ok(())
    }

    #[test]
    fn malformed() {
        assert!(from_xml(b"<pet><name>x</pet>", None).is_err());
        assert!(from_xml(b"", None).is_err());
    }
}
