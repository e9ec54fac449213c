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
//
//! Kafka protocol message metadata.
//!
//! Every request and response understood by the broker is described by a
//! static [`MessageMeta`] table. The serde encoder and decoder in
//! `mimic-sans-io` walk these tables to decide, for a negotiated API version,
//! which fields are present, which may be null and whether compact
//! (flexible) encoding applies.

use std::{collections::BTreeMap, fmt};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// The kind of Kafka API message: request or response.
pub enum MessageKind {
    #[default]
    Request,
    Response,
}

#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// An inclusive range of versions.
pub struct VersionRange {
    pub start: i16,
    pub end: i16,
}

impl fmt::Debug for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == i16::MAX {
            write!(f, "{}+", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl VersionRange {
    /// A range with an explicit start and end.
    #[must_use]
    pub const fn new(start: i16, end: i16) -> Self {
        Self { start, end }
    }

    /// An open ended range starting at `start`.
    #[must_use]
    pub const fn from(start: i16) -> Self {
        Self {
            start,
            end: i16::MAX,
        }
    }

    /// A range that no version falls within.
    #[must_use]
    pub const fn none() -> Self {
        Self { start: 1, end: 0 }
    }

    #[must_use]
    pub fn within(&self, version: i16) -> bool {
        version >= self.start && version <= self.end
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// The validity and flexible version ranges of a Kafka API message.
pub struct Version {
    /// The valid version ranges of this Kafka message.
    pub valid: VersionRange,
    /// The range of versions where this message uses flexible encoding.
    pub flexible: VersionRange,
}

impl Version {
    #[must_use]
    pub const fn new(valid: VersionRange, flexible: VersionRange) -> Self {
        Self { valid, flexible }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// The type of a field, using the names found in the Kafka protocol
/// definitions: `int8`, `int16`, `int32`, `int64`, `bool`, `string`,
/// `bytes`, `records`, a structure name, or `[]` followed by any of those.
pub struct KindMeta(pub &'static str);

const PRIMITIVES: [&str; 8] = [
    "bool", "bytes", "int16", "int32", "int64", "int8", "records", "string",
];

impl KindMeta {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.0
    }

    #[must_use]
    pub fn is_sequence(&self) -> bool {
        self.0.starts_with("[]")
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        PRIMITIVES.contains(&self.0)
    }

    #[must_use]
    pub fn is_string(&self) -> bool {
        self.0 == "string"
    }

    #[must_use]
    pub fn is_bytes(&self) -> bool {
        self.0 == "bytes"
    }

    #[must_use]
    pub fn is_records(&self) -> bool {
        self.0 == "records"
    }

    #[must_use]
    pub fn kind_of_sequence(&self) -> Option<Self> {
        self.0.strip_prefix("[]").map(KindMeta)
    }
}

/// Fields of a message or structure, in wire order.
pub type Fields = &'static [(&'static str, FieldMeta)];

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// Kafka API message field metadata
pub struct FieldMeta {
    /// The version range of this field.
    pub version: VersionRange,
    /// The version range where this field may be null.
    pub nullable: Option<VersionRange>,
    /// The kind (type) metadata of this field.
    pub kind: KindMeta,
    /// The fields contained within this structure.
    pub fields: Fields,
}

impl FieldMeta {
    /// A field of `kind` present in all versions.
    #[must_use]
    pub const fn new(kind: &'static str) -> Self {
        Self {
            version: VersionRange::from(0),
            nullable: None,
            kind: KindMeta(kind),
            fields: &[],
        }
    }

    /// Present from `start` onwards.
    #[must_use]
    pub const fn since(self, start: i16) -> Self {
        Self {
            version: VersionRange::from(start),
            ..self
        }
    }

    /// Present between `start` and `end` inclusive.
    #[must_use]
    pub const fn between(self, start: i16, end: i16) -> Self {
        Self {
            version: VersionRange::new(start, end),
            ..self
        }
    }

    /// Nullable from `start` onwards.
    #[must_use]
    pub const fn nullable_since(self, start: i16) -> Self {
        Self {
            nullable: Some(VersionRange::from(start)),
            ..self
        }
    }

    /// Nullable in every version.
    #[must_use]
    pub const fn nullable(self) -> Self {
        self.nullable_since(0)
    }

    #[must_use]
    pub const fn with_fields(self, fields: Fields) -> Self {
        Self { fields, ..self }
    }

    #[must_use]
    pub fn is_nullable(&self, version: i16) -> bool {
        self.nullable.is_some_and(|range| range.within(version))
    }

    #[must_use]
    pub fn is_structure(&self) -> bool {
        !self.fields.is_empty()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields
            .iter()
            .find(|(found, _)| name == *found)
            .map(|(_, meta)| meta)
    }

    /// Nested structures keyed by their kind name.
    #[must_use]
    pub fn structures(&self) -> BTreeMap<&'static str, &'static FieldMeta> {
        self.fields
            .iter()
            .filter(|(_, fm)| fm.is_structure())
            .fold(BTreeMap::new(), |mut acc, (_, fm)| {
                let name = fm.kind.kind_of_sequence().unwrap_or(fm.kind).name();
                _ = acc.insert(name, fm);
                acc.append(&mut fm.structures());
                acc
            })
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
/// Kafka API message metadata.
pub struct MessageMeta {
    /// The name of the Kafka API message.
    pub name: &'static str,
    /// The API key used by this message.
    pub api_key: i16,
    /// The version ranges for this message.
    pub version: Version,
    /// The message kind of this message.
    pub message_kind: MessageKind,
    /// The fields that this message describes.
    pub fields: Fields,
}

impl MessageMeta {
    #[must_use]
    pub fn is_flexible(&self, version: i16) -> bool {
        self.version.flexible.within(version)
    }

    #[must_use]
    pub fn is_valid(&self, version: i16) -> bool {
        self.version.valid.within(version)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields
            .iter()
            .find(|(found, _)| name == *found)
            .map(|(_, meta)| meta)
    }

    #[must_use]
    pub fn structures(&self) -> BTreeMap<&'static str, &'static FieldMeta> {
        self.fields
            .iter()
            .filter(|(_, fm)| fm.is_structure())
            .fold(BTreeMap::new(), |mut acc, (_, fm)| {
                let name = fm.kind.kind_of_sequence().unwrap_or(fm.kind).name();
                _ = acc.insert(name, fm);
                acc.append(&mut fm.structures());
                acc
            })
    }
}
