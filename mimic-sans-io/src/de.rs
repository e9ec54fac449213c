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

use std::{
    fmt,
    io::{self, Read},
};

use mimic_model::{FieldMeta, Fields, MessageMeta};
use serde::{
    Deserializer,
    de::{DeserializeSeed, MapAccess, SeqAccess, Visitor, value::BorrowedStrDeserializer},
};
use tracing::debug;

use crate::{Error, Result, primitive::varint::read_unsigned, skip_tag_buffer};

/// Deserialize the Kafka protocol into the serde data model.
///
/// Structures are presented to serde as maps that only contain the fields
/// valid for the negotiated version, absent fields take their default.
pub struct Decoder<'a> {
    reader: &'a mut dyn Read,
    meta: &'static MessageMeta,
    api_version: i16,
    field: Option<&'static FieldMeta>,
    length: Option<usize>,
}

impl fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(Decoder))
            .field("meta", &self.meta.name)
            .field("api_version", &self.api_version)
            .field("length", &self.length)
            .finish()
    }
}

impl<'a> Decoder<'a> {
    pub fn new(reader: &'a mut dyn Read, meta: &'static MessageMeta, api_version: i16) -> Self {
        Self {
            reader,
            meta,
            api_version,
            field: None,
            length: None,
        }
    }

    fn is_flexible(&self) -> bool {
        self.meta.is_flexible(self.api_version)
    }

    fn is_string(&self) -> bool {
        self.field.is_some_and(|field| field.kind.is_string())
    }

    fn is_records(&self) -> bool {
        self.field.is_some_and(|field| field.kind.is_records())
    }

    fn is_nullable_structure(&self) -> bool {
        self.field
            .is_some_and(|field| field.is_structure() && !field.kind.is_sequence())
    }

    fn read<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn compact_length(&mut self) -> Result<Option<usize>> {
        match read_unsigned(self.reader)? {
            0 => Ok(None),
            length => usize::try_from(length - 1).map(Some).map_err(Into::into),
        }
    }

    /// The length of a string, `None` when null.
    fn string_length(&mut self) -> Result<Option<usize>> {
        if self.is_flexible() {
            self.compact_length()
        } else {
            match self.read().map(i16::from_be_bytes)? {
                length if length < 0 => Ok(None),
                length => usize::try_from(length).map(Some).map_err(Into::into),
            }
        }
    }

    /// The length of bytes, records or an array, `None` when null.
    fn length(&mut self) -> Result<Option<usize>> {
        if self.is_flexible() {
            self.compact_length()
        } else {
            match self.read().map(i32::from_be_bytes)? {
                length if length < 0 => Ok(None),
                length => usize::try_from(length).map(Some).map_err(Into::into),
            }
        }
    }

    fn octets(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut octets = Vec::new();
        _ = (&mut *self.reader)
            .take(u64::try_from(length)?)
            .read_to_end(&mut octets)?;

        if octets.len() == length {
            Ok(octets)
        } else {
            Err(io::Error::from(io::ErrorKind::UnexpectedEof).into())
        }
    }
}

impl<'de> Deserializer<'de> for &mut Decoder<'_> {
    type Error = Error;

    fn deserialize_any<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("any"))
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read::<1>()
            .and_then(|[v]| visitor.visit_bool(v != 0))
    }

    fn deserialize_i8<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(i8::from_be_bytes)
            .and_then(|v| visitor.visit_i8(v))
    }

    fn deserialize_i16<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(i16::from_be_bytes)
            .and_then(|v| visitor.visit_i16(v))
    }

    fn deserialize_i32<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(i32::from_be_bytes)
            .and_then(|v| visitor.visit_i32(v))
    }

    fn deserialize_i64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(i64::from_be_bytes)
            .and_then(|v| visitor.visit_i64(v))
    }

    fn deserialize_u8<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(u8::from_be_bytes)
            .and_then(|v| visitor.visit_u8(v))
    }

    fn deserialize_u16<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(u16::from_be_bytes)
            .and_then(|v| visitor.visit_u16(v))
    }

    fn deserialize_u32<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(u32::from_be_bytes)
            .and_then(|v| visitor.visit_u32(v))
    }

    fn deserialize_u64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(u64::from_be_bytes)
            .and_then(|v| visitor.visit_u64(v))
    }

    fn deserialize_f32<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(f32::from_be_bytes)
            .and_then(|v| visitor.visit_f32(v))
    }

    fn deserialize_f64<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.read()
            .map(f64::from_be_bytes)
            .and_then(|v| visitor.visit_f64(v))
    }

    fn deserialize_char<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("char"))
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let length = match self.length.take() {
            Some(length) => length,
            None => self.string_length()?.unwrap_or_default(),
        };

        self.octets(length)
            .and_then(|octets| String::from_utf8(octets).map_err(Into::into))
            .and_then(|s| visitor.visit_string(s))
    }

    fn deserialize_bytes<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let length = match self.length.take() {
            Some(length) => length,
            None => self.length()?.unwrap_or_default(),
        };

        self.octets(length)
            .and_then(|octets| visitor.visit_byte_buf(octets))
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        if self.is_nullable_structure() {
            return match self.read().map(i8::from_be_bytes)? {
                marker if marker < 0 => visitor.visit_none(),
                _ => visitor.visit_some(self),
            };
        }

        let length = if self.is_string() {
            self.string_length()?
        } else {
            self.length()?
        };

        debug!(?length, is_records = self.is_records());

        match length {
            None => visitor.visit_none(),
            Some(0) if self.is_records() => visitor.visit_none(),
            Some(length) => {
                _ = self.length.replace(length);
                visitor.visit_some(self)
            }
        }
    }

    fn deserialize_unit<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let length = match self.length.take() {
            Some(length) => length,
            None => self.length()?.unwrap_or_default(),
        };

        visitor.visit_seq(Seq {
            de: self,
            remaining: length,
        })
    }

    fn deserialize_tuple<V>(self, _len: usize, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("tuple"))
    }

    fn deserialize_tuple_struct<V>(
        self,
        name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType(name))
    }

    fn deserialize_map<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("map"))
    }

    fn deserialize_struct<V>(
        self,
        name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let fields = match self.field {
            None => self.meta.fields,
            Some(field) if field.is_structure() => field.fields,
            Some(_) => return Err(Error::NoSuchField(name)),
        };

        let value = visitor.visit_map(Struct {
            de: &mut *self,
            fields,
            index: 0,
        })?;

        if self.is_flexible() {
            _ = skip_tag_buffer(self.reader)?;
        }

        Ok(value)
    }

    fn deserialize_enum<V>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType(name))
    }

    fn deserialize_identifier<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("identifier"))
    }

    fn deserialize_ignored_any<V>(self, _visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        Err(Error::UnsupportedType("ignored"))
    }
}

struct Seq<'a, 'b> {
    de: &'a mut Decoder<'b>,
    remaining: usize,
}

impl<'de> SeqAccess<'de> for Seq<'_, '_> {
    type Error = Error;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        if self.remaining == 0 {
            Ok(None)
        } else {
            self.remaining -= 1;
            seed.deserialize(&mut *self.de).map(Some)
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

/// The fields of a structure that are valid in this version.
struct Struct<'a, 'b> {
    de: &'a mut Decoder<'b>,
    fields: Fields,
    index: usize,
}

impl<'de> MapAccess<'de> for Struct<'_, '_> {
    type Error = Error;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        let fields = self.fields;

        while let Some((name, fm)) = fields.get(self.index) {
            if fm.version.within(self.de.api_version) {
                return seed
                    .deserialize(BorrowedStrDeserializer::<'de, Error>::new(*name))
                    .map(Some);
            }

            self.index += 1;
        }

        Ok(None)
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        let fields = self.fields;
        let (_, fm) = fields
            .get(self.index)
            .ok_or(Error::UnsupportedType("value without key"))?;

        self.index += 1;

        let previous = self.de.field.replace(fm);
        let outcome = seed.deserialize(&mut *self.de);
        self.de.field = previous;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FindCoordinatorRequest, MetadataRequest, find_coordinator, metadata};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[test]
    fn absent_fields_take_their_default() -> Result<()> {
        let encoded = [0, 3, b'a', b'b', b'c'];
        let mut reader = &encoded[..];

        let request = FindCoordinatorRequest::deserialize(&mut Decoder::new(
            &mut reader,
            &find_coordinator::REQUEST,
            0,
        ))?;

        assert_eq!(
            FindCoordinatorRequest::default().key("abc".into()),
            request
        );
        Ok(())
    }

    #[test]
    fn unknown_tagged_fields_are_skipped() -> Result<()> {
        // compact key, key type, a tag buffer with one 2 byte field
        let encoded = [4, b'a', b'b', b'c', 1, 1, 5, 2, 0xde, 0xad];
        let mut reader = &encoded[..];

        let request = FindCoordinatorRequest::deserialize(&mut Decoder::new(
            &mut reader,
            &find_coordinator::REQUEST,
            3,
        ))?;

        assert_eq!(
            FindCoordinatorRequest::default().key("abc".into()).key_type(1),
            request
        );
        assert!(reader.is_empty());
        Ok(())
    }

    #[test]
    fn null_array_is_none() -> Result<()> {
        let encoded = [255, 255, 255, 255, 1];
        let mut reader = &encoded[..];

        let request = MetadataRequest::deserialize(&mut Decoder::new(
            &mut reader,
            &metadata::REQUEST,
            4,
        ))?;

        assert_eq!(None, request.topics);
        assert!(request.allow_auto_topic_creation);
        Ok(())
    }

    #[test]
    fn truncated_input_is_an_error() {
        let encoded = [0, 9, b'a'];
        let mut reader = &encoded[..];

        assert!(
            FindCoordinatorRequest::deserialize(&mut Decoder::new(
                &mut reader,
                &find_coordinator::REQUEST,
                0,
            ))
            .is_err()
        );
    }
}
