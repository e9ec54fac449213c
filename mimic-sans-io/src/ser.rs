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

use std::{fmt, io::Write};

use mimic_model::{FieldMeta, Fields, MessageMeta};
use serde::{
    Serialize, Serializer,
    ser::{Impossible, SerializeSeq, SerializeStruct},
};
use tracing::debug;

use crate::{Error, Result, primitive::varint::write_unsigned};

const PARSE_DEPTH: usize = 6;

/// Serialize the serde data model into the Kafka protocol.
///
/// The field tables of the message decide, for the negotiated version,
/// which fields are written and whether compact encoding is used.
pub struct Encoder<'a> {
    writer: &'a mut dyn Write,
    meta: &'static MessageMeta,
    api_version: i16,
    field: Option<&'static FieldMeta>,
    parse: Vec<Fields>,
}

impl fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(stringify!(Encoder))
            .field("meta", &self.meta.name)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    pub fn new(writer: &'a mut dyn Write, meta: &'static MessageMeta, api_version: i16) -> Self {
        Self {
            writer,
            meta,
            api_version,
            field: None,
            parse: Vec::with_capacity(PARSE_DEPTH),
        }
    }

    fn is_flexible(&self) -> bool {
        self.meta.is_flexible(self.api_version)
    }

    fn is_nullable(&self) -> bool {
        self.field
            .is_some_and(|field| field.is_nullable(self.api_version))
    }

    fn is_nullable_structure(&self) -> bool {
        self.field
            .is_some_and(|field| field.is_structure() && !field.kind.is_sequence())
    }

    fn is_string(&self) -> bool {
        self.field.is_some_and(|field| field.kind.is_string())
    }

    fn is_records(&self) -> bool {
        self.field.is_some_and(|field| field.kind.is_records())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.writer.write_all(buf).map_err(Into::into)
    }

    /// The length of a string: compact or int16.
    fn string_length(&mut self, length: usize) -> Result<()> {
        if self.is_flexible() {
            u32::try_from(length + 1)
                .map_err(Into::into)
                .and_then(|length| write_unsigned(self.writer, length))
        } else {
            i16::try_from(length)
                .map_err(Into::into)
                .and_then(|length| self.write(&length.to_be_bytes()))
        }
    }

    /// The length of bytes, records or an array: compact or int32.
    fn length(&mut self, length: usize) -> Result<()> {
        if self.is_flexible() {
            u32::try_from(length + 1)
                .map_err(Into::into)
                .and_then(|length| write_unsigned(self.writer, length))
        } else {
            i32::try_from(length)
                .map_err(Into::into)
                .and_then(|length| self.write(&length.to_be_bytes()))
        }
    }

    fn null(&mut self) -> Result<()> {
        if self.is_flexible() {
            write_unsigned(self.writer, 0)
        } else if self.is_string() {
            self.write(&(-1i16).to_be_bytes())
        } else {
            self.write(&(-1i32).to_be_bytes())
        }
    }

    fn tag_buffer(&mut self) -> Result<()> {
        if self.is_flexible() {
            write_unsigned(self.writer, 0)
        } else {
            Ok(())
        }
    }
}

impl<'a> Serializer for &mut Encoder<'a> {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Impossible<(), Error>;
    type SerializeTupleStruct = Impossible<(), Error>;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<Self::Ok, Self::Error> {
        self.write(&[u8::from(v)])
    }

    fn serialize_i8(self, v: i8) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_i16(self, v: i16) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_i32(self, v: i32) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_i64(self, v: i64) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_u8(self, v: u8) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_u16(self, v: u16) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_u32(self, v: u32) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_u64(self, v: u64) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_f32(self, v: f32) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_f64(self, v: f64) -> Result<Self::Ok, Self::Error> {
        self.write(&v.to_be_bytes())
    }

    fn serialize_char(self, _v: char) -> Result<Self::Ok, Self::Error> {
        Err(Error::UnsupportedType("char"))
    }

    fn serialize_str(self, v: &str) -> Result<Self::Ok, Self::Error> {
        self.string_length(v.len())?;
        self.write(v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Self::Ok, Self::Error> {
        self.length(v.len())?;
        self.write(v)
    }

    fn serialize_none(self) -> Result<Self::Ok, Self::Error> {
        debug!(
            field = ?self.field.map(|field| field.kind),
            is_nullable = self.is_nullable(),
            is_flexible = self.is_flexible()
        );

        if self.field.is_some_and(|field| {
            field.kind.is_primitive()
                && !(field.kind.is_string() || field.kind.is_bytes() || field.kind.is_records())
        }) {
            Err(Error::UnsupportedType("null primitive"))
        } else if self.is_records() {
            // absent records are written as an empty set
            self.length(0)
        } else if self.is_nullable_structure() {
            self.write(&(-1i8).to_be_bytes())
        } else if self.is_nullable() {
            self.null()
        } else if self.is_string() {
            self.string_length(0)
        } else {
            self.length(0)
        }
    }

    fn serialize_some<T>(self, value: &T) -> Result<Self::Ok, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        if self.is_nullable_structure() {
            self.write(&1i8.to_be_bytes())?;
        }

        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<Self::Ok, Self::Error> {
        Err(Error::UnsupportedType(name))
    }

    fn serialize_newtype_struct<T>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<Self::Ok, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        let len = len.ok_or(Error::UnsupportedType("sequence without length"))?;
        self.length(len)?;
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(Error::UnsupportedType("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(Error::UnsupportedType(name))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(Error::UnsupportedType(name))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(Error::UnsupportedType("map"))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        let fields = match self.field {
            None => self.meta.fields,
            Some(field) if field.is_structure() => field.fields,
            Some(_) => return Err(Error::NoSuchField(name)),
        };

        self.parse.push(fields);
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(Error::UnsupportedType(name))
    }
}

impl SerializeSeq for &mut Encoder<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        Ok(())
    }
}

impl SerializeStruct for &mut Encoder<'_> {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Self::Error>
    where
        T: Serialize + ?Sized,
    {
        let fields = self.parse.last().copied().unwrap_or_default();

        let Some(fm) = fields
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, fm)| fm)
        else {
            return Err(Error::NoSuchField(key));
        };

        if !fm.version.within(self.api_version) {
            debug!(key, version = ?fm.version, api_version = self.api_version);
            return Ok(());
        }

        let previous = self.field.replace(fm);
        let outcome = value.serialize(&mut **self);
        self.field = previous;
        outcome
    }

    fn end(self) -> Result<Self::Ok, Self::Error> {
        _ = self.parse.pop();
        self.tag_buffer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ApiVersionsResponse, FindCoordinatorRequest, MetadataRequest, api_versions,
        find_coordinator, metadata,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn fields_outside_version_are_skipped() -> Result<()> {
        let request = FindCoordinatorRequest::default()
            .key("abc".into())
            .key_type(0);

        let mut v0 = vec![];
        request.serialize(&mut Encoder::new(&mut v0, &find_coordinator::REQUEST, 0))?;
        assert_eq!(vec![0, 3, b'a', b'b', b'c'], v0);

        let mut v1 = vec![];
        request.serialize(&mut Encoder::new(&mut v1, &find_coordinator::REQUEST, 1))?;
        assert_eq!(vec![0, 3, b'a', b'b', b'c', 0], v1);

        Ok(())
    }

    #[test]
    fn compact_encoding_when_flexible() -> Result<()> {
        let request = FindCoordinatorRequest::default()
            .key("abc".into())
            .key_type(0);

        let mut encoded = vec![];
        request.serialize(&mut Encoder::new(&mut encoded, &find_coordinator::REQUEST, 3))?;

        // compact string, key type and an empty tag buffer
        assert_eq!(vec![4, b'a', b'b', b'c', 0, 0], encoded);
        Ok(())
    }

    #[test]
    fn null_array() -> Result<()> {
        let request = MetadataRequest::default().topics(None);

        let mut v1 = vec![];
        request.serialize(&mut Encoder::new(&mut v1, &metadata::REQUEST, 1))?;
        assert_eq!(vec![255, 255, 255, 255], v1);

        let mut v0 = vec![];
        request.serialize(&mut Encoder::new(&mut v0, &metadata::REQUEST, 0))?;
        assert_eq!(vec![0, 0, 0, 0], v0);

        Ok(())
    }

    #[test]
    fn nested_structures() -> Result<()> {
        let response = ApiVersionsResponse::default().api_keys(vec![
            api_versions::ApiVersion::default()
                .api_key(18)
                .min_version(0)
                .max_version(3),
        ]);

        let mut encoded = vec![];
        response.serialize(&mut Encoder::new(&mut encoded, &api_versions::RESPONSE, 3))?;

        assert_eq!(
            vec![
                0, 0, // error code
                2, // compact array of 1
                0, 18, 0, 0, 0, 3, 0, // api version with tag buffer
                0, 0, 0, 0, // throttle
                0, // tag buffer
            ],
            encoded
        );

        Ok(())
    }
}
