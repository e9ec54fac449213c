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

//! Generate example values from a schema.

use fake::{
    Fake,
    faker::{
        address::raw::{BuildingNumber, CityName, CountryName, PostCode, StreetName},
        company::raw::{CompanyName, Industry},
        internet::raw::{SafeEmail, Username},
        lorem::raw::{Sentence, Word, Words},
        name::raw::{FirstName, LastName, Name},
        phone_number::raw::PhoneNumber,
    },
    locales::EN,
};
use mimic_config::{
    Reference, Schema,
    schema::{AdditionalProperties, SchemaType},
};
use rand::{
    Rng,
    seq::{IndexedRandom, SliceRandom},
};
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description};
use tracing::debug;
use uuid::Uuid;

use crate::{Error, Result};

pub const DEFAULT_MAX_DEPTH: usize = 5;

const BASE64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// A value from a faker name, such as `person.firstName` or `email`.
pub fn fake(name: &str) -> Option<String> {
    let key = name
        .rsplit('.')
        .next()
        .unwrap_or(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    match key.as_str() {
        "firstname" => Some(FirstName(EN).fake()),
        "lastname" | "surname" => Some(LastName(EN).fake()),
        "name" | "fullname" => Some(Name(EN).fake()),
        "email" | "safeemail" => Some(SafeEmail(EN).fake()),
        "username" | "login" => Some(Username(EN).fake()),
        "buildingnumber" => Some(BuildingNumber(EN).fake()),
        "street" | "streetname" => Some(StreetName(EN).fake()),
        "city" | "cityname" => Some(CityName(EN).fake()),
        "postcode" | "zipcode" | "zip" => Some(PostCode(EN).fake()),
        "country" | "countryname" => Some(CountryName(EN).fake()),
        "company" | "companyname" => Some(CompanyName(EN).fake()),
        "industry" => Some(Industry(EN).fake()),
        "phone" | "phonenumber" => Some(PhoneNumber(EN).fake()),
        "word" => Some(Word(EN).fake()),
        "sentence" | "description" | "summary" => Some(Sentence(EN, 3..8).fake()),
        "uuid" | "id" => Some(Uuid::new_v4().to_string()),
        _ => None,
    }
}

fn characters(alphabet: &[u8], length: usize) -> String {
    let mut rng = rand::rng();

    (0..length)
        .filter_map(|_| alphabet.choose(&mut rng))
        .map(|c| char::from(*c))
        .collect()
}

fn fit(value: String, schema: &Schema) -> String {
    let length = value.chars().count() as u64;

    match (schema.min_length, schema.max_length) {
        (Some(min), _) if length < min => {
            let missing = usize::try_from(min - length).unwrap_or_default();
            format!("{value}{}", characters(ALPHANUMERIC, missing))
        }

        (_, Some(max)) if length > max => value
            .chars()
            .take(usize::try_from(max).unwrap_or(usize::MAX))
            .collect(),

        _ => value,
    }
}

/// Generates values that satisfy a schema.
#[derive(Clone, Copy, Debug)]
pub struct Generator {
    max_depth: usize,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_depth(self, max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn generate(&self, schema: &Schema) -> Result<Value> {
        self.value(None, schema, 0)
    }

    pub fn generate_reference(&self, schema: &Reference<Schema>) -> Result<Value> {
        schema
            .value()
            .map_or(Ok(Value::Null), |schema| self.generate(&schema))
    }

    fn value(&self, name: Option<&str>, schema: &Schema, depth: usize) -> Result<Value> {
        debug!(name, depth);

        if let Some(example) = schema.example.as_ref() {
            return Ok(example.clone());
        }

        if let Some(enumeration) = schema
            .enumeration
            .as_ref()
            .filter(|enumeration| !enumeration.is_empty())
        {
            return Ok(enumeration
                .choose(&mut rand::rng())
                .cloned()
                .unwrap_or_default());
        }

        if let Some(default) = schema.default.as_ref() {
            return Ok(default.clone());
        }

        if let Some(value) = schema.faker.as_deref().and_then(fake) {
            return Ok(Value::String(value));
        }

        if !schema.all_of.is_empty() {
            return self.all_of(name, schema, depth);
        }

        if let Some(alternative) = schema
            .one_of
            .iter()
            .chain(schema.any_of.iter())
            .find_map(Reference::value)
        {
            return self.value(name, &alternative, depth);
        }

        let kind = schema.kind.unwrap_or(
            if !schema.properties.is_empty() || schema.additional_properties.is_some() {
                SchemaType::Object
            } else if schema.items.is_some() {
                SchemaType::Array
            } else {
                SchemaType::String
            },
        );

        match kind {
            SchemaType::Null => Ok(Value::Null),
            SchemaType::Boolean => Ok(Value::Bool(rand::rng().random_bool(0.5))),
            SchemaType::Integer => self.integer(schema),
            SchemaType::Number => self.number(schema),
            SchemaType::String => self.string(name, schema),
            SchemaType::Array => self.array(name, schema, depth),
            SchemaType::Object => self.object(schema, depth),
        }
    }

    fn all_of(&self, name: Option<&str>, schema: &Schema, depth: usize) -> Result<Value> {
        let mut merged = Map::new();

        for part in schema.all_of.iter().filter_map(Reference::value) {
            match self.value(name, &part, depth)? {
                Value::Object(object) => merged.extend(object),
                otherwise => return Ok(otherwise),
            }
        }

        if !schema.properties.is_empty() {
            if let Value::Object(object) = self.object(schema, depth)? {
                merged.extend(object);
            }
        }

        Ok(Value::Object(merged))
    }

    fn integer(&self, schema: &Schema) -> Result<Value> {
        let lower = schema.minimum.map(|minimum| {
            if schema.exclusive_minimum {
                minimum.floor() as i64 + 1
            } else {
                minimum.ceil() as i64
            }
        });

        let upper = schema.maximum.map(|maximum| {
            if schema.exclusive_maximum {
                maximum.ceil() as i64 - 1
            } else {
                maximum.floor() as i64
            }
        });

        let (lower, upper) = match (lower, upper) {
            (Some(lower), Some(upper)) => (lower, upper),
            (Some(lower), None) => (lower, lower.saturating_add(1000)),
            (None, Some(upper)) if upper >= 0 => (0, upper),
            (None, Some(upper)) => (upper.saturating_sub(1000), upper),
            (None, None) => (0, 1000),
        };

        let (lower, upper) = if schema.format.as_deref() == Some("int32") {
            (
                lower.max(i64::from(i32::MIN)),
                upper.min(i64::from(i32::MAX)),
            )
        } else {
            (lower, upper)
        };

        if lower > upper {
            return Err(Error::InvalidSchema(format!(
                "no integer between {lower} and {upper}"
            )));
        }

        let mut rng = rand::rng();

        match schema.multiple_of.filter(|multiple| *multiple >= 1.0) {
            Some(multiple) => {
                let multiple = multiple as i64;
                let first = lower.div_euclid(multiple) + i64::from(lower.rem_euclid(multiple) != 0);
                let last = upper.div_euclid(multiple);

                if first > last {
                    Err(Error::InvalidSchema(format!(
                        "no multiple of {multiple} between {lower} and {upper}"
                    )))
                } else {
                    Ok(json!(rng.random_range(first..=last) * multiple))
                }
            }

            None => Ok(json!(rng.random_range(lower..=upper))),
        }
    }

    fn number(&self, schema: &Schema) -> Result<Value> {
        let lower = schema.minimum.unwrap_or(0.0);
        let upper = schema.maximum.unwrap_or(lower + 1000.0);

        if lower > upper {
            return Err(Error::InvalidSchema(format!(
                "no number between {lower} and {upper}"
            )));
        }

        let mut rng = rand::rng();

        if let Some(multiple) = schema.multiple_of.filter(|multiple| *multiple > 0.0) {
            let first = (lower / multiple).ceil() as i64;
            let last = (upper / multiple).floor() as i64;

            return if first > last {
                Err(Error::InvalidSchema(format!(
                    "no multiple of {multiple} between {lower} and {upper}"
                )))
            } else {
                Ok(json!(rng.random_range(first..=last) as f64 * multiple))
            };
        }

        let value = if lower < upper {
            rng.random_range(lower..upper)
        } else {
            lower
        };

        let value = if (schema.exclusive_minimum && value <= lower)
            || (schema.exclusive_maximum && value >= upper)
        {
            lower + (upper - lower) / 2.0
        } else {
            value
        };

        Ok(json!(value))
    }

    fn string(&self, name: Option<&str>, schema: &Schema) -> Result<Value> {
        let mut rng = rand::rng();

        let value = match schema.format.as_deref() {
            Some("date") => (OffsetDateTime::now_utc()
                - time::Duration::days(rng.random_range(0..3650)))
            .date()
            .format(format_description!("[year]-[month]-[day]"))?,

            Some("date-time") => (OffsetDateTime::now_utc()
                - time::Duration::seconds(rng.random_range(0..315_360_000)))
            .format(&Rfc3339)?,

            Some("email") => SafeEmail(EN).fake(),

            Some("uuid") => Uuid::new_v4().to_string(),

            Some("uri" | "url") => format!(
                "https://www.{}.com/{}",
                Word(EN).fake::<String>().to_lowercase(),
                Word(EN).fake::<String>().to_lowercase()
            ),

            Some("hostname") => format!("{}.example.com", Word(EN).fake::<String>().to_lowercase()),

            Some("ipv4") => format!(
                "{}.{}.{}.{}",
                rng.random::<u8>(),
                rng.random::<u8>(),
                rng.random::<u8>(),
                rng.random::<u8>()
            ),

            Some("ipv6") => (0..8)
                .map(|_| format!("{:x}", rng.random::<u16>()))
                .collect::<Vec<_>>()
                .join(":"),

            Some("password") => characters(ALPHANUMERIC, 12),

            // any multiple of four base64 characters is valid
            Some("byte") => characters(BASE64, 4 * rng.random_range(1..=8)),

            _ => name
                .and_then(fake)
                .unwrap_or_else(|| Words(EN, 1..4).fake::<Vec<String>>().join(" ")),
        };

        Ok(Value::String(fit(value, schema)))
    }

    fn array(&self, name: Option<&str>, schema: &Schema, depth: usize) -> Result<Value> {
        if depth >= self.max_depth {
            return Ok(Value::Array(vec![]));
        }

        let min = schema.min_items.unwrap_or(1);
        let max = schema.max_items.unwrap_or(min.max(3)).max(min);

        let mut rng = rand::rng();
        let count = usize::try_from(rng.random_range(min..=max)).unwrap_or_default();

        let items = schema
            .items
            .as_ref()
            .and_then(Reference::value)
            .map(|items| items.as_ref().clone())
            .unwrap_or_default();

        let mut values = Vec::with_capacity(count);
        let mut attempts = 0;

        while values.len() < count && attempts < count * 10 {
            attempts += 1;

            let value = self.value(name, &items, depth + 1)?;

            if schema.unique_items && values.contains(&value) {
                continue;
            }

            values.push(value);
        }

        if schema.shuffle_items {
            values.shuffle(&mut rng);
        }

        Ok(Value::Array(values))
    }

    fn object(&self, schema: &Schema, depth: usize) -> Result<Value> {
        let mut object = Map::new();

        if depth >= self.max_depth {
            return Ok(Value::Object(object));
        }

        for (name, property) in &schema.properties {
            let Some(property) = property.value() else {
                continue;
            };

            _ = object.insert(
                name.clone(),
                self.value(Some(name.as_str()), &property, depth + 1)?,
            );
        }

        let additional = match schema.additional_properties.as_ref() {
            Some(AdditionalProperties::Schema(additional)) => additional
                .value()
                .map(|additional| additional.as_ref().clone()),
            Some(AdditionalProperties::Allowed(false)) => None,
            _ if schema.properties.is_empty() => None,
            _ => Some(Schema::default().kind(SchemaType::String)),
        };

        if let Some(additional) = additional {
            let minimum = schema
                .min_properties
                .and_then(|minimum| usize::try_from(minimum).ok())
                .unwrap_or(0);

            let wanted = if schema.properties.is_empty() {
                minimum.max(rand::rng().random_range(1..=3))
            } else {
                minimum
            };

            let maximum = schema
                .max_properties
                .and_then(|maximum| usize::try_from(maximum).ok())
                .unwrap_or(usize::MAX);

            let mut attempts = 0;

            while object.len() < wanted.min(maximum) && attempts < wanted * 10 {
                attempts += 1;

                let key = Word(EN).fake::<String>();
                if object.contains_key(&key) {
                    continue;
                }

                let value = self.value(None, &additional, depth + 1)?;
                _ = object.insert(key, value);
            }
        }

        Ok(Value::Object(object))
    }
}

/// Generate a value satisfying `schema`.
pub fn generate(schema: &Schema) -> Result<Value> {
    Generator::default().generate(schema)
}
