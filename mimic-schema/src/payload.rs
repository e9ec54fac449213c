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

//! Kafka record payloads validated by an AsyncAPI message schema.

use std::sync::Arc;

use bytes::Bytes;
use mimic_config::Schema;
use mimic_sans_io::{ErrorCode, record::inflated::Batch};
use opentelemetry::KeyValue;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{Error, Result, VALIDATION_ERROR, Validator, json};

#[derive(Clone, Debug, Default)]
pub struct PayloadValidator {
    schema: Option<Arc<Schema>>,
    content_type: String,
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    essence == "application/json" || essence.ends_with("+json")
}

impl PayloadValidator {
    pub fn new(schema: Option<Arc<Schema>>, content_type: impl Into<String>) -> Self {
        Self {
            schema,
            content_type: content_type.into(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    fn value(&self, schema: &Schema, encoded: Option<&Bytes>) -> Result<()> {
        let Some(encoded) = encoded else {
            warn!(content_type = self.content_type, "missing value");
            return Err(Error::Api(ErrorCode::CorruptMessage));
        };

        if is_json(&self.content_type) || self.content_type.is_empty() {
            serde_json::from_slice::<Value>(&encoded[..])
                .inspect_err(|err| warn!(?err, ?encoded))
                .map_err(|_err| Error::Api(ErrorCode::CorruptMessage))
                .and_then(|instance| {
                    json::validate(&instance, schema)
                        .map_err(|_err| Error::Api(ErrorCode::CorruptMessage))
                })
        } else {
            debug!(content_type = self.content_type, "accepted without validation");
            Ok(())
        }
    }
}

impl Validator for PayloadValidator {
    #[instrument(skip(self, batch))]
    fn validate(&self, batch: &Batch) -> Result<()> {
        let Some(schema) = self.schema.as_deref() else {
            return Ok(());
        };

        batch
            .records
            .iter()
            .try_for_each(|record| self.value(schema, record.value.as_ref()))
            .inspect_err(|_err| {
                VALIDATION_ERROR.add(1, &[KeyValue::new("kind", "payload")]);
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_sans_io::record::Record;
    use serde_json::json;

    fn order() -> Arc<Schema> {
        Arc::new(
            serde_json::from_value(json!({
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "string"}, "quantity": {"type": "integer"}}
            }))
            .unwrap(),
        )
    }

    fn batch(values: &[Option<&'static str>]) -> Result<Batch> {
        values
            .iter()
            .enumerate()
            .fold(Batch::builder(), |builder, (index, value)| {
                builder.record(
                    Record::builder()
                        .offset_delta(i32::try_from(index).unwrap())
                        .value(value.map(|value| Bytes::from_static(value.as_bytes()))),
                )
            })
            .build()
            .map_err(|err| Error::Message(err.to_string()))
    }

    #[test]
    fn json_payloads() -> Result<()> {
        let validator = PayloadValidator::new(Some(order()), "application/json");

        validator.validate(&batch(&[
            Some(r#"{"id": "abc", "quantity": 3}"#),
            Some(r#"{"id": "def"}"#),
        ])?)?;

        assert!(matches!(
            validator.validate(&batch(&[
                Some(r#"{"id": "abc"}"#),
                Some(r#"{"quantity": 3}"#)
            ])?),
            Err(Error::Api(ErrorCode::CorruptMessage))
        ));

        assert!(validator.validate(&batch(&[Some("not json")])?).is_err());
        assert!(validator.validate(&batch(&[None])?).is_err());
        Ok(())
    }

    #[test]
    fn text_payloads_are_accepted() -> Result<()> {
        let validator = PayloadValidator::new(Some(order()), "text/plain");
        validator.validate(&batch(&[Some("anything")])?)?;
        assert!(validator.validate(&batch(&[None])?).is_err());
        Ok(())
    }

    #[test]
    fn without_schema_everything_is_valid() -> Result<()> {
        let validator = PayloadValidator::new(None, "application/json");
        validator.validate(&batch(&[None, Some("not json")])?)?;
        Ok(())
    }
}
