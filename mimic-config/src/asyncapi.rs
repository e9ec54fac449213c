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

//! AsyncAPI 2 descriptions, used to populate the Kafka store.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{Error, Reference, Result, openapi::Info, reference::Arena, schema::Schema};

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncApi {
    pub asyncapi: String,
    pub info: Info,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub servers: IndexMap<String, Server>,
    #[serde(default)]
    pub channels: IndexMap<String, Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(skip)]
    pub(crate) arena: Arena,
}

impl AsyncApi {
    pub(crate) fn check(&self) -> Result<()> {
        if !self.asyncapi.starts_with("2.") {
            return Err(Error::UnsupportedVersion(self.asyncapi.clone()));
        }

        self.info.check()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Channel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bindings: Option<ChannelBindings>,
}

impl Channel {
    /// The number of partitions declared by a Kafka binding, or 1.
    pub fn partitions(&self) -> i32 {
        self.bindings
            .as_ref()
            .and_then(|bindings| bindings.kafka.as_ref())
            .and_then(|kafka| kafka.partitions)
            .unwrap_or(1)
    }

    /// The topic name declared by a Kafka binding.
    pub fn topic(&self) -> Option<&str> {
        self.bindings
            .as_ref()
            .and_then(|bindings| bindings.kafka.as_ref())
            .and_then(|kafka| kafka.topic.as_deref())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ChannelBindings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kafka: Option<KafkaChannelBinding>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KafkaChannelBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partitions: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i16>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Reference<Message>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Reference<Schema>>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Components {
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub schemas: IndexMap<String, Reference<Schema>>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub messages: IndexMap<String, Reference<Message>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn kafka_bindings() -> Result<(), serde_json::Error> {
        let channel: Channel = serde_json::from_value(json!({
            "bindings": {"kafka": {"partitions": 3, "topic": "orders"}},
            "publish": {"message": {"contentType": "application/json"}}
        }))?;
        assert_eq!(3, channel.partitions());
        assert_eq!(Some("orders"), channel.topic());

        let unbound: Channel = serde_json::from_value(json!({}))?;
        assert_eq!(1, unbound.partitions());
        assert_eq!(None, unbound.topic());
        Ok(())
    }
}
