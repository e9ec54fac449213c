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

//! Brokers and topics described by an AsyncAPI document.
//!
//! Each declared server becomes a broker, numbered from 1 in declaration
//! order, the first coordinating every group. Each channel becomes a topic,
//! partitioned by its Kafka binding, whose produced records are checked
//! against the payload schema of the channel's publish message.

use std::{sync::Arc, time::Duration};

use mimic_config::{
    AsyncApi,
    asyncapi::{Channel, Server},
};
use mimic_schema::{PayloadValidator, Validator};
use mimic_storage::Store;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};
use url::Url;

use crate::{
    Error, Result,
    broker::Broker,
    coordinator::group::DEFAULT_JOIN_WINDOW,
};

const DEFAULT_LISTENER: &str = "kafka://localhost:9092";
const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Debug)]
pub struct Bootstrap {
    store: Arc<Store>,
    listeners: Vec<(i32, Url)>,
    join_window: Duration,
    cancellation: CancellationToken,
}

impl Bootstrap {
    #[instrument(skip_all, fields(title = %api.info.title))]
    pub fn new(api: &AsyncApi) -> Result<Self> {
        let listeners = if api.servers.is_empty() {
            vec![(1, Url::parse(DEFAULT_LISTENER)?)]
        } else {
            api.servers
                .values()
                .zip(1..)
                .map(|(server, node_id)| listener(server).map(|url| (node_id, url)))
                .collect::<Result<Vec<_>>>()?
        };

        let store = listeners
            .iter()
            .try_fold(Store::builder(), |builder, (node_id, url)| {
                url.host_str()
                    .ok_or_else(|| Error::UnsupportedListener(url.clone()))
                    .map(|host| {
                        builder.broker(mimic_storage::Broker::new(
                            *node_id,
                            host,
                            i32::from(url.port().unwrap_or(9092)),
                        ))
                    })
            })?
            .cluster_id(api.info.title.as_str())
            .build()
            .map(Arc::new)?;

        for (name, channel) in &api.channels {
            let topic = channel.topic().unwrap_or(name);
            debug!(channel = %name, topic, partitions = channel.partitions());

            _ = store
                .create_topic_with_validator(
                    topic,
                    channel.partitions(),
                    replicas(channel),
                    validator(channel),
                )
                .inspect_err(|err| error!(?err, topic))?;
        }

        Ok(Self {
            store,
            listeners,
            join_window: DEFAULT_JOIN_WINDOW,
            cancellation: CancellationToken::new(),
        })
    }

    pub fn join_window(self, join_window: Duration) -> Self {
        Self {
            join_window,
            ..self
        }
    }

    pub fn cancellation(self, cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..self
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// One broker per declared server, sharing the store and shutdown.
    pub fn brokers(&self) -> Result<Vec<Broker>> {
        self.listeners
            .iter()
            .map(|(node_id, listener)| {
                Broker::builder()
                    .node_id(*node_id)
                    .listener(listener.clone())
                    .store(self.store.clone())
                    .join_window(self.join_window)
                    .cancellation(self.cancellation.child_token())
                    .build()
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    /// Listen on every broker until shutdown, or the first listener fails.
    pub async fn main(self) -> Result<()> {
        let mut set = JoinSet::new();

        for broker in self.brokers()? {
            _ = set.spawn(broker.listen());
        }

        let mut outcome = Ok(());

        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined.map_err(Error::from).and_then(|listened| listened) {
                error!(?err);
                self.cancellation.cancel();

                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        outcome
    }
}

fn listener(server: &Server) -> Result<Url> {
    let url = if server.url.contains("://") {
        Url::parse(&server.url)?
    } else {
        Url::parse(&format!("kafka://{}", server.url))?
    };

    if matches!(url.scheme(), "kafka" | "tcp") {
        Ok(url)
    } else {
        Err(Error::UnsupportedListener(url))
    }
}

fn replicas(channel: &Channel) -> i16 {
    channel
        .bindings
        .as_ref()
        .and_then(|bindings| bindings.kafka.as_ref())
        .and_then(|kafka| kafka.replicas)
        .unwrap_or(-1)
}

fn validator(channel: &Channel) -> Option<Arc<dyn Validator + Send + Sync>> {
    let message = channel.publish.as_ref()?.message.as_ref()?.value()?;

    let content_type = message
        .content_type
        .clone()
        .unwrap_or_else(|| String::from(DEFAULT_CONTENT_TYPE));

    Some(Arc::new(PayloadValidator::new(
        message.payload.as_ref().and_then(|payload| payload.value()),
        content_type,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mimic_config::{Document, MemoryReader};
    use mimic_sans_io::{
        ErrorCode,
        record::{Record, inflated},
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn parse(document: serde_json::Value) -> Result<Arc<AsyncApi>> {
        let source = Url::parse("memory:///asyncapi.json")?;

        match Document::parse(&source, document, &MemoryReader::new())? {
            Document::AsyncApi(api) => Ok(api),
            Document::OpenApi(_) => Err(Error::Message(String::from("not asyncapi"))),
        }
    }

    fn batch(value: &'static [u8]) -> Result<inflated::Batch> {
        inflated::Batch::builder()
            .record(Record::builder().value(Some(Bytes::from_static(value))))
            .build()
            .map_err(Into::into)
    }

    #[test]
    fn servers_become_brokers() -> Result<()> {
        let api = parse(json!({
            "asyncapi": "2.6.0",
            "info": {"title": "orders", "version": "1.0"},
            "servers": {
                "first": {"url": "localhost:19092", "protocol": "kafka"},
                "second": {"url": "kafka://127.0.0.1:19093", "protocol": "kafka"}
            }
        }))?;

        let bootstrap = Bootstrap::new(&api)?;
        let store = bootstrap.store();

        assert_eq!(Some("orders"), store.cluster_id());
        assert_eq!(
            vec![(1, "localhost", 19092), (2, "127.0.0.1", 19093)],
            store
                .brokers()
                .iter()
                .map(|broker| (broker.id(), broker.host(), broker.port()))
                .collect::<Vec<_>>()
        );
        assert_eq!(1, store.coordinator().id());

        let brokers = bootstrap.brokers()?;
        assert_eq!(
            vec![1, 2],
            brokers.iter().map(Broker::node_id).collect::<Vec<_>>()
        );

        Ok(())
    }

    #[test]
    fn without_servers() -> Result<()> {
        let api = parse(json!({
            "asyncapi": "2.6.0",
            "info": {"title": "empty", "version": "1.0"}
        }))?;

        let bootstrap = Bootstrap::new(&api)?;
        assert_eq!(9092, bootstrap.store().coordinator().port());
        assert!(bootstrap.store().topics()?.is_empty());
        Ok(())
    }

    #[test]
    fn unsupported_server_protocol() -> Result<()> {
        let api = parse(json!({
            "asyncapi": "2.6.0",
            "info": {"title": "mqtt", "version": "1.0"},
            "servers": {"broker": {"url": "mqtt://localhost:1883", "protocol": "mqtt"}}
        }))?;

        assert!(matches!(
            Bootstrap::new(&api),
            Err(Error::UnsupportedListener(_))
        ));
        Ok(())
    }

    #[test]
    fn channels_become_topics() -> Result<()> {
        let api = parse(json!({
            "asyncapi": "2.6.0",
            "info": {"title": "orders", "version": "1.0"},
            "channels": {
                "order.created": {
                    "bindings": {"kafka": {"partitions": 3}},
                    "publish": {
                        "message": {
                            "contentType": "application/json",
                            "payload": {
                                "type": "object",
                                "required": ["id"],
                                "properties": {"id": {"type": "integer"}}
                            }
                        }
                    }
                },
                "audit": {
                    "bindings": {"kafka": {"topic": "audit-log"}}
                }
            }
        }))?;

        let bootstrap = Bootstrap::new(&api)?;
        let store = bootstrap.store();

        assert_eq!(
            vec![("audit-log".to_owned(), 1), ("order.created".to_owned(), 3)],
            store
                .topics()?
                .iter()
                .map(|topic| (topic.name().to_owned(), topic.partitions().len()))
                .collect::<Vec<_>>()
        );

        let orders = store
            .topic("order.created")?
            .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;
        let partition = orders
            .partition(0)
            .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

        assert_eq!(0, partition.write(&batch(br#"{"id": 42}"#)?)?);
        assert!(partition.write(&batch(br#"{"name": "x"}"#)?).is_err());
        assert!(partition.write(&batch(b"not json")?).is_err());
        assert_eq!(1, partition.high_watermark()?);

        let audit = store
            .topic("audit-log")?
            .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;
        let partition = audit
            .partition(0)
            .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;
        assert_eq!(0, partition.write(&batch(b"anything")?)?);

        Ok(())
    }

    #[tokio::test]
    async fn shutdown_stops_every_listener() -> Result<()> {
        let api = parse(json!({
            "asyncapi": "2.6.0",
            "info": {"title": "local", "version": "1.0"},
            "servers": {
                "a": {"url": "127.0.0.1:0", "protocol": "kafka"},
                "b": {"url": "127.0.0.1:0", "protocol": "kafka"}
            }
        }))?;

        let bootstrap = Bootstrap::new(&api)?;
        let cancellation = CancellationToken::new();
        let main = tokio::spawn(bootstrap.cancellation(cancellation.clone()).main());

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancellation.cancel();

        tokio::time::timeout(Duration::from_secs(5), main)
            .await
            .map_err(|_| Error::Message(String::from("listeners did not stop")))??
    }
}
