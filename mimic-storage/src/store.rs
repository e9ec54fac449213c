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
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicI64, Ordering},
    },
};

use mimic_sans_io::ErrorCode;
use mimic_schema::Validator;
use tracing::{debug, instrument};

use crate::{
    DEFAULT_SEGMENT_BYTES, Error, Result, group::Group, partition::Partition,
    validate_topic_name,
};

/// A broker of the cluster, immutable for the lifetime of the process.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Broker {
    id: i32,
    host: String,
    port: i32,
}

impl Broker {
    pub fn new(id: i32, host: impl Into<String>, port: i32) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }
}

#[derive(Debug)]
pub struct Topic {
    name: String,
    replication_factor: i16,
    partitions: Vec<Partition>,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replication_factor(&self) -> i16 {
        self.replication_factor
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition(&self, index: i32) -> Option<&Partition> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.partitions.get(index))
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Builder {
    cluster_id: Option<String>,
    brokers: Vec<Broker>,
    segment_bytes: usize,
}

impl Builder {
    #[must_use]
    pub fn cluster_id(self, cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: Some(cluster_id.into()),
            ..self
        }
    }

    #[must_use]
    pub fn broker(mut self, broker: Broker) -> Self {
        self.brokers.push(broker);
        self
    }

    #[must_use]
    pub fn segment_bytes(self, segment_bytes: usize) -> Self {
        Self {
            segment_bytes,
            ..self
        }
    }

    pub fn build(self) -> Result<Store> {
        let mut brokers = self.brokers.into_iter();

        let coordinator = brokers
            .next()
            .ok_or(Error::Message(String::from("a store needs at least one broker")))?;

        Ok(Store {
            cluster_id: self.cluster_id,
            coordinator,
            brokers: brokers.collect(),
            segment_bytes: if self.segment_bytes == 0 {
                DEFAULT_SEGMENT_BYTES
            } else {
                self.segment_bytes
            },
            topics: RwLock::new(BTreeMap::new()),
            groups: RwLock::new(BTreeMap::new()),
            producer_id: AtomicI64::new(1),
        })
    }
}

/// The cluster: brokers, topics and consumer groups.
#[derive(Debug)]
pub struct Store {
    cluster_id: Option<String>,
    coordinator: Broker,
    brokers: Vec<Broker>,
    segment_bytes: usize,
    topics: RwLock<BTreeMap<String, Arc<Topic>>>,
    groups: RwLock<BTreeMap<String, Arc<Group>>>,
    producer_id: AtomicI64,
}

impl Store {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    /// Every broker, in declaration order.
    pub fn brokers(&self) -> Vec<Broker> {
        let mut brokers = Vec::with_capacity(self.brokers.len() + 1);
        brokers.push(self.coordinator.clone());
        brokers.extend(self.brokers.iter().cloned());
        brokers
    }

    /// The first broker, which coordinates every group.
    pub fn coordinator(&self) -> &Broker {
        &self.coordinator
    }

    pub fn create_topic(
        &self,
        name: &str,
        partitions: i32,
        replication: i16,
    ) -> Result<Arc<Topic>> {
        self.create_topic_with_validator(name, partitions, replication, None)
    }

    /// Create a topic, each partition checking produced batches with
    /// `validator`.
    ///
    /// A partition count or replication factor of -1 takes the default of 1.
    #[instrument(skip(self, validator))]
    pub fn create_topic_with_validator(
        &self,
        name: &str,
        partitions: i32,
        replication: i16,
        validator: Option<Arc<dyn Validator + Send + Sync>>,
    ) -> Result<Arc<Topic>> {
        validate_topic_name(name)?;

        let partitions = if partitions == -1 { 1 } else { partitions };
        let replication = if replication == -1 { 1 } else { replication };

        if partitions < 1 {
            return Err(Error::Api(ErrorCode::InvalidPartitions));
        }

        let brokers = self.brokers();

        if replication < 1 || usize::try_from(replication)? > brokers.len() {
            return Err(Error::Api(ErrorCode::InvalidReplicationFactor));
        }

        let mut topics = self.topics.write()?;

        if topics.contains_key(name) {
            return Err(Error::Api(ErrorCode::TopicAlreadyExists));
        }

        let replicas = usize::try_from(replication)?;

        let partitions = (0..partitions)
            .map(|index| {
                let first = usize::try_from(index)?;

                let replicas = (0..replicas)
                    .map(|replica| brokers[(first + replica) % brokers.len()].id)
                    .collect::<Vec<_>>();

                let leader = replicas.first().copied().unwrap_or(self.coordinator.id);

                Ok(
                    Partition::new(name, index, leader, replicas, self.segment_bytes)
                        .with_validator(validator.clone()),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let topic = Arc::new(Topic {
            name: name.to_owned(),
            replication_factor: replication,
            partitions,
        });

        debug!(partitions = topic.partitions.len());

        _ = topics.insert(name.to_owned(), topic.clone());
        Ok(topic)
    }

    pub fn topic(&self, name: &str) -> Result<Option<Arc<Topic>>> {
        self.topics
            .read()
            .map(|topics| topics.get(name).cloned())
            .map_err(Into::into)
    }

    /// Every topic, ordered by name.
    pub fn topics(&self) -> Result<Vec<Arc<Topic>>> {
        self.topics
            .read()
            .map(|topics| topics.values().cloned().collect())
            .map_err(Into::into)
    }

    pub fn group(&self, name: &str) -> Result<Option<Arc<Group>>> {
        self.groups
            .read()
            .map(|groups| groups.get(name).cloned())
            .map_err(Into::into)
    }

    pub fn group_or_create(&self, name: &str) -> Result<Arc<Group>> {
        if let Some(group) = self.group(name)? {
            return Ok(group);
        }

        self.groups
            .write()
            .map(|mut groups| {
                groups
                    .entry(name.to_owned())
                    .or_insert_with(|| {
                        debug!(group = name, coordinator = self.coordinator.id);
                        Arc::new(Group::new(name, self.coordinator.id))
                    })
                    .clone()
            })
            .map_err(Into::into)
    }

    /// Every group, ordered by name.
    pub fn groups(&self) -> Result<Vec<Arc<Group>>> {
        self.groups
            .read()
            .map(|groups| groups.values().cloned().collect())
            .map_err(Into::into)
    }

    /// A producer id, unique for the lifetime of this store.
    pub fn next_producer_id(&self) -> i64 {
        self.producer_id.fetch_add(1, Ordering::SeqCst)
    }
}
