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

use std::sync::Arc;

use mimic_sans_io::{
    ErrorCode, MetadataResponse,
    metadata::{
        MetadataRequestTopic, MetadataResponseBroker, MetadataResponsePartition,
        MetadataResponseTopic,
    },
};
use mimic_storage::{Store, Topic, validate_topic_name};
use tracing::debug;

use crate::Result;

#[derive(Clone, Debug)]
pub(crate) struct MetadataRequest {
    store: Arc<Store>,
}

impl MetadataRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn topic(topic: &Topic) -> MetadataResponseTopic {
        MetadataResponseTopic::default()
            .error_code(ErrorCode::None.into())
            .name(topic.name().to_owned())
            .partitions(Some(
                topic
                    .partitions()
                    .iter()
                    .map(|partition| {
                        MetadataResponsePartition::default()
                            .error_code(ErrorCode::None.into())
                            .partition_index(partition.index())
                            .leader_id(partition.leader())
                            .leader_epoch(0)
                            .replica_nodes(Some(partition.replicas().to_vec()))
                            .isr_nodes(Some(partition.replicas().to_vec()))
                            .offline_replicas(Some(vec![]))
                    })
                    .collect(),
            ))
            .topic_authorized_operations(i32::MIN)
    }

    fn missing(name: &str, error_code: ErrorCode) -> MetadataResponseTopic {
        MetadataResponseTopic::default()
            .error_code(error_code.into())
            .name(name.to_owned())
            .partitions(Some(vec![]))
            .topic_authorized_operations(i32::MIN)
    }

    /// Every topic when `topics` is absent or empty, otherwise only those
    /// named.
    pub(crate) fn response(
        &self,
        topics: Option<&[MetadataRequestTopic]>,
    ) -> Result<MetadataResponse> {
        let brokers = self
            .store
            .brokers()
            .iter()
            .map(|broker| {
                MetadataResponseBroker::default()
                    .node_id(broker.id())
                    .host(broker.host().to_owned())
                    .port(broker.port())
            })
            .collect();

        let topics = match topics {
            Some(requested) if !requested.is_empty() => requested
                .iter()
                .map(|requested| {
                    if validate_topic_name(&requested.name).is_err() {
                        return Ok(Self::missing(
                            &requested.name,
                            ErrorCode::InvalidTopicException,
                        ));
                    }

                    self.store.topic(&requested.name).map(|topic| {
                        topic.map_or_else(
                            || Self::missing(&requested.name, ErrorCode::UnknownTopicOrPartition),
                            |topic| Self::topic(&topic),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,

            _ => self
                .store
                .topics()?
                .iter()
                .map(|topic| Self::topic(topic))
                .collect(),
        };

        debug!(?topics);

        Ok(MetadataResponse::default()
            .brokers(Some(brokers))
            .cluster_id(self.store.cluster_id().map(ToOwned::to_owned))
            .controller_id(self.store.coordinator().id())
            .topics(Some(topics))
            .cluster_authorized_operations(i32::MIN))
    }
}
