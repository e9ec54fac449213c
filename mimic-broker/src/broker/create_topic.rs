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
    ErrorCode,
    create_topics::{CreatableTopic, CreatableTopicResult},
};
use mimic_storage::{Store, validate_topic_name};
use tracing::{debug, warn};

use crate::Result;

#[derive(Clone, Debug)]
pub(crate) struct CreateTopic {
    store: Arc<Store>,
}

impl CreateTopic {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// The checks of a create, without creating anything.
    fn validate(&self, topic: &CreatableTopic) -> Result<ErrorCode> {
        if validate_topic_name(&topic.name).is_err() {
            return Ok(ErrorCode::InvalidTopicException);
        }

        if self.store.topic(&topic.name)?.is_some() {
            return Ok(ErrorCode::TopicAlreadyExists);
        }

        if topic.num_partitions == 0 || topic.num_partitions < -1 {
            return Ok(ErrorCode::InvalidPartitions);
        }

        let brokers = self.store.brokers().len();

        if topic.replication_factor == 0
            || topic.replication_factor < -1
            || usize::try_from(topic.replication_factor).is_ok_and(|factor| factor > brokers)
        {
            return Ok(ErrorCode::InvalidReplicationFactor);
        }

        Ok(ErrorCode::None)
    }

    fn create(&self, topic: &CreatableTopic) -> ErrorCode {
        self.store
            .create_topic(&topic.name, topic.num_partitions, topic.replication_factor)
            .map_or_else(
                |err| {
                    warn!(name = topic.name, ?err);
                    err.error_code()
                },
                |_| ErrorCode::None,
            )
    }

    pub(crate) fn response(
        &self,
        topics: Option<&[CreatableTopic]>,
        validate_only: bool,
    ) -> Result<Vec<CreatableTopicResult>> {
        topics
            .unwrap_or_default()
            .iter()
            .map(|topic| {
                debug!(
                    name = topic.name,
                    num_partitions = topic.num_partitions,
                    replication_factor = topic.replication_factor,
                    validate_only
                );

                let error_code = if validate_only {
                    self.validate(topic)?
                } else {
                    self.create(topic)
                };

                Ok(CreatableTopicResult::default()
                    .name(topic.name.clone())
                    .error_code(error_code.into())
                    .error_message(
                        (!error_code.is_none()).then(|| error_code.description().to_owned()),
                    ))
            })
            .collect()
    }
}
