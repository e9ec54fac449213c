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
    ErrorCode, ListOffset, ListOffsetsResponse,
    list_offsets::{
        ListOffsetsPartition, ListOffsetsPartitionResponse, ListOffsetsTopic,
        ListOffsetsTopicResponse,
    },
    to_timestamp,
};
use mimic_storage::{Partition, Store};
use tracing::debug;

use crate::Result;

#[derive(Clone, Debug)]
pub(crate) struct ListOffsetsRequest {
    store: Arc<Store>,
}

impl ListOffsetsRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn offset(partition: &Partition, list: ListOffset) -> Result<(i64, i64)> {
        match list {
            ListOffset::Earliest => Ok((-1, partition.start_offset()?.max(0))),
            ListOffset::Latest => Ok((-1, partition.offset()?.max(0))),
            ListOffset::Timestamp(system_time) => {
                let timestamp = to_timestamp(&system_time)?;
                Ok((timestamp, partition.offset_for_timestamp(timestamp)?))
            }
        }
    }

    fn partition(
        &self,
        partition: Option<&Partition>,
        request: &ListOffsetsPartition,
    ) -> Result<ListOffsetsPartitionResponse> {
        let response =
            ListOffsetsPartitionResponse::default().partition_index(request.partition_index);

        let Some(partition) = partition else {
            return Ok(response
                .error_code(ErrorCode::UnknownTopicOrPartition.into())
                .timestamp(-1)
                .offset(-1)
                .leader_epoch(-1));
        };

        let Ok(list) = ListOffset::try_from(request.timestamp) else {
            return Ok(response
                .error_code(ErrorCode::InvalidRequest.into())
                .timestamp(-1)
                .offset(-1)
                .leader_epoch(-1));
        };

        let (timestamp, offset) = Self::offset(partition, list)?;

        debug!(
            topic = partition.topic(),
            index = partition.index(),
            requested = request.timestamp,
            offset
        );

        Ok(response
            .error_code(ErrorCode::None.into())
            .old_style_offsets(Some(vec![offset]))
            .timestamp(timestamp)
            .offset(offset)
            .leader_epoch(0))
    }

    pub(crate) fn response(
        &self,
        topics: Option<&[ListOffsetsTopic]>,
    ) -> Result<ListOffsetsResponse> {
        let mut responses = vec![];

        for topic in topics.unwrap_or_default() {
            let known = self.store.topic(&topic.name)?;

            let partitions = topic
                .partitions
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|request| {
                    self.partition(
                        known
                            .as_ref()
                            .and_then(|known| known.partition(request.partition_index)),
                        request,
                    )
                })
                .collect::<Result<Vec<_>>>()?;

            responses.push(
                ListOffsetsTopicResponse::default()
                    .name(topic.name.clone())
                    .partitions(Some(partitions)),
            );
        }

        Ok(ListOffsetsResponse::default().topics(Some(responses)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mimic_sans_io::record::{Record, inflated::Batch};
    use mimic_storage::Broker;
    use pretty_assertions::assert_eq;

    fn list(name: &str, timestamps: &[i64]) -> ListOffsetsTopic {
        ListOffsetsTopic::default().name(name.into()).partitions(Some(
            timestamps
                .iter()
                .map(|timestamp| {
                    ListOffsetsPartition::default()
                        .partition_index(0)
                        .timestamp(*timestamp)
                })
                .collect(),
        ))
    }

    fn offsets(response: ListOffsetsResponse) -> Vec<(i16, i64)> {
        response
            .topics
            .unwrap_or_default()
            .into_iter()
            .flat_map(|topic| topic.partitions.unwrap_or_default())
            .map(|partition| (partition.error_code, partition.offset))
            .collect()
    }

    #[test]
    fn earliest_latest_and_by_time() -> Result<()> {
        let store = Store::builder()
            .broker(Broker::new(111, "localhost", 9092))
            .build()
            .map(Arc::new)?;

        let topic = store.create_topic("clicks", 1, 1)?;

        let batch = Batch::builder()
            .base_timestamp(1_000)
            .record(Record::builder().value(Some(Bytes::from_static(b"a"))))
            .record(
                Record::builder()
                    .offset_delta(1)
                    .timestamp_delta(500)
                    .value(Some(Bytes::from_static(b"b"))),
            )
            .build()?;

        if let Some(partition) = topic.partition(0) {
            _ = partition.write(&batch)?;
        }

        let list_offsets = ListOffsetsRequest::with_store(store);

        let none = i16::from(ErrorCode::None);

        assert_eq!(
            vec![(none, 0), (none, 1), (none, 1), (none, -1)],
            offsets(list_offsets.response(Some(&[list("clicks", &[-2, -1, 1_200, 9_000])]))?)
        );

        assert_eq!(
            vec![(i16::from(ErrorCode::UnknownTopicOrPartition), -1)],
            offsets(list_offsets.response(Some(&[list("missing", &[-1])]))?)
        );
        Ok(())
    }
}
