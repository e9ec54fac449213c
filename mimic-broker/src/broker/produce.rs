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
    Error as SansIoError, ErrorCode, ProduceResponse,
    produce::{
        PartitionProduceData, PartitionProduceResponse, TopicProduceData, TopicProduceResponse,
    },
    record::{deflated, inflated},
};
use mimic_storage::{Partition, Store};
use tracing::{debug, error};

use crate::{Error, Result};

#[derive(Clone, Debug)]
pub(crate) struct ProduceRequest {
    store: Arc<Store>,
}

impl ProduceRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn error(&self, index: i32, error_code: ErrorCode) -> PartitionProduceResponse {
        PartitionProduceResponse::default()
            .index(index)
            .error_code(error_code.into())
            .base_offset(-1)
            .log_append_time_ms(-1)
            .log_start_offset(-1)
            .record_errors(Some(vec![]))
            .error_message(Some(error_code.description().to_owned()))
    }

    /// Append every batch, returning the offset of the first record.
    fn append(partition: &Partition, frame: &deflated::Frame) -> Result<i64> {
        let mut base_offset = None;

        for deflated in &frame.batches {
            let batch = inflated::Batch::try_from(deflated)?;
            let offset = partition.write(&batch)?;
            _ = base_offset.get_or_insert(offset);
        }

        base_offset.ok_or(Error::Api(ErrorCode::CorruptMessage))
    }

    fn partition(
        &self,
        name: &str,
        data: &PartitionProduceData,
    ) -> Result<PartitionProduceResponse> {
        let Some(topic) = self.store.topic(name)? else {
            return Ok(self.error(data.index, ErrorCode::UnknownTopicOrPartition));
        };

        let Some(partition) = topic.partition(data.index) else {
            return Ok(self.error(data.index, ErrorCode::UnknownTopicOrPartition));
        };

        let Some(ref frame) = data.records else {
            return Ok(self.error(data.index, ErrorCode::CorruptMessage));
        };

        match Self::append(partition, frame) {
            Ok(base_offset) => {
                debug!(name, index = data.index, base_offset);

                Ok(PartitionProduceResponse::default()
                    .index(data.index)
                    .error_code(ErrorCode::None.into())
                    .base_offset(base_offset)
                    .log_append_time_ms(-1)
                    .log_start_offset(partition.start_offset()?)
                    .record_errors(Some(vec![])))
            }

            Err(Error::Api(error_code)) => Ok(self.error(data.index, error_code)),

            Err(Error::Storage(error)) => {
                debug!(name, index = data.index, ?error);
                Ok(self.error(data.index, error.error_code()))
            }

            Err(Error::KafkaSansIo(SansIoError::CompressionNotSupported(compression))) => {
                debug!(name, index = data.index, ?compression);
                Ok(self.error(data.index, ErrorCode::UnsupportedCompressionType))
            }

            Err(err) => {
                error!(name, index = data.index, ?err);
                Ok(self.error(data.index, ErrorCode::UnknownServerError))
            }
        }
    }

    fn topic(&self, topic: &TopicProduceData) -> Result<TopicProduceResponse> {
        topic
            .partition_data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|data| self.partition(&topic.name, data))
            .collect::<Result<Vec<_>>>()
            .map(|partitions| {
                TopicProduceResponse::default()
                    .name(topic.name.clone())
                    .partition_responses(Some(partitions))
            })
    }

    pub(crate) fn response(
        &self,
        transactional_id: Option<&str>,
        acks: i16,
        topic_data: Option<&[TopicProduceData]>,
    ) -> Result<ProduceResponse> {
        debug!(transactional_id, acks);

        topic_data
            .unwrap_or_default()
            .iter()
            .map(|topic| self.topic(topic))
            .collect::<Result<Vec<_>>>()
            .map(|responses| ProduceResponse::default().responses(Some(responses)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use mimic_sans_io::record::Record;
    use mimic_storage::Broker;
    use pretty_assertions::assert_eq;

    fn topic_data(name: &str, index: i32, values: &[&'static [u8]]) -> Result<TopicProduceData> {
        let batch = values
            .iter()
            .enumerate()
            .try_fold(inflated::Batch::builder(), |builder, (delta, value)| {
                i32::try_from(delta).map(|delta| {
                    builder.record(
                        Record::builder()
                            .offset_delta(delta)
                            .value(Some(Bytes::from_static(value))),
                    )
                })
            })?
            .build()
            .and_then(deflated::Batch::try_from)?;

        Ok(TopicProduceData::default().name(name.into()).partition_data(Some(vec![
            PartitionProduceData::default()
                .index(index)
                .records(Some(deflated::Frame::new(vec![batch]))),
        ])))
    }

    fn outcomes(response: ProduceResponse) -> Vec<(i16, i64)> {
        response
            .responses
            .unwrap_or_default()
            .into_iter()
            .flat_map(|topic| topic.partition_responses.unwrap_or_default())
            .map(|partition| (partition.error_code, partition.base_offset))
            .collect()
    }

    #[test]
    fn base_offsets_advance() -> Result<()> {
        let store = Store::builder()
            .broker(Broker::new(111, "localhost", 9092))
            .build()
            .map(Arc::new)?;

        _ = store.create_topic("events", 1, 1)?;

        let produce = ProduceRequest::with_store(store);
        let none = i16::from(ErrorCode::None);

        assert_eq!(
            vec![(none, 0)],
            outcomes(produce.response(None, -1, Some(&[topic_data("events", 0, &[b"a", b"b"])?]))?)
        );

        assert_eq!(
            vec![(none, 2)],
            outcomes(produce.response(None, 1, Some(&[topic_data("events", 0, &[b"c"])?]))?)
        );

        let unknown = i16::from(ErrorCode::UnknownTopicOrPartition);

        assert_eq!(
            vec![(unknown, -1), (unknown, -1)],
            outcomes(produce.response(
                None,
                1,
                Some(&[
                    topic_data("events", 3, &[b"d"])?,
                    topic_data("missing", 0, &[b"e"])?
                ])
            )?)
        );
        Ok(())
    }
}
