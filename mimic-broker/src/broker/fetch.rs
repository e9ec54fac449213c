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

use std::{sync::Arc, time::Duration};

use mimic_sans_io::{
    ErrorCode, FetchResponse,
    fetch::{FetchPartition, FetchTopic, FetchableTopicResponse, PartitionData},
    record::deflated,
};
use mimic_storage::{Store, Topic};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;

/// Time left for encoding and writing a response before `max_wait_ms`.
const RESPONSE_MARGIN: Duration = Duration::from_millis(200);

const MAX_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub(crate) struct FetchRequest {
    store: Arc<Store>,
}

impl FetchRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn unknown(partition: &FetchPartition) -> PartitionData {
        PartitionData::default()
            .partition_index(partition.partition)
            .error_code(ErrorCode::UnknownTopicOrPartition.into())
            .high_watermark(-1)
            .last_stable_offset(-1)
            .log_start_offset(-1)
            .aborted_transactions(Some(vec![]))
            .preferred_read_replica(-1)
    }

    fn partition(
        &self,
        topic: Option<&Topic>,
        fetch: &FetchPartition,
        max_bytes: usize,
    ) -> Result<(PartitionData, usize)> {
        let Some(partition) = topic.and_then(|topic| topic.partition(fetch.partition)) else {
            return Ok((Self::unknown(fetch), 0));
        };

        let high_watermark = partition.high_watermark()?;
        let log_start_offset = partition.start_offset()?;

        let data = PartitionData::default()
            .partition_index(fetch.partition)
            .high_watermark(high_watermark)
            .last_stable_offset(high_watermark)
            .log_start_offset(log_start_offset)
            .aborted_transactions(Some(vec![]))
            .preferred_read_replica(-1);

        match partition.read(fetch.fetch_offset, max_bytes) {
            Ok(batch) if batch.records.is_empty() => {
                Ok((data.error_code(ErrorCode::None.into()), 0))
            }

            Ok(batch) => {
                let batch = deflated::Batch::try_from(batch)?;
                let size = batch.size();

                Ok((
                    data.error_code(ErrorCode::None.into())
                        .records(Some(deflated::Frame::new(vec![batch]))),
                    size,
                ))
            }

            Err(error) => {
                debug!(
                    topic = partition.topic(),
                    partition = fetch.partition,
                    fetch_offset = fetch.fetch_offset,
                    ?error
                );

                Ok((data.error_code(error.error_code().into()), 0))
            }
        }
    }

    /// A single pass over every requested partition, returning the
    /// responses with the number of record bytes found.
    fn fetch(
        &self,
        topics: &[FetchTopic],
        max_bytes: usize,
    ) -> Result<(Vec<FetchableTopicResponse>, usize)> {
        let mut remaining = max_bytes;
        let mut bytes = 0;
        let mut responses = vec![];

        for fetch in topics {
            let topic = self.store.topic(&fetch.topic)?;
            let mut partitions = vec![];

            for partition in fetch.partitions.as_deref().unwrap_or_default() {
                let limit = usize::try_from(partition.partition_max_bytes)
                    .ok()
                    .filter(|limit| *limit > 0)
                    .map_or(remaining, |limit| limit.min(remaining));

                let (data, size) = self.partition(topic.as_deref(), partition, limit)?;

                bytes += size;
                remaining = remaining.saturating_sub(size);
                partitions.push(data);
            }

            responses.push(
                FetchableTopicResponse::default()
                    .topic(fetch.topic.clone())
                    .partitions(Some(partitions)),
            );
        }

        Ok((responses, bytes))
    }

    /// Poll the requested partitions until at least `min_bytes` of records
    /// are available, or the wait is over.
    ///
    /// The wait ends `RESPONSE_MARGIN` before `max_wait_ms`, so that the
    /// response reaches the client before it gives up.
    pub(crate) async fn response(
        &self,
        max_wait_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
        topics: Option<&[FetchTopic]>,
        cancellation: &CancellationToken,
    ) -> Result<FetchResponse> {
        let topics = topics.unwrap_or_default();

        let max_wait = Duration::from_millis(u64::try_from(max_wait_ms).unwrap_or_default());
        let min_bytes = usize::try_from(min_bytes).unwrap_or_default();
        let max_bytes = usize::try_from(max_bytes)
            .ok()
            .filter(|max_bytes| *max_bytes > 0)
            .unwrap_or(usize::MAX);

        let deadline = Instant::now() + max_wait.saturating_sub(RESPONSE_MARGIN);
        let poll = MAX_POLL.min(max_wait / 5);
        let mut iteration = 0;

        let responses = loop {
            let (responses, bytes) = self.fetch(topics, max_bytes)?;

            debug!(iteration, bytes, min_bytes, ?max_wait);

            if bytes >= min_bytes || Instant::now() >= deadline {
                break responses;
            }

            tokio::select! {
                _ = sleep(poll) => {}

                _ = cancellation.cancelled() => break responses,
            }

            iteration += 1;
        };

        Ok(FetchResponse::default()
            .error_code(ErrorCode::None.into())
            .session_id(0)
            .responses(Some(responses)))
    }
}
