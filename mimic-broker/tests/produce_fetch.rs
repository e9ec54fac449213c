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

use std::time::Duration;

use bytes::Bytes;
use common::{Client, init_tracing, start, store};
use mimic_broker::{Error, Result};
use mimic_sans_io::{
    ErrorCode, FetchRequest, FetchResponse, ListOffsetsRequest, ListOffsetsResponse,
    MetadataRequest, MetadataResponse, ProduceRequest, ProduceResponse,
    fetch::{FetchPartition, FetchTopic},
    list_offsets::{ListOffsetsPartition, ListOffsetsTopic},
    metadata::MetadataRequestTopic,
    produce::{PartitionProduceData, TopicProduceData},
    record::{Record, deflated, inflated},
};
use pretty_assertions::assert_eq;

pub mod common;

fn records(entries: &[(&'static str, &'static str)]) -> Result<deflated::Frame> {
    entries
        .iter()
        .enumerate()
        .try_fold(inflated::Batch::builder(), |builder, (delta, &(key, value))| {
            i32::try_from(delta).map(|delta| {
                builder.record(
                    Record::builder()
                        .offset_delta(delta)
                        .key(Some(Bytes::from_static(key.as_bytes())))
                        .value(Some(Bytes::from_static(value.as_bytes()))),
                )
            })
        })?
        .build()
        .and_then(deflated::Batch::try_from)
        .map(|batch| deflated::Frame::new(vec![batch]))
        .map_err(Into::into)
}

fn produce(topic: &str, frame: deflated::Frame) -> ProduceRequest {
    ProduceRequest::default()
        .acks(-1)
        .timeout_ms(1_000)
        .topic_data(Some(vec![
            TopicProduceData::default()
                .name(topic.into())
                .partition_data(Some(vec![
                    PartitionProduceData::default()
                        .index(0)
                        .records(Some(frame)),
                ])),
        ]))
}

fn fetch(topic: &str, offset: i64, max_wait_ms: i32) -> FetchRequest {
    FetchRequest::default()
        .replica_id(-1)
        .max_wait_ms(max_wait_ms)
        .min_bytes(1)
        .max_bytes(500)
        .isolation_level(0)
        .topics(Some(vec![
            FetchTopic::default()
                .topic(topic.into())
                .partitions(Some(vec![
                    FetchPartition::default()
                        .partition(0)
                        .fetch_offset(offset)
                        .log_start_offset(-1)
                        .partition_max_bytes(500),
                ])),
        ]))
}

#[tokio::test]
async fn produce_then_fetch() -> Result<()> {
    let _guard = init_tracing()?;

    let store = store()?;
    _ = store.create_topic("foo", 1, 1)?;

    let (addr, broker) = start(store, Duration::from_millis(500)).await?;
    let mut client = Client::connect(addr).await?;

    let produced: ProduceResponse = client
        .call(7, produce("foo", records(&[("k1", "v1"), ("k2", "v2")])?))
        .await?;

    let partition = produced
        .responses
        .as_deref()
        .and_then(|topics| topics.first())
        .and_then(|topic| topic.partition_responses.as_deref())
        .and_then(|partitions| partitions.first())
        .ok_or(Error::Message(String::from("no produce response")))?;

    assert_eq!(i16::from(ErrorCode::None), partition.error_code);
    assert_eq!(0, partition.base_offset);

    let latest: ListOffsetsResponse = client
        .call(
            4,
            ListOffsetsRequest::default()
                .replica_id(-1)
                .isolation_level(0)
                .topics(Some(vec![
                    ListOffsetsTopic::default()
                        .name("foo".into())
                        .partitions(Some(vec![
                            ListOffsetsPartition::default()
                                .partition_index(0)
                                .current_leader_epoch(-1)
                                .timestamp(-1),
                        ])),
                ])),
        )
        .await?;

    assert_eq!(
        Some(1),
        latest
            .topics
            .as_deref()
            .and_then(|topics| topics.first())
            .and_then(|topic| topic.partitions.as_deref())
            .and_then(|partitions| partitions.first())
            .map(|partition| partition.offset)
    );

    let fetched: FetchResponse = client.call(6, fetch("foo", 0, 1_000)).await?;

    let data = fetched
        .responses
        .as_deref()
        .and_then(|topics| topics.first())
        .and_then(|topic| topic.partitions.as_deref())
        .and_then(|partitions| partitions.first())
        .ok_or(Error::Message(String::from("no fetch response")))?;

    assert_eq!(i16::from(ErrorCode::None), data.error_code);
    assert_eq!(2, data.high_watermark);

    let fetched = data
        .records
        .as_ref()
        .map(inflated::Frame::try_from)
        .transpose()?
        .map(|frame| {
            frame
                .batches
                .iter()
                .flat_map(|batch| {
                    batch.records.iter().map(|record| {
                        (
                            batch.base_offset + i64::from(record.offset_delta),
                            record.key.clone(),
                            record.value.clone(),
                        )
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    assert_eq!(
        vec![
            (
                0,
                Some(Bytes::from_static(b"k1")),
                Some(Bytes::from_static(b"v1"))
            ),
            (
                1,
                Some(Bytes::from_static(b"k2")),
                Some(Bytes::from_static(b"v2"))
            ),
        ],
        fetched
    );

    broker.shutdown();
    Ok(())
}

#[tokio::test]
async fn fetch_at_high_watermark_waits() -> Result<()> {
    let _guard = init_tracing()?;

    let store = store()?;
    _ = store.create_topic("idle", 1, 1)?;

    let (addr, broker) = start(store, Duration::from_millis(500)).await?;
    let mut client = Client::connect(addr).await?;

    let started = tokio::time::Instant::now();
    let fetched: FetchResponse = client.call(6, fetch("idle", 0, 500)).await?;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(250), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(500), "{elapsed:?}");

    assert_eq!(
        Some(i16::from(ErrorCode::None)),
        fetched
            .responses
            .as_deref()
            .and_then(|topics| topics.first())
            .and_then(|topic| topic.partitions.as_deref())
            .and_then(|partitions| partitions.first())
            .map(|partition| partition.error_code)
    );

    broker.shutdown();
    Ok(())
}

#[tokio::test]
async fn metadata_invalid_topic() -> Result<()> {
    let _guard = init_tracing()?;

    let store = store()?;
    _ = store.create_topic("valid", 3, 1)?;

    let (addr, broker) = start(store, Duration::from_millis(500)).await?;
    let mut client = Client::connect(addr).await?;

    let metadata: MetadataResponse = client
        .call(
            7,
            MetadataRequest::default()
                .topics(Some(vec![
                    MetadataRequestTopic::default().name("event?".into()),
                ]))
                .allow_auto_topic_creation(false),
        )
        .await?;

    let topics = metadata.topics.unwrap_or_default();
    assert_eq!(1, topics.len());
    assert_eq!("event?", topics[0].name);
    assert_eq!(i16::from(ErrorCode::InvalidTopicException), topics[0].error_code);

    let metadata: MetadataResponse = client
        .call(7, MetadataRequest::default().topics(None))
        .await?;

    assert_eq!(Some("mimic"), metadata.cluster_id.as_deref());
    assert_eq!(
        vec![("valid".to_owned(), 3)],
        metadata
            .topics
            .unwrap_or_default()
            .iter()
            .map(|topic| (
                topic.name.clone(),
                topic.partitions.as_ref().map_or(0, Vec::len)
            ))
            .collect::<Vec<_>>()
    );

    broker.shutdown();
    Ok(())
}
