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

use std::{sync::Arc, thread};

use bytes::Bytes;
use common::init_tracing;
use mimic_config::Schema;
use mimic_sans_io::{
    ErrorCode,
    record::{Record, inflated::Batch},
};
use mimic_schema::PayloadValidator;
use mimic_storage::{Broker, Error, Result, Store};
use pretty_assertions::assert_eq;
use serde_json::json;

mod common;

fn store() -> Result<Store> {
    Store::builder()
        .cluster_id("mimic")
        .broker(Broker::new(1, "localhost", 9092))
        .build()
}

fn key_values(pairs: &[(&'static str, &'static str)]) -> Result<Batch> {
    pairs
        .iter()
        .zip(0..)
        .fold(Batch::builder(), |builder, ((key, value), delta)| {
            builder.record(
                Record::builder()
                    .offset_delta(delta)
                    .key(Some(Bytes::from_static(key.as_bytes())))
                    .value(Some(Bytes::from_static(value.as_bytes()))),
            )
        })
        .build()
        .map_err(Into::into)
}

fn offsets(batch: &Batch) -> Vec<i64> {
    batch
        .offsets_and_timestamps()
        .map(|(offset, ..)| offset)
        .collect()
}

#[test]
fn produce_then_fetch() -> Result<()> {
    let _guard = init_tracing()?;

    let store = store()?;
    let topic = store.create_topic("foo", 1, 1)?;
    let partition = topic
        .partition(0)
        .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

    let base_offset = partition.write(&key_values(&[("k1", "v1"), ("k2", "v2")])?)?;
    assert_eq!(0, base_offset);
    assert_eq!(1, partition.offset()?);

    let fetched = partition.read(0, 500)?;
    assert_eq!(vec![0, 1], offsets(&fetched));
    assert_eq!(
        vec![
            (Some(Bytes::from_static(b"k1")), Some(Bytes::from_static(b"v1"))),
            (Some(Bytes::from_static(b"k2")), Some(Bytes::from_static(b"v2")))
        ],
        fetched
            .records
            .iter()
            .map(|record| (record.key.clone(), record.value.clone()))
            .collect::<Vec<_>>()
    );

    Ok(())
}

#[test]
fn offsets_follow_appends() -> Result<()> {
    let _guard = init_tracing()?;

    let store = store()?;
    let topic = store.create_topic("bar", 1, 1)?;
    let partition = topic
        .partition(0)
        .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

    _ = partition.write(&key_values(&[("a", "1"), ("b", "2"), ("c", "3")])?)?;
    let t0 = partition.offset()?;

    let n = 7;
    for i in 0..n {
        assert_eq!(t0 + 1 + i, partition.write(&key_values(&[("k", "v")])?)?);
    }

    assert_eq!(t0 + n, partition.offset()?);

    let appended = partition.read(t0 + 1, usize::MAX)?;
    assert_eq!(((t0 + 1)..=(t0 + n)).collect::<Vec<_>>(), offsets(&appended));

    Ok(())
}

#[test]
fn fetch_is_complete_from_any_offset() -> Result<()> {
    let _guard = init_tracing()?;

    let store = Store::builder()
        .broker(Broker::new(1, "localhost", 9092))
        .segment_bytes(64)
        .build()?;

    let topic = store.create_topic("baz", 1, 1)?;
    let partition = topic
        .partition(0)
        .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

    for _ in 0..10 {
        _ = partition.write(&key_values(&[("key", "value"), ("yek", "eulav")])?)?;
    }

    assert!(partition.segments()? > 1);

    let tail = partition.offset()?;
    for offset in partition.start_offset()?..=tail {
        assert_eq!(
            (offset..=tail).collect::<Vec<_>>(),
            offsets(&partition.read(offset, usize::MAX)?)
        );
    }

    Ok(())
}

#[test]
fn validated_topic_rejects_whole_batch() -> Result<()> {
    let _guard = init_tracing()?;

    let schema = serde_json::from_value::<Schema>(json!({
        "type": "object",
        "required": ["id"],
        "properties": {"id": {"type": "integer"}}
    }))
    .map(Arc::new)
    .map_err(|err| Error::Message(err.to_string()))?;

    let store = store()?;
    let topic = store.create_topic_with_validator(
        "orders",
        1,
        1,
        Some(Arc::new(PayloadValidator::new(
            Some(schema),
            "application/json",
        ))),
    )?;

    let partition = topic
        .partition(0)
        .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

    assert_eq!(0, partition.write(&key_values(&[("a", r#"{"id": 1}"#)])?)?);

    assert!(matches!(
        partition.write(&key_values(&[("b", r#"{"id": 2}"#), ("c", r#"{"id": "x"}"#)])?),
        Err(Error::Api(ErrorCode::CorruptMessage))
    ));

    assert_eq!(0, partition.offset()?);
    Ok(())
}

#[test]
fn concurrent_writers_never_share_offsets() -> Result<()> {
    let _guard = init_tracing()?;

    let store = Arc::new(store()?);
    _ = store.create_topic("shared", 1, 1)?;

    let writers = (0..4)
        .map(|_| {
            let store = store.clone();

            thread::spawn(move || -> Result<Vec<i64>> {
                let topic = store
                    .topic("shared")?
                    .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

                let partition = topic
                    .partition(0)
                    .ok_or(Error::Api(ErrorCode::UnknownTopicOrPartition))?;

                (0..25)
                    .map(|_| partition.write(&key_values(&[("k", "v")])?))
                    .collect()
            })
        })
        .collect::<Vec<_>>();

    let mut assigned = Vec::new();
    for writer in writers {
        assigned.extend(
            writer
                .join()
                .map_err(|_err| Error::Message(String::from("writer panicked")))??,
        );
    }

    assigned.sort_unstable();
    assert_eq!((0..100).collect::<Vec<_>>(), assigned);
    Ok(())
}
