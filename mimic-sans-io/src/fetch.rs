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

//! Fetch (API key 1), versions 0 to 11.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

use crate::record::deflated;

message! {
    FetchRequest {
        replica_id: i32,
        max_wait_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
        isolation_level: i8,
        session_id: i32,
        session_epoch: i32,
        topics: Option<Vec<FetchTopic>>,
        forgotten_topics_data: Option<Vec<ForgottenTopic>>,
        rack_id: String,
    }
}

message! {
    FetchTopic {
        topic: String,
        partitions: Option<Vec<FetchPartition>>,
    }
}

message! {
    FetchPartition {
        partition: i32,
        current_leader_epoch: i32,
        fetch_offset: i64,
        log_start_offset: i64,
        partition_max_bytes: i32,
    }
}

message! {
    ForgottenTopic {
        topic: String,
        partitions: Option<Vec<i32>>,
    }
}

static FETCH_PARTITION: [(&str, FieldMeta); 5] = [
    ("partition", FieldMeta::new("int32")),
    ("current_leader_epoch", FieldMeta::new("int32").since(9)),
    ("fetch_offset", FieldMeta::new("int64")),
    ("log_start_offset", FieldMeta::new("int64").since(5)),
    ("partition_max_bytes", FieldMeta::new("int32")),
];

static FETCH_TOPIC: [(&str, FieldMeta); 2] = [
    ("topic", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]FetchPartition").with_fields(&FETCH_PARTITION),
    ),
];

static FORGOTTEN_TOPIC: [(&str, FieldMeta); 2] = [
    ("topic", FieldMeta::new("string")),
    ("partitions", FieldMeta::new("[]int32")),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "FetchRequest",
    api_key: 1,
    version: Version::new(VersionRange::new(0, 11), VersionRange::none()),
    message_kind: MessageKind::Request,
    fields: &[
        ("replica_id", FieldMeta::new("int32")),
        ("max_wait_ms", FieldMeta::new("int32")),
        ("min_bytes", FieldMeta::new("int32")),
        ("max_bytes", FieldMeta::new("int32").since(3)),
        ("isolation_level", FieldMeta::new("int8").since(4)),
        ("session_id", FieldMeta::new("int32").since(7)),
        ("session_epoch", FieldMeta::new("int32").since(7)),
        (
            "topics",
            FieldMeta::new("[]FetchTopic").with_fields(&FETCH_TOPIC),
        ),
        (
            "forgotten_topics_data",
            FieldMeta::new("[]ForgottenTopic")
                .since(7)
                .with_fields(&FORGOTTEN_TOPIC),
        ),
        ("rack_id", FieldMeta::new("string").since(11)),
    ],
};

message! {
    FetchResponse {
        throttle_time_ms: i32,
        error_code: i16,
        session_id: i32,
        responses: Option<Vec<FetchableTopicResponse>>,
    }
}

message! {
    FetchableTopicResponse {
        topic: String,
        partitions: Option<Vec<PartitionData>>,
    }
}

message! {
    PartitionData {
        partition_index: i32,
        error_code: i16,
        high_watermark: i64,
        last_stable_offset: i64,
        log_start_offset: i64,
        aborted_transactions: Option<Vec<AbortedTransaction>>,
        preferred_read_replica: i32,
        records: Option<deflated::Frame>,
    }
}

message! {
    AbortedTransaction {
        producer_id: i64,
        first_offset: i64,
    }
}

static ABORTED_TRANSACTION: [(&str, FieldMeta); 2] = [
    ("producer_id", FieldMeta::new("int64")),
    ("first_offset", FieldMeta::new("int64")),
];

static PARTITION_DATA: [(&str, FieldMeta); 8] = [
    ("partition_index", FieldMeta::new("int32")),
    ("error_code", FieldMeta::new("int16")),
    ("high_watermark", FieldMeta::new("int64")),
    ("last_stable_offset", FieldMeta::new("int64").since(4)),
    ("log_start_offset", FieldMeta::new("int64").since(5)),
    (
        "aborted_transactions",
        FieldMeta::new("[]AbortedTransaction")
            .since(4)
            .nullable_since(4)
            .with_fields(&ABORTED_TRANSACTION),
    ),
    ("preferred_read_replica", FieldMeta::new("int32").since(11)),
    ("records", FieldMeta::new("records").nullable()),
];

static FETCHABLE_TOPIC_RESPONSE: [(&str, FieldMeta); 2] = [
    ("topic", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]PartitionData").with_fields(&PARTITION_DATA),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "FetchResponse",
    api_key: 1,
    version: Version::new(VersionRange::new(0, 11), VersionRange::none()),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16").since(7)),
        ("session_id", FieldMeta::new("int32").since(7)),
        (
            "responses",
            FieldMeta::new("[]FetchableTopicResponse").with_fields(&FETCHABLE_TOPIC_RESPONSE),
        ),
    ],
};
