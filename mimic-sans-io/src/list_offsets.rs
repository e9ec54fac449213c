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

//! ListOffsets (API key 2), versions 0 to 6.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    ListOffsetsRequest {
        replica_id: i32,
        isolation_level: i8,
        topics: Option<Vec<ListOffsetsTopic>>,
    }
}

message! {
    ListOffsetsTopic {
        name: String,
        partitions: Option<Vec<ListOffsetsPartition>>,
    }
}

message! {
    ListOffsetsPartition {
        partition_index: i32,
        current_leader_epoch: i32,
        timestamp: i64,
        max_num_offsets: i32,
    }
}

static LIST_OFFSETS_PARTITION: [(&str, FieldMeta); 4] = [
    ("partition_index", FieldMeta::new("int32")),
    ("current_leader_epoch", FieldMeta::new("int32").since(4)),
    ("timestamp", FieldMeta::new("int64")),
    ("max_num_offsets", FieldMeta::new("int32").between(0, 0)),
];

static LIST_OFFSETS_TOPIC: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]ListOffsetsPartition").with_fields(&LIST_OFFSETS_PARTITION),
    ),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "ListOffsetsRequest",
    api_key: 2,
    version: Version::new(VersionRange::new(0, 6), VersionRange::from(6)),
    message_kind: MessageKind::Request,
    fields: &[
        ("replica_id", FieldMeta::new("int32")),
        ("isolation_level", FieldMeta::new("int8").since(2)),
        (
            "topics",
            FieldMeta::new("[]ListOffsetsTopic").with_fields(&LIST_OFFSETS_TOPIC),
        ),
    ],
};

message! {
    ListOffsetsResponse {
        throttle_time_ms: i32,
        topics: Option<Vec<ListOffsetsTopicResponse>>,
    }
}

message! {
    ListOffsetsTopicResponse {
        name: String,
        partitions: Option<Vec<ListOffsetsPartitionResponse>>,
    }
}

message! {
    ListOffsetsPartitionResponse {
        partition_index: i32,
        error_code: i16,
        old_style_offsets: Option<Vec<i64>>,
        timestamp: i64,
        offset: i64,
        leader_epoch: i32,
    }
}

static LIST_OFFSETS_PARTITION_RESPONSE: [(&str, FieldMeta); 6] = [
    ("partition_index", FieldMeta::new("int32")),
    ("error_code", FieldMeta::new("int16")),
    ("old_style_offsets", FieldMeta::new("[]int64").between(0, 0)),
    ("timestamp", FieldMeta::new("int64").since(1)),
    ("offset", FieldMeta::new("int64").since(1)),
    ("leader_epoch", FieldMeta::new("int32").since(4)),
];

static LIST_OFFSETS_TOPIC_RESPONSE: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]ListOffsetsPartitionResponse")
            .with_fields(&LIST_OFFSETS_PARTITION_RESPONSE),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "ListOffsetsResponse",
    api_key: 2,
    version: Version::new(VersionRange::new(0, 6), VersionRange::from(6)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(2)),
        (
            "topics",
            FieldMeta::new("[]ListOffsetsTopicResponse").with_fields(&LIST_OFFSETS_TOPIC_RESPONSE),
        ),
    ],
};
