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

//! OffsetCommit (API key 8), versions 0 to 8.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    OffsetCommitRequest {
        group_id: String,
        generation_id_or_member_epoch: i32,
        member_id: String,
        group_instance_id: Option<String>,
        retention_time_ms: i64,
        topics: Option<Vec<OffsetCommitRequestTopic>>,
    }
}

message! {
    OffsetCommitRequestTopic {
        name: String,
        partitions: Option<Vec<OffsetCommitRequestPartition>>,
    }
}

message! {
    OffsetCommitRequestPartition {
        partition_index: i32,
        committed_offset: i64,
        committed_leader_epoch: i32,
        commit_timestamp: i64,
        committed_metadata: Option<String>,
    }
}

static OFFSET_COMMIT_REQUEST_PARTITION: [(&str, FieldMeta); 5] = [
    ("partition_index", FieldMeta::new("int32")),
    ("committed_offset", FieldMeta::new("int64")),
    ("committed_leader_epoch", FieldMeta::new("int32").since(6)),
    ("commit_timestamp", FieldMeta::new("int64").between(1, 1)),
    ("committed_metadata", FieldMeta::new("string").nullable()),
];

static OFFSET_COMMIT_REQUEST_TOPIC: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]OffsetCommitRequestPartition")
            .with_fields(&OFFSET_COMMIT_REQUEST_PARTITION),
    ),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "OffsetCommitRequest",
    api_key: 8,
    version: Version::new(VersionRange::new(0, 8), VersionRange::from(8)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        (
            "generation_id_or_member_epoch",
            FieldMeta::new("int32").since(1),
        ),
        ("member_id", FieldMeta::new("string").since(1)),
        (
            "group_instance_id",
            FieldMeta::new("string").since(7).nullable_since(7),
        ),
        ("retention_time_ms", FieldMeta::new("int64").between(2, 4)),
        (
            "topics",
            FieldMeta::new("[]OffsetCommitRequestTopic").with_fields(&OFFSET_COMMIT_REQUEST_TOPIC),
        ),
    ],
};

message! {
    OffsetCommitResponse {
        throttle_time_ms: i32,
        topics: Option<Vec<OffsetCommitResponseTopic>>,
    }
}

message! {
    OffsetCommitResponseTopic {
        name: String,
        partitions: Option<Vec<OffsetCommitResponsePartition>>,
    }
}

message! {
    OffsetCommitResponsePartition {
        partition_index: i32,
        error_code: i16,
    }
}

static OFFSET_COMMIT_RESPONSE_PARTITION: [(&str, FieldMeta); 2] = [
    ("partition_index", FieldMeta::new("int32")),
    ("error_code", FieldMeta::new("int16")),
];

static OFFSET_COMMIT_RESPONSE_TOPIC: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]OffsetCommitResponsePartition")
            .with_fields(&OFFSET_COMMIT_RESPONSE_PARTITION),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "OffsetCommitResponse",
    api_key: 8,
    version: Version::new(VersionRange::new(0, 8), VersionRange::from(8)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(3)),
        (
            "topics",
            FieldMeta::new("[]OffsetCommitResponseTopic")
                .with_fields(&OFFSET_COMMIT_RESPONSE_TOPIC),
        ),
    ],
};
