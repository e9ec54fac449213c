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

//! CreateTopics (API key 19), versions 0 to 4.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    CreateTopicsRequest {
        topics: Option<Vec<CreatableTopic>>,
        timeout_ms: i32,
        validate_only: bool,
    }
}

message! {
    CreatableTopic {
        name: String,
        num_partitions: i32,
        replication_factor: i16,
        assignments: Option<Vec<CreatableReplicaAssignment>>,
        configs: Option<Vec<CreatableTopicConfig>>,
    }
}

message! {
    CreatableReplicaAssignment {
        partition_index: i32,
        broker_ids: Option<Vec<i32>>,
    }
}

message! {
    CreatableTopicConfig {
        name: String,
        value: Option<String>,
    }
}

static CREATABLE_REPLICA_ASSIGNMENT: [(&str, FieldMeta); 2] = [
    ("partition_index", FieldMeta::new("int32")),
    ("broker_ids", FieldMeta::new("[]int32")),
];

static CREATABLE_TOPIC_CONFIG: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    ("value", FieldMeta::new("string").nullable()),
];

static CREATABLE_TOPIC: [(&str, FieldMeta); 5] = [
    ("name", FieldMeta::new("string")),
    ("num_partitions", FieldMeta::new("int32")),
    ("replication_factor", FieldMeta::new("int16")),
    (
        "assignments",
        FieldMeta::new("[]CreatableReplicaAssignment").with_fields(&CREATABLE_REPLICA_ASSIGNMENT),
    ),
    (
        "configs",
        FieldMeta::new("[]CreatableTopicConfig").with_fields(&CREATABLE_TOPIC_CONFIG),
    ),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "CreateTopicsRequest",
    api_key: 19,
    version: Version::new(VersionRange::new(0, 4), VersionRange::none()),
    message_kind: MessageKind::Request,
    fields: &[
        (
            "topics",
            FieldMeta::new("[]CreatableTopic").with_fields(&CREATABLE_TOPIC),
        ),
        ("timeout_ms", FieldMeta::new("int32")),
        ("validate_only", FieldMeta::new("bool").since(1)),
    ],
};

message! {
    CreateTopicsResponse {
        throttle_time_ms: i32,
        topics: Option<Vec<CreatableTopicResult>>,
    }
}

message! {
    CreatableTopicResult {
        name: String,
        error_code: i16,
        error_message: Option<String>,
    }
}

static CREATABLE_TOPIC_RESULT: [(&str, FieldMeta); 3] = [
    ("name", FieldMeta::new("string")),
    ("error_code", FieldMeta::new("int16")),
    (
        "error_message",
        FieldMeta::new("string").since(1).nullable_since(1),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "CreateTopicsResponse",
    api_key: 19,
    version: Version::new(VersionRange::new(0, 4), VersionRange::none()),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(2)),
        (
            "topics",
            FieldMeta::new("[]CreatableTopicResult").with_fields(&CREATABLE_TOPIC_RESULT),
        ),
    ],
};
