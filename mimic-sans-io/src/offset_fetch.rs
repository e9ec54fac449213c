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

//! OffsetFetch (API key 9), versions 0 to 7.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    OffsetFetchRequest {
        group_id: String,
        topics: Option<Vec<OffsetFetchRequestTopic>>,
        require_stable: bool,
    }
}

message! {
    OffsetFetchRequestTopic {
        name: String,
        partition_indexes: Option<Vec<i32>>,
    }
}

static OFFSET_FETCH_REQUEST_TOPIC: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    ("partition_indexes", FieldMeta::new("[]int32")),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "OffsetFetchRequest",
    api_key: 9,
    version: Version::new(VersionRange::new(0, 7), VersionRange::from(6)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        (
            "topics",
            FieldMeta::new("[]OffsetFetchRequestTopic")
                .nullable_since(2)
                .with_fields(&OFFSET_FETCH_REQUEST_TOPIC),
        ),
        ("require_stable", FieldMeta::new("bool").since(7)),
    ],
};

message! {
    OffsetFetchResponse {
        throttle_time_ms: i32,
        topics: Option<Vec<OffsetFetchResponseTopic>>,
        error_code: i16,
    }
}

message! {
    OffsetFetchResponseTopic {
        name: String,
        partitions: Option<Vec<OffsetFetchResponsePartition>>,
    }
}

message! {
    OffsetFetchResponsePartition {
        partition_index: i32,
        committed_offset: i64,
        committed_leader_epoch: i32,
        metadata: Option<String>,
        error_code: i16,
    }
}

static OFFSET_FETCH_RESPONSE_PARTITION: [(&str, FieldMeta); 5] = [
    ("partition_index", FieldMeta::new("int32")),
    ("committed_offset", FieldMeta::new("int64")),
    ("committed_leader_epoch", FieldMeta::new("int32").since(5)),
    ("metadata", FieldMeta::new("string").nullable()),
    ("error_code", FieldMeta::new("int16")),
];

static OFFSET_FETCH_RESPONSE_TOPIC: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partitions",
        FieldMeta::new("[]OffsetFetchResponsePartition")
            .with_fields(&OFFSET_FETCH_RESPONSE_PARTITION),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "OffsetFetchResponse",
    api_key: 9,
    version: Version::new(VersionRange::new(0, 7), VersionRange::from(6)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(3)),
        (
            "topics",
            FieldMeta::new("[]OffsetFetchResponseTopic").with_fields(&OFFSET_FETCH_RESPONSE_TOPIC),
        ),
        ("error_code", FieldMeta::new("int16").since(2)),
    ],
};
