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

//! Produce (API key 0), versions 0 to 8.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

use crate::record::deflated;

message! {
    ProduceRequest {
        transactional_id: Option<String>,
        acks: i16,
        timeout_ms: i32,
        topic_data: Option<Vec<TopicProduceData>>,
    }
}

message! {
    TopicProduceData {
        name: String,
        partition_data: Option<Vec<PartitionProduceData>>,
    }
}

message! {
    PartitionProduceData {
        index: i32,
        records: Option<deflated::Frame>,
    }
}

static PARTITION_PRODUCE_DATA: [(&str, FieldMeta); 2] = [
    ("index", FieldMeta::new("int32")),
    ("records", FieldMeta::new("records").nullable()),
];

static TOPIC_PRODUCE_DATA: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partition_data",
        FieldMeta::new("[]PartitionProduceData").with_fields(&PARTITION_PRODUCE_DATA),
    ),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "ProduceRequest",
    api_key: 0,
    version: Version::new(VersionRange::new(0, 8), VersionRange::none()),
    message_kind: MessageKind::Request,
    fields: &[
        (
            "transactional_id",
            FieldMeta::new("string").since(3).nullable_since(3),
        ),
        ("acks", FieldMeta::new("int16")),
        ("timeout_ms", FieldMeta::new("int32")),
        (
            "topic_data",
            FieldMeta::new("[]TopicProduceData").with_fields(&TOPIC_PRODUCE_DATA),
        ),
    ],
};

message! {
    ProduceResponse {
        responses: Option<Vec<TopicProduceResponse>>,
        throttle_time_ms: i32,
    }
}

message! {
    TopicProduceResponse {
        name: String,
        partition_responses: Option<Vec<PartitionProduceResponse>>,
    }
}

message! {
    PartitionProduceResponse {
        index: i32,
        error_code: i16,
        base_offset: i64,
        log_append_time_ms: i64,
        log_start_offset: i64,
        record_errors: Option<Vec<BatchIndexAndErrorMessage>>,
        error_message: Option<String>,
    }
}

message! {
    BatchIndexAndErrorMessage {
        batch_index: i32,
        batch_index_error_message: Option<String>,
    }
}

static BATCH_INDEX_AND_ERROR_MESSAGE: [(&str, FieldMeta); 2] = [
    ("batch_index", FieldMeta::new("int32")),
    (
        "batch_index_error_message",
        FieldMeta::new("string").nullable(),
    ),
];

static PARTITION_PRODUCE_RESPONSE: [(&str, FieldMeta); 7] = [
    ("index", FieldMeta::new("int32")),
    ("error_code", FieldMeta::new("int16")),
    ("base_offset", FieldMeta::new("int64")),
    ("log_append_time_ms", FieldMeta::new("int64").since(2)),
    ("log_start_offset", FieldMeta::new("int64").since(5)),
    (
        "record_errors",
        FieldMeta::new("[]BatchIndexAndErrorMessage")
            .since(8)
            .with_fields(&BATCH_INDEX_AND_ERROR_MESSAGE),
    ),
    (
        "error_message",
        FieldMeta::new("string").since(8).nullable_since(8),
    ),
];

static TOPIC_PRODUCE_RESPONSE: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    (
        "partition_responses",
        FieldMeta::new("[]PartitionProduceResponse").with_fields(&PARTITION_PRODUCE_RESPONSE),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "ProduceResponse",
    api_key: 0,
    version: Version::new(VersionRange::new(0, 8), VersionRange::none()),
    message_kind: MessageKind::Response,
    fields: &[
        (
            "responses",
            FieldMeta::new("[]TopicProduceResponse").with_fields(&TOPIC_PRODUCE_RESPONSE),
        ),
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
    ],
};
