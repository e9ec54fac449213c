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

//! Metadata (API key 3), versions 0 to 9.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    MetadataRequest {
        topics: Option<Vec<MetadataRequestTopic>>,
        allow_auto_topic_creation: bool,
        include_cluster_authorized_operations: bool,
        include_topic_authorized_operations: bool,
    }
}

message! {
    MetadataRequestTopic {
        name: String,
    }
}

static METADATA_REQUEST_TOPIC: [(&str, FieldMeta); 1] = [("name", FieldMeta::new("string"))];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "MetadataRequest",
    api_key: 3,
    version: Version::new(VersionRange::new(0, 9), VersionRange::from(9)),
    message_kind: MessageKind::Request,
    fields: &[
        (
            "topics",
            FieldMeta::new("[]MetadataRequestTopic")
                .nullable_since(1)
                .with_fields(&METADATA_REQUEST_TOPIC),
        ),
        (
            "allow_auto_topic_creation",
            FieldMeta::new("bool").since(4),
        ),
        (
            "include_cluster_authorized_operations",
            FieldMeta::new("bool").since(8),
        ),
        (
            "include_topic_authorized_operations",
            FieldMeta::new("bool").since(8),
        ),
    ],
};

message! {
    MetadataResponse {
        throttle_time_ms: i32,
        brokers: Option<Vec<MetadataResponseBroker>>,
        cluster_id: Option<String>,
        controller_id: i32,
        topics: Option<Vec<MetadataResponseTopic>>,
        cluster_authorized_operations: i32,
    }
}

message! {
    MetadataResponseBroker {
        node_id: i32,
        host: String,
        port: i32,
        rack: Option<String>,
    }
}

message! {
    MetadataResponseTopic {
        error_code: i16,
        name: String,
        is_internal: bool,
        partitions: Option<Vec<MetadataResponsePartition>>,
        topic_authorized_operations: i32,
    }
}

message! {
    MetadataResponsePartition {
        error_code: i16,
        partition_index: i32,
        leader_id: i32,
        leader_epoch: i32,
        replica_nodes: Option<Vec<i32>>,
        isr_nodes: Option<Vec<i32>>,
        offline_replicas: Option<Vec<i32>>,
    }
}

static METADATA_RESPONSE_BROKER: [(&str, FieldMeta); 4] = [
    ("node_id", FieldMeta::new("int32")),
    ("host", FieldMeta::new("string")),
    ("port", FieldMeta::new("int32")),
    ("rack", FieldMeta::new("string").since(1).nullable_since(1)),
];

static METADATA_RESPONSE_PARTITION: [(&str, FieldMeta); 7] = [
    ("error_code", FieldMeta::new("int16")),
    ("partition_index", FieldMeta::new("int32")),
    ("leader_id", FieldMeta::new("int32")),
    ("leader_epoch", FieldMeta::new("int32").since(7)),
    ("replica_nodes", FieldMeta::new("[]int32")),
    ("isr_nodes", FieldMeta::new("[]int32")),
    ("offline_replicas", FieldMeta::new("[]int32").since(5)),
];

static METADATA_RESPONSE_TOPIC: [(&str, FieldMeta); 5] = [
    ("error_code", FieldMeta::new("int16")),
    ("name", FieldMeta::new("string")),
    ("is_internal", FieldMeta::new("bool").since(1)),
    (
        "partitions",
        FieldMeta::new("[]MetadataResponsePartition").with_fields(&METADATA_RESPONSE_PARTITION),
    ),
    (
        "topic_authorized_operations",
        FieldMeta::new("int32").since(8),
    ),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "MetadataResponse",
    api_key: 3,
    version: Version::new(VersionRange::new(0, 9), VersionRange::from(9)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(3)),
        (
            "brokers",
            FieldMeta::new("[]MetadataResponseBroker").with_fields(&METADATA_RESPONSE_BROKER),
        ),
        (
            "cluster_id",
            FieldMeta::new("string").since(2).nullable_since(2),
        ),
        ("controller_id", FieldMeta::new("int32").since(1)),
        (
            "topics",
            FieldMeta::new("[]MetadataResponseTopic").with_fields(&METADATA_RESPONSE_TOPIC),
        ),
        (
            "cluster_authorized_operations",
            FieldMeta::new("int32").since(8),
        ),
    ],
};
