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

//! SyncGroup (API key 14), versions 0 to 5.

use bytes::Bytes;
use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    SyncGroupRequest {
        group_id: String,
        generation_id: i32,
        member_id: String,
        group_instance_id: Option<String>,
        protocol_type: Option<String>,
        protocol_name: Option<String>,
        assignments: Option<Vec<SyncGroupRequestAssignment>>,
    }
}

message! {
    SyncGroupRequestAssignment {
        member_id: String,
        assignment: Bytes,
    }
}

static SYNC_GROUP_REQUEST_ASSIGNMENT: [(&str, FieldMeta); 2] = [
    ("member_id", FieldMeta::new("string")),
    ("assignment", FieldMeta::new("bytes")),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "SyncGroupRequest",
    api_key: 14,
    version: Version::new(VersionRange::new(0, 5), VersionRange::from(4)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        ("generation_id", FieldMeta::new("int32")),
        ("member_id", FieldMeta::new("string")),
        (
            "group_instance_id",
            FieldMeta::new("string").since(3).nullable_since(3),
        ),
        (
            "protocol_type",
            FieldMeta::new("string").since(5).nullable_since(5),
        ),
        (
            "protocol_name",
            FieldMeta::new("string").since(5).nullable_since(5),
        ),
        (
            "assignments",
            FieldMeta::new("[]SyncGroupRequestAssignment")
                .with_fields(&SYNC_GROUP_REQUEST_ASSIGNMENT),
        ),
    ],
};

message! {
    SyncGroupResponse {
        throttle_time_ms: i32,
        error_code: i16,
        protocol_type: Option<String>,
        protocol_name: Option<String>,
        assignment: Bytes,
    }
}

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "SyncGroupResponse",
    api_key: 14,
    version: Version::new(VersionRange::new(0, 5), VersionRange::from(4)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16")),
        (
            "protocol_type",
            FieldMeta::new("string").since(5).nullable_since(5),
        ),
        (
            "protocol_name",
            FieldMeta::new("string").since(5).nullable_since(5),
        ),
        ("assignment", FieldMeta::new("bytes")),
    ],
};
