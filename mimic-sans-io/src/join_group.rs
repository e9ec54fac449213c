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

//! JoinGroup (API key 11), versions 0 to 7.

use bytes::Bytes;
use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    JoinGroupRequest {
        group_id: String,
        session_timeout_ms: i32,
        rebalance_timeout_ms: i32,
        member_id: String,
        group_instance_id: Option<String>,
        protocol_type: String,
        protocols: Option<Vec<JoinGroupRequestProtocol>>,
    }
}

message! {
    JoinGroupRequestProtocol {
        name: String,
        metadata: Bytes,
    }
}

static JOIN_GROUP_REQUEST_PROTOCOL: [(&str, FieldMeta); 2] = [
    ("name", FieldMeta::new("string")),
    ("metadata", FieldMeta::new("bytes")),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "JoinGroupRequest",
    api_key: 11,
    version: Version::new(VersionRange::new(0, 7), VersionRange::from(6)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        ("session_timeout_ms", FieldMeta::new("int32")),
        ("rebalance_timeout_ms", FieldMeta::new("int32").since(1)),
        ("member_id", FieldMeta::new("string")),
        (
            "group_instance_id",
            FieldMeta::new("string").since(5).nullable_since(5),
        ),
        ("protocol_type", FieldMeta::new("string")),
        (
            "protocols",
            FieldMeta::new("[]JoinGroupRequestProtocol").with_fields(&JOIN_GROUP_REQUEST_PROTOCOL),
        ),
    ],
};

message! {
    JoinGroupResponse {
        throttle_time_ms: i32,
        error_code: i16,
        generation_id: i32,
        protocol_type: Option<String>,
        protocol_name: Option<String>,
        leader: String,
        member_id: String,
        members: Option<Vec<JoinGroupResponseMember>>,
    }
}

message! {
    JoinGroupResponseMember {
        member_id: String,
        group_instance_id: Option<String>,
        metadata: Bytes,
    }
}

static JOIN_GROUP_RESPONSE_MEMBER: [(&str, FieldMeta); 3] = [
    ("member_id", FieldMeta::new("string")),
    (
        "group_instance_id",
        FieldMeta::new("string").since(5).nullable_since(5),
    ),
    ("metadata", FieldMeta::new("bytes")),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "JoinGroupResponse",
    api_key: 11,
    version: Version::new(VersionRange::new(0, 7), VersionRange::from(6)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(2)),
        ("error_code", FieldMeta::new("int16")),
        ("generation_id", FieldMeta::new("int32")),
        (
            "protocol_type",
            FieldMeta::new("string").since(7).nullable_since(7),
        ),
        ("protocol_name", FieldMeta::new("string").nullable_since(7)),
        ("leader", FieldMeta::new("string")),
        ("member_id", FieldMeta::new("string")),
        (
            "members",
            FieldMeta::new("[]JoinGroupResponseMember").with_fields(&JOIN_GROUP_RESPONSE_MEMBER),
        ),
    ],
};
