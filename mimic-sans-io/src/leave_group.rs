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

//! LeaveGroup (API key 13), versions 0 to 4.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    LeaveGroupRequest {
        group_id: String,
        member_id: String,
        members: Option<Vec<MemberIdentity>>,
    }
}

message! {
    MemberIdentity {
        member_id: String,
        group_instance_id: Option<String>,
    }
}

static MEMBER_IDENTITY: [(&str, FieldMeta); 2] = [
    ("member_id", FieldMeta::new("string")),
    ("group_instance_id", FieldMeta::new("string").nullable()),
];

pub static REQUEST: MessageMeta = MessageMeta {
    name: "LeaveGroupRequest",
    api_key: 13,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(4)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        ("member_id", FieldMeta::new("string").between(0, 2)),
        (
            "members",
            FieldMeta::new("[]MemberIdentity")
                .since(3)
                .with_fields(&MEMBER_IDENTITY),
        ),
    ],
};

message! {
    LeaveGroupResponse {
        throttle_time_ms: i32,
        error_code: i16,
        members: Option<Vec<MemberResponse>>,
    }
}

message! {
    MemberResponse {
        member_id: String,
        group_instance_id: Option<String>,
        error_code: i16,
    }
}

static MEMBER_RESPONSE: [(&str, FieldMeta); 3] = [
    ("member_id", FieldMeta::new("string")),
    ("group_instance_id", FieldMeta::new("string").nullable()),
    ("error_code", FieldMeta::new("int16")),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "LeaveGroupResponse",
    api_key: 13,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(4)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16")),
        (
            "members",
            FieldMeta::new("[]MemberResponse")
                .since(3)
                .with_fields(&MEMBER_RESPONSE),
        ),
    ],
};
