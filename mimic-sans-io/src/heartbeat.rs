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

//! Heartbeat (API key 12), versions 0 to 4.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    HeartbeatRequest {
        group_id: String,
        generation_id: i32,
        member_id: String,
        group_instance_id: Option<String>,
    }
}

pub static REQUEST: MessageMeta = MessageMeta {
    name: "HeartbeatRequest",
    api_key: 12,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(4)),
    message_kind: MessageKind::Request,
    fields: &[
        ("group_id", FieldMeta::new("string")),
        ("generation_id", FieldMeta::new("int32")),
        ("member_id", FieldMeta::new("string")),
        (
            "group_instance_id",
            FieldMeta::new("string").since(3).nullable_since(3),
        ),
    ],
};

message! {
    HeartbeatResponse {
        throttle_time_ms: i32,
        error_code: i16,
    }
}

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "HeartbeatResponse",
    api_key: 12,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(4)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16")),
    ],
};
