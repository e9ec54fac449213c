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

//! FindCoordinator (API key 10), versions 0 to 3.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    FindCoordinatorRequest {
        key: String,
        key_type: i8,
    }
}

pub static REQUEST: MessageMeta = MessageMeta {
    name: "FindCoordinatorRequest",
    api_key: 10,
    version: Version::new(VersionRange::new(0, 3), VersionRange::from(3)),
    message_kind: MessageKind::Request,
    fields: &[
        ("key", FieldMeta::new("string")),
        ("key_type", FieldMeta::new("int8").since(1)),
    ],
};

message! {
    FindCoordinatorResponse {
        throttle_time_ms: i32,
        error_code: i16,
        error_message: Option<String>,
        node_id: i32,
        host: String,
        port: i32,
    }
}

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "FindCoordinatorResponse",
    api_key: 10,
    version: Version::new(VersionRange::new(0, 3), VersionRange::from(3)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16")),
        (
            "error_message",
            FieldMeta::new("string").since(1).nullable_since(1),
        ),
        ("node_id", FieldMeta::new("int32")),
        ("host", FieldMeta::new("string")),
        ("port", FieldMeta::new("int32")),
    ],
};
