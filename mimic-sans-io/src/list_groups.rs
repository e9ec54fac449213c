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

//! ListGroups (API key 16), versions 0 to 4.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    ListGroupsRequest {
        states_filter: Option<Vec<String>>,
    }
}

pub static REQUEST: MessageMeta = MessageMeta {
    name: "ListGroupsRequest",
    api_key: 16,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(3)),
    message_kind: MessageKind::Request,
    fields: &[("states_filter", FieldMeta::new("[]string").since(4))],
};

message! {
    ListGroupsResponse {
        throttle_time_ms: i32,
        error_code: i16,
        groups: Option<Vec<ListedGroup>>,
    }
}

message! {
    ListedGroup {
        group_id: String,
        protocol_type: String,
        group_state: String,
    }
}

static LISTED_GROUP: [(&str, FieldMeta); 3] = [
    ("group_id", FieldMeta::new("string")),
    ("protocol_type", FieldMeta::new("string")),
    ("group_state", FieldMeta::new("string").since(4)),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "ListGroupsResponse",
    api_key: 16,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(3)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
        ("error_code", FieldMeta::new("int16")),
        (
            "groups",
            FieldMeta::new("[]ListedGroup").with_fields(&LISTED_GROUP),
        ),
    ],
};
