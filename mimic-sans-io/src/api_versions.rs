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

//! ApiVersions (API key 18), versions 0 to 3.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    ApiVersionsRequest {
        client_software_name: String,
        client_software_version: String,
    }
}

pub static REQUEST: MessageMeta = MessageMeta {
    name: "ApiVersionsRequest",
    api_key: 18,
    version: Version::new(VersionRange::new(0, 3), VersionRange::from(3)),
    message_kind: MessageKind::Request,
    fields: &[
        ("client_software_name", FieldMeta::new("string").since(3)),
        ("client_software_version", FieldMeta::new("string").since(3)),
    ],
};

message! {
    ApiVersionsResponse {
        error_code: i16,
        api_keys: Vec<ApiVersion>,
        throttle_time_ms: i32,
    }
}

message! {
    ApiVersion {
        api_key: i16,
        min_version: i16,
        max_version: i16,
    }
}

static API_VERSION: [(&str, FieldMeta); 3] = [
    ("api_key", FieldMeta::new("int16")),
    ("min_version", FieldMeta::new("int16")),
    ("max_version", FieldMeta::new("int16")),
];

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "ApiVersionsResponse",
    api_key: 18,
    version: Version::new(VersionRange::new(0, 3), VersionRange::from(3)),
    message_kind: MessageKind::Response,
    fields: &[
        ("error_code", FieldMeta::new("int16")),
        (
            "api_keys",
            FieldMeta::new("[]ApiVersion").with_fields(&API_VERSION),
        ),
        ("throttle_time_ms", FieldMeta::new("int32").since(1)),
    ],
};
