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

//! InitProducerId (API key 22), versions 0 to 4.

use mimic_model::{FieldMeta, MessageKind, MessageMeta, Version, VersionRange};

message! {
    InitProducerIdRequest {
        transactional_id: Option<String>,
        transaction_timeout_ms: i32,
        producer_id: i64,
        producer_epoch: i16,
    }
}

pub static REQUEST: MessageMeta = MessageMeta {
    name: "InitProducerIdRequest",
    api_key: 22,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(2)),
    message_kind: MessageKind::Request,
    fields: &[
        ("transactional_id", FieldMeta::new("string").nullable()),
        ("transaction_timeout_ms", FieldMeta::new("int32")),
        ("producer_id", FieldMeta::new("int64").since(3)),
        ("producer_epoch", FieldMeta::new("int16").since(3)),
    ],
};

message! {
    InitProducerIdResponse {
        throttle_time_ms: i32,
        error_code: i16,
        producer_id: i64,
        producer_epoch: i16,
    }
}

pub static RESPONSE: MessageMeta = MessageMeta {
    name: "InitProducerIdResponse",
    api_key: 22,
    version: Version::new(VersionRange::new(0, 4), VersionRange::from(2)),
    message_kind: MessageKind::Response,
    fields: &[
        ("throttle_time_ms", FieldMeta::new("int32")),
        ("error_code", FieldMeta::new("int16")),
        ("producer_id", FieldMeta::new("int64")),
        ("producer_epoch", FieldMeta::new("int16")),
    ],
};
