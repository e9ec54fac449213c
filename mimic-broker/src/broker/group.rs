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

//! Consumer group requests that this broker will not serve.

use mimic_sans_io::{
    Body, ErrorCode, HeartbeatResponse, JoinGroupResponse, LeaveGroupResponse,
    OffsetCommitResponse, OffsetFetchResponse, SyncGroupResponse,
    offset_commit::{OffsetCommitResponsePartition, OffsetCommitResponseTopic},
};

use crate::{Error, Result};

/// The group of a request, empty when it is not a group request.
pub(crate) fn group_id(request: &Body) -> &str {
    match request {
        Body::JoinGroupRequest(join) => &join.group_id,
        Body::SyncGroupRequest(sync) => &sync.group_id,
        Body::HeartbeatRequest(heartbeat) => &heartbeat.group_id,
        Body::LeaveGroupRequest(leave) => &leave.group_id,
        Body::OffsetCommitRequest(commit) => &commit.group_id,
        Body::OffsetFetchRequest(fetch) => &fetch.group_id,
        _ => "",
    }
}

/// Why a request for `group_id` cannot be served by `node_id`.
pub(crate) fn refusal(group_id: &str, node_id: i32, coordinator: i32) -> Option<ErrorCode> {
    if group_id.is_empty() {
        Some(ErrorCode::InvalidGroupId)
    } else if node_id != coordinator {
        Some(ErrorCode::NotCoordinator)
    } else {
        None
    }
}

/// The response to a group request refused with `error_code`.
pub(crate) fn refused(request: &Body, error_code: ErrorCode) -> Result<Body> {
    match request {
        Body::JoinGroupRequest(join) => Ok(JoinGroupResponse::default()
            .error_code(error_code.into())
            .generation_id(-1)
            .member_id(join.member_id.clone())
            .members(Some(vec![]))
            .into()),

        Body::SyncGroupRequest(_) => Ok(SyncGroupResponse::default()
            .error_code(error_code.into())
            .into()),

        Body::HeartbeatRequest(_) => Ok(HeartbeatResponse::default()
            .error_code(error_code.into())
            .into()),

        Body::LeaveGroupRequest(_) => Ok(LeaveGroupResponse::default()
            .error_code(error_code.into())
            .into()),

        Body::OffsetCommitRequest(commit) => Ok(OffsetCommitResponse::default()
            .topics(Some(
                commit
                    .topics
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|topic| {
                        OffsetCommitResponseTopic::default()
                            .name(topic.name.clone())
                            .partitions(Some(
                                topic
                                    .partitions
                                    .as_deref()
                                    .unwrap_or_default()
                                    .iter()
                                    .map(|partition| {
                                        OffsetCommitResponsePartition::default()
                                            .partition_index(partition.partition_index)
                                            .error_code(error_code.into())
                                    })
                                    .collect(),
                            ))
                    })
                    .collect(),
            ))
            .into()),

        Body::OffsetFetchRequest(_) => Ok(OffsetFetchResponse::default()
            .topics(Some(vec![]))
            .error_code(error_code.into())
            .into()),

        otherwise => Err(Error::Message(format!(
            "not a group request: {}",
            otherwise.api_name()
        ))),
    }
}
