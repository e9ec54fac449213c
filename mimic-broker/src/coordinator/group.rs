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

//! Consumer group coordination.

mod balancer;

use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use mimic_sans_io::{
    Body, ErrorCode, HeartbeatResponse, LeaveGroupResponse, OffsetCommitResponse,
    OffsetFetchResponse,
    join_group::JoinGroupRequestProtocol,
    leave_group::{MemberIdentity, MemberResponse},
    offset_commit::{
        OffsetCommitRequestTopic, OffsetCommitResponsePartition, OffsetCommitResponseTopic,
    },
    offset_fetch::{
        OffsetFetchRequestTopic, OffsetFetchResponsePartition, OffsetFetchResponseTopic,
    },
    sync_group::SyncGroupRequestAssignment,
};
use mimic_storage::{GroupState, Store};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span};

use crate::{Error, Result};

pub use balancer::DEFAULT_JOIN_WINDOW;
use balancer::{Balancer, Command, Member};

const INBOX_CAPACITY: usize = 64;

/// The details of a JoinGroup request.
#[derive(Clone, Copy, Debug)]
pub struct Join<'a> {
    pub group_id: &'a str,
    pub session_timeout_ms: i32,
    pub rebalance_timeout_ms: i32,
    pub member_id: &'a str,
    pub group_instance_id: Option<&'a str>,
    pub protocol_type: &'a str,
    pub protocols: Option<&'a [JoinGroupRequestProtocol]>,
}

/// The details of an OffsetCommit request.
#[derive(Clone, Copy, Debug)]
pub struct OffsetCommit<'a> {
    pub group_id: &'a str,
    pub generation_id_or_member_epoch: i32,
    pub member_id: &'a str,
    pub topics: Option<&'a [OffsetCommitRequestTopic]>,
}

#[async_trait]
pub trait Coordinator: Debug + Send + Sync {
    async fn join(&mut self, join: Join<'_>) -> Result<Body>;

    async fn sync(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        assignments: Option<&[SyncGroupRequestAssignment]>,
    ) -> Result<Body>;

    async fn heartbeat(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
    ) -> Result<Body>;

    async fn leave(
        &mut self,
        group_id: &str,
        member_id: Option<&str>,
        members: Option<&[MemberIdentity]>,
    ) -> Result<Body>;

    async fn offset_commit(&mut self, commit: OffsetCommit<'_>) -> Result<Body>;

    async fn offset_fetch(
        &mut self,
        group_id: &str,
        topics: Option<&[OffsetFetchRequestTopic]>,
    ) -> Result<Body>;
}

/// Routes requests to the balancer task of each group, starting one on
/// first use.
#[derive(Clone, Debug)]
pub struct Controller {
    store: Arc<Store>,
    join_window: Duration,
    balancers: Arc<Mutex<BTreeMap<String, mpsc::Sender<Command>>>>,
    cancellation: CancellationToken,
}

fn duration(ms: i32) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or_default())
}

impl Controller {
    pub fn new(store: Arc<Store>, cancellation: CancellationToken) -> Self {
        Self {
            store,
            join_window: DEFAULT_JOIN_WINDOW,
            balancers: Arc::new(Mutex::new(BTreeMap::new())),
            cancellation,
        }
    }

    pub fn join_window(self, join_window: Duration) -> Self {
        Self {
            join_window,
            ..self
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn inbox(&self, group_id: &str) -> Result<mpsc::Sender<Command>> {
        let mut balancers = self.balancers.lock()?;

        if let Some(inbox) = balancers.get(group_id).filter(|inbox| !inbox.is_closed()) {
            return Ok(inbox.clone());
        }

        let group = self.store.group_or_create(group_id)?;
        let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);

        debug!(group_id, join_window = ?self.join_window);

        let span = debug_span!("balancer", group_id);
        let balancer = Balancer::new(group, self.join_window);
        drop(tokio::spawn(
            balancer
                .run(receiver, self.cancellation.child_token())
                .instrument(span),
        ));

        _ = balancers.insert(group_id.to_owned(), sender.clone());
        Ok(sender)
    }

    async fn send<T>(
        &self,
        group_id: &str,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();

        self.inbox(group_id)?
            .send(command(reply))
            .await
            .map_err(|_| Error::BalancerStopped(group_id.to_owned()))?;

        response.await.map_err(Into::into)
    }
}

#[async_trait]
impl Coordinator for Controller {
    async fn join(&mut self, join: Join<'_>) -> Result<Body> {
        let session_timeout = duration(join.session_timeout_ms);

        let rebalance_timeout = if join.rebalance_timeout_ms > 0 {
            duration(join.rebalance_timeout_ms)
        } else {
            session_timeout
        };

        let protocols = join
            .protocols
            .unwrap_or_default()
            .iter()
            .map(|protocol| (protocol.name.clone(), protocol.metadata.clone()))
            .collect();

        let member = Member::new(
            join.member_id.to_owned(),
            join.group_instance_id.map(ToOwned::to_owned),
            session_timeout,
            rebalance_timeout,
            protocols,
        );

        let protocol_type = join.protocol_type.to_owned();

        self.send(join.group_id, |reply| Command::Join {
            member,
            protocol_type,
            reply,
        })
        .await
        .map(Body::from)
    }

    async fn sync(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
        assignments: Option<&[SyncGroupRequestAssignment]>,
    ) -> Result<Body> {
        let assignments = assignments
            .unwrap_or_default()
            .iter()
            .map(|assignment| (assignment.member_id.clone(), assignment.assignment.clone()))
            .collect::<Vec<(String, Bytes)>>();

        let member_id = member_id.to_owned();

        self.send(group_id, |reply| Command::Sync {
            generation_id,
            member_id,
            assignments,
            reply,
        })
        .await
        .map(Body::from)
    }

    async fn heartbeat(
        &mut self,
        group_id: &str,
        generation_id: i32,
        member_id: &str,
    ) -> Result<Body> {
        let member_id = member_id.to_owned();

        self.send(group_id, |reply| Command::Heartbeat {
            generation_id,
            member_id,
            reply,
        })
        .await
        .map(|error_code| {
            HeartbeatResponse::default()
                .error_code(error_code.into())
                .into()
        })
    }

    async fn leave(
        &mut self,
        group_id: &str,
        member_id: Option<&str>,
        members: Option<&[MemberIdentity]>,
    ) -> Result<Body> {
        let leaving = members.map_or_else(
            || member_id.map(ToOwned::to_owned).into_iter().collect(),
            |members| {
                members
                    .iter()
                    .map(|member| member.member_id.clone())
                    .collect::<Vec<_>>()
            },
        );

        let batched = members.is_some();

        let left = self
            .send(group_id, |reply| Command::Leave {
                members: leaving,
                reply,
            })
            .await?;

        // v0 to v2 carry a single member, answered in the top level error
        let error_code = if batched {
            ErrorCode::None
        } else {
            left.first()
                .map_or(ErrorCode::UnknownMemberId, |(_, error_code)| *error_code)
        };

        let members = batched.then(|| {
            left.into_iter()
                .map(|(member_id, error_code)| {
                    MemberResponse::default()
                        .member_id(member_id)
                        .error_code(error_code.into())
                })
                .collect()
        });

        Ok(LeaveGroupResponse::default()
            .error_code(error_code.into())
            .members(members)
            .into())
    }

    async fn offset_commit(&mut self, commit: OffsetCommit<'_>) -> Result<Body> {
        let group = self.store.group_or_create(commit.group_id)?;
        let snapshot = group.snapshot()?;

        // a negative generation without a member is a commit from outside
        // of group management
        let standalone = commit.generation_id_or_member_epoch < 0 && commit.member_id.is_empty();

        let rejected = if standalone {
            ErrorCode::None
        } else if snapshot.state == GroupState::Joining {
            ErrorCode::RebalanceInProgress
        } else if !snapshot.is_member(commit.member_id) {
            ErrorCode::UnknownMemberId
        } else if commit.generation_id_or_member_epoch != snapshot.generation_id {
            ErrorCode::IllegalGeneration
        } else {
            ErrorCode::None
        };

        debug!(group_id = commit.group_id, standalone, ?rejected);

        let mut topics = vec![];

        for topic in commit.topics.unwrap_or_default() {
            let known = self.store.topic(&topic.name)?;
            let mut partitions = vec![];

            for partition in topic.partitions.as_deref().unwrap_or_default() {
                let error_code = if !rejected.is_none() {
                    rejected
                } else if known
                    .as_ref()
                    .is_some_and(|known| known.partition(partition.partition_index).is_some())
                {
                    group.commit(
                        &topic.name,
                        partition.partition_index,
                        partition.committed_offset,
                        partition.committed_metadata.clone(),
                    )?;
                    ErrorCode::None
                } else {
                    ErrorCode::UnknownTopicOrPartition
                };

                partitions.push(
                    OffsetCommitResponsePartition::default()
                        .partition_index(partition.partition_index)
                        .error_code(error_code.into()),
                );
            }

            topics.push(
                OffsetCommitResponseTopic::default()
                    .name(topic.name.clone())
                    .partitions(Some(partitions)),
            );
        }

        Ok(OffsetCommitResponse::default().topics(Some(topics)).into())
    }

    async fn offset_fetch(
        &mut self,
        group_id: &str,
        topics: Option<&[OffsetFetchRequestTopic]>,
    ) -> Result<Body> {
        let group = self.store.group(group_id)?;

        let committed = |topic: &str, partition: i32| -> Result<OffsetFetchResponsePartition> {
            let commit = group
                .as_ref()
                .map(|group| group.committed(topic, partition))
                .transpose()?
                .flatten();

            Ok(OffsetFetchResponsePartition::default()
                .partition_index(partition)
                .committed_offset(commit.as_ref().map_or(-1, |commit| commit.offset))
                .committed_leader_epoch(-1)
                .metadata(commit.and_then(|commit| commit.metadata))
                .error_code(ErrorCode::None.into()))
        };

        let responses = if let Some(topics) = topics {
            topics
                .iter()
                .map(|topic| {
                    topic
                        .partition_indexes
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .map(|partition| committed(&topic.name, *partition))
                        .collect::<Result<Vec<_>>>()
                        .map(|partitions| {
                            OffsetFetchResponseTopic::default()
                                .name(topic.name.clone())
                                .partitions(Some(partitions))
                        })
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            let mut by_topic = BTreeMap::<String, Vec<OffsetFetchResponsePartition>>::new();

            for (topition, commit) in group
                .as_ref()
                .map(|group| group.commits())
                .transpose()?
                .unwrap_or_default()
            {
                by_topic.entry(topition.topic().to_owned()).or_default().push(
                    OffsetFetchResponsePartition::default()
                        .partition_index(topition.partition())
                        .committed_offset(commit.offset)
                        .committed_leader_epoch(-1)
                        .metadata(commit.metadata)
                        .error_code(ErrorCode::None.into()),
                );
            }

            by_topic
                .into_iter()
                .map(|(name, partitions)| {
                    OffsetFetchResponseTopic::default()
                        .name(name)
                        .partitions(Some(partitions))
                })
                .collect()
        };

        Ok(OffsetFetchResponse::default()
            .topics(Some(responses))
            .error_code(ErrorCode::None.into())
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_sans_io::{
        JoinGroupResponse, SyncGroupResponse, offset_commit::OffsetCommitRequestPartition,
    };
    use mimic_storage::Broker;
    use pretty_assertions::assert_eq;

    fn controller() -> Result<Controller> {
        let store = Store::builder()
            .broker(Broker::new(111, "localhost", 9092))
            .build()
            .map(Arc::new)?;

        _ = store.create_topic("orders", 2, 1)?;

        Ok(Controller::new(store, CancellationToken::new()))
    }

    fn protocols() -> Vec<JoinGroupRequestProtocol> {
        vec![
            JoinGroupRequestProtocol::default()
                .name("range".into())
                .metadata(Bytes::from_static(b"m")),
        ]
    }

    fn join<'a>(member_id: &'a str, protocols: &'a [JoinGroupRequestProtocol]) -> Join<'a> {
        Join {
            group_id: "g",
            session_timeout_ms: 30_000,
            rebalance_timeout_ms: 60_000,
            member_id,
            group_instance_id: None,
            protocol_type: "consumer",
            protocols: Some(protocols),
        }
    }

    fn commit<'a>(
        generation_id_or_member_epoch: i32,
        member_id: &'a str,
        topics: &'a [OffsetCommitRequestTopic],
    ) -> OffsetCommit<'a> {
        OffsetCommit {
            group_id: "g",
            generation_id_or_member_epoch,
            member_id,
            topics: Some(topics),
        }
    }

    fn commit_error_codes(body: Body) -> Result<Vec<i16>> {
        OffsetCommitResponse::try_from(body)
            .map(|response| {
                response
                    .topics
                    .unwrap_or_default()
                    .into_iter()
                    .flat_map(|topic| topic.partitions.unwrap_or_default())
                    .map(|partition| partition.error_code)
                    .collect()
            })
            .map_err(Into::into)
    }

    #[tokio::test(start_paused = true)]
    async fn join_sync_commit_fetch() -> Result<()> {
        let mut controller = controller()?;
        let protocols = protocols();

        let joined = JoinGroupResponse::try_from(controller.join(join("a", &protocols)).await?)?;
        assert_eq!(i16::from(ErrorCode::None), joined.error_code);
        assert_eq!(1, joined.generation_id);

        let assignments = [SyncGroupRequestAssignment::default()
            .member_id("a".into())
            .assignment(Bytes::from_static(b"orders-0"))];

        let synced = SyncGroupResponse::try_from(
            controller.sync("g", 1, "a", Some(&assignments)).await?,
        )?;
        assert_eq!(Bytes::from_static(b"orders-0"), synced.assignment);

        let topics = [OffsetCommitRequestTopic::default()
            .name("orders".into())
            .partitions(Some(vec![
                OffsetCommitRequestPartition::default()
                    .partition_index(0)
                    .committed_offset(42),
                OffsetCommitRequestPartition::default()
                    .partition_index(7)
                    .committed_offset(1),
            ]))];

        assert_eq!(
            vec![
                i16::from(ErrorCode::None),
                i16::from(ErrorCode::UnknownTopicOrPartition)
            ],
            commit_error_codes(controller.offset_commit(commit(1, "a", &topics)).await?)?
        );

        assert_eq!(
            vec![i16::from(ErrorCode::IllegalGeneration); 2],
            commit_error_codes(controller.offset_commit(commit(3, "a", &topics)).await?)?
        );

        assert_eq!(
            vec![i16::from(ErrorCode::UnknownMemberId); 2],
            commit_error_codes(controller.offset_commit(commit(1, "z", &topics)).await?)?
        );

        let fetched = OffsetFetchResponse::try_from(
            controller
                .offset_fetch(
                    "g",
                    Some(&[OffsetFetchRequestTopic::default()
                        .name("orders".into())
                        .partition_indexes(Some(vec![0, 1]))]),
                )
                .await?,
        )?;

        assert_eq!(
            vec![42, -1],
            fetched
                .topics
                .unwrap_or_default()
                .into_iter()
                .flat_map(|topic| topic.partitions.unwrap_or_default())
                .map(|partition| partition.committed_offset)
                .collect::<Vec<_>>()
        );

        let everything = OffsetFetchResponse::try_from(controller.offset_fetch("g", None).await?)?;
        assert_eq!(1, everything.topics.unwrap_or_default().len());

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn standalone_commit() -> Result<()> {
        let mut controller = controller()?;

        let topics = [OffsetCommitRequestTopic::default()
            .name("orders".into())
            .partitions(Some(vec![
                OffsetCommitRequestPartition::default()
                    .partition_index(1)
                    .committed_offset(5),
            ]))];

        assert_eq!(
            vec![i16::from(ErrorCode::None)],
            commit_error_codes(controller.offset_commit(commit(-1, "", &topics)).await?)?
        );

        assert_eq!(
            Some(5),
            controller
                .store()
                .group("g")?
                .map(|group| group.offset("orders", 1))
                .transpose()?
        );

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn leave_versions() -> Result<()> {
        let mut controller = controller()?;
        let protocols = protocols();

        _ = controller.join(join("a", &protocols)).await?;

        let single = LeaveGroupResponse::try_from(controller.leave("g", Some("z"), None).await?)?;
        assert_eq!(i16::from(ErrorCode::UnknownMemberId), single.error_code);
        assert_eq!(None, single.members);

        let batched = LeaveGroupResponse::try_from(
            controller
                .leave(
                    "g",
                    None,
                    Some(&[MemberIdentity::default().member_id("a".into())]),
                )
                .await?,
        )?;
        assert_eq!(i16::from(ErrorCode::None), batched.error_code);
        assert_eq!(
            Some(vec![
                MemberResponse::default()
                    .member_id("a".into())
                    .error_code(ErrorCode::None.into())
            ]),
            batched.members
        );

        Ok(())
    }
}
