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

//! The balancer of a single consumer group.
//!
//! Every request for the group is sent to the inbox of its balancer task,
//! which owns the membership and generation of the group. Callers park a
//! reply channel that is answered when the request completes, which for a
//! join is only once the join window has closed.

use std::{mem, sync::Arc, time::Duration};

use bytes::Bytes;
use mimic_sans_io::{
    ErrorCode, JoinGroupResponse, SyncGroupResponse, join_group::JoinGroupResponseMember,
};
use mimic_storage::{Group, GroupState, Snapshot};
use tokio::{
    sync::{mpsc, oneshot},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a balancer waits after a rebalance starts for members to join.
pub const DEFAULT_JOIN_WINDOW: Duration = Duration::from_millis(500);

const TICK: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub(crate) struct Member {
    id: String,
    group_instance_id: Option<String>,
    session_timeout: Duration,
    rebalance_timeout: Duration,
    protocols: Vec<(String, Bytes)>,
    assignment: Bytes,
    last_seen: Instant,
}

impl Member {
    pub(crate) fn new(
        id: String,
        group_instance_id: Option<String>,
        session_timeout: Duration,
        rebalance_timeout: Duration,
        protocols: Vec<(String, Bytes)>,
    ) -> Self {
        Self {
            id,
            group_instance_id,
            session_timeout,
            rebalance_timeout,
            protocols,
            assignment: Bytes::new(),
            last_seen: Instant::now(),
        }
    }

    fn supports(&self, protocol: &str) -> bool {
        self.protocols.iter().any(|(name, _)| name == protocol)
    }

    fn metadata(&self, protocol: &str) -> Bytes {
        self.protocols
            .iter()
            .find(|(name, _)| name == protocol)
            .map(|(_, metadata)| metadata.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Join {
        member: Member,
        protocol_type: String,
        reply: oneshot::Sender<JoinGroupResponse>,
    },

    Sync {
        generation_id: i32,
        member_id: String,
        assignments: Vec<(String, Bytes)>,
        reply: oneshot::Sender<SyncGroupResponse>,
    },

    Heartbeat {
        generation_id: i32,
        member_id: String,
        reply: oneshot::Sender<ErrorCode>,
    },

    Leave {
        members: Vec<String>,
        reply: oneshot::Sender<Vec<(String, ErrorCode)>>,
    },

    Tick,
}

/// A rebalance in progress.
#[derive(Debug)]
struct Joining {
    window_end: Instant,
    rebalance_end: Instant,
    previous: Vec<String>,
    joined: Vec<(Member, oneshot::Sender<JoinGroupResponse>)>,
}

impl Joining {
    fn has(&self, member_id: &str) -> bool {
        self.joined.iter().any(|(member, _)| member.id == member_id)
    }

    fn all_rejoined(&self) -> bool {
        self.previous.iter().all(|member_id| self.has(member_id))
    }

    fn deadline(&self) -> Instant {
        if self.all_rejoined() {
            self.window_end
        } else {
            self.window_end.max(self.rebalance_end)
        }
    }
}

fn join_error(error_code: ErrorCode, member_id: &str, generation_id: i32) -> JoinGroupResponse {
    JoinGroupResponse::default()
        .error_code(error_code.into())
        .generation_id(generation_id)
        .member_id(member_id.to_owned())
        .members(Some(vec![]))
}

#[derive(Debug)]
pub(crate) struct Balancer {
    group: Arc<Group>,
    join_window: Duration,
    state: GroupState,
    generation_id: i32,
    protocol_type: String,
    protocol_name: Option<String>,
    leader: Option<String>,
    members: Vec<Member>,
    joining: Option<Joining>,
    syncs: Vec<(String, oneshot::Sender<SyncGroupResponse>)>,
}

impl Balancer {
    pub(crate) fn new(group: Arc<Group>, join_window: Duration) -> Self {
        Self {
            group,
            join_window,
            state: GroupState::Stable,
            generation_id: 0,
            protocol_type: String::new(),
            protocol_name: None,
            leader: None,
            members: Vec::new(),
            joining: None,
            syncs: Vec::new(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut inbox: mpsc::Receiver<Command>,
        cancellation: CancellationToken,
    ) {
        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.deadline();

            tokio::select! {
                command = inbox.recv() => {
                    let Some(command) = command else {
                        debug!(group = self.group.name(), "inbox closed");
                        break;
                    };

                    self.handle(command, Instant::now());
                }

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.complete_if_ready(Instant::now());
                }

                _ = ticker.tick() => {
                    self.handle(Command::Tick, Instant::now());
                }

                _ = cancellation.cancelled() => {
                    debug!(group = self.group.name(), "cancelled");
                    break;
                }
            }
        }
    }

    pub(crate) fn handle(&mut self, command: Command, now: Instant) {
        match command {
            Command::Join {
                member,
                protocol_type,
                reply,
            } => self.join(member, protocol_type, reply, now),

            Command::Sync {
                generation_id,
                member_id,
                assignments,
                reply,
            } => self.sync(generation_id, member_id, &assignments, reply, now),

            Command::Heartbeat {
                generation_id,
                member_id,
                reply,
            } => {
                let error_code = self.heartbeat(generation_id, &member_id, now);
                if reply.send(error_code).is_err() {
                    debug!(member_id, "heartbeat abandoned");
                }
            }

            Command::Leave { members, reply } => {
                let left = self.leave(members, now);
                if reply.send(left).is_err() {
                    debug!("leave abandoned");
                }
            }

            Command::Tick => self.tick(now),
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.joining.as_ref().map(Joining::deadline)
    }

    fn is_member(&self, member_id: &str) -> bool {
        self.members.iter().any(|member| member.id == member_id)
    }

    fn touch(&mut self, member_id: &str, now: Instant) {
        if let Some(member) = self
            .members
            .iter_mut()
            .find(|member| member.id == member_id)
        {
            member.last_seen = now;
        }
    }

    fn publish(&self) {
        _ = self
            .group
            .publish(Snapshot {
                state: self.state,
                generation_id: self.generation_id,
                protocol_type: self.protocol_type.clone(),
                protocol_name: self.protocol_name.clone(),
                leader: self.leader.clone(),
                members: self.members.iter().map(|member| member.id.clone()).collect(),
            })
            .inspect_err(|err| warn!(?err));
    }

    fn sync_response(&self, error_code: ErrorCode, assignment: Bytes) -> SyncGroupResponse {
        SyncGroupResponse::default()
            .error_code(error_code.into())
            .protocol_type(Some(self.protocol_type.clone()))
            .protocol_name(self.protocol_name.clone())
            .assignment(assignment)
    }

    fn assignment(&self, member_id: &str) -> Bytes {
        self.members
            .iter()
            .find(|member| member.id == member_id)
            .map(|member| member.assignment.clone())
            .unwrap_or_default()
    }

    /// Move to joining: members of the current generation must rejoin.
    fn rebalance(&mut self, now: Instant) {
        let previous = self
            .members
            .iter()
            .map(|member| member.id.clone())
            .collect::<Vec<_>>();

        let rebalance_timeout = self
            .members
            .iter()
            .map(|member| member.rebalance_timeout)
            .max()
            .unwrap_or_default()
            .max(self.join_window);

        debug!(group = self.group.name(), ?previous, ?rebalance_timeout);

        for (member_id, reply) in mem::take(&mut self.syncs) {
            if reply
                .send(self.sync_response(ErrorCode::RebalanceInProgress, Bytes::new()))
                .is_err()
            {
                debug!(member_id, "sync abandoned");
            }
        }

        self.state = GroupState::Joining;
        self.joining = Some(Joining {
            window_end: now + self.join_window,
            rebalance_end: now + rebalance_timeout,
            previous,
            joined: Vec::new(),
        });
    }

    fn join(
        &mut self,
        member: Member,
        protocol_type: String,
        reply: oneshot::Sender<JoinGroupResponse>,
        now: Instant,
    ) {
        let populated = !self.members.is_empty()
            || self
                .joining
                .as_ref()
                .is_some_and(|joining| !joining.joined.is_empty());

        if member.protocols.is_empty() || (populated && self.protocol_type != protocol_type) {
            warn!(member_id = member.id, protocol_type, current = self.protocol_type);

            if reply
                .send(join_error(
                    ErrorCode::InconsistentGroupProtocol,
                    &member.id,
                    self.generation_id,
                ))
                .is_err()
            {
                debug!(member_id = member.id, "join abandoned");
            }

            return;
        }

        if self.joining.is_none() {
            self.rebalance(now);
        }

        self.protocol_type = protocol_type;

        if let Some(joining) = self.joining.as_mut() {
            if let Some(position) = joining
                .joined
                .iter()
                .position(|(joined, _)| joined.id == member.id)
            {
                let (_, replaced) = joining.joined.remove(position);
                _ = replaced.send(join_error(
                    ErrorCode::RebalanceInProgress,
                    &member.id,
                    self.generation_id,
                ));
            }

            debug!(member_id = member.id, joined = joining.joined.len());
            joining.joined.push((member, reply));
        }

        self.publish();
        self.complete_if_ready(now);
    }

    fn complete_if_ready(&mut self, now: Instant) {
        if self.deadline().is_some_and(|deadline| now >= deadline) {
            self.complete(now);
        }
    }

    fn empty(&mut self) {
        self.members.clear();
        self.leader = None;
        self.protocol_name = None;
        self.state = GroupState::Stable;
        self.publish();
    }

    /// Close the join window: elect a leader, choose a protocol and reply
    /// to every joiner with the new generation.
    fn complete(&mut self, now: Instant) {
        let Some(Joining { joined, .. }) = self.joining.take() else {
            return;
        };

        let leader = self
            .leader
            .as_ref()
            .filter(|leader| joined.iter().any(|(member, _)| &&member.id == leader))
            .cloned()
            .or_else(|| joined.first().map(|(member, _)| member.id.clone()));

        let Some(leader) = leader else {
            debug!(group = self.group.name(), "no members joined");
            self.empty();
            return;
        };

        let protocol = joined
            .iter()
            .find(|(member, _)| member.id == leader)
            .and_then(|(member, _)| {
                member
                    .protocols
                    .iter()
                    .map(|(name, _)| name)
                    .find(|name| joined.iter().all(|(other, _)| other.supports(name)))
                    .cloned()
            });

        let Some(protocol) = protocol else {
            warn!(group = self.group.name(), "no common protocol");

            for (member, reply) in joined {
                _ = reply.send(join_error(
                    ErrorCode::InconsistentGroupProtocol,
                    &member.id,
                    self.generation_id,
                ));
            }

            self.empty();
            return;
        };

        self.generation_id += 1;
        self.state = GroupState::AwaitingSync;
        self.leader = Some(leader.clone());
        self.protocol_name = Some(protocol.clone());

        let listed = joined
            .iter()
            .map(|(member, _)| {
                JoinGroupResponseMember::default()
                    .member_id(member.id.clone())
                    .group_instance_id(member.group_instance_id.clone())
                    .metadata(member.metadata(&protocol))
            })
            .collect::<Vec<_>>();

        let (members, replies): (Vec<_>, Vec<_>) = joined
            .into_iter()
            .map(|(mut member, reply)| {
                member.last_seen = now;
                member.assignment = Bytes::new();
                (member, reply)
            })
            .unzip();

        self.members = members;

        debug!(
            group = self.group.name(),
            generation_id = self.generation_id,
            leader,
            protocol,
            members = self.members.len()
        );

        for (member, reply) in self.members.iter().zip(replies) {
            let response = JoinGroupResponse::default()
                .error_code(ErrorCode::None.into())
                .generation_id(self.generation_id)
                .protocol_type(Some(self.protocol_type.clone()))
                .protocol_name(Some(protocol.clone()))
                .leader(leader.clone())
                .member_id(member.id.clone())
                .members(Some(if member.id == leader {
                    listed.clone()
                } else {
                    vec![]
                }));

            if reply.send(response).is_err() {
                debug!(member_id = member.id, "join abandoned");
            }
        }

        self.publish();
    }

    fn sync(
        &mut self,
        generation_id: i32,
        member_id: String,
        assignments: &[(String, Bytes)],
        reply: oneshot::Sender<SyncGroupResponse>,
        now: Instant,
    ) {
        let error_code = if member_id.is_empty() {
            ErrorCode::MemberIdRequired
        } else if self.state == GroupState::Joining {
            ErrorCode::RebalanceInProgress
        } else if !self.is_member(&member_id) {
            ErrorCode::UnknownMemberId
        } else if generation_id != self.generation_id {
            ErrorCode::IllegalGeneration
        } else {
            ErrorCode::None
        };

        if !error_code.is_none() {
            debug!(member_id, generation_id, ?error_code);
            _ = reply.send(self.sync_response(error_code, Bytes::new()));
            return;
        }

        self.touch(&member_id, now);

        match self.state {
            GroupState::Stable => {
                _ = reply.send(self.sync_response(ErrorCode::None, self.assignment(&member_id)));
            }

            GroupState::AwaitingSync => {
                let is_leader = self.leader.as_deref() == Some(member_id.as_str());
                self.syncs.push((member_id, reply));

                if is_leader {
                    for member in &mut self.members {
                        member.assignment = assignments
                            .iter()
                            .find(|(assigned, _)| assigned == &member.id)
                            .map(|(_, assignment)| assignment.clone())
                            .unwrap_or_default();
                    }

                    self.state = GroupState::Stable;

                    for (member_id, reply) in mem::take(&mut self.syncs) {
                        let response =
                            self.sync_response(ErrorCode::None, self.assignment(&member_id));

                        if reply.send(response).is_err() {
                            debug!(member_id, "sync abandoned");
                        }
                    }

                    self.publish();
                }
            }

            GroupState::Joining => {
                debug!(member_id, "joining");
            }
        }
    }

    fn heartbeat(&mut self, generation_id: i32, member_id: &str, now: Instant) -> ErrorCode {
        let joining = self
            .joining
            .as_ref()
            .is_some_and(|joining| joining.has(member_id));

        if member_id.is_empty() || !(self.is_member(member_id) || joining) {
            return ErrorCode::UnknownMemberId;
        }

        self.touch(member_id, now);

        if self.state != GroupState::Stable {
            ErrorCode::RebalanceInProgress
        } else if generation_id != self.generation_id {
            ErrorCode::IllegalGeneration
        } else {
            ErrorCode::None
        }
    }

    fn remove(&mut self, member_id: &str) {
        self.members.retain(|member| member.id != member_id);

        if self.leader.as_deref() == Some(member_id) {
            self.leader = None;
        }

        if let Some(joining) = self.joining.as_mut() {
            joining.previous.retain(|previous| previous != member_id);

            if let Some(position) = joining
                .joined
                .iter()
                .position(|(joined, _)| joined.id == member_id)
            {
                let (_, reply) = joining.joined.remove(position);
                _ = reply.send(join_error(
                    ErrorCode::UnknownMemberId,
                    member_id,
                    self.generation_id,
                ));
            }
        }
    }

    /// Members have left, or expired: those remaining must rejoin.
    fn departed(&mut self, now: Instant) {
        if self.joining.is_some() {
            self.publish();
        } else if self.members.is_empty() {
            for (_, reply) in mem::take(&mut self.syncs) {
                _ = reply.send(self.sync_response(ErrorCode::RebalanceInProgress, Bytes::new()));
            }

            self.empty();
        } else {
            self.rebalance(now);
            self.publish();
        }
    }

    fn leave(&mut self, member_ids: Vec<String>, now: Instant) -> Vec<(String, ErrorCode)> {
        let mut departed = false;

        let left = member_ids
            .into_iter()
            .map(|member_id| {
                let known = self.is_member(&member_id)
                    || self
                        .joining
                        .as_ref()
                        .is_some_and(|joining| joining.has(&member_id));

                if known {
                    debug!(group = self.group.name(), member_id);
                    self.remove(&member_id);
                    departed = true;
                    (member_id, ErrorCode::None)
                } else {
                    (member_id, ErrorCode::UnknownMemberId)
                }
            })
            .collect();

        if departed {
            self.departed(now);
        }

        left
    }

    fn tick(&mut self, now: Instant) {
        if self.state == GroupState::Stable {
            let expired = self
                .members
                .iter()
                .filter(|member| now.duration_since(member.last_seen) > member.session_timeout)
                .map(|member| member.id.clone())
                .collect::<Vec<_>>();

            if !expired.is_empty() {
                debug!(group = self.group.name(), ?expired);

                for member_id in &expired {
                    self.remove(member_id);
                }

                self.departed(now);
            }
        } else {
            self.complete_if_ready(now);
        }
    }
}
