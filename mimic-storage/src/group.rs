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

use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
    sync::RwLock,
    time::SystemTime,
};

use mimic_sans_io::to_timestamp;
use tracing::debug;

use crate::{Result, Topition};

/// The rebalance state of a consumer group.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum GroupState {
    #[default]
    Stable,
    Joining,
    AwaitingSync,
}

impl GroupState {
    /// The name a Kafka client expects for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stable => "Stable",
            Self::Joining => "PreparingRebalance",
            Self::AwaitingSync => "CompletingRebalance",
        }
    }
}

impl Display for GroupState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The balancer state of a group, as published by its balancer.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Snapshot {
    pub state: GroupState,
    pub generation_id: i32,
    pub protocol_type: String,
    pub protocol_name: Option<String>,
    pub leader: Option<String>,
    pub members: Vec<String>,
}

impl Snapshot {
    pub fn is_member(&self, member_id: &str) -> bool {
        self.members.iter().any(|member| member == member_id)
    }

    /// The state reported by ListGroups: a stable group without members is
    /// empty.
    pub fn state_name(&self) -> &'static str {
        if self.state == GroupState::Stable && self.members.is_empty() {
            "Empty"
        } else {
            self.state.as_str()
        }
    }
}

/// A committed offset.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Commit {
    pub offset: i64,
    pub metadata: Option<String>,
    pub timestamp: i64,
}

/// A consumer group, created on first contact.
#[derive(Debug)]
pub struct Group {
    name: String,
    coordinator: i32,
    commits: RwLock<BTreeMap<Topition, Commit>>,
    snapshot: RwLock<Snapshot>,
}

impl Group {
    pub fn new(name: impl Into<String>, coordinator: i32) -> Self {
        Self {
            name: name.into(),
            coordinator,
            commits: RwLock::new(BTreeMap::new()),
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The broker coordinating this group.
    pub fn coordinator(&self) -> i32 {
        self.coordinator
    }

    pub fn commit(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
        metadata: Option<String>,
    ) -> Result<()> {
        let timestamp = to_timestamp(&SystemTime::now())?;

        debug!(group = self.name, topic, partition, offset);

        self.commits
            .write()
            .map(|mut commits| {
                _ = commits.insert(
                    Topition::new(topic, partition),
                    Commit {
                        offset,
                        metadata,
                        timestamp,
                    },
                );
            })
            .map_err(Into::into)
    }

    /// The committed offset, -1 when nothing has been committed.
    pub fn offset(&self, topic: &str, partition: i32) -> Result<i64> {
        self.committed(topic, partition)
            .map(|commit| commit.map_or(-1, |commit| commit.offset))
    }

    pub fn committed(&self, topic: &str, partition: i32) -> Result<Option<Commit>> {
        self.commits
            .read()
            .map(|commits| commits.get(&Topition::new(topic, partition)).cloned())
            .map_err(Into::into)
    }

    /// Every commit made to this group, ordered by topic and partition.
    pub fn commits(&self) -> Result<Vec<(Topition, Commit)>> {
        self.commits
            .read()
            .map(|commits| {
                commits
                    .iter()
                    .map(|(topition, commit)| (topition.clone(), commit.clone()))
                    .collect()
            })
            .map_err(Into::into)
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        self.snapshot
            .read()
            .map(|snapshot| snapshot.clone())
            .map_err(Into::into)
    }

    /// Replace the balancer state of this group.
    pub fn publish(&self, snapshot: Snapshot) -> Result<()> {
        debug!(group = self.name, ?snapshot);

        self.snapshot
            .write()
            .map(|mut current| *current = snapshot)
            .map_err(Into::into)
    }
}
