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

use std::{collections::BTreeMap, net::SocketAddr, time::SystemTime};

use tracing::debug;
use uuid::Uuid;

/// State kept for the lifetime of a client connection.
#[derive(Clone, Debug)]
pub struct ClientContext {
    peer: SocketAddr,
    client_id: Option<String>,
    software_name: Option<String>,
    software_version: Option<String>,
    last_heartbeat: Option<SystemTime>,
    members: BTreeMap<String, String>,
}

impl ClientContext {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            client_id: None,
            software_name: None,
            software_version: None,
            last_heartbeat: None,
            members: BTreeMap::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn software_name(&self) -> Option<&str> {
        self.software_name.as_deref()
    }

    pub fn software_version(&self) -> Option<&str> {
        self.software_version.as_deref()
    }

    pub fn last_heartbeat(&self) -> Option<SystemTime> {
        self.last_heartbeat
    }

    /// The member id this connection uses within `group_id`.
    pub fn member_id(&self, group_id: &str) -> Option<&str> {
        self.members.get(group_id).map(String::as_str)
    }

    pub(crate) fn identify(&mut self, client_id: Option<String>) {
        if client_id.is_some() {
            self.client_id = client_id;
        }
    }

    pub(crate) fn software(&mut self, name: &str, version: &str) {
        debug!(peer = %self.peer, name, version);

        self.software_name = Some(name).filter(|name| !name.is_empty()).map(ToOwned::to_owned);
        self.software_version = Some(version)
            .filter(|version| !version.is_empty())
            .map(ToOwned::to_owned);
    }

    pub(crate) fn heartbeat(&mut self) {
        self.last_heartbeat = Some(SystemTime::now());
    }

    /// The member id for a join: the requested id, otherwise the id
    /// already given to this connection, otherwise a new one.
    pub(crate) fn join(&mut self, group_id: &str, requested: &str) -> String {
        let member_id = if !requested.is_empty() {
            requested.to_owned()
        } else if let Some(existing) = self.members.get(group_id) {
            existing.clone()
        } else {
            let id = Uuid::new_v4();

            self.software_name
                .as_deref()
                .map_or_else(|| id.to_string(), |name| format!("{name}-{id}"))
        };

        _ = self.members.insert(group_id.to_owned(), member_id.clone());
        member_id
    }

    pub(crate) fn leave(&mut self, group_id: &str) {
        _ = self.members.remove(group_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::net::{IpAddr, Ipv4Addr};

    fn context() -> ClientContext {
        ClientContext::new(SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 32123)))
    }

    #[test]
    fn member_ids() {
        let mut context = context();

        let anonymous = context.join("g", "");
        assert!(Uuid::parse_str(&anonymous).is_ok());
        assert_eq!(anonymous, context.join("g", ""));
        assert_eq!(Some(anonymous.as_str()), context.member_id("g"));

        context.leave("g");
        context.software("kafka-python", "2.0.2");

        let named = context.join("g", "");
        assert!(named.starts_with("kafka-python-"));

        assert_eq!("abc", context.join("h", "abc"));
        assert_eq!(Some("abc"), context.member_id("h"));
    }

    #[test]
    fn empty_software_is_absent() {
        let mut context = context();
        context.software("", "");
        assert_eq!(None, context.software_name());
        assert_eq!(None, context.software_version());

        context.identify(Some("console".into()));
        context.identify(None);
        assert_eq!(Some("console"), context.client_id());
    }
}
