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

use std::sync::Arc;

use mimic_sans_io::{ErrorCode, ListGroupsResponse, list_groups::ListedGroup};
use mimic_storage::Store;

use crate::Result;

#[derive(Clone, Debug)]
pub(crate) struct ListGroupsRequest {
    store: Arc<Store>,
}

impl ListGroupsRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub(crate) fn response(&self, states_filter: Option<&[String]>) -> Result<ListGroupsResponse> {
        let states = states_filter.unwrap_or_default();
        let mut groups = vec![];

        for group in self.store.groups()? {
            let snapshot = group.snapshot()?;
            let state = snapshot.state_name();

            if states.is_empty() || states.iter().any(|filter| filter.eq_ignore_ascii_case(state)) {
                groups.push(
                    ListedGroup::default()
                        .group_id(group.name().to_owned())
                        .protocol_type(snapshot.protocol_type.clone())
                        .group_state(state.to_owned()),
                );
            }
        }

        Ok(ListGroupsResponse::default()
            .error_code(ErrorCode::None.into())
            .groups(Some(groups)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_storage::{Broker, GroupState, Snapshot};
    use pretty_assertions::assert_eq;

    #[test]
    fn filter_by_state() -> Result<()> {
        let store = Store::builder()
            .broker(Broker::new(111, "localhost", 9092))
            .build()
            .map(Arc::new)?;

        _ = store.group_or_create("idle")?;

        store.group_or_create("busy")?.publish(Snapshot {
            state: GroupState::Stable,
            generation_id: 3,
            protocol_type: "consumer".into(),
            protocol_name: Some("range".into()),
            leader: Some("m".into()),
            members: vec!["m".into()],
        })?;

        let list = ListGroupsRequest::with_store(store);

        let names = |response: ListGroupsResponse| {
            response
                .groups
                .unwrap_or_default()
                .into_iter()
                .map(|group| (group.group_id, group.group_state))
                .collect::<Vec<_>>()
        };

        assert_eq!(
            vec![
                ("busy".into(), "Stable".into()),
                ("idle".into(), "Empty".into())
            ],
            names(list.response(None)?)
        );

        assert_eq!(
            vec![("idle".into(), "Empty".into())],
            names(list.response(Some(&["empty".into()]))?)
        );
        Ok(())
    }
}
