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

use mimic_sans_io::{ErrorCode, FindCoordinatorResponse};
use mimic_storage::Store;
use tracing::debug;

use crate::Result;

const GROUP: i8 = 0;

#[derive(Clone, Debug)]
pub(crate) struct FindCoordinatorRequest {
    store: Arc<Store>,
}

impl FindCoordinatorRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn unavailable(error_code: ErrorCode) -> FindCoordinatorResponse {
        FindCoordinatorResponse::default()
            .error_code(error_code.into())
            .error_message(Some(error_code.description().to_owned()))
            .node_id(-1)
            .port(-1)
    }

    pub(crate) fn response(&self, key: &str, key_type: i8) -> Result<FindCoordinatorResponse> {
        debug!(key, key_type);

        if key_type != GROUP {
            return Ok(Self::unavailable(ErrorCode::CoordinatorNotAvailable));
        }

        if key.is_empty() {
            return Ok(Self::unavailable(ErrorCode::InvalidGroupId));
        }

        let group = self.store.group_or_create(key)?;
        let coordinator = self.store.coordinator();

        debug!(group = group.name(), coordinator = coordinator.id());

        Ok(FindCoordinatorResponse::default()
            .error_code(ErrorCode::None.into())
            .node_id(coordinator.id())
            .host(coordinator.host().to_owned())
            .port(coordinator.port()))
    }
}
