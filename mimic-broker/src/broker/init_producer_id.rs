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

use mimic_sans_io::{ErrorCode, InitProducerIdResponse};
use mimic_storage::Store;
use tracing::debug;

#[derive(Clone, Debug)]
pub(crate) struct InitProducerIdRequest {
    store: Arc<Store>,
}

impl InitProducerIdRequest {
    pub(crate) fn with_store(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub(crate) fn response(&self, transactional_id: Option<&str>) -> InitProducerIdResponse {
        let producer_id = self.store.next_producer_id();
        debug!(transactional_id, producer_id);

        InitProducerIdResponse::default()
            .error_code(ErrorCode::None.into())
            .producer_id(producer_id)
            .producer_epoch(0)
    }
}
