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

use mimic_sans_io::{
    ApiVersionsResponse, ErrorCode, RootMessageMeta, api_versions::ApiVersion,
};

/// The API versions supported by this broker.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct ApiVersionsRequest;

impl ApiVersionsRequest {
    pub(crate) fn response(&self, error_code: ErrorCode) -> ApiVersionsResponse {
        ApiVersionsResponse::default()
            .error_code(error_code.into())
            .api_keys(
                RootMessageMeta::messages()
                    .requests()
                    .iter()
                    .map(|(api_key, meta)| {
                        ApiVersion::default()
                            .api_key(*api_key)
                            .min_version(meta.version.valid.start)
                            .max_version(meta.version.valid.end)
                    })
                    .collect(),
            )
            .throttle_time_ms(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn every_request_is_listed() {
        let response = ApiVersionsRequest.response(ErrorCode::None);

        assert_eq!(i16::from(ErrorCode::None), response.error_code);
        assert_eq!(
            vec![0, 1, 2, 3, 8, 9, 10, 11, 12, 13, 14, 16, 18, 19, 22],
            response
                .api_keys
                .iter()
                .map(|api_version| api_version.api_key)
                .collect::<Vec<_>>()
        );

        let produce = response
            .api_keys
            .iter()
            .find(|api_version| api_version.api_key == 0);

        assert_eq!(Some(0), produce.map(|produce| produce.min_version));
        assert_eq!(Some(8), produce.map(|produce| produce.max_version));
    }
}
