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

use mimic_http::{Engine, Error, Result};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

mod common;

#[tokio::test]
async fn petstore_over_http() -> Result<()> {
    let _guard = common::init_tracing()?;

    let cancellation = CancellationToken::new();
    let engine = Engine::new(common::fixture("petstore.yaml")?);
    let (addr, served) = common::start(engine, cancellation.clone()).await?;

    let by_status = common::send(addr, "GET /api/v3/pet/findByStatus?status=available", &[]).await?;
    assert_eq!(200, by_status.status);
    assert_eq!(Some("application/json"), by_status.header("content-type"));

    let pets = serde_json::from_str::<Value>(&by_status.body)?;
    let pets = pets
        .as_array()
        .ok_or_else(|| Error::Message(by_status.body.clone()))?;
    assert!(pets.iter().all(|pet| pet["name"] == "doggie"));

    let as_xml = common::send(
        addr,
        "GET /api/v3/pet/findByStatus?status=sold",
        &[("Accept", "application/xml")],
    )
    .await?;
    assert_eq!(200, as_xml.status);
    assert_eq!(Some("application/xml"), as_xml.header("content-type"));
    assert!(as_xml.body.starts_with("<pets"), "{}", as_xml.body);

    let missing = common::send(addr, "GET /api/v3/pet/findByStatus", &[]).await?;
    assert_eq!(400, missing.status);
    assert_eq!("query parameter status: required parameter not found", missing.body);

    let pet = common::send(addr, "GET /api/v3/pet/10", &[]).await?;
    assert_eq!(200, pet.status);
    let pet = serde_json::from_str::<Value>(&pet.body)?;
    assert_eq!(10, pet["id"]);
    assert_eq!("doggie", pet["name"]);

    let invalid = common::send(addr, "GET /api/v3/pet/rex", &[]).await?;
    assert_eq!(400, invalid.status);

    let unknown = common::send(addr, "GET /pet/10", &[]).await?;
    assert_eq!(404, unknown.status);
    assert_eq!("no matching endpoint found at /pet/10", unknown.body);

    cancellation.cancel();
    served
        .await
        .map_err(|err| Error::Message(err.to_string()))??;
    Ok(())
}
