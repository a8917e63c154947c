//! Manifest id resolution against the info service
//!
//! One request per item returns the depot table for all of the item's depots; the
//! public manifest id of a depot lives at `data[item].depots[depot].manifests.public.gid`.
//! A depot without that path simply has no public version.

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::types::{DepotId, ItemId, ManifestId};
use crate::utils::truncate_body;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct InfoEnvelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Manifest ids resolved for one item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Item the lookup was made for
    pub item: ItemId,
    /// Requested depots in request order, each with its public manifest if one exists
    pub manifests: Vec<(DepotId, Option<ManifestId>)>,
}

impl Resolution {
    /// Public manifest of `depot`, if it was requested and has one
    pub fn manifest_for(&self, depot: DepotId) -> Option<&ManifestId> {
        self.manifests
            .iter()
            .find(|(d, _)| *d == depot)
            .and_then(|(_, m)| m.as_ref())
    }

    /// Depots that have no public manifest
    pub fn missing(&self) -> impl Iterator<Item = DepotId> + '_ {
        self.manifests
            .iter()
            .filter(|(_, m)| m.is_none())
            .map(|(d, _)| *d)
    }
}

/// Map requested depots to manifest ids using the `data` object of an info response
///
/// # Errors
/// Returns [`Error::Resolution`] if `data[item].depots` is not an object. Inside the
/// table, a depot with no public gid simply resolves to `None`.
pub fn manifests_from_info(item: ItemId, data: &Value, depots: &[DepotId]) -> Result<Resolution> {
    let table = data
        .get(item.to_string())
        .and_then(|app| app.get("depots"))
        .filter(|table| table.is_object())
        .ok_or_else(|| Error::Resolution {
            item,
            reason: "no depot table for item".into(),
        })?;

    let manifests = depots
        .iter()
        .map(|depot| {
            let gid = table
                .get(depot.to_string())
                .and_then(|d| d.get("manifests"))
                .and_then(|m| m.get("public"))
                .and_then(|p| p.get("gid"))
                .and_then(Value::as_str)
                .map(ManifestId::from)
                .filter(|gid| {
                    let plain = gid.is_plain();
                    if !plain && !gid.as_str().is_empty() {
                        warn!(
                            item = %item,
                            depot = %depot,
                            gid = %gid,
                            "ignoring malformed manifest id"
                        );
                    }
                    plain
                });
            (*depot, gid)
        })
        .collect();

    Ok(Resolution { item, manifests })
}

/// Client for the info service
#[derive(Clone, Debug)]
pub struct VersionResolver {
    client: reqwest::Client,
    base_url: String,
}

impl VersionResolver {
    /// Create a resolver for the configured info endpoint
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(services: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(services.info_timeout)
            .user_agent(services.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base_url: services.info_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Look up the public manifests of `depots` with a single info request
    ///
    /// # Errors
    /// Returns [`Error::Resolution`] if the request fails, the service answers with a
    /// non-success HTTP status, the body is not JSON, or its `status` field is not
    /// `"success"`. Depots missing from a successful response are not errors.
    pub async fn resolve(&self, item: ItemId, depots: &[DepotId]) -> Result<Resolution> {
        let url = format!("{}/{}", self.base_url, item);
        debug!(item = %item, url = %url, "requesting item info");

        let fail = |reason: String| Error::Resolution { item, reason };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(fail(format!(
                "info service returned HTTP {}: {}",
                status.as_u16(),
                truncate_body(&body, 200)
            )));
        }

        let envelope: InfoEnvelope = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid info response: {e}")))?;

        match envelope.status.as_deref() {
            Some("success") => {}
            other => {
                return Err(fail(format!(
                    "info service reported status {}",
                    other.unwrap_or("<missing>")
                )));
            }
        }

        let resolution = manifests_from_info(item, &envelope.data, depots)?;
        for depot in resolution.missing() {
            warn!(item = %item, depot = %depot, "no public manifest for depot");
        }
        Ok(resolution)
    }
}
