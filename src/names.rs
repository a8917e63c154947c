//! Best-effort display names from the store service
//!
//! Names are cosmetic: every failure (timeout, HTTP error, unexpected JSON,
//! `success: false`) falls back to [`placeholder_name`].

use crate::config::ServiceConfig;
use crate::error::Result;
use crate::types::{ItemId, placeholder_name};
use serde_json::Value;
use tracing::debug;

/// Client for the store's app details endpoint
#[derive(Clone, Debug)]
pub struct NameLookup {
    client: reqwest::Client,
    base_url: String,
}

impl NameLookup {
    /// Create a lookup client for the configured store endpoint
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(services: &ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(services.name_timeout)
            .user_agent(services.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base_url: services.store_base_url.clone(),
        })
    }

    /// Display name of `item`, or the placeholder when the store has none
    pub async fn lookup(&self, item: ItemId) -> String {
        match self.try_lookup(item).await {
            Some(name) => name,
            None => placeholder_name(item),
        }
    }

    async fn try_lookup(&self, item: ItemId) -> Option<String> {
        let id = item.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("appids", id.as_str()), ("filters", "basic")])
            .send()
            .await
            .map_err(|e| debug!(item = %item, error = %e, "name lookup failed"))
            .ok()?;

        if !response.status().is_success() {
            debug!(item = %item, status = %response.status(), "name lookup rejected");
            return None;
        }

        let body: Value = response.json().await.ok()?;
        let entry = body.get(&id)?;
        if entry.get("success").and_then(Value::as_bool) != Some(true) {
            return None;
        }
        entry
            .get("data")?
            .get("name")?
            .as_str()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}
