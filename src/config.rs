//! Configuration types for manifest-dl
//!
//! Every component receives the sub-config it needs at construction time; there is
//! no process-wide state. Durations are serialized as whole seconds.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Descriptor discovery settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory holding `{itemId}.{extension}` descriptor files
    #[serde(default = "default_descriptor_dir")]
    pub descriptor_dir: PathBuf,

    /// Descriptor file extension, without the dot (default: "lua")
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            descriptor_dir: default_descriptor_dir(),
            extension: default_extension(),
        }
    }
}

/// Endpoints and HTTP behaviour of the external services
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Info service base; the item id is appended as a path segment
    #[serde(default = "default_info_base_url")]
    pub info_base_url: String,

    /// Manifest service endpoint; key and ids are passed as query parameters
    #[serde(default = "default_manifest_base_url")]
    pub manifest_base_url: String,

    /// Store endpoint used for display names
    #[serde(default = "default_store_base_url")]
    pub store_base_url: String,

    /// User-Agent sent with every request (default: "Mozilla/5.0")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-attempt timeout for manifest downloads (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for info lookups (default: 30 seconds)
    #[serde(default = "default_info_timeout", with = "duration_serde")]
    pub info_timeout: Duration,

    /// Timeout for display-name lookups (default: 3 seconds)
    #[serde(default = "default_name_timeout", with = "duration_serde")]
    pub name_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            info_base_url: default_info_base_url(),
            manifest_base_url: default_manifest_base_url(),
            store_base_url: default_store_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            info_timeout: default_info_timeout(),
            name_timeout: default_name_timeout(),
        }
    }
}

/// Retry budget for manifest downloads
///
/// Only genuine failures spend budget. Rate-limit responses wait
/// `rate_limit_delay` and retry for free.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Budget of failing attempts per depot (default: 10)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after a failed attempt (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,

    /// Delay after a 429 response (default: 5 seconds)
    #[serde(default = "default_rate_limit_delay", with = "duration_serde")]
    pub rate_limit_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            rate_limit_delay: default_rate_limit_delay(),
        }
    }
}

/// Pacing between requests
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Pause after each depot before the next one (default: 1 second)
    #[serde(default = "default_inter_depot", with = "duration_serde")]
    pub inter_depot: Duration,

    /// Pause before every item except the first (default: 5 minutes)
    #[serde(default = "default_inter_item", with = "duration_serde")]
    pub inter_item: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            inter_depot: default_inter_depot(),
            inter_item: default_inter_item(),
        }
    }
}

/// Where fetched manifests are written
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// First destination root (default: "depotcache")
    #[serde(default = "default_primary_root")]
    pub primary_root: PathBuf,

    /// Second destination root (default: "config/depotcache")
    #[serde(default = "default_secondary_root")]
    pub secondary_root: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            primary_root: default_primary_root(),
            secondary_root: default_secondary_root(),
        }
    }
}

/// Main configuration for the acquisition pipeline
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Descriptor discovery
    #[serde(default)]
    pub scan: ScanConfig,

    /// External services
    #[serde(default)]
    pub services: ServiceConfig,

    /// Retry budget and backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Pacing between depots and items
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Destination roots
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Default configuration rooted at an existing host install directory
    ///
    /// Descriptors live in `{root}/config/stplug-in`, manifests go to
    /// `{root}/depotcache` and `{root}/config/depotcache`.
    pub fn from_install_root(root: impl AsRef<Path>) -> Self {
        let mut config = Config::default();
        config.apply_install_root(root);
        config
    }

    /// Re-point the scan directory and both output roots at an install directory
    pub fn apply_install_root(&mut self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        self.scan.descriptor_dir = root.join("config").join("stplug-in");
        self.output.primary_root = root.join("depotcache");
        self.output.secondary_root = root.join("config").join("depotcache");
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "retry budget must be at least 1",
                "retry.max_attempts",
            ));
        }
        if self.scan.extension.is_empty() || self.scan.extension.starts_with('.') {
            return Err(Error::config(
                "descriptor extension must be non-empty and given without a leading dot",
                "scan.extension",
            ));
        }
        if self.output.primary_root == self.output.secondary_root {
            return Err(Error::config(
                "output roots must differ",
                "output.secondary_root",
            ));
        }
        for (key, url) in [
            ("services.info_base_url", &self.services.info_base_url),
            ("services.manifest_base_url", &self.services.manifest_base_url),
            ("services.store_base_url", &self.services.store_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::config(format!("not an http(s) URL: {url}"), key));
            }
        }
        Ok(())
    }
}

// Default value functions
fn default_descriptor_dir() -> PathBuf {
    PathBuf::from("config").join("stplug-in")
}

fn default_extension() -> String {
    "lua".into()
}

fn default_info_base_url() -> String {
    "https://api.steamcmd.net/v1/info".into()
}

fn default_manifest_base_url() -> String {
    "https://api.manifesthub1.filegear-sg.me/manifest".into()
}

fn default_store_base_url() -> String {
    "https://store.steampowered.com/api/appdetails".into()
}

fn default_user_agent() -> String {
    "Mozilla/5.0".into()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_info_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_name_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_rate_limit_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_inter_depot() -> Duration {
    Duration::from_secs(1)
}

fn default_inter_item() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_primary_root() -> PathBuf {
    PathBuf::from("depotcache")
}

fn default_secondary_root() -> PathBuf {
    PathBuf::from("config").join("depotcache")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_service_contract() {
        let config = Config::default();

        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.retry.retry_delay, Duration::from_secs(2));
        assert_eq!(config.retry.rate_limit_delay, Duration::from_secs(5));
        assert_eq!(config.cooldown.inter_depot, Duration::from_secs(1));
        assert_eq!(config.cooldown.inter_item, Duration::from_secs(300));
        assert_eq!(config.services.request_timeout, Duration::from_secs(60));
        assert_eq!(config.services.user_agent, "Mozilla/5.0");
        assert_eq!(config.scan.extension, "lua");
        config.validate().unwrap();
    }

    #[test]
    fn install_root_layout() {
        let config = Config::from_install_root("/opt/steam");

        assert_eq!(
            config.scan.descriptor_dir,
            PathBuf::from("/opt/steam/config/stplug-in")
        );
        assert_eq!(
            config.output.primary_root,
            PathBuf::from("/opt/steam/depotcache")
        );
        assert_eq!(
            config.output.secondary_root,
            PathBuf::from("/opt/steam/config/depotcache")
        );
    }

    #[test]
    fn partial_json_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "retry": { "max_attempts": 3 },
                "cooldown": { "inter_item": 60 },
                "services": { "manifest_base_url": "http://127.0.0.1:9/manifest" }
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.rate_limit_delay, Duration::from_secs(5));
        assert_eq!(config.cooldown.inter_item, Duration::from_secs(60));
        assert_eq!(config.cooldown.inter_depot, Duration::from_secs(1));
        assert_eq!(
            config.services.manifest_base_url,
            "http://127.0.0.1:9/manifest"
        );
        assert_eq!(config.services.info_base_url, default_info_base_url());
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = Config::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");
        assert!(err.is_setup());
    }

    #[test]
    fn validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("retry.max_attempts"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_identical_roots() {
        let mut config = Config::default();
        config.output.secondary_root = config.output.primary_root.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dotted_extension_and_bad_urls() {
        let mut config = Config::default();
        config.scan.extension = ".lua".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.services.info_base_url = "ftp://example.com".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cooldown"]["inter_item"], 300);
        assert_eq!(json["retry"]["retry_delay"], 2);
    }
}
