//! Test configuration helpers for pointing a pipeline at a mock server

use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

use manifest_dl::{Config, Pipeline};

/// API key accepted by the setup checks
pub const TEST_API_KEY: &str = "test-key-0123456789";

/// Configuration rooted at `root` with every service on `server` and millisecond pacing
pub fn fast_config(root: &Path, server: &MockServer) -> Config {
    let mut config = Config::from_install_root(root);
    config.services.info_base_url = format!("{}/v1/info", server.uri());
    config.services.manifest_base_url = format!("{}/manifest", server.uri());
    config.services.store_base_url = format!("{}/api/appdetails", server.uri());
    config.services.request_timeout = Duration::from_secs(5);
    config.services.info_timeout = Duration::from_secs(5);
    config.services.name_timeout = Duration::from_millis(200);
    config.retry.retry_delay = Duration::from_millis(10);
    config.retry.rate_limit_delay = Duration::from_millis(10);
    config.cooldown.inter_depot = Duration::from_millis(10);
    config.cooldown.inter_item = Duration::from_millis(10);
    config
}

/// Create a pipeline over a fresh install root
///
/// Returns the pipeline and temp directory (keep temp_dir alive for test duration)
pub fn create_test_pipeline(server: &MockServer) -> (Pipeline, TempDir) {
    create_test_pipeline_with(server, |_| {})
}

/// Like [`create_test_pipeline`] with a hook to adjust the configuration
pub fn create_test_pipeline_with(
    server: &MockServer,
    adjust: impl FnOnce(&mut Config),
) -> (Pipeline, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let mut config = fast_config(temp_dir.path(), server);
    adjust(&mut config);
    let pipeline = Pipeline::new(config).expect("Failed to create pipeline");
    (pipeline, temp_dir)
}
