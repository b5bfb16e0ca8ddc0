use std::fs;
use std::path::Path;

use anyhow::Result;
use binary_deployer_core::config::{DeployConfig, RepositoryConfig};
use tracing::{error, info, warn};

/// Overrides `concurrency` from the config file when set.
pub const CONCURRENCY_ENV: &str = "BINARY_DEPLOYER_CONCURRENCY";

/// Loads the deploy config from a YAML file. Secrets never live here, only
/// credential ids that are resolved later against the credential store.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DeployConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: DeployConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(raw) = std::env::var(CONCURRENCY_ENV) {
        match raw.trim().parse::<usize>() {
            Ok(concurrency) => {
                info!(concurrency, "Concurrency overridden from {CONCURRENCY_ENV}");
                config.concurrency = concurrency;
            }
            Err(e) => {
                error!(error = ?e, raw = %raw, "{CONCURRENCY_ENV} must be a non-negative integer");
                return Err(anyhow::anyhow!("{CONCURRENCY_ENV} must be a non-negative integer: {e}"));
            }
        }
    }

    if config.concurrency == 0 {
        warn!("concurrency 0 is not meaningful, using 1");
        config.concurrency = 1;
    }

    match &config.repository {
        RepositoryConfig::ObjectStore(store) => {
            if store.bucket_name.trim().is_empty() {
                error!("Object store repository without bucket_name");
                anyhow::bail!("repository.bucket_name must not be empty");
            }
            if store.credentials_id.trim().is_empty() {
                error!("Object store repository without credentials_id");
                anyhow::bail!("repository.credentials_id must not be empty");
            }
        }
        RepositoryConfig::Http(http) => {
            if http.remote_location.trim().is_empty() {
                error!("HTTP repository without remote_location");
                anyhow::bail!("repository.remote_location must not be empty");
            }
        }
    }

    config.trace_loaded();
    Ok(config)
}
