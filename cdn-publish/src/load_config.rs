/// `load_config` module: loads the optional YAML defaults file and merges it under the
/// command-line options.
///
/// Every key is optional. A value given on the command line (or through its environment
/// variable) always wins over the file, and the file wins over the built-in defaults.
///
/// ```yaml
/// storage:
///   access_key: "..."
///   zone_name: my-zone
///   base_url: https://storage.bunnycdn.com
/// api:
///   access_key: "..."
///   base_url: https://api.bunny.net
/// upload:
///   batch_size: 40
///   checksum: true
///   retries: 3
///   retry_delay_ms: 1000
/// ```
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use cdn_publish_core::http::RetryPolicy;
use cdn_publish_core::pipeline::DEFAULT_BATCH_SIZE;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.bunnycdn.com";
pub const DEFAULT_API_BASE_URL: &str = "https://api.bunny.net";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub storage: StorageSection,
    pub api: ApiSection,
    pub upload: UploadSection,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    pub access_key: Option<String>,
    pub zone_name: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSection {
    pub access_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadSection {
    pub batch_size: Option<usize>,
    pub checksum: Option<bool>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl CliConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            retries: self.upload.retries.unwrap_or(defaults.retries),
            delay: self
                .upload
                .retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
        }
    }

    pub fn batch_size(&self, flag: Option<usize>) -> usize {
        flag.or(self.upload.batch_size).unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn checksum(&self, flag: bool) -> bool {
        flag || self.upload.checksum.unwrap_or(false)
    }
}

/// Loads a YAML defaults file. Secrets may be left out of it and supplied through
/// the environment instead.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    if config_content.trim().is_empty() {
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(config)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

/// The defaults file when one is given, otherwise empty defaults.
pub fn load_optional_config(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CliConfig::default()),
    }
}
