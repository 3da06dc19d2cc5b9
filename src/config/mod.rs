mod file_config;

pub use file_config::{FileConfig, RetryConfig};

use crate::error::RetryPolicy;
use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub base_url: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub cookie_domain: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub base_url: String,
    pub storage_dir: PathBuf,
    pub cookie_domain: Option<String>,
    pub request_timeout_secs: u64,

    // Retry settings (with defaults)
    pub retry: RetryPolicy,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let base_url = file
            .base_url
            .or_else(|| cli.base_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("base_url must be specified via --base-url or in config file")
            })?;

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("base_url must start with http:// or https://: {}", base_url);
        }

        let storage_dir = file
            .storage_dir
            .map(PathBuf::from)
            .or_else(|| cli.storage_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("storage_dir must be specified via --storage-dir or in config file")
            })?;

        if storage_dir.exists() && !storage_dir.is_dir() {
            bail!("storage_dir is not a directory: {:?}", storage_dir);
        }

        let cookie_domain = file.cookie_domain.or_else(|| cli.cookie_domain.clone());

        let request_timeout_secs = file.request_timeout_secs.unwrap_or(cli.request_timeout_secs);

        // Retry settings - merge file config with defaults
        let retry_file = file.retry.unwrap_or_default();
        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: retry_file.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_ms: retry_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: retry_file.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: retry_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };

        Ok(Self {
            base_url,
            storage_dir,
            cookie_domain,
            request_timeout_secs,
            retry,
        })
    }

    pub fn session_file_path(&self) -> PathBuf {
        self.storage_dir.join("session.json")
    }

    pub fn cookies_file_path(&self) -> PathBuf {
        self.storage_dir.join("cookies.json")
    }
}
