mod file_config;

pub use file_config::{FileConfig, UploadQueueConfig};

use crate::upload_queue::{
    ValidationRules, DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_QUEUE_SIZE, SUPPORTED_EXTENSIONS,
};
use anyhow::{bail, Result};

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub upload_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub max_queue_size: Option<usize>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub upload_url: String,
    /// None keeps the HTTP client's default.
    pub request_timeout_secs: Option<u64>,
    pub client_id: Option<String>,

    // Feature configs (with defaults)
    pub upload_queue: UploadQueueSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let upload_url = file
            .upload_url
            .or_else(|| cli.upload_url.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("upload_url must be specified via --upload-url or in config file")
            })?;

        if !upload_url.starts_with("http://") && !upload_url.starts_with("https://") {
            bail!("upload_url must be an http(s) URL: {}", upload_url);
        }

        let request_timeout_secs = file.request_timeout_secs.or(cli.request_timeout_sec);
        if request_timeout_secs == Some(0) {
            bail!("request_timeout_secs must be greater than 0");
        }

        let client_id = file
            .client_id
            .or_else(|| cli.client_id.clone())
            .filter(|c| !c.trim().is_empty());

        // Upload queue settings - merge file config with defaults
        let uq_file = file.upload_queue.unwrap_or_default();
        let defaults = UploadQueueSettings::default();
        let upload_queue = UploadQueueSettings {
            max_queue_size: uq_file
                .max_queue_size
                .or(cli.max_queue_size)
                .unwrap_or(defaults.max_queue_size),
            max_file_size_bytes: uq_file
                .max_file_size_bytes
                .unwrap_or(defaults.max_file_size_bytes),
            accepted_extensions: uq_file
                .accepted_extensions
                .unwrap_or(defaults.accepted_extensions),
        };

        if upload_queue.max_queue_size == 0 {
            bail!("max_queue_size must be greater than 0");
        }
        if upload_queue.max_file_size_bytes == 0 {
            bail!("max_file_size_bytes must be greater than 0");
        }
        if upload_queue.accepted_extensions.is_empty() {
            bail!("accepted_extensions must not be empty");
        }

        Ok(Self {
            upload_url,
            request_timeout_secs,
            client_id,
            upload_queue,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadQueueSettings {
    pub max_queue_size: usize,
    pub max_file_size_bytes: u64,
    pub accepted_extensions: Vec<String>,
}

impl UploadQueueSettings {
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules::new(self.accepted_extensions.clone(), self.max_file_size_bytes)
    }
}

impl Default for UploadQueueSettings {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            accepted_extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}
