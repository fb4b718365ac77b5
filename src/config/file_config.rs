use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub upload_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub client_id: Option<String>,

    // Feature configs
    pub upload_queue: Option<UploadQueueConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploadQueueConfig {
    pub max_queue_size: Option<usize>,
    pub max_file_size_bytes: Option<u64>,
    /// Replaces the built-in extension list when set.
    pub accepted_extensions: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
upload_url = "https://analysis.example.com/api/upload"
request_timeout_secs = 45
client_id = "acme"

[upload_queue]
max_queue_size = 5
max_file_size_bytes = 1048576
accepted_extensions = ["csv", "xlsx"]
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(
            config.upload_url,
            Some("https://analysis.example.com/api/upload".to_string())
        );
        assert_eq!(config.request_timeout_secs, Some(45));
        assert_eq!(config.client_id, Some("acme".to_string()));

        let queue = config.upload_queue.unwrap();
        assert_eq!(queue.max_queue_size, Some(5));
        assert_eq!(queue.max_file_size_bytes, Some(1048576));
        assert_eq!(
            queue.accepted_extensions,
            Some(vec!["csv".to_string(), "xlsx".to_string()])
        );
    }

    #[test]
    fn test_load_empty_config() {
        let file = NamedTempFile::new().unwrap();
        let config = FileConfig::load(file.path()).unwrap();
        assert!(config.upload_url.is_none());
        assert!(config.upload_queue.is_none());
    }

    #[test]
    fn test_load_partial_section() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[upload_queue]\nmax_queue_size = 3").unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        let queue = config.upload_queue.unwrap();
        assert_eq!(queue.max_queue_size, Some(3));
        assert!(queue.max_file_size_bytes.is_none());
        assert!(queue.accepted_extensions.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = FileConfig::load(Path::new("/nonexistent/uploader.toml"));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[test]
    fn test_load_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "upload_url = [not toml").unwrap();

        let result = FileConfig::load(file.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }
}
