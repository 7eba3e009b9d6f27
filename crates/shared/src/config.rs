//! Application configuration management.

use std::path::PathBuf;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// S3 client configuration.
    #[serde(default)]
    pub s3: S3Config,
    /// Local scratch storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body size, in bytes.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    /// Socket address string the server binds to.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024 // 100MB
}

/// S3-compatible object storage client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Custom endpoint URL (MinIO, Cloudflare R2, ...). AWS is used when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key ID.
    #[serde(default)]
    pub access_key: Option<String>,
    /// Static secret access key.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Signing region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Use path-style bucket addressing.
    #[serde(default = "default_force_path_style")]
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: default_region(),
            force_path_style: default_force_path_style(),
        }
    }
}

impl S3Config {
    /// Static credentials, if both halves are configured and non-blank.
    #[must_use]
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access), Some(secret))
                if !access.trim().is_empty() && !secret.trim().is_empty() =>
            {
                Some((access, secret))
            }
            _ => None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_force_path_style() -> bool {
    true
}

/// Local scratch storage used while streaming downloads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Root directory for download scratch files. Defaults to the OS temp dir.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolved scratch root directory.
    #[must_use]
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("SMARTHUB").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
