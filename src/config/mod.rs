pub mod cli;
pub mod toml_config;

use crate::utils::error::{BridgeError, Result};
use crate::utils::validation::{
    validate_absolute_path, validate_non_empty_string, validate_range, validate_url, Validate,
};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_ROUTES_PREFIX: &str = "/files";
pub const DEFAULT_REMOTE_UPLOAD_DIR: &str = "/content/uploaded";

/// Everything the service needs, resolved once at startup and handed to each
/// adapter at construction.
#[derive(Clone)]
pub struct BridgeConfig {
    pub app_host: String,
    pub app_port: u16,
    pub routes_prefix: String,
    pub max_upload_mb: usize,

    pub s3_endpoint_url: String,
    pub s3_region: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,

    pub remote_upload_dir: String,

    /// Holds `.aws/credentials` and the scratch mount directories.
    pub home_dir: PathBuf,
    pub sshfs_bin: String,
    pub aws_bin: String,
    pub fusermount_bin: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            app_host: "0.0.0.0".to_string(),
            app_port: 8000,
            routes_prefix: DEFAULT_ROUTES_PREFIX.to_string(),
            max_upload_mb: 1024,
            s3_endpoint_url: "http://localhost:9000".to_string(),
            s3_region: "us-east-1".to_string(),
            aws_access_key_id: String::new(),
            aws_secret_access_key: String::new(),
            remote_upload_dir: DEFAULT_REMOTE_UPLOAD_DIR.to_string(),
            home_dir: PathBuf::from("."),
            sshfs_bin: "sshfs".to_string(),
            aws_bin: "aws".to_string(),
            fusermount_bin: "fusermount".to_string(),
        }
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("app_host", &self.app_host)
            .field("app_port", &self.app_port)
            .field("routes_prefix", &self.routes_prefix)
            .field("max_upload_mb", &self.max_upload_mb)
            .field("s3_endpoint_url", &self.s3_endpoint_url)
            .field("s3_region", &self.s3_region)
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"***")
            .field("remote_upload_dir", &self.remote_upload_dir)
            .field("home_dir", &self.home_dir)
            .field("sshfs_bin", &self.sshfs_bin)
            .field("aws_bin", &self.aws_bin)
            .field("fusermount_bin", &self.fusermount_bin)
            .finish()
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds the config from a variable lookup, falling back to defaults for
    /// anything unset.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("APP_HOST") {
            config.app_host = host;
        }
        if let Some(port) = lookup("APP_PORT") {
            config.app_port = port.trim().parse().map_err(|e| BridgeError::Config {
                message: format!("APP_PORT must be a port number, got {:?}: {}", port, e),
            })?;
        }
        if let Some(prefix) = lookup("ROUTES_PREFIX") {
            config.routes_prefix = prefix;
        }
        if let Some(endpoint) = lookup("S3_ENDPOINT_URL") {
            config.s3_endpoint_url = endpoint;
        }
        if let Some(region) = lookup("S3_REGION") {
            config.s3_region = region;
        }
        if let Some(key_id) = lookup("AWS_ACCESS_KEY_ID") {
            config.aws_access_key_id = key_id;
        }
        if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
            config.aws_secret_access_key = secret;
        }
        if let Some(dir) = lookup("COLAB_UPLOAD_DIRECTORY") {
            config.remote_upload_dir = dir;
        }
        if let Some(home) = lookup("BRIDGE_HOME").or_else(|| lookup("HOME")) {
            config.home_dir = PathBuf::from(home);
        }

        Ok(config)
    }

    pub fn remote_output_dir(&self) -> String {
        format!("{}/output", self.remote_upload_dir.trim_end_matches('/'))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.app_host, self.app_port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

impl Validate for BridgeConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("app_host", &self.app_host)?;
        validate_range("app_port", self.app_port, 1, u16::MAX)?;
        if !self.routes_prefix.starts_with('/') {
            return Err(BridgeError::validation(
                "routes_prefix",
                "Prefix must start with '/'",
            ));
        }
        validate_range("max_upload_mb", self.max_upload_mb, 1, 1024 * 1024)?;

        validate_url("s3_endpoint_url", &self.s3_endpoint_url)?;
        validate_non_empty_string("s3_region", &self.s3_region)?;
        validate_non_empty_string("aws_access_key_id", &self.aws_access_key_id)?;
        validate_non_empty_string("aws_secret_access_key", &self.aws_secret_access_key)?;

        validate_absolute_path("remote_upload_dir", &self.remote_upload_dir)?;
        validate_non_empty_string("sshfs_bin", &self.sshfs_bin)?;
        validate_non_empty_string("aws_bin", &self.aws_bin)?;
        validate_non_empty_string("fusermount_bin", &self.fusermount_bin)?;

        tracing::debug!("configuration validation passed");
        Ok(())
    }
}
