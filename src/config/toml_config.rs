use crate::config::BridgeConfig;
use crate::utils::error::{BridgeError, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Optional file overlay. Every key may be omitted; present keys replace the
/// values resolved from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub server: Option<ServerSection>,
    pub storage: Option<StorageSection>,
    pub colab: Option<ColabSection>,
    pub sync: Option<SyncSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub routes_prefix: Option<String>,
    pub max_upload_mb: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColabSection {
    pub upload_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSection {
    pub home_dir: Option<PathBuf>,
    pub sshfs_bin: Option<String>,
    pub aws_bin: Option<String>,
    pub fusermount_bin: Option<String>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| BridgeError::Config {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| BridgeError::Config {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR_NAME}` with the variable's value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| BridgeError::Config {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.into_owned())
    }

    pub fn apply_to(&self, config: &mut BridgeConfig) {
        if let Some(server) = &self.server {
            if let Some(host) = &server.host {
                config.app_host = host.clone();
            }
            if let Some(port) = server.port {
                config.app_port = port;
            }
            if let Some(prefix) = &server.routes_prefix {
                config.routes_prefix = prefix.clone();
            }
            if let Some(limit) = server.max_upload_mb {
                config.max_upload_mb = limit;
            }
        }

        if let Some(storage) = &self.storage {
            if let Some(endpoint) = &storage.endpoint_url {
                config.s3_endpoint_url = endpoint.clone();
            }
            if let Some(region) = &storage.region {
                config.s3_region = region.clone();
            }
            if let Some(key_id) = &storage.access_key_id {
                config.aws_access_key_id = key_id.clone();
            }
            if let Some(secret) = &storage.secret_access_key {
                config.aws_secret_access_key = secret.clone();
            }
        }

        if let Some(dir) = self.colab.as_ref().and_then(|c| c.upload_directory.clone()) {
            config.remote_upload_dir = dir;
        }

        if let Some(sync) = &self.sync {
            if let Some(home) = &sync.home_dir {
                config.home_dir = home.clone();
            }
            if let Some(bin) = &sync.sshfs_bin {
                config.sshfs_bin = bin.clone();
            }
            if let Some(bin) = &sync.aws_bin {
                config.aws_bin = bin.clone();
            }
            if let Some(bin) = &sync.fusermount_bin {
                config.fusermount_bin = bin.clone();
            }
        }
    }
}
