use crate::config::toml_config::TomlConfig;
use crate::config::BridgeConfig;
use crate::utils::error::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "colab-bridge")]
#[command(about = "Moves files between S3-compatible storage and a Colab runtime over SSH")]
pub struct ServerArgs {
    #[arg(long, help = "TOML file layered over environment settings")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Bind host (overrides APP_HOST)")]
    pub host: Option<String>,

    #[arg(long, help = "Bind port (overrides APP_PORT)")]
    pub port: Option<u16>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

impl ServerArgs {
    /// Environment first, then the optional file, then flags.
    pub fn resolve(&self) -> Result<BridgeConfig> {
        let mut config = BridgeConfig::from_env()?;

        if let Some(path) = &self.config {
            tracing::info!("loading configuration overlay from {}", path.display());
            TomlConfig::from_file(path)?.apply_to(&mut config);
        }
        if let Some(host) = &self.host {
            config.app_host = host.clone();
        }
        if let Some(port) = self.port {
            config.app_port = port;
        }

        Ok(config)
    }
}
