pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use app::{build_bridge, router, ColabBridge};
pub use config::BridgeConfig;
pub use core::bridge::BridgeService;
pub use utils::error::{BridgeError, Result};
