pub mod handlers;

use crate::adapters::process::TokioProcessRunner;
use crate::adapters::remote::SshConnector;
use crate::adapters::storage::S3Storage;
use crate::adapters::sync::DirectorySync;
use crate::config::BridgeConfig;
use crate::core::bridge::BridgeService;
use crate::domain::ports::{ObjectStore, ProcessRunner, RemoteConnector};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

/// The production wiring: minio over the S3 API, colab over SSH, local tools
/// as child processes.
pub type ColabBridge = BridgeService<S3Storage, SshConnector, TokioProcessRunner>;

pub async fn build_bridge(config: &BridgeConfig) -> ColabBridge {
    let store = S3Storage::from_config(config).await;
    let connector = SshConnector::new(config);
    let sync = DirectorySync::new(TokioProcessRunner, config);
    BridgeService::new(store, connector, sync)
}

pub fn router<S, C, P>(bridge: Arc<BridgeService<S, C, P>>, config: &BridgeConfig) -> Router
where
    S: ObjectStore + 'static,
    C: RemoteConnector + 'static,
    P: ProcessRunner + 'static,
{
    let files = Router::new()
        .route(
            "/upload_minio",
            put(handlers::upload_minio::<S, C, P>)
                .layer(DefaultBodyLimit::max(config.max_upload_bytes())),
        )
        .route("/upload_colab", post(handlers::upload_colab::<S, C, P>))
        .route("/download_colab", post(handlers::download_colab::<S, C, P>));

    let prefix = config.routes_prefix.trim_end_matches('/');
    let app = Router::new().route("/health", get(handlers::health));
    let app = if prefix.is_empty() {
        app.merge(files)
    } else {
        app.nest(prefix, files)
    };
    app.with_state(bridge)
}
