use anyhow::Context;
use clap::Parser;
use colab_bridge::config::cli::ServerArgs;
use colab_bridge::utils::{logger, validation::Validate};
use colab_bridge::{build_bridge, router};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_logger(args.verbose);
    }

    tracing::info!("Starting colab-bridge");

    let config = args.resolve().context("failed to load configuration")?;
    if args.verbose {
        tracing::debug!("resolved config: {:?}", config);
    }
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        return Err(e).context("invalid configuration");
    }

    let bridge = Arc::new(build_bridge(&config).await);
    let app = router(bridge, &config);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("cannot bind {}", address))?;
    tracing::info!(
        "✅ Listening on {} (routes under {})",
        address,
        config.routes_prefix
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("colab-bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
