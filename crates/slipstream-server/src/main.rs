use dotenv::dotenv;
use std::net::SocketAddr;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use slipstream::GatewayConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenv().ok();

    // --- Tracing ---
    let app_level = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let global_filter = Targets::new()
        .with_default(LevelFilter::WARN)
        .with_target("slipstream", app_level)
        .with_target("slipstream_server", app_level)
        .with_target("tower_http", app_level)
        .with_target("hyper", LevelFilter::OFF)
        .with_target("tokio", LevelFilter::OFF);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(global_filter)
        .try_init()
        .unwrap();

    // --- Shutdown channel ---
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        tracing::info!("Received CTRL+C, initiating shutdown...");
        let _ = shutdown_tx.send(());
    });

    // --- Gateway config from environment ---
    let gateway = GatewayConfig::from_env();
    match &gateway.repo {
        Some(repo) => tracing::info!("Serving releases for {}", repo),
        None => tracing::warn!(
            "No repository configured; requests will be answered with the configuration diagnostic"
        ),
    }
    tracing::info!(
        "Token: {}",
        if gateway.token.is_some() { "loaded" } else { "missing" }
    );
    if let Some(url) = &gateway.base_url {
        tracing::info!("Base URL: {}", url);
    }
    if !gateway.proxy_downloads {
        tracing::info!("Download proxy disabled; manifests point at direct CDN URLs");
    }

    let http_addr = std::env::var("HTTP_ADDR")
        .ok()
        .or_else(|| std::env::var("PORT").ok().map(|port| format!("0.0.0.0:{port}")))
        .unwrap_or_else(|| "0.0.0.0:4000".to_string())
        .parse::<SocketAddr>()
        .expect("Invalid HTTP_ADDR format");

    let config = slipstream_server::ServerConfig {
        http_addr,
        gateway,
        shutdown: shutdown_rx,
    };

    slipstream_server::run_server(config).await
}
