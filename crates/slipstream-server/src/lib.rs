use std::net::SocketAddr;

use slipstream::GatewayConfig;

/// Configuration for running the gateway server.
pub struct ServerConfig {
    pub http_addr: SocketAddr,
    pub gateway: GatewayConfig,
    /// When this receiver gets a value, the server shuts down gracefully.
    pub shutdown: tokio::sync::watch::Receiver<()>,
}

pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(posthog_key) = std::env::var("POSTHOG_API_KEY")
        .ok()
        .filter(|s| !s.is_empty())
    {
        match posthog_rs::init_global(posthog_key.as_str()).await {
            Ok(()) => tracing::info!("PostHog analytics initialized"),
            Err(e) => tracing::warn!("Failed to initialize PostHog: {}", e),
        }
    } else {
        tracing::info!("POSTHOG_API_KEY not set, analytics disabled");
    }

    let router = slipstream::init_gateway(config.gateway)?;

    tracing::info!("Starting HTTP server at {}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;

    let mut shutdown = config.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            tracing::info!("Shutting down HTTP server...");
        })
        .await?;

    Ok(())
}
