//! Slipstream update gateway
//!
//! Fronts a GitHub repository's releases and re-publishes them in the wire
//! format electron-updater expects: `latest.yml` manifests with SHA-512
//! digests, plus a byte-accurate download proxy that prefers redirecting
//! clients to the signed CDN location and falls back to streaming.
//!
//! Paths the gateway does not claim are delegated to a static-site fallback
//! when one is configured.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod analytics;
pub mod checksum;
pub mod config;
pub mod error;
pub mod github;
pub mod handlers;
pub mod proxy;
pub mod service;
pub mod types;
pub mod utils;

use service::AppState;

/// Create the axum router.
///
/// Routes are tried in order — download proxy, then manifests — with
/// anything else falling through to the static delegate or, when none is
/// configured, a fixed configuration diagnostic.
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route(
            "/download/{platform}",
            get(handlers::download_platform_handler),
        )
        .route(
            "/download/{platform}/{asset}",
            get(handlers::download_asset_handler),
        )
        .route("/latest.yml", get(handlers::latest_manifest_handler))
        .route(
            "/update/{platform}/{version}/latest.yml",
            get(handlers::update_manifest_handler),
        );

    let router = match &state.config().static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(handlers::unconfigured_fallback),
    };

    router
        .layer(middleware::map_request_with_state(
            state.clone(),
            handlers::normalize_request,
        ))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Initialize the gateway and return its router.
pub fn init_gateway(config: config::GatewayConfig) -> anyhow::Result<Router> {
    let state = Arc::new(AppState::new(config)?);
    Ok(create_router(state))
}

// Re-export commonly used types
pub use config::{GatewayConfig, RepoIdentity};
pub use error::{GatewayError, MISSING_CONFIG_HELP};
pub use service::{AppState as GatewayState, find_asset, select_asset};
pub use types::{ManifestFile, Platform, Release, ReleaseAsset, UpdateManifest};
