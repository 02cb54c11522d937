use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::types::Platform;

/// Diagnostic body served when no repository identity is configured.
pub const MISSING_CONFIG_HELP: &str = "\
Repository configuration is missing.

Set either:
- ACCOUNT and REPOSITORY
  or
- REPO in the form owner/repo

Optional:
- TOKEN (or GITHUB_TOKEN) for private repos / higher rate limits
- URL (or VERCEL_URL) when TOKEN is set";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("repository is not configured")]
    RepoNotConfigured,

    #[error("release {} not found", .tag.as_deref().unwrap_or("latest"))]
    ReleaseNotFound { tag: Option<String> },

    #[error("asset '{0}' not found in release")]
    AssetNotFound(String),

    #[error("no asset for platform '{0}'")]
    NoAssetForPlatform(Platform),

    #[error("release API unavailable: {message}")]
    UpstreamUnavailable {
        /// Upstream status, forwarded verbatim when present.
        status: Option<StatusCode>,
        message: String,
    },

    #[error("failed to fetch asset from upstream: {0}")]
    UpstreamFetchFailed(String),
}

impl GatewayError {
    /// Short machine-readable label, used for analytics events.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RepoNotConfigured => "repo_not_configured",
            GatewayError::ReleaseNotFound { .. } => "release_not_found",
            GatewayError::AssetNotFound(_) => "asset_not_found",
            GatewayError::NoAssetForPlatform(_) => "no_asset_for_platform",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::UpstreamFetchFailed(_) => "upstream_fetch_failed",
        }
    }

    /// Whether a retry could plausibly succeed. Only the checksum service's
    /// bounded backoff consults this; metadata calls never retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamUnavailable { .. } | GatewayError::UpstreamFetchFailed(_)
        )
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            GatewayError::RepoNotConfigured => {
                error!("request rejected: repository not configured");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    MISSING_CONFIG_HELP.to_string(),
                )
            }
            GatewayError::ReleaseNotFound { tag } => {
                warn!(?tag, "release not found");
                let body = match tag {
                    Some(tag) => format!("Release '{tag}' not found"),
                    None => "Latest release not found".to_string(),
                };
                (StatusCode::NOT_FOUND, body)
            }
            GatewayError::AssetNotFound(name) => {
                warn!(asset = %name, "asset not found");
                (StatusCode::NOT_FOUND, format!("Asset '{name}' not found"))
            }
            GatewayError::NoAssetForPlatform(platform) => {
                warn!(%platform, "no asset for platform");
                (StatusCode::NOT_FOUND, "No asset for platform".to_string())
            }
            GatewayError::UpstreamUnavailable { status, message } => {
                error!(?status, %message, "release API unavailable");
                let status = status
                    .filter(|s| !s.is_success())
                    .unwrap_or(StatusCode::BAD_GATEWAY);
                (status, "Release host unavailable".to_string())
            }
            GatewayError::UpstreamFetchFailed(message) => {
                error!(%message, "asset fetch failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to fetch asset from release host".to_string(),
                )
            }
        };

        (status, body).into_response()
    }
}
