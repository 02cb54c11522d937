//! Download proxy: redirect the client to the signed upstream location when
//! one is offered, stream the bytes through the gateway otherwise.

use axum::{
    body::Body,
    http::{HeaderMap, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use crate::{
    analytics,
    config::RepoIdentity,
    error::GatewayError,
    service::{AppState, find_asset, select_asset},
    types::{DownloadQuery, Platform, ReleaseAsset},
};

/// Request headers forwarded to the upstream fetch on the streaming path.
const FORWARDED_REQUEST_HEADERS: [header::HeaderName; 3] = [
    header::RANGE,
    header::IF_NONE_MATCH,
    header::USER_AGENT,
];

/// Response headers mirrored back to the client on the streaming path.
const MIRRORED_RESPONSE_HEADERS: [header::HeaderName; 7] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_DISPOSITION,
    header::ACCEPT_RANGES,
    header::ETAG,
    header::LAST_MODIFIED,
    header::CONTENT_RANGE,
];

/// Resolve the requested asset and answer with a 307 to its signed location,
/// or with the asset bytes streamed through the gateway when upstream does
/// not offer one.
#[instrument(
    skip(state, query, client_headers),
    fields(%platform, %method, tag = query.tag.as_deref().unwrap_or("latest"))
)]
pub async fn proxy_download(
    state: &AppState,
    platform: Platform,
    asset_name: Option<&str>,
    query: &DownloadQuery,
    method: Method,
    client_headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let repo = state.repo()?;
    let release = state
        .github()
        .release(repo, query.tag.as_deref())
        .await?;

    // Path-segment name wins over the legacy `asset` query parameter; both
    // win over platform-based selection.
    let requested = asset_name.or(query.asset.as_deref());
    let asset = resolve_asset(&release.assets, requested, platform)?;
    debug!(asset = %asset.name, id = asset.id, "asset resolved for download");

    // Preferred strategy: hand out the signed location, proxy no bytes.
    if let Some(location) = state.github().asset_redirect(repo, asset.id).await? {
        analytics::track_download_redirect(platform.as_str(), &asset.name);
        return Ok(
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, location)]).into_response(),
        );
    }

    warn!(asset = %asset.name, "no signed location from upstream, streaming through gateway");
    stream_through(state, repo, asset, method, client_headers).await
}

fn resolve_asset<'a>(
    assets: &'a [ReleaseAsset],
    requested: Option<&str>,
    platform: Platform,
) -> Result<&'a ReleaseAsset, GatewayError> {
    match requested {
        Some(name) => {
            find_asset(assets, name).ok_or_else(|| GatewayError::AssetNotFound(name.to_string()))
        }
        None => {
            select_asset(assets, platform).ok_or(GatewayError::NoAssetForPlatform(platform))
        }
    }
}

/// Streaming fallback. The upstream status (200/206/304) and the caching and
/// range headers are mirrored verbatim so resumable downloads keep working;
/// the body is piped without buffering. Dropping either side of the pipe
/// releases the other.
async fn stream_through(
    state: &AppState,
    repo: &RepoIdentity,
    asset: &ReleaseAsset,
    method: Method,
    client_headers: &HeaderMap,
) -> Result<Response, GatewayError> {
    let mut outbound = HeaderMap::new();
    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = client_headers.get(&name) {
            outbound.insert(name, value.clone());
        }
    }

    let upstream = state
        .github()
        .fetch_asset(repo, asset.id, method.clone(), outbound)
        .await?;

    let status = upstream.status();
    let mut mirrored = HeaderMap::new();
    for name in MIRRORED_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            mirrored.insert(name, value.clone());
        }
    }
    debug!(%status, asset = %asset.name, "streaming asset through gateway");
    analytics::track_download_stream(&asset.name, status.as_u16());

    // HEAD terminates after headers; 304 carries no body by definition.
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = mirrored;
    Ok(response)
}
