use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, error, instrument, warn};

use crate::{
    analytics,
    config::LEGACY_ROUTE_PREFIXES,
    proxy,
    service::AppState,
    types::{DownloadQuery, Platform, UpdateManifest, UpdateManifestParams},
    utils::{manifest_variant, strip_route_prefix},
};

/// Diagnostic served for paths outside the gateway's routes when no static
/// delegate is configured.
const DELEGATE_HELP: &str = "\
No handler matched this path and no static fallback is configured.

Set STATIC_DIR to serve a static update site for paths outside /download
and the update manifest routes.";

/// Variant component of a `latest-<variant>.yml` request, stashed in request
/// extensions by the normalization layer.
#[derive(Debug, Clone)]
pub struct ManifestVariant(pub String);

/// Rewrite the request before routing: strip the configured mount prefix and
/// the legacy serverless prefixes, and fold `latest-<variant>.yml` into the
/// `latest.yml` route with the variant preserved as an extension.
pub async fn normalize_request(
    State(state): State<Arc<AppState>>,
    mut request: Request,
) -> Request {
    let original = request.uri().clone();
    let mut path = original.path().to_string();

    if let Some(prefix) = &state.config().path_prefix {
        path = strip_route_prefix(&path, prefix).to_string();
    }
    for prefix in LEGACY_ROUTE_PREFIXES {
        path = strip_route_prefix(&path, prefix).to_string();
    }

    let mut variant = None;
    if let Some((parent, file)) = path.rsplit_once('/')
        && is_manifest_parent(parent)
        && let Some(v) = manifest_variant(file)
    {
        variant = Some(ManifestVariant(v.to_string()));
        path = format!("{parent}/latest.yml");
    }

    if path != original.path()
        && let Some(rewritten) = rewrite_uri(&original, &path)
    {
        debug!(from = %original.path(), to = %path, "request path normalized");
        *request.uri_mut() = rewritten;
    }
    if let Some(variant) = variant {
        request.extensions_mut().insert(variant);
    }
    request
}

/// Only the site root and `/update/{platform}/{version}/` host manifest
/// files; a download path segment that happens to look like
/// `latest-<variant>.yml` names an asset and must not be rewritten.
fn is_manifest_parent(parent: &str) -> bool {
    if parent.is_empty() {
        return true;
    }
    let mut segments = parent.trim_start_matches('/').split('/');
    segments.next() == Some("update")
        && segments.next().is_some()
        && segments.next().is_some()
        && segments.next().is_none()
}

fn rewrite_uri(original: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match original.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut parts = original.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// `GET /latest.yml` (and `latest-<variant>.yml`): manifest for the latest
/// release with no platform filter, so the generic first-asset rule applies.
#[instrument(skip_all)]
pub async fn latest_manifest_handler(
    State(state): State<Arc<AppState>>,
    variant: Option<Extension<ManifestVariant>>,
) -> Response {
    let variant = variant.map(|Extension(v)| v.0);
    debug!(?variant, "root manifest requested");
    respond_with_manifest(&state, Platform::Unknown).await
}

/// `GET /update/{platform}/{version}/latest.yml`: platform-filtered
/// manifest. The client's installed version is accepted but does not pin a
/// release.
#[instrument(skip_all, fields(platform = %params.platform, client_version = %params.version))]
pub async fn update_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path(params): Path<UpdateManifestParams>,
) -> Response {
    let platform = Platform::parse(&params.platform);
    respond_with_manifest(&state, platform).await
}

async fn respond_with_manifest(state: &AppState, platform: Platform) -> Response {
    match state.build_manifest(platform).await {
        Ok(manifest) => {
            analytics::track_manifest_request(
                platform.as_str(),
                &manifest.version,
                manifest.files.iter().any(|f| f.sha512.is_some()),
            );
            yaml_response(&manifest)
        }
        Err(e) => {
            warn!(error = %e, "manifest request failed");
            analytics::track_manifest_failed(platform.as_str(), e.kind());
            e.into_response()
        }
    }
}

fn yaml_response(manifest: &UpdateManifest) -> Response {
    match serde_yaml::to_string(manifest) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/yaml; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize manifest");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error generating latest.yml",
            )
                .into_response()
        }
    }
}

/// `GET|HEAD /download/{platform}`: platform-selected asset.
pub async fn download_platform_handler(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    Query(query): Query<DownloadQuery>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    download(&state, &platform, None, &query, method, &headers).await
}

/// `GET|HEAD /download/{platform}/{asset}`: explicitly named asset.
pub async fn download_asset_handler(
    State(state): State<Arc<AppState>>,
    Path((platform, asset)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    download(&state, &platform, Some(&asset), &query, method, &headers).await
}

async fn download(
    state: &AppState,
    platform_segment: &str,
    asset_name: Option<&str>,
    query: &DownloadQuery,
    method: Method,
    headers: &HeaderMap,
) -> Response {
    let platform = Platform::parse(platform_segment);
    match proxy::proxy_download(state, platform, asset_name, query, method, headers).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "download request failed");
            analytics::track_download_failed(platform.as_str(), e.kind());
            e.into_response()
        }
    }
}

/// Terminal fallback when no static delegate is configured.
pub async fn unconfigured_fallback(uri: Uri) -> Response {
    debug!(path = %uri.path(), "no delegate configured for path");
    (StatusCode::INTERNAL_SERVER_ERROR, DELEGATE_HELP).into_response()
}
