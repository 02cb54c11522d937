//! Client for the GitHub Releases REST API.
//!
//! Two reqwest clients are held: one that follows redirects (streaming
//! fetches) and one with redirects disabled, used to read the `Location`
//! header of the signed-download handshake without consuming the body.

use anyhow::Context;
use axum::http::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, LOCATION};
use tracing::debug;

use crate::{config::RepoIdentity, error::GatewayError, types::Release};

/// Client identifier sent on every API call; the API rejects requests
/// without a `User-Agent`.
pub const USER_AGENT: &str = "slipstream-update-gateway";

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_OCTET_STREAM: &str = "application/octet-stream";

pub struct GithubClient {
    api_root: String,
    token: Option<String>,
    /// Follows redirects; used for metadata and streaming fetches.
    http: reqwest::Client,
    /// Redirects disabled; used to capture signed locations.
    http_no_redirect: reqwest::Client,
}

impl GithubClient {
    pub fn new(api_root: String, token: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let http_no_redirect = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build non-redirecting HTTP client")?;

        Ok(Self {
            api_root,
            token,
            http,
            http_no_redirect,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    fn asset_url(&self, repo: &RepoIdentity, asset_id: u64) -> String {
        format!(
            "{}/repos/{}/{}/releases/assets/{asset_id}",
            self.api_root, repo.owner, repo.name
        )
    }

    /// Fetch the latest release, or the release published under `tag`.
    ///
    /// No retry here: a failed metadata fetch is reported to the caller
    /// directly.
    pub async fn release(
        &self,
        repo: &RepoIdentity,
        tag: Option<&str>,
    ) -> Result<Release, GatewayError> {
        let url = match tag {
            Some(tag) => format!(
                "{}/repos/{}/{}/releases/tags/{tag}",
                self.api_root, repo.owner, repo.name
            ),
            None => format!(
                "{}/repos/{}/{}/releases/latest",
                self.api_root, repo.owner, repo.name
            ),
        };
        debug!(%url, "fetching release metadata");

        let response = self
            .authorize(self.http.get(&url).header(ACCEPT, ACCEPT_JSON))
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::ReleaseNotFound {
                tag: tag.map(str::to_string),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::UpstreamUnavailable {
                status: Some(status),
                message: format!("release API responded with {status}"),
            });
        }

        response
            .json::<Release>()
            .await
            .map_err(|e| GatewayError::UpstreamUnavailable {
                status: None,
                message: format!("malformed release document: {e}"),
            })
    }

    /// First leg of the signed-download handshake: request the asset's
    /// binary content with redirects disabled and return the `Location`
    /// the API hands out, if any.
    pub async fn asset_redirect(
        &self,
        repo: &RepoIdentity,
        asset_id: u64,
    ) -> Result<Option<String>, GatewayError> {
        let url = self.asset_url(repo, asset_id);
        let response = self
            .authorize(
                self.http_no_redirect
                    .get(&url)
                    .header(ACCEPT, ACCEPT_OCTET_STREAM),
            )
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamFetchFailed(e.to_string()))?;

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            debug!(%url, present = location.is_some(), "signed location resolved");
            return Ok(location);
        }
        if status.is_success() {
            // Upstream served the bytes inline; the caller falls back to
            // streaming through the redirect-following client.
            return Ok(None);
        }
        Err(GatewayError::UpstreamFetchFailed(format!(
            "asset endpoint responded with {status}"
        )))
    }

    /// Fetch an asset's binary content through the redirect-following
    /// client. The upstream status is NOT checked: proxy callers mirror it
    /// verbatim (200/206/304), checksum callers validate it themselves.
    pub async fn fetch_asset(
        &self,
        repo: &RepoIdentity,
        asset_id: u64,
        method: Method,
        headers: HeaderMap,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = self.asset_url(repo, asset_id);
        self.authorize(
            self.http
                .request(method, &url)
                .header(ACCEPT, ACCEPT_OCTET_STREAM)
                .headers(headers),
        )
        .send()
        .await
        .map_err(|e| GatewayError::UpstreamFetchFailed(e.to_string()))
    }

    /// Plain GET of an already-signed location. No credential is attached:
    /// signed URLs are self-authorizing and object stores reject requests
    /// carrying both a signature and an `Authorization` header.
    pub async fn fetch_location(&self, url: &str) -> Result<reqwest::Response, GatewayError> {
        self.http
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamFetchFailed(e.to_string()))
    }

    /// Fetch a small textual asset (companion checksum files).
    pub async fn fetch_asset_text(
        &self,
        repo: &RepoIdentity,
        asset_id: u64,
    ) -> Result<String, GatewayError> {
        let response = self
            .fetch_asset(repo, asset_id, Method::GET, HeaderMap::new())
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::UpstreamFetchFailed(format!(
                "asset download responded with {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| GatewayError::UpstreamFetchFailed(e.to_string()))
    }
}
