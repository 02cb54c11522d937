//! Data types for releases, assets and the update manifest document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::strip_v_prefix;

/// A published release as returned by the GitHub Releases API.
///
/// Immutable once fetched; the gateway re-fetches per request instead of
/// caching release metadata across requests.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Release {
    /// Tag name, the source of truth for the version (e.g. `"v1.2.3"`).
    pub tag_name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// The manifest version: the tag with a leading `v` stripped.
    pub fn version(&self) -> &str {
        strip_v_prefix(&self.tag_name)
    }

    /// Publication timestamp for the manifest `releaseDate` field.
    pub fn release_date(&self) -> DateTime<Utc> {
        self.published_at
            .or(self.created_at)
            .unwrap_or_else(Utc::now)
    }
}

/// One downloadable file attached to a release.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ReleaseAsset {
    /// Opaque identifier, stable for the release's lifetime. Keys the
    /// checksum cache and the asset metadata endpoint.
    pub id: u64,
    /// File name, unique within a release.
    pub name: String,
    /// Direct CDN URL (redirect target when proxying is disabled).
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Client platform, derived from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Win32,
    Darwin,
    Linux,
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Win32 => "win32",
            Platform::Darwin => "darwin",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }

    /// Parse a path segment into a platform. Unrecognized values map to
    /// [`Platform::Unknown`] rather than an error: an unknown platform still
    /// gets the generic first-asset selection rule.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "win32" | "win" | "windows" => Platform::Win32,
            "darwin" | "mac" | "macos" => Platform::Darwin,
            "linux" => Platform::Linux,
            _ => Platform::Unknown,
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Platform::parse(s))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The document an electron-updater client polls (`latest.yml`).
#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifest {
    /// Semantic version string, `v` prefix stripped.
    pub version: String,
    /// Primary download URL.
    pub path: String,
    pub files: Vec<ManifestFile>,
    pub release_date: String,
}

/// One downloadable entry in the manifest `files` list.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ManifestFile {
    pub url: String,
    pub name: String,
    /// Base64 SHA-512 digest; omitted when unverifiable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

/// Path parameters for `/update/{platform}/{version}/latest.yml`.
///
/// `version` is the client's installed version; it is accepted for
/// compatibility but does not pin a release.
#[derive(Deserialize, Debug)]
pub struct UpdateManifestParams {
    pub platform: String,
    pub version: String,
}

/// Query parameters accepted by the download routes.
#[derive(Deserialize, Debug, Default)]
pub struct DownloadQuery {
    /// Release tag; defaults to the latest release.
    pub tag: Option<String>,
    /// Legacy form of the asset name (the path segment takes precedence).
    pub asset: Option<String>,
}
