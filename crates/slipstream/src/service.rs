//! Core gateway state: release resolution, asset selection and manifest
//! assembly.

use std::sync::Arc;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::{debug, instrument};

use crate::{
    checksum::ChecksumService,
    config::{GatewayConfig, RepoIdentity},
    error::GatewayError,
    github::GithubClient,
    types::{ManifestFile, Platform, Release, ReleaseAsset, UpdateManifest},
    utils::has_extension,
};

/// Characters escaped inside a path segment of a generated download URL.
const SEGMENT_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Characters escaped inside a query value of a generated download URL.
const QUERY_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>');

/// Shared application state, constructed once at startup.
pub struct AppState {
    config: GatewayConfig,
    github: Arc<GithubClient>,
    checksums: ChecksumService,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let github = Arc::new(GithubClient::new(
            config.api_root.clone(),
            config.token.clone(),
        )?);
        let checksums = ChecksumService::new(Arc::clone(&github));
        Ok(Self {
            config,
            github,
            checksums,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub(crate) fn github(&self) -> &GithubClient {
        &self.github
    }

    /// The configured repository, or the fatal configuration error.
    pub fn repo(&self) -> Result<&RepoIdentity, GatewayError> {
        self.config
            .repo
            .as_ref()
            .ok_or(GatewayError::RepoNotConfigured)
    }

    /// Build the update manifest for the latest release, filtered by
    /// platform. Built fresh per request; never cached.
    #[instrument(skip(self), fields(%platform))]
    pub async fn build_manifest(&self, platform: Platform) -> Result<UpdateManifest, GatewayError> {
        let repo = self.repo()?;
        let release = self.github.release(repo, None).await?;
        let asset = select_asset(&release.assets, platform)
            .ok_or(GatewayError::NoAssetForPlatform(platform))?;

        let url = self.download_url(&release, platform, asset);
        let digest = self.checksums.obtain(repo, &release, asset).await;
        debug!(
            version = release.version(),
            asset = %asset.name,
            digest_present = digest.is_some(),
            "manifest assembled"
        );

        Ok(UpdateManifest {
            version: release.version().to_string(),
            path: url.clone(),
            files: vec![ManifestFile {
                url,
                name: asset.name.clone(),
                sha512: digest,
            }],
            release_date: release.release_date().to_rfc3339(),
        })
    }

    /// The URL a manifest points clients at: the same-origin proxy route
    /// when proxying is enabled and an external base URL is known, else the
    /// asset's direct CDN URL.
    fn download_url(&self, release: &Release, platform: Platform, asset: &ReleaseAsset) -> String {
        match &self.config.base_url {
            Some(base) if self.config.proxy_downloads => {
                let name = utf8_percent_encode(&asset.name, SEGMENT_ENCODE);
                let tag = utf8_percent_encode(&release.tag_name, QUERY_ENCODE);
                format!("{base}/download/{platform}/{name}?tag={tag}")
            }
            _ => asset.browser_download_url.clone(),
        }
    }
}

/// Pick the asset for a platform: ordered extension preference, first
/// matching preference wins regardless of where the asset sits in the list,
/// falling back to the first asset.
pub fn select_asset(assets: &[ReleaseAsset], platform: Platform) -> Option<&ReleaseAsset> {
    let preferences: &[&str] = match platform {
        Platform::Win32 => &[".exe", ".zip"],
        // zip before dmg: zip is what auto-update clients apply silently.
        Platform::Darwin => &[".zip", ".dmg", ".pkg"],
        Platform::Linux => &[".AppImage", ".deb", ".rpm"],
        Platform::Unknown => &[],
    };

    preferences
        .iter()
        .find_map(|ext| assets.iter().find(|a| has_extension(&a.name, ext)))
        .or_else(|| assets.first())
}

/// Find an asset by name: exact match first, then case-insensitive.
pub fn find_asset<'a>(assets: &'a [ReleaseAsset], name: &str) -> Option<&'a ReleaseAsset> {
    assets
        .iter()
        .find(|a| a.name == name)
        .or_else(|| assets.iter().find(|a| a.name.eq_ignore_ascii_case(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;

    fn asset(id: u64, name: &str) -> ReleaseAsset {
        ReleaseAsset {
            id,
            name: name.to_string(),
            browser_download_url: format!("https://cdn.example/{name}"),
            size: None,
        }
    }

    fn assets(names: &[&str]) -> Vec<ReleaseAsset> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| asset(i as u64 + 1, n))
            .collect()
    }

    fn release(tag: &str, names: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            published_at: None,
            created_at: None,
            assets: assets(names),
        }
    }

    #[test]
    fn darwin_prefers_zip_over_dmg_regardless_of_order() {
        let listed_dmg_first = assets(&["App-1.0.0.dmg", "App-1.0.0.zip"]);
        let picked = select_asset(&listed_dmg_first, Platform::Darwin).unwrap();
        assert_eq!(picked.name, "App-1.0.0.zip");

        let listed_zip_first = assets(&["App-1.0.0.zip", "App-1.0.0.dmg"]);
        let picked = select_asset(&listed_zip_first, Platform::Darwin).unwrap();
        assert_eq!(picked.name, "App-1.0.0.zip");
    }

    #[test]
    fn darwin_falls_back_through_preference_order() {
        let only_dmg = assets(&["App-1.0.0.dmg"]);
        assert_eq!(
            select_asset(&only_dmg, Platform::Darwin).unwrap().name,
            "App-1.0.0.dmg"
        );

        let pkg_among_others = assets(&["notes.txt", "App-1.0.0.pkg"]);
        assert_eq!(
            select_asset(&pkg_among_others, Platform::Darwin).unwrap().name,
            "App-1.0.0.pkg"
        );
    }

    #[test]
    fn win32_prefers_exe_then_zip() {
        let both = assets(&["App-1.0.0.zip", "App-Setup-1.0.0.exe"]);
        assert_eq!(
            select_asset(&both, Platform::Win32).unwrap().name,
            "App-Setup-1.0.0.exe"
        );
    }

    #[test]
    fn linux_prefers_appimage_case_insensitively() {
        let mixed = assets(&["app_1.0.0.deb", "App-1.0.0.appimage"]);
        assert_eq!(
            select_asset(&mixed, Platform::Linux).unwrap().name,
            "App-1.0.0.appimage"
        );
    }

    #[test]
    fn unknown_platform_gets_first_asset() {
        let listed = assets(&["b.bin", "a.zip"]);
        assert_eq!(select_asset(&listed, Platform::Unknown).unwrap().name, "b.bin");
    }

    #[test]
    fn no_match_falls_back_to_first_and_empty_yields_none() {
        let unmatched = assets(&["README.md"]);
        assert_eq!(
            select_asset(&unmatched, Platform::Darwin).unwrap().name,
            "README.md"
        );
        assert!(select_asset(&[], Platform::Darwin).is_none());
        assert!(select_asset(&[], Platform::Unknown).is_none());
    }

    #[test]
    fn find_asset_exact_match_beats_case_insensitive() {
        let listed = assets(&["app-1.0.0.ZIP", "app-1.0.0.zip"]);
        assert_eq!(find_asset(&listed, "app-1.0.0.zip").unwrap().name, "app-1.0.0.zip");
        assert_eq!(find_asset(&listed, "APP-1.0.0.ZIP").unwrap().name, "app-1.0.0.ZIP");
        assert!(find_asset(&listed, "missing.zip").is_none());
    }

    #[test]
    fn version_strips_leading_v() {
        assert_eq!(release("v1.2.3", &[]).version(), "1.2.3");
        assert_eq!(release("1.2.3", &[]).version(), "1.2.3");
    }

    #[test]
    fn download_url_prefers_proxy_when_configured() {
        let config = GatewayConfig {
            repo: None,
            base_url: Some("https://updates.acme.dev".into()),
            proxy_downloads: true,
            ..GatewayConfig::default()
        };
        let state = AppState::new(config).unwrap();
        let rel = release("v1.0.0", &["App 1.0.0.zip"]);
        let url = state.download_url(&rel, Platform::Darwin, &rel.assets[0]);
        assert_eq!(
            url,
            "https://updates.acme.dev/download/darwin/App%201.0.0.zip?tag=v1.0.0"
        );
    }

    #[test]
    fn download_url_falls_back_to_cdn() {
        let disabled = GatewayConfig {
            base_url: Some("https://updates.acme.dev".into()),
            proxy_downloads: false,
            ..GatewayConfig::default()
        };
        let state = AppState::new(disabled).unwrap();
        let rel = release("v1.0.0", &["App-1.0.0.zip"]);
        let url = state.download_url(&rel, Platform::Darwin, &rel.assets[0]);
        assert_eq!(url, "https://cdn.example/App-1.0.0.zip");

        // No base URL to build a proxy link from: direct CDN as well.
        let no_base = GatewayConfig::default();
        let state = AppState::new(no_base).unwrap();
        let url = state.download_url(&rel, Platform::Darwin, &rel.assets[0]);
        assert_eq!(url, "https://cdn.example/App-1.0.0.zip");
    }
}
