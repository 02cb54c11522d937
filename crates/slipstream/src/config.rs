//! Gateway configuration, resolved once at startup from plain values.

use std::path::PathBuf;

use crate::utils::normalize_base_url;

pub const DEFAULT_API_ROOT: &str = "https://api.github.com";

/// Legacy serverless mount points stripped before routing, in order.
pub const LEGACY_ROUTE_PREFIXES: &[&str] = &["/api/hazel", "/api"];

/// The repository whose releases are served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoIdentity {
    pub owner: String,
    pub name: String,
}

impl std::fmt::Display for RepoIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Everything the gateway needs to know, read once at process start.
///
/// A missing repository identity is not a construction error: the gateway
/// still serves requests and answers each with the configuration diagnostic.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub repo: Option<RepoIdentity>,
    /// Bearer credential forwarded to the release API (private repositories,
    /// higher rate limits).
    pub token: Option<String>,
    /// Externally visible base URL used to build proxy download links.
    pub base_url: Option<String>,
    /// When false, manifests point at direct CDN URLs instead of the proxy.
    pub proxy_downloads: bool,
    /// Extra mount prefix stripped before routing, ahead of the legacy ones.
    pub path_prefix: Option<String>,
    /// Release API root; override for GitHub Enterprise hosts.
    pub api_root: String,
    /// Root of the static-site fallback; `None` means unconfigured.
    pub static_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            repo: None,
            token: None,
            base_url: None,
            proxy_downloads: true,
            path_prefix: None,
            api_root: DEFAULT_API_ROOT.to_string(),
            static_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Resolve the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// Resolve from an arbitrary variable source.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let repo = resolve_repo_identity(
            get("ACCOUNT").as_deref(),
            get("REPOSITORY").as_deref(),
            get("REPO").as_deref(),
        );
        let token = get("TOKEN").or_else(|| get("GITHUB_TOKEN"));
        let base_url = get("URL")
            .or_else(|| get("VERCEL_URL"))
            .and_then(|raw| normalize_base_url(&raw));
        let proxy_downloads = !get("DISABLE_PROXY").is_some_and(|v| is_truthy(&v));
        let path_prefix = get("PATH_PREFIX");
        let api_root = get("GITHUB_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_ROOT.to_string());
        let static_dir = get("STATIC_DIR").map(PathBuf::from);

        Self {
            repo,
            token,
            base_url,
            proxy_downloads,
            path_prefix,
            api_root,
            static_dir,
        }
    }
}

/// Resolve the repository identity. The split `ACCOUNT`/`REPOSITORY` form
/// wins over the combined `REPO=owner/name` form.
fn resolve_repo_identity(
    account: Option<&str>,
    repository: Option<&str>,
    combined: Option<&str>,
) -> Option<RepoIdentity> {
    if let (Some(owner), Some(name)) = (account, repository) {
        return Some(RepoIdentity {
            owner: owner.to_string(),
            name: name.to_string(),
        });
    }

    let (owner, name) = combined?.split_once('/')?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some(RepoIdentity {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve(vars: &[(&str, &str)]) -> GatewayConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        GatewayConfig::resolve(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn split_form_wins_over_combined() {
        let config = resolve(&[
            ("ACCOUNT", "acme"),
            ("REPOSITORY", "app"),
            ("REPO", "other/repo"),
        ]);
        assert_eq!(
            config.repo,
            Some(RepoIdentity {
                owner: "acme".into(),
                name: "app".into()
            })
        );
    }

    #[test]
    fn combined_repo_form_splits_on_first_slash() {
        let config = resolve(&[("REPO", "acme/app")]);
        assert_eq!(config.repo.unwrap().to_string(), "acme/app");
    }

    #[test]
    fn malformed_combined_repo_yields_no_identity() {
        assert!(resolve(&[("REPO", "acme")]).repo.is_none());
        assert!(resolve(&[("REPO", "/app")]).repo.is_none());
        assert!(resolve(&[]).repo.is_none());
    }

    #[test]
    fn token_prefers_explicit_over_github_token() {
        let config = resolve(&[("TOKEN", "t1"), ("GITHUB_TOKEN", "t2")]);
        assert_eq!(config.token.as_deref(), Some("t1"));
        let config = resolve(&[("GITHUB_TOKEN", "t2")]);
        assert_eq!(config.token.as_deref(), Some("t2"));
    }

    #[test]
    fn base_url_gains_scheme_when_missing() {
        let config = resolve(&[("VERCEL_URL", "updates.acme.dev")]);
        assert_eq!(config.base_url.as_deref(), Some("https://updates.acme.dev"));
        let config = resolve(&[("URL", "http://localhost:4000")]);
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:4000"));
    }

    #[test]
    fn proxy_toggle_defaults_on() {
        assert!(resolve(&[]).proxy_downloads);
        assert!(!resolve(&[("DISABLE_PROXY", "true")]).proxy_downloads);
        assert!(!resolve(&[("DISABLE_PROXY", "1")]).proxy_downloads);
        assert!(resolve(&[("DISABLE_PROXY", "no")]).proxy_downloads);
    }

    #[test]
    fn api_root_override_drops_trailing_slash() {
        let config = resolve(&[("GITHUB_API_URL", "https://ghe.acme.dev/api/v3/")]);
        assert_eq!(config.api_root, "https://ghe.acme.dev/api/v3");
        assert_eq!(resolve(&[]).api_root, DEFAULT_API_ROOT);
    }
}
