//! Pure helpers for version, URL and route-path handling.

/// Strip a single leading `v` from a release tag (`"v1.2.3"` -> `"1.2.3"`).
pub fn strip_v_prefix(tag: &str) -> &str {
    tag.strip_prefix('v').unwrap_or(tag)
}

/// Normalize an externally visible base URL: prepend `https://` when no
/// scheme is present and drop any trailing slash.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    Some(with_scheme.trim_end_matches('/').to_string())
}

/// Strip `prefix` from the start of `path`, respecting segment boundaries.
///
/// Mirrors the mount-point stripping of serverless deployments: a path that
/// does not start with the prefix is returned unchanged, and stripping the
/// whole path yields `"/"`.
pub fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Extract the variant from a `latest-<variant>.yml` file name.
///
/// Returns `None` for plain `latest.yml` and for names outside the pattern.
pub fn manifest_variant(file: &str) -> Option<&str> {
    let variant = file.strip_prefix("latest-")?.strip_suffix(".yml")?;
    if variant.is_empty() { None } else { Some(variant) }
}

/// Case-insensitive file-extension test. `ext` includes the dot.
pub fn has_extension(name: &str, ext: &str) -> bool {
    name.len() >= ext.len() && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
}
