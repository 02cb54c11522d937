//! Checksum acquisition for release assets.
//!
//! A digest is obtained from a companion `.sha512` asset when one is
//! published and well-formed, otherwise by streaming the binary itself
//! through SHA-512. Results are cached per asset id with a TTL, and
//! concurrent computations for the same asset collapse into a single
//! in-flight attempt. Absence of a digest is a valid terminal state: the
//! manifest simply omits the field.

use std::{collections::HashMap, future::Future, sync::Arc, sync::Mutex, time::Duration};

use axum::http::Method;
use backon::{ExponentialBuilder, Retryable};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha512};
use tokio::{sync::OnceCell, time::Instant};
use tracing::{debug, error, warn};

use crate::{
    config::RepoIdentity,
    error::GatewayError,
    github::GithubClient,
    types::{Release, ReleaseAsset},
    utils::has_extension,
};

/// Cached digests expire after this long and are recomputed lazily.
pub const DIGEST_TTL: Duration = Duration::from_secs(60 * 60);

/// Base64 length of a SHA-512 digest (64 bytes).
const PUBLISHED_DIGEST_LEN: usize = 88;

const HASH_RETRY_BASE_DELAY: Duration = Duration::from_millis(500);
const HASH_RETRY_MAX_TIMES: usize = 3;

#[derive(Debug, Clone)]
struct CacheEntry {
    digest: Option<String>,
    computed_at: Instant,
}

type Slot = Arc<OnceCell<CacheEntry>>;

/// Process-wide digest cache keyed by asset id.
///
/// Each key maps to a once-cell slot: concurrent callers for a key with no
/// completed entry all await the same cell, so exactly one computation runs
/// (single-flight). Failed computations are not retained; the slot is
/// replaced on the next access.
pub struct ChecksumCache {
    ttl: Duration,
    slots: Mutex<HashMap<u64, Slot>>,
}

impl ChecksumCache {
    pub fn new() -> Self {
        Self::with_ttl(DIGEST_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached digest for `asset_id`, or run `compute` to fill the
    /// cache. Concurrent calls for the same uncached id share one
    /// computation and all observe its result.
    pub async fn get_or_compute<F, Fut>(&self, asset_id: u64, compute: F) -> Option<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let slot = self.slot(asset_id);
        let entry = slot
            .get_or_init(|| async {
                CacheEntry {
                    digest: compute().await,
                    computed_at: Instant::now(),
                }
            })
            .await;
        entry.digest.clone()
    }

    /// Overwrite the entry for `asset_id` with a freshly computed digest
    /// (background reconciliation: the binary is ground truth).
    pub fn store(&self, asset_id: u64, digest: String) {
        let entry = CacheEntry {
            digest: Some(digest),
            computed_at: Instant::now(),
        };
        let slot: Slot = Arc::new(OnceCell::new_with(Some(entry)));
        self.lock_slots().insert(asset_id, slot);
    }

    /// Fetch a usable slot for `asset_id`: an in-flight or fresh slot is
    /// joined, a stale or failed one is replaced. The map lock is never held
    /// across an await point.
    fn slot(&self, asset_id: u64) -> Slot {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get(&asset_id) {
            match slot.get() {
                // Computation in flight: join it.
                None => return slot.clone(),
                Some(entry)
                    if entry.digest.is_some() && entry.computed_at.elapsed() < self.ttl =>
                {
                    return slot.clone();
                }
                // Expired, or a computation that yielded nothing.
                Some(_) => {}
            }
        }
        let slot = Slot::default();
        slots.insert(asset_id, slot.clone());
        slot
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ChecksumCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Obtains, verifies and caches asset digests.
pub struct ChecksumService {
    github: Arc<GithubClient>,
    cache: Arc<ChecksumCache>,
}

impl ChecksumService {
    pub fn new(github: Arc<GithubClient>) -> Self {
        Self {
            github,
            cache: Arc::new(ChecksumCache::new()),
        }
    }

    /// Obtain a digest for `asset`, consulting the cache first. Never an
    /// error; `None` means the digest is unverifiable right now.
    pub async fn obtain(
        &self,
        repo: &RepoIdentity,
        release: &Release,
        asset: &ReleaseAsset,
    ) -> Option<String> {
        self.cache
            .get_or_compute(asset.id, || self.resolve_digest(repo, release, asset))
            .await
    }

    async fn resolve_digest(
        &self,
        repo: &RepoIdentity,
        release: &Release,
        asset: &ReleaseAsset,
    ) -> Option<String> {
        if let Some(companion) = find_companion(release, asset) {
            match self.github.fetch_asset_text(repo, companion.id).await {
                Ok(raw) => {
                    if let Some(digest) = validate_published_digest(&raw) {
                        debug!(asset = %asset.name, companion = %companion.name, "using published checksum");
                        self.spawn_reconcile(repo.clone(), asset.clone(), digest.clone());
                        return Some(digest);
                    }
                    warn!(
                        companion = %companion.name,
                        "published checksum is not an 88-char base64 SHA-512 digest, recomputing"
                    );
                }
                Err(e) => {
                    warn!(companion = %companion.name, error = %e, "failed to fetch published checksum, recomputing");
                }
            }
        }
        self.compute_digest(repo, asset).await
    }

    /// Stream-and-hash with bounded exponential backoff on transport
    /// failure. Terminal conditions are not retried.
    async fn compute_digest(&self, repo: &RepoIdentity, asset: &ReleaseAsset) -> Option<String> {
        let attempt = || hash_remote_asset(&self.github, repo, asset);
        let result = attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(HASH_RETRY_BASE_DELAY)
                    .with_factor(2.0)
                    .with_max_times(HASH_RETRY_MAX_TIMES),
            )
            .when(GatewayError::is_transient)
            .notify(|err: &GatewayError, delay: Duration| {
                warn!(asset = %asset.name, error = %err, ?delay, "asset hash attempt failed, backing off");
            })
            .await;

        match result {
            Ok(digest) => Some(digest),
            Err(e) => {
                error!(asset = %asset.name, error = %e, "giving up on asset checksum");
                None
            }
        }
    }

    /// Verify a published digest against the binary without blocking the
    /// caller. On disagreement the computed digest wins.
    fn spawn_reconcile(&self, repo: RepoIdentity, asset: ReleaseAsset, published: String) {
        let github = Arc::clone(&self.github);
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            reconcile_published_digest(&github, &cache, &repo, &asset, &published).await;
        });
    }
}

/// Compare a published digest with one computed from the binary, replacing
/// the cache entry when they disagree.
pub(crate) async fn reconcile_published_digest(
    github: &GithubClient,
    cache: &ChecksumCache,
    repo: &RepoIdentity,
    asset: &ReleaseAsset,
    published: &str,
) {
    match hash_remote_asset(github, repo, asset).await {
        Ok(computed) if computed == published => {
            debug!(asset = %asset.name, "published checksum verified against binary");
        }
        Ok(computed) => {
            warn!(
                asset = %asset.name,
                published,
                computed,
                "published checksum disagrees with binary, replacing cache entry"
            );
            cache.store(asset.id, computed);
        }
        Err(e) => {
            debug!(asset = %asset.name, error = %e, "background checksum verification failed");
        }
    }
}

/// Resolve the asset's signed location and stream its body through SHA-512.
///
/// A byte count short of the declared content length is logged as
/// truncation but still yields a digest: a partial failure here must not
/// block manifest generation.
async fn hash_remote_asset(
    github: &GithubClient,
    repo: &RepoIdentity,
    asset: &ReleaseAsset,
) -> Result<String, GatewayError> {
    let response = match github.asset_redirect(repo, asset.id).await? {
        Some(location) => github.fetch_location(&location).await?,
        None => {
            github
                .fetch_asset(repo, asset.id, Method::GET, HeaderMap::new())
                .await?
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(GatewayError::UpstreamFetchFailed(format!(
            "asset download responded with {status}"
        )));
    }

    let declared = response.content_length();
    let mut hasher = Sha512::new();
    let mut received: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| GatewayError::UpstreamFetchFailed(e.to_string()))?;
        received += chunk.len() as u64;
        hasher.update(&chunk);
    }

    if let Some(declared) = declared
        && declared != received
    {
        warn!(asset = %asset.name, declared, received, "asset stream truncated while hashing");
    }

    Ok(BASE64_STANDARD.encode(hasher.finalize()))
}

/// Locate the companion checksum asset: `<name>.sha512` exactly, else any
/// asset ending in `.sha512`.
pub(crate) fn find_companion<'a>(
    release: &'a Release,
    asset: &ReleaseAsset,
) -> Option<&'a ReleaseAsset> {
    let exact = format!("{}.sha512", asset.name);
    release
        .assets
        .iter()
        .find(|a| a.name == exact)
        .or_else(|| {
            release
                .assets
                .iter()
                .find(|a| has_extension(&a.name, ".sha512"))
        })
}

/// Accept a published digest only if, after trimming, it is exactly 88
/// characters of standard base64 decoding to 64 bytes.
pub(crate) fn validate_published_digest(raw: &str) -> Option<String> {
    let candidate = raw.trim();
    if candidate.len() != PUBLISHED_DIGEST_LEN {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(candidate).ok()?;
    (decoded.len() == Sha512::output_size()).then(|| candidate.to_string())
}
