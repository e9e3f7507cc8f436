//! Catalog platform resolvers
//!
//! Each catalog platform turns a URL into an ordered list of
//! [`TrackPair`]s through a [`CascadeResolver`]: an ordered list of
//! [`TierStrategy`] values tried one after another. A tier that fails or
//! yields nothing is logged and the next tier runs; only when every tier is
//! exhausted does the caller see a [`ResolutionError`].
//!
//! Tracks from a tier that succeeded are returned as-is. A later tier never
//! runs after an earlier one produced tracks, so results are never merged.

mod amazon_music;
mod apple_music;
mod deezer;
mod fetch;
mod scrape;
mod share;
mod spotify;
mod tidal;

pub use fetch::{FetchedPage, HttpFetcher, PageFetcher};
pub use share::{canonicalize, MAX_SHARE_HOPS};

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tunecast_common::config::TomlConfig;

use crate::normalize::{cache_key, sanitize};

/// Catalog platforms with a dedicated resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Spotify,
    Deezer,
    AppleMusic,
    Tidal,
    AmazonMusic,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Spotify => "Spotify",
            Platform::Deezer => "Deezer",
            Platform::AppleMusic => "Apple Music",
            Platform::Tidal => "Tidal",
            Platform::AmazonMusic => "Amazon Music",
        };
        f.write_str(name)
    }
}

/// One catalog track, identified by title and artist only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPair {
    pub title: String,
    pub artist: String,
}

impl TrackPair {
    pub fn new(title: impl AsRef<str>, artist: impl AsRef<str>) -> Self {
        Self {
            title: sanitize(title.as_ref()),
            artist: sanitize(artist.as_ref()),
        }
    }

    /// Resolution cache key
    pub fn cache_key(&self) -> String {
        cache_key(&self.title, &self.artist)
    }
}

impl fmt::Display for TrackPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            f.write_str(&self.title)
        } else {
            write!(f, "{} - {}", self.title, self.artist)
        }
    }
}

/// All tiers of a platform resolver failed
#[derive(Debug, Clone, Error)]
#[error("{platform} resolution failed: {reason}")]
pub struct ResolutionError {
    pub platform: Platform,
    pub reason: String,
}

/// Failure of a single tier (logged, never surfaced on its own)
#[derive(Debug, Error)]
pub enum TierError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Unsupported link: {0}")]
    Unsupported(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type TierResult<T> = std::result::Result<T, TierError>;

/// One way of listing the tracks behind a platform URL
#[async_trait]
pub trait TierStrategy: Send + Sync {
    /// Name for logging (e.g., "web-api", "embed-scrape")
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>>;
}

/// Uniform platform resolver contract
#[async_trait]
pub trait PlatformResolver: Send + Sync {
    fn platform(&self) -> Platform;

    async fn resolve(&self, url: &str) -> Result<Vec<TrackPair>, ResolutionError>;
}

/// Ordered tier cascade for one platform
pub struct CascadeResolver {
    platform: Platform,
    tiers: Vec<Box<dyn TierStrategy>>,
}

impl CascadeResolver {
    pub fn new(platform: Platform, tiers: Vec<Box<dyn TierStrategy>>) -> Self {
        Self { platform, tiers }
    }
}

#[async_trait]
impl PlatformResolver for CascadeResolver {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn resolve(&self, url: &str) -> Result<Vec<TrackPair>, ResolutionError> {
        let mut reasons = Vec::with_capacity(self.tiers.len());

        for tier in &self.tiers {
            match tier.fetch(url).await {
                Ok(tracks) if !tracks.is_empty() => {
                    info!(
                        platform = %self.platform,
                        tier = tier.name(),
                        tracks = tracks.len(),
                        "Platform link resolved"
                    );
                    return Ok(tracks);
                }
                Ok(_) => {
                    warn!(platform = %self.platform, tier = tier.name(), "Tier returned no tracks");
                    reasons.push(format!("{}: no tracks", tier.name()));
                }
                Err(e) => {
                    warn!(platform = %self.platform, tier = tier.name(), error = %e, "Tier failed");
                    reasons.push(format!("{}: {}", tier.name(), e));
                }
            }
        }

        Err(ResolutionError {
            platform: self.platform,
            reason: if reasons.is_empty() {
                "no strategies configured".to_string()
            } else {
                reasons.join("; ")
            },
        })
    }
}

/// Platform resolvers keyed by platform
#[derive(Default)]
pub struct PlatformRegistry {
    resolvers: HashMap<Platform, Arc<dyn PlatformResolver>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in platform
    pub fn standard(config: &TomlConfig, fetcher: Arc<dyn PageFetcher>) -> TierResult<Self> {
        let client = Client::builder()
            .user_agent(config.resolver.user_agent.clone())
            .timeout(config.resolver.extraction_timeout())
            .build()?;
        let max_pages = config.resolver.max_pages.max(1);

        let mut registry = Self::new();
        registry.register(Arc::new(spotify::cascade(
            client.clone(),
            fetcher.clone(),
            config.spotify.clone(),
            max_pages,
        )));
        registry.register(Arc::new(deezer::cascade(client.clone(), fetcher.clone(), max_pages)));
        registry.register(Arc::new(apple_music::cascade(fetcher.clone())));
        registry.register(Arc::new(tidal::cascade(
            client,
            fetcher.clone(),
            config.tidal.clone(),
            max_pages,
        )));
        registry.register(Arc::new(amazon_music::cascade(fetcher)));
        Ok(registry)
    }

    pub fn register(&mut self, resolver: Arc<dyn PlatformResolver>) {
        self.resolvers.insert(resolver.platform(), resolver);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformResolver>> {
        self.resolvers.get(&platform).cloned()
    }

    pub async fn resolve(
        &self,
        platform: Platform,
        url: &str,
    ) -> Result<Vec<TrackPair>, ResolutionError> {
        match self.get(platform) {
            Some(resolver) => resolver.resolve(url).await,
            None => Err(ResolutionError {
                platform,
                reason: "no resolver registered".to_string(),
            }),
        }
    }
}

/// One page of a paginated collection
pub struct Page {
    pub tracks: Vec<TrackPair>,
    /// Continuation cursor (next page URL), `None` on the last page
    pub next: Option<String>,
}

/// Follow continuation cursors from `first` until exhaustion or `max_pages`
///
/// All pages are accumulated before returning; an error on any page fails
/// the whole tier.
pub async fn collect_pages<F, Fut>(
    first: String,
    max_pages: usize,
    mut fetch_page: F,
) -> TierResult<Vec<TrackPair>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = TierResult<Page>>,
{
    let mut tracks = Vec::new();
    let mut cursor = Some(first);
    let mut pages = 0;

    while let Some(url) = cursor.take() {
        if pages >= max_pages {
            warn!(pages, "Page cap reached, collection truncated");
            break;
        }
        let page = fetch_page(url).await?;
        pages += 1;
        tracks.extend(page.tracks);
        cursor = page.next;
    }

    debug!(pages, tracks = tracks.len(), "Collection pages collected");
    Ok(tracks)
}

pub(crate) type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Direct (un-keyed) limiter allowing `per_second` requests
pub(crate) fn api_limiter(per_second: u32) -> DirectLimiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Reject non-success responses before decoding
pub(crate) fn check_status(response: reqwest::Response) -> TierResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TierError::Status(status.as_u16()))
    }
}
