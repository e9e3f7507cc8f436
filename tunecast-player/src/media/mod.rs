//! Media resolution
//!
//! The [`MediaProvider`] trait is the seam to the extraction backend
//! (yt-dlp by default). [`GenericMediaResolver`] builds direct-link,
//! playlist, search and related-track resolution on top of it.

mod resolver;
mod ytdlp;

pub use resolver::{GenericMediaResolver, LinkResolution, ResolvedTrack};
pub use ytdlp::YtDlpProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Options for one extraction call
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// List collection entries without resolving each one
    pub flat: bool,
    /// Never expand a link into its surrounding playlist
    pub single_item: bool,
    pub timeout: Duration,
}

impl ExtractOptions {
    /// Lightweight listing of a link or search
    pub fn flat(timeout: Duration) -> Self {
        Self {
            flat: true,
            single_item: false,
            timeout,
        }
    }

    /// Full resolution of exactly one item, including its stream URL
    pub fn single(timeout: Duration) -> Self {
        Self {
            flat: false,
            single_item: true,
            timeout,
        }
    }
}

/// Metadata returned by a provider for one reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub canonical_url: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Short-lived direct audio URL (deep extraction only)
    pub stream_url: Option<String>,
    pub duration_secs: Option<f64>,
    /// Present for playlists, channels, mixes and searches
    pub entries: Option<Vec<MediaEntry>>,
}

/// Flat collection entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaEntry {
    pub id: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub duration_secs: Option<f64>,
}

impl MediaEntry {
    /// Lightweight reference for queueing, if the entry has enough metadata
    pub fn to_track_ref(&self) -> Option<TrackRef> {
        let url = self.url.as_ref().filter(|u| !u.trim().is_empty())?;
        let title = self
            .title
            .as_ref()
            .filter(|t| !t.trim().is_empty())?;
        Some(TrackRef {
            title: title.clone(),
            url: url.clone(),
            thumbnail: None,
            duration_secs: self.duration_secs,
        })
    }
}

/// Resolvable reference to one track (no stream URL yet)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRef {
    pub title: String,
    /// Canonical page URL, resolvable by the provider
    pub url: String,
    pub thumbnail: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Provider failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    Timeout,
    Network,
    NotFound,
    Unavailable,
    Parse,
    /// Provider process could not run
    Process,
}

#[derive(Debug, Clone, Error)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Worth retrying with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            ExtractionErrorKind::Timeout | ExtractionErrorKind::Network
        )
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "extraction failed ({:?}): {}", self.kind, self.message)
    }
}

/// Media resolution backend
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Extract metadata for a URL or a provider search expression
    async fn extract(
        &self,
        reference: &str,
        options: &ExtractOptions,
    ) -> Result<MediaInfo, ExtractionError>;

    /// Provider search expression returning up to `limit` ranked candidates
    fn search_reference(&self, term: &str, limit: usize) -> String {
        format!("ytsearch{}:{}", limit, term)
    }
}
