//! Generic media resolver
//!
//! Resolves direct links and free-text searches through a [`MediaProvider`].
//! Collections are listed flat; stream URLs are resolved one item at a time
//! just before playback because they expire quickly.

use super::{ExtractOptions, ExtractionError, ExtractionErrorKind, MediaInfo, MediaProvider, TrackRef};
use crate::normalize::sanitize;
use crate::retry::{retry_with_backoff, RetryPolicy};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tunecast_common::config::ResolverConfig;

static YOUTUBE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]{11})")
        .expect("invalid youtube id pattern")
});

/// Outcome of resolving a direct link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkResolution {
    Single(TrackRef),
    Collection {
        title: Option<String>,
        tracks: Vec<TrackRef>,
    },
}

/// Fully resolved track, ready for the transport
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub title: String,
    pub canonical_url: String,
    pub thumbnail_url: Option<String>,
    pub stream_url: String,
    pub duration_secs: Option<f64>,
}

pub struct GenericMediaResolver {
    provider: Arc<dyn MediaProvider>,
    timeout: Duration,
    search_candidates: usize,
    retry: RetryPolicy,
}

impl GenericMediaResolver {
    pub fn new(provider: Arc<dyn MediaProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            timeout: config.extraction_timeout(),
            search_candidates: config.search_candidates.max(1),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve a direct link into one track or a flat collection
    pub async fn resolve_link(&self, url: &str) -> Result<LinkResolution, ExtractionError> {
        let info = self
            .extract_with_retry("link resolution", url, ExtractOptions::flat(self.timeout))
            .await?;

        if let Some(entries) = info.entries.as_ref().filter(|e| !e.is_empty()) {
            let tracks: Vec<TrackRef> = entries.iter().filter_map(|e| e.to_track_ref()).collect();
            let skipped = entries.len() - tracks.len();
            if skipped > 0 {
                debug!(url = %url, skipped, "Collection entries without url or title skipped");
            }
            if tracks.is_empty() {
                return Err(ExtractionError::new(
                    ExtractionErrorKind::NotFound,
                    format!("collection {} has no playable entries", url),
                ));
            }
            return Ok(LinkResolution::Collection {
                title: info.title.clone(),
                tracks,
            });
        }

        Ok(LinkResolution::Single(single_ref(&info, url)?))
    }

    /// Top-ranked playable candidate for a free-text term
    ///
    /// Candidates are tried in rank order; a candidate whose metadata cannot
    /// be resolved is skipped.
    pub async fn search(&self, term: &str) -> Result<TrackRef, ExtractionError> {
        let term = sanitize(term);
        if term.is_empty() {
            return Err(ExtractionError::new(
                ExtractionErrorKind::NotFound,
                "empty search term",
            ));
        }

        let reference = self.provider.search_reference(&term, self.search_candidates);
        let info = self
            .extract_with_retry("search", &reference, ExtractOptions::flat(self.timeout))
            .await?;

        for entry in info.entries.unwrap_or_default() {
            if let Some(track) = entry.to_track_ref() {
                return Ok(track);
            }

            // Flat listing lacked metadata; look the candidate up on its own.
            let Some(url) = entry.url.as_deref() else {
                continue;
            };
            match self
                .extract_with_retry("candidate metadata", url, ExtractOptions::single(self.timeout))
                .await
            {
                Ok(info) => match single_ref(&info, url) {
                    Ok(track) => return Ok(track),
                    Err(e) => debug!(url = %url, error = %e, "Skipping search candidate"),
                },
                Err(e) => debug!(url = %url, error = %e, "Skipping search candidate"),
            }
        }

        Err(ExtractionError::new(
            ExtractionErrorKind::NotFound,
            format!("no result for '{}'", term),
        ))
    }

    /// Search for a (title, artist) pair
    ///
    /// Falls back to the title alone, then to the artist alone.
    pub async fn search_pair(&self, title: &str, artist: &str) -> Result<TrackRef, ExtractionError> {
        let mut queries: Vec<String> = Vec::with_capacity(3);
        for candidate in [format!("{} {}", title, artist), title.to_string(), artist.to_string()] {
            let candidate = sanitize(&candidate);
            if !candidate.is_empty() && !queries.contains(&candidate) {
                queries.push(candidate);
            }
        }

        let mut last_error = ExtractionError::new(
            ExtractionErrorKind::NotFound,
            "empty title and artist",
        );
        for query in &queries {
            match self.search(query).await {
                Ok(track) => return Ok(track),
                Err(e) => {
                    debug!(query = %query, error = %e, "Search attempt failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Resolve the stream URL of one track just before playback
    pub async fn resolve_stream(&self, url: &str) -> Result<ResolvedTrack, ExtractionError> {
        let info = self
            .extract_with_retry("stream resolution", url, ExtractOptions::single(self.timeout))
            .await?;

        let stream_url = info.stream_url.clone().ok_or_else(|| {
            ExtractionError::new(
                ExtractionErrorKind::Unavailable,
                format!("no audio stream for {}", url),
            )
        })?;

        Ok(ResolvedTrack {
            title: info.title.clone().unwrap_or_else(|| url.to_string()),
            canonical_url: info.canonical_url.clone().unwrap_or_else(|| url.to_string()),
            thumbnail_url: info.thumbnail_url.clone(),
            stream_url,
            duration_secs: info.duration_secs,
        })
    }

    /// Related tracks for autoplay, derived from the platform's mix of `url`
    ///
    /// The seed track itself is excluded. Links without a recognisable video
    /// identifier yield no related tracks.
    pub async fn related(&self, url: &str, limit: usize) -> Result<Vec<TrackRef>, ExtractionError> {
        let Some(seed) = video_id(url) else {
            return Ok(Vec::new());
        };

        let mix = format!("https://www.youtube.com/watch?v={0}&list=RD{0}", seed);
        let info = self
            .extract_with_retry("related discovery", &mix, ExtractOptions::flat(self.timeout))
            .await?;

        let related = info
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter(|e| {
                let entry_id = e.id.clone().or_else(|| e.url.as_deref().and_then(video_id));
                entry_id.as_deref() != Some(seed.as_str())
            })
            .filter_map(|e| e.to_track_ref())
            .take(limit)
            .collect::<Vec<_>>();

        if related.is_empty() {
            warn!(seed = %seed, "Mix returned no related tracks");
        }
        Ok(related)
    }

    async fn extract_with_retry(
        &self,
        operation: &str,
        reference: &str,
        options: ExtractOptions,
    ) -> Result<MediaInfo, ExtractionError> {
        retry_with_backoff(operation, self.retry, || {
            self.provider.extract(reference, &options)
        })
        .await
    }
}

/// Video identifier of a YouTube-style link
pub fn video_id(url: &str) -> Option<String> {
    YOUTUBE_ID.captures(url).map(|c| c[1].to_string())
}

fn single_ref(info: &MediaInfo, requested: &str) -> Result<TrackRef, ExtractionError> {
    let title = info
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            ExtractionError::new(
                ExtractionErrorKind::Parse,
                format!("no title for {}", requested),
            )
        })?;

    Ok(TrackRef {
        title,
        url: info
            .canonical_url
            .clone()
            .unwrap_or_else(|| requested.to_string()),
        thumbnail: info.thumbnail_url.clone(),
        duration_secs: info.duration_secs,
    })
}
