//! Batch resolution coordinator
//!
//! Resolves the (title, artist) pairs of a catalog collection into playable
//! references, one chunk at a time. All pairs of a chunk are resolved
//! concurrently and the whole chunk completes before the next one starts.
//! Successful resolutions are handed to the [`BatchObserver`] as they come
//! in (in collection order), so playback can begin before the batch ends.

use crate::cache::{CacheLookup, ResolutionCache};
use crate::media::{GenericMediaResolver, TrackRef};
use crate::sources::TrackPair;
use crate::{Error, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunecast_common::config::BatchConfig;

/// Receiver of streamed batch results
#[async_trait]
pub trait BatchObserver: Send + Sync {
    /// A pair resolved; called in collection order
    async fn on_resolved(&self, track: TrackRef);

    /// `processed` of `total` pairs attempted so far
    async fn on_progress(&self, processed: usize, total: usize);
}

/// Summary of a finished batch with at least one success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Descriptors of the first failures, capped
    pub failures: Vec<String>,
}

/// Resolves one pair, consulting the shared cache first
#[derive(Clone)]
pub struct PairResolver {
    cache: Arc<ResolutionCache>,
    media: Arc<GenericMediaResolver>,
}

impl PairResolver {
    pub fn new(cache: Arc<ResolutionCache>, media: Arc<GenericMediaResolver>) -> Self {
        Self { cache, media }
    }

    /// `None` when the pair is unresolvable
    ///
    /// Permanent failures are cached as tombstones; transient ones are not,
    /// so the pair is retried the next time it is requested.
    pub async fn resolve(&self, pair: &TrackPair) -> Option<TrackRef> {
        let key = pair.cache_key();

        match self.cache.get(&key) {
            CacheLookup::Found(track) => return Some(track),
            CacheLookup::NotFound => {
                debug!(pair = %pair, "Cached as unresolvable");
                return None;
            }
            CacheLookup::Absent => {}
        }

        match self.media.search_pair(&pair.title, &pair.artist).await {
            Ok(track) => {
                self.cache.put(&key, Some(track.clone()));
                Some(track)
            }
            Err(e) => {
                debug!(pair = %pair, error = %e, "Pair resolution failed");
                if !e.is_transient() {
                    self.cache.put(&key, None);
                }
                None
            }
        }
    }
}

pub struct BatchCoordinator {
    resolver: PairResolver,
    chunk_size: usize,
    failure_sample_cap: usize,
    progress_interval: usize,
    chunk_delay: Duration,
}

impl BatchCoordinator {
    pub fn new(resolver: PairResolver, config: &BatchConfig) -> Self {
        Self {
            resolver,
            chunk_size: config.chunk_size.max(1),
            failure_sample_cap: config.failure_sample_cap,
            progress_interval: config.progress_interval.max(1),
            chunk_delay: config.chunk_delay(),
        }
    }

    /// Resolve `pairs`, streaming successes to `observer`
    ///
    /// Returns [`Error::BatchExhausted`] when nothing resolved and
    /// [`Error::Cancelled`] when `cancel` fires first. A cancelled batch
    /// makes no further observer calls.
    pub async fn run(
        &self,
        pairs: Vec<TrackPair>,
        observer: &dyn BatchObserver,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let total = pairs.len();
        let mut processed = 0;
        let mut succeeded = 0;
        let mut failed = 0;
        let mut failures = Vec::with_capacity(self.failure_sample_cap);

        info!(total, chunk_size = self.chunk_size, "Batch resolution started");

        let chunk_count = total.div_ceil(self.chunk_size);
        for (chunk_index, chunk) in pairs.chunks(self.chunk_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let pending: Vec<_> = chunk
                .iter()
                .map(|pair| async move { (pair, self.resolver.resolve(pair).await) }.boxed())
                .collect();
            let mut results = stream::iter(pending).buffered(chunk.len());

            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    next = results.next() => next,
                };
                let Some((pair, outcome)) = next else {
                    break;
                };

                processed += 1;
                match outcome {
                    Some(track) => {
                        succeeded += 1;
                        observer.on_resolved(track).await;
                    }
                    None => {
                        failed += 1;
                        if failures.len() < self.failure_sample_cap {
                            failures.push(pair.to_string());
                        }
                    }
                }

                if processed % self.progress_interval == 0 || processed == total {
                    info!(progress = format!("{}/{}", processed, total), "Batch progress");
                    observer.on_progress(processed, total).await;
                }
            }

            let last_chunk = chunk_index + 1 == chunk_count;
            if !last_chunk && !self.chunk_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(self.chunk_delay) => {}
                }
            }
        }

        if succeeded == 0 {
            warn!(total, "Batch resolved no tracks");
            return Err(Error::BatchExhausted { failed, failures });
        }

        info!(total, succeeded, failed, "Batch resolution completed");
        Ok(BatchReport {
            total,
            succeeded,
            failed,
            failures,
        })
    }
}
