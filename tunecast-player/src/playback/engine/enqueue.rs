//! Resolving user input onto the queue
//!
//! Input is classified (share links expanded first) and routed to a
//! catalog platform resolver plus the batch coordinator, or straight to
//! the generic media resolver. The voice session is connected once there
//! is something to play, and the drive loop is started if none is running.

use super::core::{cancellable, PlaybackEngine};
use crate::announce::keys;
use crate::batch::{BatchObserver, BatchReport};
use crate::classify::Classification;
use crate::error::{Error, Result};
use crate::media::{ExtractionError, ExtractionErrorKind, LinkResolution, TrackRef};
use crate::normalize::sanitize;
use crate::playback::queue::QueueItem;
use crate::playback::state::{ContextHandle, PlayerState};
use crate::sources::{canonicalize, TrackPair};
use crate::transport::VoiceEndpoint;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tunecast_common::events::{QueueChangeTrigger, TunecastEvent};
use tunecast_common::ContextId;
use uuid::Uuid;

/// Where new items go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    #[default]
    Back,
    /// Front of the queue; collections keep their relative order
    Next,
}

/// What a play request queued
#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Track { title: String, url: String },
    Collection { title: Option<String>, count: usize },
    Batch(BatchReport),
}

impl PlaybackEngine {
    /// Resolve `query` and queue the result on `context`
    pub async fn play(
        &self,
        context: ContextId,
        endpoint: &VoiceEndpoint,
        query: &str,
        placement: Placement,
    ) -> Result<PlayOutcome> {
        let query = sanitize(query);
        if query.is_empty() {
            return Err(Error::InvalidInput("empty query".to_string()));
        }

        // A stop between lookup and lock unregisters the handle; retry on
        // the fresh context.
        let (handle, session) = loop {
            let handle = self.context(context);
            let session = {
                let state = handle.state.lock().await;
                self.is_registered(&handle).then(|| state.session.clone())
            };
            if let Some(session) = session {
                break (handle, session);
            }
        };

        let result = self
            .play_inner(&handle, endpoint, &query, placement, &session)
            .await;
        if let Err(e) = &result {
            info!(context = %context, query = %query, error = %e, "Play request failed");
            if !session.is_cancelled() {
                self.settle(&handle).await;
            }
        }
        result
    }

    async fn play_inner(
        &self,
        handle: &Arc<ContextHandle>,
        endpoint: &VoiceEndpoint,
        query: &str,
        placement: Placement,
        session: &CancellationToken,
    ) -> Result<PlayOutcome> {
        let classification =
            cancellable(session, canonicalize(query, self.shared.fetcher.as_ref())).await??;

        match classification {
            Classification::Catalog { platform, url } => {
                let pairs =
                    cancellable(session, self.shared.platforms.resolve(platform, &url)).await??;
                self.queue_pairs(handle, endpoint, pairs, placement, session).await
            }
            Classification::Media { url, .. } => {
                match cancellable(session, self.shared.media.resolve_link(&url)).await?? {
                    LinkResolution::Single(track) => {
                        self.queue_single(handle, endpoint, track, placement, session).await
                    }
                    LinkResolution::Collection { title, tracks } => {
                        self.queue_collection(handle, endpoint, title, tracks, placement, session)
                            .await
                    }
                }
            }
            Classification::Search(term) => {
                let track = cancellable(session, self.shared.media.search(&term)).await??;
                self.queue_single(handle, endpoint, track, placement, session).await
            }
            Classification::ShareLink { url, .. } => {
                Err(Error::InvalidInput(format!("unresolved share link {}", url)))
            }
        }
    }

    async fn queue_pairs(
        &self,
        handle: &Arc<ContextHandle>,
        endpoint: &VoiceEndpoint,
        pairs: Vec<TrackPair>,
        placement: Placement,
        session: &CancellationToken,
    ) -> Result<PlayOutcome> {
        if let [pair] = pairs.as_slice() {
            let track = cancellable(session, self.shared.pairs.resolve(pair))
                .await?
                .ok_or_else(|| {
                    ExtractionError::new(
                        ExtractionErrorKind::NotFound,
                        format!("no result for '{}'", pair),
                    )
                })?;
            return self.queue_single(handle, endpoint, track, placement, session).await;
        }

        self.ensure_connected(handle, endpoint, session).await?;

        let feeder = QueueFeeder {
            engine: self.clone(),
            handle: handle.clone(),
            placement,
            last_inserted: Mutex::new(None),
            session: session.clone(),
        };
        {
            let mut state = handle.state.lock().await;
            state.last_enqueued_was_single = false;
        }

        match self.shared.batch.run(pairs, &feeder, session).await {
            Ok(report) => {
                let failures = if report.failures.is_empty() {
                    String::new()
                } else {
                    format!(": {}", report.failures.join(", "))
                };
                self.shared
                    .announcer
                    .announce(
                        handle.id,
                        keys::BATCH_SUMMARY,
                        &[
                            ("succeeded", report.succeeded.to_string()),
                            ("total", report.total.to_string()),
                            ("failed", report.failed.to_string()),
                            ("failures", failures),
                        ],
                    )
                    .await;
                Ok(PlayOutcome::Batch(report))
            }
            Err(Error::BatchExhausted { failed, failures }) => {
                warn!(context = %handle.id, failed, "No track of the collection resolved");
                self.shared
                    .announcer
                    .announce(handle.id, keys::BATCH_FAILED, &[("failed", failed.to_string())])
                    .await;
                Err(Error::BatchExhausted { failed, failures })
            }
            Err(e) => Err(e),
        }
    }

    async fn queue_single(
        &self,
        handle: &Arc<ContextHandle>,
        endpoint: &VoiceEndpoint,
        track: TrackRef,
        placement: Placement,
        session: &CancellationToken,
    ) -> Result<PlayOutcome> {
        self.ensure_connected(handle, endpoint, session).await?;

        let item = QueueItem::new(&track.url, &track.title, true);
        let was_busy = {
            let mut state = handle.state.lock().await;
            if session.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let was_busy = state.current_item.is_some();
            self.place(handle.id, &mut state, item, placement, 0);
            state.last_enqueued_was_single = true;
            self.kick(handle, &mut state);
            was_busy
        };

        if was_busy {
            self.shared
                .announcer
                .announce(handle.id, keys::TRACK_QUEUED, &[("title", track.title.clone())])
                .await;
        }
        Ok(PlayOutcome::Track {
            title: track.title,
            url: track.url,
        })
    }

    async fn queue_collection(
        &self,
        handle: &Arc<ContextHandle>,
        endpoint: &VoiceEndpoint,
        title: Option<String>,
        tracks: Vec<TrackRef>,
        placement: Placement,
        session: &CancellationToken,
    ) -> Result<PlayOutcome> {
        self.ensure_connected(handle, endpoint, session).await?;

        let count = tracks.len();
        {
            let mut state = handle.state.lock().await;
            if session.is_cancelled() {
                return Err(Error::Cancelled);
            }
            for (index, track) in tracks.into_iter().enumerate() {
                let item = QueueItem::new(track.url, track.title, false);
                self.place(handle.id, &mut state, item, placement, index);
            }
            state.last_enqueued_was_single = false;
            self.kick(handle, &mut state);
        }

        info!(context = %handle.id, count, "Collection queued");
        self.shared
            .announcer
            .announce(
                handle.id,
                keys::COLLECTION_QUEUED,
                &[
                    ("count", count.to_string()),
                    ("title", title.clone().unwrap_or_default()),
                ],
            )
            .await;
        Ok(PlayOutcome::Collection { title, count })
    }

    /// Put `item` on the queue; `index` is its position within a
    /// play-next group
    fn place(
        &self,
        context: ContextId,
        state: &mut PlayerState,
        item: QueueItem,
        placement: Placement,
        index: usize,
    ) {
        let trigger = match placement {
            Placement::Back => {
                state.queue.enqueue(item);
                QueueChangeTrigger::Enqueue
            }
            Placement::Next => {
                state.queue.insert(index, item);
                QueueChangeTrigger::PlayNext
            }
        };
        self.emit_queue_changed(context, state.queue.len(), trigger);
    }

    /// Start the drive loop unless one is running
    pub(super) fn kick(&self, handle: &Arc<ContextHandle>, state: &mut PlayerState) {
        if state.has_running_task() || state.voice.is_none() || state.queue.is_empty() {
            return;
        }
        let token = state.session.child_token();
        let engine = self.clone();
        let handle = handle.clone();
        state.playback_task = Some(tokio::spawn(async move {
            engine.drive(handle, token).await;
        }));
    }
}

/// Streams batch results onto the queue
struct QueueFeeder {
    engine: PlaybackEngine,
    handle: Arc<ContextHandle>,
    placement: Placement,
    /// Id of the item this batch placed last, for play-next grouping
    last_inserted: Mutex<Option<Uuid>>,
    session: CancellationToken,
}

#[async_trait]
impl BatchObserver for QueueFeeder {
    async fn on_resolved(&self, track: TrackRef) {
        let mut state = self.handle.state.lock().await;
        if self.session.is_cancelled() {
            return;
        }
        let item = QueueItem::new(track.url, track.title, false);
        let id = item.id;
        let mut last_inserted = self.last_inserted.lock().unwrap_or_else(|e| e.into_inner());
        // Right behind the previous item of this batch; at the front once
        // that one has been dequeued.
        let index = last_inserted
            .and_then(|last| state.queue.position(last))
            .map_or(0, |position| position + 1);
        self.engine
            .place(self.handle.id, &mut state, item, self.placement, index);
        *last_inserted = Some(id);
        drop(last_inserted);
        self.engine.kick(&self.handle, &mut state);
    }

    async fn on_progress(&self, processed: usize, total: usize) {
        self.engine
            .shared
            .events
            .emit_lossy(TunecastEvent::BatchProgress {
                context: self.handle.id,
                processed,
                total,
                timestamp: chrono::Utc::now(),
            });
        self.engine
            .shared
            .announcer
            .announce(
                self.handle.id,
                keys::BATCH_PROGRESS,
                &[("processed", processed.to_string()), ("total", total.to_string())],
            )
            .await;
    }
}
