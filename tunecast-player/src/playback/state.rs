//! Per-context player state
//!
//! Every context owns exactly one [`PlayerState`] behind its
//! [`ContextHandle`]. The drive loop and command handlers both go through
//! the handle's async mutex, one writer at a time.

use super::filters::FilterChain;
use super::queue::{PlaybackQueue, QueueItem};
use crate::media::ResolvedTrack;
use crate::transport::VoiceHandle;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tunecast_common::events::PlaybackPhase;
use tunecast_common::ContextId;

#[derive(Default)]
pub struct PlayerState {
    pub phase: PlaybackPhase,
    pub queue: PlaybackQueue,

    /// Item being resolved or played
    pub current_item: Option<QueueItem>,
    pub current_track: Option<ResolvedTrack>,

    pub voice: Option<Arc<dyn VoiceHandle>>,

    /// Drive loop of this context; at most one at a time
    pub playback_task: Option<JoinHandle<()>>,

    pub loop_enabled: bool,
    pub autoplay_enabled: bool,
    pub last_enqueued_was_single: bool,

    pub filters: FilterChain,

    /// Position the current track was started at
    pub playback_start_offset_secs: f64,
    pub playback_started_at: Option<Instant>,
    /// Set while paused; paused time does not count as elapsed
    pub paused_at: Option<Instant>,

    /// Restart the current track at this offset when it stops
    pub pending_seek_secs: Option<f64>,
    /// The pending seek was requested while paused; the restart stays paused
    pub restart_paused: bool,

    /// Most recent item that completed normally (autoplay seed)
    pub last_completed: Option<QueueItem>,

    /// Cancelled when the context is stopped; every in-flight command and
    /// the drive loop hold a clone or child of it
    pub session: CancellationToken,
}

impl PlayerState {
    pub fn active_filter_chain(&self) -> Option<String> {
        self.filters.to_chain_string()
    }

    /// Position in the current track at `now`, in seconds
    pub fn elapsed_secs(&self, now: Instant) -> f64 {
        let Some(started) = self.playback_started_at else {
            return self.playback_start_offset_secs;
        };
        let until = self.paused_at.unwrap_or(now);
        until.saturating_duration_since(started).as_secs_f64() + self.playback_start_offset_secs
    }

    /// Record the start of a track at `offset_secs`
    pub fn mark_started(&mut self, now: Instant, offset_secs: f64) {
        self.playback_start_offset_secs = offset_secs;
        self.playback_started_at = Some(now);
        self.paused_at = None;
    }

    pub fn mark_paused(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Shift the start time by the paused duration
    pub fn mark_resumed(&mut self, now: Instant) {
        if let (Some(paused), Some(started)) = (self.paused_at.take(), self.playback_started_at) {
            self.playback_started_at = Some(started + now.saturating_duration_since(paused));
        }
    }

    pub fn clear_current(&mut self) {
        self.current_item = None;
        self.current_track = None;
        self.playback_started_at = None;
        self.paused_at = None;
        self.playback_start_offset_secs = 0.0;
        self.pending_seek_secs = None;
        self.restart_paused = false;
    }

    pub fn has_running_task(&self) -> bool {
        self.playback_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

/// Context-scoped access to one [`PlayerState`]
pub struct ContextHandle {
    pub id: ContextId,
    pub state: Mutex<PlayerState>,
}

impl ContextHandle {
    pub fn new(id: ContextId) -> Self {
        Self {
            id,
            state: Mutex::new(PlayerState::default()),
        }
    }
}
