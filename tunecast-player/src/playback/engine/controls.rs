//! Playback controls and status accessors

use super::core::PlaybackEngine;
use crate::error::{Error, Result};
use crate::playback::filters::{AudioFilter, FilterChain};
use crate::playback::queue::QueueItem;
use serde::Serialize;
use tracing::info;
use tunecast_common::events::{PlaybackPhase, QueueChangeTrigger};
use tunecast_common::ContextId;

/// Current track and position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub title: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub elapsed_secs: f64,
    pub duration_secs: Option<f64>,
    pub paused: bool,
}

/// Point-in-time view of a context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub phase: PlaybackPhase,
    pub queue_len: usize,
    pub loop_enabled: bool,
    pub autoplay_enabled: bool,
    pub last_enqueued_was_single: bool,
    pub filters: Vec<String>,
    pub connected: bool,
}

impl PlaybackEngine {
    pub async fn pause(&self, context: ContextId) -> Result<()> {
        let handle = self.existing_context(context).ok_or(Error::NothingPlaying)?;
        let mut state = handle.state.lock().await;
        if state.phase != PlaybackPhase::Playing {
            return Err(Error::InvalidState(format!("cannot pause while {:?}", state.phase)));
        }
        let voice = state.voice.clone().ok_or(Error::NothingPlaying)?;

        voice.pause().await;
        state.mark_paused(self.shared.clock.now());
        self.set_phase(context, &mut state, PlaybackPhase::Paused);
        Ok(())
    }

    pub async fn resume(&self, context: ContextId) -> Result<()> {
        let handle = self.existing_context(context).ok_or(Error::NothingPlaying)?;
        let mut state = handle.state.lock().await;
        if state.phase != PlaybackPhase::Paused {
            return Err(Error::InvalidState(format!("cannot resume while {:?}", state.phase)));
        }
        let voice = state.voice.clone().ok_or(Error::NothingPlaying)?;

        voice.resume().await;
        state.mark_resumed(self.shared.clock.now());
        self.set_phase(context, &mut state, PlaybackPhase::Playing);
        Ok(())
    }

    /// Stop the current track; the drive loop advances as on completion
    pub async fn skip(&self, context: ContextId) -> Result<()> {
        let handle = self.existing_context(context).ok_or(Error::NothingPlaying)?;
        let mut state = handle.state.lock().await;
        if !state.phase.has_current_track() {
            return Err(Error::NothingPlaying);
        }
        let voice = state.voice.clone().ok_or(Error::NothingPlaying)?;

        state.pending_seek_secs = None;
        info!(context = %context, "Skipping current track");
        voice.stop().await;
        Ok(())
    }

    /// Toggle one filter; returns whether it is now active
    pub async fn toggle_filter(&self, context: ContextId, filter: AudioFilter) -> Result<bool> {
        let handle = self.context(context);
        let mut chain = handle.state.lock().await.filters.clone();
        let active = chain.toggle(filter);
        self.set_filters(context, chain).await?;
        Ok(active)
    }

    /// Replace the active filter chain
    ///
    /// In-flight audio cannot be re-filtered: when a track is loaded, its
    /// elapsed position is stored as a pending seek and the track is
    /// stopped so the drive loop restarts it there with the new chain. A
    /// paused track is restarted paused.
    pub async fn set_filters(&self, context: ContextId, filters: FilterChain) -> Result<()> {
        let handle = self.context(context);
        let mut state = handle.state.lock().await;
        if state.filters == filters {
            return Ok(());
        }
        state.filters = filters;

        // Nothing loaded: the next play call picks up the new chain.
        if !state.phase.has_current_track() {
            return Ok(());
        }
        let Some(voice) = state.voice.clone() else {
            return Ok(());
        };

        let elapsed = state.elapsed_secs(self.shared.clock.now());
        state.pending_seek_secs = Some(elapsed);
        state.restart_paused = state.phase == PlaybackPhase::Paused;
        info!(
            context = %context,
            elapsed_secs = elapsed,
            chain = ?state.active_filter_chain(),
            "Filters changed, restarting at elapsed offset"
        );
        voice.stop().await;
        Ok(())
    }

    pub async fn filters(&self, context: ContextId) -> FilterChain {
        self.context(context).state.lock().await.filters.clone()
    }

    pub async fn set_loop(&self, context: ContextId, enabled: bool) {
        self.context(context).state.lock().await.loop_enabled = enabled;
        info!(context = %context, enabled, "Loop mode");
    }

    pub async fn set_autoplay(&self, context: ContextId, enabled: bool) {
        self.context(context).state.lock().await.autoplay_enabled = enabled;
        info!(context = %context, enabled, "Autoplay");
    }

    pub async fn shuffle(&self, context: ContextId) -> usize {
        let handle = self.context(context);
        let mut state = handle.state.lock().await;
        state.queue.shuffle();
        let len = state.queue.len();
        self.emit_queue_changed(context, len, QueueChangeTrigger::Shuffle);
        len
    }

    /// Drop every pending item; the current track keeps playing
    pub async fn clear_queue(&self, context: ContextId) -> usize {
        let handle = self.context(context);
        let mut state = handle.state.lock().await;
        let removed = state.queue.clear();
        self.emit_queue_changed(context, 0, QueueChangeTrigger::Clear);
        removed
    }

    pub async fn queue_preview(&self, context: ContextId, n: usize) -> Vec<QueueItem> {
        self.context(context).state.lock().await.queue.peek(n)
    }

    pub async fn queue_len(&self, context: ContextId) -> usize {
        self.context(context).state.lock().await.queue.len()
    }

    pub async fn now_playing(&self, context: ContextId) -> Option<NowPlaying> {
        let handle = self.existing_context(context)?;
        let state = handle.state.lock().await;
        if !state.phase.has_current_track() {
            return None;
        }
        let track = state.current_track.as_ref()?;
        Some(NowPlaying {
            title: track.title.clone(),
            url: track.canonical_url.clone(),
            thumbnail_url: track.thumbnail_url.clone(),
            elapsed_secs: state.elapsed_secs(self.shared.clock.now()),
            duration_secs: track.duration_secs,
            paused: state.phase == PlaybackPhase::Paused,
        })
    }

    pub async fn phase(&self, context: ContextId) -> PlaybackPhase {
        match self.existing_context(context) {
            Some(handle) => handle.state.lock().await.phase,
            None => PlaybackPhase::Idle,
        }
    }

    pub async fn status(&self, context: ContextId) -> StatusSnapshot {
        let handle = self.context(context);
        let state = handle.state.lock().await;
        StatusSnapshot {
            phase: state.phase,
            queue_len: state.queue.len(),
            loop_enabled: state.loop_enabled,
            autoplay_enabled: state.autoplay_enabled,
            last_enqueued_was_single: state.last_enqueued_was_single,
            filters: state.filters.iter().map(|f| f.name().to_string()).collect(),
            connected: state.voice.is_some(),
        }
    }
}
