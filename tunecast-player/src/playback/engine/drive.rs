//! Per-context drive loop
//!
//! Resolves the next item's stream, hands it to the transport, waits for
//! the completion signal and advances. After each completion the advance
//! checks, in order: a pending seek (restart the same item at the stored
//! offset), loop mode (put the item back in front), and plain dequeue.
//!
//! The context lock is only held for short critical sections. The cancel
//! token is checked after every lock acquisition; once a stop cancelled
//! it, the loop makes no further queue or transport calls.

use super::core::{cancellable, PlaybackEngine};
use crate::announce::keys;
use crate::playback::queue::QueueItem;
use crate::playback::state::{ContextHandle, PlayerState};
use crate::transport::{CompletionSignal, TransportOptions};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tunecast_common::events::{PlaybackPhase, QueueChangeTrigger, TunecastEvent};

/// How the previous track ended
enum Finished {
    Completed(QueueItem),
    Failed,
}

/// Next thing to play
struct Step {
    item: QueueItem,
    offset_secs: f64,
    restarted: bool,
}

impl PlaybackEngine {
    pub(super) async fn drive(&self, handle: Arc<ContextHandle>, token: CancellationToken) {
        let context = handle.id;
        let mut finished: Option<Finished> = None;
        debug!(context = %context, "Drive loop started");

        loop {
            let (step, autoplay_seed) = {
                let mut state = handle.state.lock().await;
                if token.is_cancelled() {
                    return;
                }
                let had_finished = finished.is_some();
                match self.advance(&handle, &mut state, finished.take()) {
                    Some(step) => (Some(step), None),
                    None => {
                        let seed = if had_finished { autoplay_seed(&state) } else { None };
                        if seed.is_none() {
                            self.go_idle(&handle, &mut state);
                            drop(state);
                            self.shared
                                .announcer
                                .announce(context, keys::QUEUE_FINISHED, &[])
                                .await;
                            return;
                        }
                        self.set_phase(context, &mut state, PlaybackPhase::ResolvingCurrent);
                        (None, seed)
                    }
                }
            };

            let Some(step) = step else {
                if let Some(seed) = autoplay_seed {
                    if self.continue_autoplay(&handle, &token, &seed).await.is_err() {
                        return;
                    }
                }
                // Next iteration dequeues what autoplay added or goes idle.
                continue;
            };

            finished = match self.play_step(&handle, &token, step).await {
                Some(f) => Some(f),
                None => return,
            };
        }
    }

    /// Pick the next step after `finished`; `None` when the queue is empty
    fn advance(
        &self,
        handle: &ContextHandle,
        state: &mut PlayerState,
        finished: Option<Finished>,
    ) -> Option<Step> {
        match finished {
            Some(Finished::Completed(item)) => {
                if let Some(offset_secs) = state.pending_seek_secs.take() {
                    debug!(context = %handle.id, offset_secs, "Restarting current track");
                    self.set_phase(handle.id, state, PlaybackPhase::ResolvingCurrent);
                    return Some(Step {
                        item,
                        offset_secs,
                        restarted: true,
                    });
                }
                if state.loop_enabled {
                    state.queue.requeue_for_loop(&item);
                    self.emit_queue_changed(handle.id, state.queue.len(), QueueChangeTrigger::LoopRequeue);
                }
                state.last_completed = Some(item);
            }
            Some(Finished::Failed) => {
                // A failed item is neither looped nor restarted, and does
                // not seed autoplay.
                state.pending_seek_secs = None;
                state.last_completed = None;
            }
            None => {}
        }

        state.clear_current();
        let item = state.queue.dequeue()?;
        self.emit_queue_changed(handle.id, state.queue.len(), QueueChangeTrigger::Dequeue);
        self.set_phase(handle.id, state, PlaybackPhase::ResolvingCurrent);
        Some(Step {
            item,
            offset_secs: 0.0,
            restarted: false,
        })
    }

    /// Leave the drive loop; runs in the same critical section that found
    /// the queue empty
    fn go_idle(&self, handle: &ContextHandle, state: &mut PlayerState) {
        state.clear_current();
        state.playback_task = None;
        self.set_phase(handle.id, state, PlaybackPhase::Idle);
        info!(context = %handle.id, "Queue exhausted, drive loop idle");
    }

    /// Resolve, play and await one item
    ///
    /// Returns `None` when cancelled.
    async fn play_step(
        &self,
        handle: &Arc<ContextHandle>,
        token: &CancellationToken,
        step: Step,
    ) -> Option<Finished> {
        let context = handle.id;
        let Step {
            item,
            offset_secs,
            restarted,
        } = step;

        {
            let mut state = handle.state.lock().await;
            if token.is_cancelled() {
                return None;
            }
            state.current_item = Some(item.clone());
            self.set_phase(context, &mut state, PlaybackPhase::ResolvingCurrent);
        }

        let resolved = match cancellable(token, self.shared.media.resolve_stream(&item.source_reference)).await {
            Err(_) => return None,
            Ok(Ok(track)) => track,
            Ok(Err(e)) => {
                return self.fail_item(handle, token, item, e.to_string()).await;
            }
        };

        let (signal, completion) = CompletionSignal::channel();
        {
            let mut state = handle.state.lock().await;
            if token.is_cancelled() {
                return None;
            }
            let Some(voice) = state.voice.clone() else {
                drop(state);
                return self.fail_item(handle, token, item, "no voice session".to_string()).await;
            };
            let options = TransportOptions {
                filter_chain: state.active_filter_chain(),
                seek_secs: offset_secs,
            };

            if let Err(e) = voice.play(&resolved.stream_url, &options, signal).await {
                drop(state);
                return self.fail_item(handle, token, item, e.to_string()).await;
            }

            let now = self.shared.clock.now();
            state.mark_started(now, offset_secs);
            state.current_track = Some(resolved.clone());
            if restarted && std::mem::take(&mut state.restart_paused) {
                voice.pause().await;
                state.mark_paused(now);
                self.set_phase(context, &mut state, PlaybackPhase::Paused);
            } else {
                self.set_phase(context, &mut state, PlaybackPhase::Playing);
            }
        }

        info!(
            context = %context,
            title = %resolved.title,
            offset_secs,
            restarted,
            "Track started"
        );
        self.shared.events.emit_lossy(TunecastEvent::TrackStarted {
            context,
            title: resolved.title.clone(),
            url: resolved.canonical_url.clone(),
            offset_secs,
            restarted,
            timestamp: chrono::Utc::now(),
        });
        if !restarted && !item.suppress_now_playing {
            self.shared
                .announcer
                .announce(context, keys::NOW_PLAYING, &[("title", resolved.title.clone())])
                .await;
        }

        let outcome = match cancellable(token, completion).await {
            Err(_) => return None,
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err("transport dropped the completion signal".to_string()),
        };

        self.shared.events.emit_lossy(TunecastEvent::TrackFinished {
            context,
            url: item.source_reference.clone(),
            failed: outcome.is_err(),
            timestamp: chrono::Utc::now(),
        });

        match outcome {
            Ok(()) => Some(Finished::Completed(item)),
            Err(reason) => self.fail_item(handle, token, item, reason).await,
        }
    }

    /// Contain a playback error: log, notify, and advance past the item
    async fn fail_item(
        &self,
        handle: &ContextHandle,
        token: &CancellationToken,
        item: QueueItem,
        reason: String,
    ) -> Option<Finished> {
        if token.is_cancelled() {
            return None;
        }
        error!(
            context = %handle.id,
            url = %item.source_reference,
            reason = %reason,
            "Playback failed, advancing"
        );
        self.shared.events.emit_lossy(TunecastEvent::PlaybackFailed {
            context: handle.id,
            url: item.source_reference.clone(),
            reason: reason.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.shared
            .announcer
            .announce(
                handle.id,
                keys::PLAYBACK_ERROR,
                &[("title", item.title.clone()), ("reason", reason)],
            )
            .await;
        Some(Finished::Failed)
    }
}

/// Seed for autoplay: the last completed item, if it was a single track
fn autoplay_seed(state: &PlayerState) -> Option<QueueItem> {
    if !state.autoplay_enabled {
        return None;
    }
    match &state.last_completed {
        Some(item) if item.is_single_track => Some(item.clone()),
        Some(_) => {
            debug!("Last item came from a collection, autoplay skipped");
            None
        }
        None => {
            debug!("No completed track to seed autoplay");
            None
        }
    }
}
