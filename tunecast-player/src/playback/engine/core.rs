//! Core playback engine - construction, registry and lifecycle
//!
//! **Responsibilities:**
//! - PlaybackEngine struct definition and initialization
//! - Context registry (one `ContextHandle` per context, created on first use)
//! - Voice connection and explicit stop
//! - Phase transitions and event emission

use crate::announce::Announcer;
use crate::batch::{BatchCoordinator, PairResolver};
use crate::cache::ResolutionCache;
use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::media::GenericMediaResolver;
use crate::playback::state::{ContextHandle, PlayerState};
use crate::sources::{PageFetcher, PlatformRegistry};
use crate::transport::{VoiceEndpoint, VoiceTransport};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tunecast_common::config::TomlConfig;
use tunecast_common::events::{EventBus, PlaybackPhase, QueueChangeTrigger, TunecastEvent};
use tunecast_common::ContextId;

/// Collaborators the engine is assembled from
pub struct EngineParts {
    pub transport: Arc<dyn VoiceTransport>,
    pub media: Arc<GenericMediaResolver>,
    pub platforms: PlatformRegistry,
    pub fetcher: Arc<dyn PageFetcher>,
    pub cache: Arc<ResolutionCache>,
    pub announcer: Announcer,
    pub events: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
}

impl EngineParts {
    /// Parts with a fresh cache sized from `config`, silent announcements,
    /// a default event bus and the system clock
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        media: Arc<GenericMediaResolver>,
        platforms: PlatformRegistry,
        fetcher: Arc<dyn PageFetcher>,
        config: &TomlConfig,
    ) -> Self {
        Self {
            transport,
            media,
            platforms,
            fetcher,
            cache: Arc::new(ResolutionCache::new(
                config.cache.max_entries,
                config.cache.ttl(),
            )),
            announcer: Announcer::silent(),
            events: Arc::new(EventBus::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

pub(super) struct EngineShared {
    pub(super) contexts: Mutex<HashMap<ContextId, Arc<ContextHandle>>>,
    pub(super) transport: Arc<dyn VoiceTransport>,
    pub(super) media: Arc<GenericMediaResolver>,
    pub(super) platforms: PlatformRegistry,
    pub(super) fetcher: Arc<dyn PageFetcher>,
    pub(super) pairs: PairResolver,
    pub(super) batch: BatchCoordinator,
    pub(super) announcer: Announcer,
    pub(super) events: Arc<EventBus>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) related_limit: usize,
}

/// Multi-context playback engine
///
/// Cheap to clone; clones share the registry and collaborators.
#[derive(Clone)]
pub struct PlaybackEngine {
    pub(super) shared: Arc<EngineShared>,
}

impl PlaybackEngine {
    pub fn new(parts: EngineParts, config: &TomlConfig) -> Self {
        let pairs = PairResolver::new(parts.cache, parts.media.clone());
        let batch = BatchCoordinator::new(pairs.clone(), &config.batch);

        Self {
            shared: Arc::new(EngineShared {
                contexts: Mutex::new(HashMap::new()),
                transport: parts.transport,
                media: parts.media,
                platforms: parts.platforms,
                fetcher: parts.fetcher,
                pairs,
                batch,
                announcer: parts.announcer,
                events: parts.events,
                clock: parts.clock,
                related_limit: config.autoplay.related_limit,
            }),
        }
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.shared.events.clone()
    }

    /// Handle of `context`, created on first reference
    pub(super) fn context(&self, context: ContextId) -> Arc<ContextHandle> {
        self.registry()
            .entry(context)
            .or_insert_with(|| {
                debug!(context = %context, "Context created");
                Arc::new(ContextHandle::new(context))
            })
            .clone()
    }

    /// Contexts currently registered
    pub fn context_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<ContextId, Arc<ContextHandle>>> {
        self.shared
            .contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `handle` is still the registered handle of its context
    pub(super) fn is_registered(&self, handle: &Arc<ContextHandle>) -> bool {
        self.registry()
            .get(&handle.id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    /// Handle of `context` if it is registered
    pub(super) fn existing_context(&self, context: ContextId) -> Option<Arc<ContextHandle>> {
        self.registry().get(&context).cloned()
    }

    /// Establish the voice session if the context has none
    ///
    /// On failure the context returns to `Idle` and the error reaches the
    /// caller.
    pub(super) async fn ensure_connected(
        &self,
        handle: &ContextHandle,
        endpoint: &VoiceEndpoint,
        session: &CancellationToken,
    ) -> Result<()> {
        let mut state = handle.state.lock().await;
        if session.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if state.voice.is_some() {
            return Ok(());
        }

        self.set_phase(handle.id, &mut state, PlaybackPhase::Connecting);
        match self.shared.transport.connect(handle.id, endpoint).await {
            Ok(voice) => {
                info!(context = %handle.id, endpoint = %endpoint.0, "Voice session connected");
                state.voice = Some(voice);
                Ok(())
            }
            Err(e) => {
                warn!(context = %handle.id, error = %e, "Voice connection failed");
                self.set_phase(handle.id, &mut state, PlaybackPhase::Idle);
                Err(Error::ConnectionFailed(e.to_string()))
            }
        }
    }

    /// Stop `context`: cancel its drive loop, clear the queue, disconnect,
    /// and drop it from the registry
    ///
    /// The next reference creates a fresh context. Holders of the old
    /// handle only see its cancelled session.
    pub async fn stop(&self, context: ContextId) -> Result<()> {
        let Some(handle) = self.existing_context(context) else {
            return Ok(());
        };
        let mut state = handle.state.lock().await;

        state.session.cancel();
        if let Some(task) = state.playback_task.take() {
            task.abort();
        }

        let removed = state.queue.clear();
        if let Some(voice) = state.voice.take() {
            voice.stop().await;
            voice.disconnect().await;
        }

        self.emit_queue_changed(context, 0, QueueChangeTrigger::Stop);
        self.set_phase(context, &mut state, PlaybackPhase::Stopped);

        *state = PlayerState::default();
        state.session.cancel();
        self.set_phase(context, &mut state, PlaybackPhase::Idle);

        let remaining = {
            let mut contexts = self.registry();
            if contexts.get(&context).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                contexts.remove(&context);
            }
            contexts.len()
        };
        info!(context = %context, removed, contexts = remaining, "Context stopped");
        Ok(())
    }

    /// Leave `Connecting` when a command ends without starting playback
    pub(super) async fn settle(&self, handle: &ContextHandle) {
        let mut state = handle.state.lock().await;
        if state.phase == PlaybackPhase::Connecting && !state.has_running_task() {
            self.set_phase(handle.id, &mut state, PlaybackPhase::Idle);
        }
    }

    pub(super) fn set_phase(&self, context: ContextId, state: &mut PlayerState, phase: PlaybackPhase) {
        if state.phase == phase {
            return;
        }
        let old_phase = std::mem::replace(&mut state.phase, phase);
        debug!(context = %context, from = ?old_phase, to = ?phase, "Phase changed");
        self.shared.events.emit_lossy(TunecastEvent::PhaseChanged {
            context,
            old_phase,
            new_phase: phase,
            timestamp: chrono::Utc::now(),
        });
    }

    pub(super) fn emit_queue_changed(&self, context: ContextId, queue_len: usize, trigger: QueueChangeTrigger) {
        self.shared.events.emit_lossy(TunecastEvent::QueueChanged {
            context,
            queue_len,
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Run `fut` unless `token` fires first
pub(super) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        _ = token.cancelled() => Err(Error::Cancelled),
        value = fut => Ok(value),
    }
}
