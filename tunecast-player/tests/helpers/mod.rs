//! Shared fakes for engine and batch integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tunecast_common::config::TomlConfig;
use tunecast_common::ContextId;
use tunecast_player::announce::{AnnouncementSink, Announcer, TemplateCatalog};
use tunecast_player::clock::ManualClock;
use tunecast_player::media::{
    ExtractOptions, ExtractionError, ExtractionErrorKind, GenericMediaResolver, MediaEntry,
    MediaInfo, MediaProvider,
};
use tunecast_player::retry::RetryPolicy;
use tunecast_player::sources::{
    FetchedPage, PageFetcher, Platform, PlatformRegistry, PlatformResolver, ResolutionError,
    TierError, TierResult, TrackPair,
};
use tunecast_player::transport::{
    CompletionSignal, TransportError, TransportOptions, VoiceEndpoint, VoiceHandle, VoiceTransport,
};
use tunecast_player::{EngineParts, PlaybackEngine};

pub const CONTEXT: ContextId = ContextId(1);

pub fn endpoint() -> VoiceEndpoint {
    VoiceEndpoint::new("voice-1")
}

/// YouTube-style link with an 11 character id
pub fn video_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}

pub fn stream_of(url: &str) -> String {
    format!("{}#stream", url)
}

/// Poll `condition` until it holds, panicking after two seconds
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition().await {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ========================================
// Media provider
// ========================================

/// Holds one search call until released
#[derive(Default)]
pub struct Gate {
    reached: Notify,
    released: Notify,
}

impl Gate {
    /// Wait until the held call has started
    pub async fn reached(&self) {
        tokio::time::timeout(Duration::from_secs(2), self.reached.notified())
            .await
            .expect("held call never started");
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

/// In-memory provider keyed by reference
#[derive(Default)]
pub struct FakeProvider {
    infos: Mutex<HashMap<String, MediaInfo>>,
    searches: Mutex<HashMap<String, Vec<MediaEntry>>>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, Arc<Gate>>>,
    panicking_streams: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    finished: AtomicUsize,
    /// Each call with the number of calls finished before it started
    starts: Mutex<Vec<(String, usize)>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a playable track
    pub fn add_track(&self, url: &str, title: &str) {
        self.add_info(
            url,
            MediaInfo {
                title: Some(title.to_string()),
                canonical_url: Some(url.to_string()),
                stream_url: Some(stream_of(url)),
                duration_secs: Some(180.0),
                ..Default::default()
            },
        );
    }

    /// Register a track whose stream cannot be extracted
    pub fn add_unplayable(&self, url: &str, title: &str) {
        self.add_info(
            url,
            MediaInfo {
                title: Some(title.to_string()),
                canonical_url: Some(url.to_string()),
                ..Default::default()
            },
        );
    }

    /// Register a collection of `(url, title)` entries, each playable
    pub fn add_collection(&self, url: &str, title: &str, tracks: &[(String, String)]) {
        for (track_url, track_title) in tracks {
            self.add_track(track_url, track_title);
        }
        self.add_info(
            url,
            MediaInfo {
                title: Some(title.to_string()),
                entries: Some(tracks.iter().map(|(u, t)| entry(u, t)).collect()),
                ..Default::default()
            },
        );
    }

    pub fn add_info(&self, reference: &str, info: MediaInfo) {
        self.infos.lock().unwrap().insert(reference.to_string(), info);
    }

    /// Search term resolving to one playable track
    pub fn add_search(&self, term: &str, url: &str, title: &str) {
        self.add_track(url, title);
        self.searches
            .lock()
            .unwrap()
            .insert(term.to_string(), vec![entry(url, title)]);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Hold the next search for `term` until the returned gate is released
    pub fn hold_search(&self, term: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(term.to_string(), gate.clone());
        gate
    }

    /// Panic when the stream of `url` is resolved
    pub fn panic_on_stream(&self, url: &str) {
        self.panicking_streams.lock().unwrap().insert(url.to_string());
    }

    /// Make every call take `delay`
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Most calls ever in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> Vec<(String, usize)> {
        self.starts.lock().unwrap().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub fn entry(url: &str, title: &str) -> MediaEntry {
    MediaEntry {
        url: Some(url.to_string()),
        title: Some(title.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    async fn extract(
        &self,
        reference: &str,
        options: &ExtractOptions,
    ) -> Result<MediaInfo, ExtractionError> {
        self.calls.lock().unwrap().push(reference.to_string());
        let finished_before = self.finished.load(Ordering::SeqCst);
        self.starts
            .lock()
            .unwrap()
            .push((reference.to_string(), finished_before));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.lookup(reference, options).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

impl FakeProvider {
    async fn lookup(
        &self,
        reference: &str,
        options: &ExtractOptions,
    ) -> Result<MediaInfo, ExtractionError> {
        if let Some(expression) = reference.strip_prefix("ytsearch") {
            let term = expression.split_once(':').map(|(_, t)| t).unwrap_or_default();
            let gate = self.gates.lock().unwrap().remove(term);
            if let Some(gate) = gate {
                gate.reached.notify_one();
                gate.released.notified().await;
            }
            let entries = self.searches.lock().unwrap().get(term).cloned().unwrap_or_default();
            return Ok(MediaInfo {
                entries: Some(entries),
                ..Default::default()
            });
        }

        let panics = options.single_item && self.panicking_streams.lock().unwrap().contains(reference);
        if panics {
            panic!("stream extraction crashed for {}", reference);
        }

        self.infos
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| ExtractionError::new(ExtractionErrorKind::NotFound, reference))
    }
}

pub fn media_resolver(provider: Arc<FakeProvider>, config: &TomlConfig) -> Arc<GenericMediaResolver> {
    Arc::new(GenericMediaResolver::new(provider, &config.resolver).with_retry(RetryPolicy::none()))
}

// ========================================
// Voice transport
// ========================================

#[derive(Debug, Clone, PartialEq)]
pub struct PlayCall {
    pub stream_url: String,
    pub options: TransportOptions,
}

#[derive(Default)]
pub struct FakeVoice {
    plays: Mutex<Vec<PlayCall>>,
    pending: Mutex<Option<CompletionSignal>>,
    paused: AtomicBool,
    disconnected: AtomicBool,
}

impl FakeVoice {
    pub fn plays(&self) -> Vec<PlayCall> {
        self.plays.lock().unwrap().clone()
    }

    pub fn play_count(&self) -> usize {
        self.plays.lock().unwrap().len()
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.plays().into_iter().map(|p| p.stream_url).collect()
    }

    /// Report the current track as finished; false when nothing is loaded
    pub fn finish_current(&self) -> bool {
        match self.pending.lock().unwrap().take() {
            Some(signal) => {
                signal.complete();
                true
            }
            None => false,
        }
    }

    pub fn fail_current(&self, reason: &str) -> bool {
        match self.pending.lock().unwrap().take() {
            Some(signal) => {
                signal.fail(reason);
                true
            }
            None => false,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceHandle for FakeVoice {
    async fn play(
        &self,
        stream_url: &str,
        options: &TransportOptions,
        on_complete: CompletionSignal,
    ) -> Result<(), TransportError> {
        if self.is_disconnected() {
            return Err(TransportError::Closed);
        }
        // Signal first so a test that observed the call can finish it.
        *self.pending.lock().unwrap() = Some(on_complete);
        self.paused.store(false, Ordering::SeqCst);
        self.plays.lock().unwrap().push(PlayCall {
            stream_url: stream_url.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    async fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    async fn stop(&self) {
        self.finish_current();
    }

    fn is_playing(&self) -> bool {
        self.pending.lock().unwrap().is_some() && !self.is_paused()
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeTransport {
    sessions: Mutex<Vec<Arc<FakeVoice>>>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Most recently connected session
    pub fn voice(&self) -> Arc<FakeVoice> {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no voice session connected")
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn connect(
        &self,
        _context: ContextId,
        endpoint: &VoiceEndpoint,
    ) -> Result<Arc<dyn VoiceHandle>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!("{} unreachable", endpoint.0)));
        }
        let voice = Arc::new(FakeVoice::default());
        self.sessions.lock().unwrap().push(voice.clone());
        Ok(voice)
    }
}

// ========================================
// Announcements, pages and platforms
// ========================================

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(ContextId, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }
}

#[async_trait]
impl AnnouncementSink for RecordingSink {
    async fn send(&self, context: ContextId, message: String) {
        self.messages.lock().unwrap().push((context, message));
    }
}

/// Fetcher for tests that never follow share links
pub struct OfflineFetcher;

#[async_trait]
impl PageFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> TierResult<FetchedPage> {
        Err(TierError::Unsupported(url.to_string()))
    }
}

/// Platform resolver returning canned pairs per URL
pub struct CannedPlatform {
    pub platform: Platform,
    pub links: HashMap<String, Vec<TrackPair>>,
}

#[async_trait]
impl PlatformResolver for CannedPlatform {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn resolve(&self, url: &str) -> Result<Vec<TrackPair>, ResolutionError> {
        self.links.get(url).cloned().ok_or_else(|| ResolutionError {
            platform: self.platform,
            reason: "unknown link".to_string(),
        })
    }
}

// ========================================
// Engine harness
// ========================================

pub fn test_config() -> TomlConfig {
    let mut config = TomlConfig::default();
    config.batch.chunk_delay_ms = 0;
    config
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub provider: Arc<FakeProvider>,
    pub transport: Arc<FakeTransport>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_platforms(PlatformRegistry::new())
    }

    pub fn with_platforms(platforms: PlatformRegistry) -> Self {
        let config = test_config();
        let provider = FakeProvider::new();
        let transport = FakeTransport::new();
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(ManualClock::new());

        let mut parts = EngineParts::new(
            transport.clone(),
            media_resolver(provider.clone(), &config),
            platforms,
            Arc::new(OfflineFetcher),
            &config,
        );
        let sink_handle: Arc<dyn AnnouncementSink> = sink.clone();
        parts.announcer = Announcer::new(Some(sink_handle), Arc::new(TemplateCatalog::english()));
        parts.clock = clock.clone();

        Self {
            engine: PlaybackEngine::new(parts, &config),
            provider,
            transport,
            sink,
            clock,
        }
    }

    /// Wait until the current session has received `n` play calls
    pub async fn wait_for_plays(&self, n: usize) {
        let transport = self.transport.clone();
        wait_until(&format!("{} play calls", n), move || {
            let transport = transport.clone();
            async move { transport.session_count() > 0 && transport.voice().play_count() >= n }
        })
        .await;
    }

    /// Wait for the `n`th play call and for the engine to report it playing
    ///
    /// The play call is recorded inside the engine's critical section, so
    /// any later state read observes the started track.
    pub async fn wait_until_playing(&self, n: usize) {
        self.wait_for_plays(n).await;
        self.wait_for_phase(tunecast_common::events::PlaybackPhase::Playing).await;
    }

    pub async fn wait_for_phase(&self, phase: tunecast_common::events::PlaybackPhase) {
        let engine = self.engine.clone();
        wait_until(&format!("phase {:?}", phase), move || {
            let engine = engine.clone();
            async move { engine.phase(CONTEXT).await == phase }
        })
        .await;
    }
}
