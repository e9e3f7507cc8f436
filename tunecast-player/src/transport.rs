//! Voice transport collaborator
//!
//! The transport streams bytes to a voice session; the engine only drives
//! it. Completion of a track is reported through a single-shot
//! [`CompletionSignal`] that the drive loop awaits, so the transport never
//! touches player state directly.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tunecast_common::ContextId;

/// Where to connect (e.g. a voice channel)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoiceEndpoint(pub String);

impl VoiceEndpoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Options for one `play` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportOptions {
    /// Serialized effect chain, `None` for unfiltered playback
    pub filter_chain: Option<String>,
    /// Start position in seconds
    pub seek_secs: f64,
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Play failed: {0}")]
    Play(String),

    #[error("Voice session closed")]
    Closed,
}

/// Outcome of one playback: `Ok` for completion or stop, `Err` for a
/// transport error mid-stream
pub type Completion = Result<(), String>;

/// Single-shot completion callback handed to the transport with each track
pub struct CompletionSignal(oneshot::Sender<Completion>);

impl CompletionSignal {
    pub fn channel() -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Playback ended normally (finished, skipped or stopped)
    pub fn complete(self) {
        let _ = self.0.send(Ok(()));
    }

    /// Playback ended with an error
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.0.send(Err(reason.into()));
    }
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        context: ContextId,
        endpoint: &VoiceEndpoint,
    ) -> Result<Arc<dyn VoiceHandle>, TransportError>;
}

/// An established voice session
///
/// `stop` must eventually fire the signal of the track being played.
#[async_trait]
pub trait VoiceHandle: Send + Sync {
    async fn play(
        &self,
        stream_url: &str,
        options: &TransportOptions,
        on_complete: CompletionSignal,
    ) -> Result<(), TransportError>;

    async fn pause(&self);

    async fn resume(&self);

    async fn stop(&self);

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completion_signal_delivers_once() {
        let (signal, rx) = CompletionSignal::channel();
        signal.fail("decoder error");
        assert_eq!(rx.await.unwrap(), Err("decoder error".to_string()));

        let (signal, rx) = CompletionSignal::channel();
        drop(rx);
        signal.complete();
    }
}
