//! Playback state and queue change enums shared by events

use serde::{Deserialize, Serialize};

/// Playback phase of one context's state machine
///
/// `Stopped` is terminal: the context is reset to a fresh `Idle` state
/// immediately after the transition is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Connecting,
    ResolvingCurrent,
    Playing,
    Paused,
    Stopped,
}

impl PlaybackPhase {
    /// True while a track is loaded on the transport
    pub fn has_current_track(self) -> bool {
        matches!(self, PlaybackPhase::Playing | PlaybackPhase::Paused)
    }
}

/// What caused a queue change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueChangeTrigger {
    /// Item appended to the back
    Enqueue,
    /// Item inserted at the front (play-next)
    PlayNext,
    /// Item taken for playback
    Dequeue,
    /// Finished item re-inserted at the front by loop mode
    LoopRequeue,
    /// Related tracks appended by autoplay
    Autoplay,
    Shuffle,
    Clear,
    /// Context reset by stop
    Stop,
}
