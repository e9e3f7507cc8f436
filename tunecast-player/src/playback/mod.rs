//! Per-context playback: queue, filters, state and the engine driving them

pub mod engine;
pub mod filters;
pub mod queue;
pub mod state;

pub use engine::{EngineParts, NowPlaying, PlaybackEngine, Placement, PlayOutcome, StatusSnapshot};
pub use filters::{AudioFilter, FilterChain};
pub use queue::{PlaybackQueue, QueueItem};
