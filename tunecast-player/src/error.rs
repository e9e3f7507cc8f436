//! Error types for tunecast-player
//!
//! Per-item resolution and playback failures are contained inside the
//! engine and turned into counters and notifications. Only the variants
//! below that a command handler returns reach the user: connection
//! failures, exhausted batches, and exhausted single resolutions.

use crate::media::ExtractionError;
use crate::sources::ResolutionError;
use thiserror::Error;

/// Main error type for tunecast-player
#[derive(Error, Debug)]
pub enum Error {
    /// Every tier of a platform resolver failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Media resolution provider failed
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Voice session could not be established
    #[error("Voice connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation requires a current track
    #[error("Nothing is playing")]
    NothingPlaying,

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A collection resolved with zero playable tracks
    #[error("No track of {failed} could be resolved")]
    BatchExhausted {
        failed: usize,
        /// Itemized descriptors of the first failures
        failures: Vec<String>,
    },

    /// Invalid request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Context was stopped while the operation was in flight
    #[error("Operation cancelled by stop")]
    Cancelled,
}

/// Convenience Result type using tunecast-player Error
pub type Result<T> = std::result::Result<T, Error>;
