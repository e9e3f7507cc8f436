//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: engine construction, context registry, connection, stop
//! - `enqueue.rs`: resolving user input and placing it on the queue
//! - `drive.rs`: the per-context drive loop (resolve, play, advance)
//! - `autoplay.rs`: related-track continuation when the queue empties
//! - `controls.rs`: pause, resume, skip, filters, loop, shuffle, status

mod autoplay;
mod controls;
mod core;
mod drive;
mod enqueue;

pub use self::core::{EngineParts, PlaybackEngine};
pub use controls::{NowPlaying, StatusSnapshot};
pub use enqueue::{Placement, PlayOutcome};
