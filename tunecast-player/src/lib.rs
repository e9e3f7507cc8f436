//! # Tunecast Player Library
//!
//! Multi-context music queue and playback engine.
//!
//! **Purpose:** Turn user input (catalog links, direct media links, share
//! links, free text) into playable tracks, keep one queue per context, and
//! drive an external voice transport through it with loop, autoplay and
//! audio filter support.
//!
//! **Architecture:** classifier -> platform cascade / generic media resolver
//! -> batch coordinator -> per-context drive loop -> [`transport::VoiceTransport`]

pub mod announce;
pub mod batch;
pub mod cache;
pub mod classify;
pub mod clock;
pub mod error;
pub mod media;
pub mod normalize;
pub mod playback;
pub mod retry;
pub mod sources;
pub mod transport;

pub use error::{Error, Result};
pub use playback::{EngineParts, PlaybackEngine};
