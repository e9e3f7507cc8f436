//! # Tunecast Common Library
//!
//! Shared code for the tunecast crates including:
//! - Context identifiers for independent playback scopes
//! - Event types (TunecastEvent enum) and the broadcast EventBus
//! - TOML bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod context;
pub mod error;
pub mod events;

pub use context::ContextId;
pub use error::{Error, Result};
