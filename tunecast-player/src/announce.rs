//! Announcements
//!
//! The engine never formats user-facing text itself. It asks a
//! [`MessageCatalog`] for a message by key in the context's locale and
//! hands the result to an [`AnnouncementSink`]. Without a sink every
//! announcement is a no-op.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use tunecast_common::ContextId;

/// Message keys requested by the engine
pub mod keys {
    pub const NOW_PLAYING: &str = "now_playing";
    pub const TRACK_QUEUED: &str = "track_queued";
    pub const COLLECTION_QUEUED: &str = "collection_queued";
    pub const BATCH_PROGRESS: &str = "batch_progress";
    pub const BATCH_SUMMARY: &str = "batch_summary";
    pub const BATCH_FAILED: &str = "batch_failed";
    pub const PLAYBACK_ERROR: &str = "playback_error";
    pub const AUTOPLAY_ADDED: &str = "autoplay_added";
    pub const QUEUE_FINISHED: &str = "queue_finished";
}

/// Settings key holding the context locale
pub const LANGUAGE_SETTING: &str = "language";

pub const DEFAULT_LOCALE: &str = "en";

/// Fire-and-forget notification channel
#[async_trait]
pub trait AnnouncementSink: Send + Sync {
    async fn send(&self, context: ContextId, message: String);
}

pub trait MessageCatalog: Send + Sync {
    fn lookup(&self, key: &str, locale: &str, vars: &[(&str, String)]) -> String;
}

/// Per-context key/value settings (language, display mode, ...)
pub trait ContextSettings: Send + Sync {
    fn get(&self, context: ContextId, key: &str) -> Option<String>;
}

/// Engine-side announcement helper
#[derive(Clone)]
pub struct Announcer {
    sink: Option<Arc<dyn AnnouncementSink>>,
    catalog: Arc<dyn MessageCatalog>,
    settings: Option<Arc<dyn ContextSettings>>,
}

impl Announcer {
    pub fn new(sink: Option<Arc<dyn AnnouncementSink>>, catalog: Arc<dyn MessageCatalog>) -> Self {
        Self {
            sink,
            catalog,
            settings: None,
        }
    }

    /// No sink: announcements are dropped
    pub fn silent() -> Self {
        Self::new(None, Arc::new(TemplateCatalog::english()))
    }

    pub fn with_settings(mut self, settings: Arc<dyn ContextSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn locale(&self, context: ContextId) -> String {
        self.settings
            .as_ref()
            .and_then(|s| s.get(context, LANGUAGE_SETTING))
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    pub async fn announce(&self, context: ContextId, key: &str, vars: &[(&str, String)]) {
        let Some(sink) = &self.sink else {
            return;
        };
        let locale = self.locale(context);
        let message = self.catalog.lookup(key, &locale, vars);
        debug!(context = %context, key, "Announcement");
        sink.send(context, message).await;
    }
}

/// Catalog of `{var}` templates keyed by locale and message key
///
/// Lookups fall back to the default locale, then to the key itself.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<(String, String), String>,
}

impl TemplateCatalog {
    pub fn english() -> Self {
        let mut catalog = Self::default();
        for (key, template) in [
            (keys::NOW_PLAYING, "Now playing: {title}"),
            (keys::TRACK_QUEUED, "Queued: {title}"),
            (keys::COLLECTION_QUEUED, "Queued {count} tracks from {title}"),
            (keys::BATCH_PROGRESS, "Resolving tracks: {processed}/{total}"),
            (
                keys::BATCH_SUMMARY,
                "Queued {succeeded} of {total} tracks ({failed} failed){failures}",
            ),
            (keys::BATCH_FAILED, "None of the {failed} tracks could be found"),
            (keys::PLAYBACK_ERROR, "Could not play {title}: {reason}"),
            (keys::AUTOPLAY_ADDED, "Autoplay added {count} related tracks"),
            (keys::QUEUE_FINISHED, "Queue finished"),
        ] {
            catalog.insert(DEFAULT_LOCALE, key, template);
        }
        catalog
    }

    pub fn insert(&mut self, locale: &str, key: &str, template: &str) {
        self.templates
            .insert((locale.to_string(), key.to_string()), template.to_string());
    }

    fn template(&self, key: &str, locale: &str) -> Option<&String> {
        self.templates
            .get(&(locale.to_string(), key.to_string()))
            .or_else(|| {
                self.templates
                    .get(&(DEFAULT_LOCALE.to_string(), key.to_string()))
            })
    }
}

impl MessageCatalog for TemplateCatalog {
    fn lookup(&self, key: &str, locale: &str, vars: &[(&str, String)]) -> String {
        let Some(template) = self.template(key, locale) else {
            return key.to_string();
        };
        vars.iter().fold(template.clone(), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }
}

/// In-memory [`ContextSettings`]
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<(ContextId, String), String>>,
}

impl MemorySettings {
    pub fn set(&self, context: ContextId, key: &str, value: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert((context, key.to_string()), value.to_string());
    }
}

impl ContextSettings for MemorySettings {
    fn get(&self, context: ContextId, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(&(context, key.to_string())).cloned()
    }
}
