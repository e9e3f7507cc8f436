//! yt-dlp media provider
//!
//! Runs `yt-dlp -J` as a child process and decodes its JSON document.

use super::{ExtractOptions, ExtractionError, ExtractionErrorKind, MediaEntry, MediaInfo, MediaProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct YtDlpProvider {
    executable: PathBuf,
}

impl YtDlpProvider {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn command(&self, reference: &str, options: &ExtractOptions) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-J")
            .arg("--no-warnings")
            .arg("--ignore-no-formats-error")
            .arg("--socket-timeout")
            .arg(options.timeout.as_secs().max(1).to_string())
            .arg("-f")
            .arg("bestaudio/best");

        if options.flat {
            cmd.arg("--flat-playlist");
        }
        if options.single_item {
            cmd.arg("--no-playlist");
        }

        cmd.arg("--")
            .arg(reference)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for YtDlpProvider {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl MediaProvider for YtDlpProvider {
    async fn extract(
        &self,
        reference: &str,
        options: &ExtractOptions,
    ) -> Result<MediaInfo, ExtractionError> {
        debug!(reference = %reference, flat = options.flat, "Running yt-dlp");

        let output = tokio::time::timeout(options.timeout, self.command(reference, options).output())
            .await
            .map_err(|_| {
                ExtractionError::new(
                    ExtractionErrorKind::Timeout,
                    format!("yt-dlp timed out after {:?}", options.timeout),
                )
            })?
            .map_err(|e| {
                ExtractionError::new(
                    ExtractionErrorKind::Process,
                    format!("failed to run {}: {}", self.executable.display(), e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        parse_document(&output.stdout)
    }
}

/// Map yt-dlp's stderr to an error kind
fn classify_failure(stderr: &str) -> ExtractionError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .unwrap_or(stderr)
        .trim()
        .to_string();
    let lower = message.to_lowercase();

    let kind = if lower.contains("timed out") {
        ExtractionErrorKind::Timeout
    } else if lower.contains("unable to download")
        || lower.contains("connection")
        || lower.contains("http error 5")
    {
        ExtractionErrorKind::Network
    } else if lower.contains("private")
        || lower.contains("unavailable")
        || lower.contains("sign in")
        || lower.contains("copyright")
    {
        ExtractionErrorKind::Unavailable
    } else if lower.contains("404") || lower.contains("not found") || lower.contains("unsupported url") {
        ExtractionErrorKind::NotFound
    } else {
        ExtractionErrorKind::Process
    };

    ExtractionError::new(kind, message)
}

#[derive(Debug, Deserialize)]
struct Document {
    id: Option<String>,
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    #[serde(rename = "_type")]
    kind: Option<String>,
    entries: Option<Vec<Option<Entry>>>,
    requested_formats: Option<Vec<Format>>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    id: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    ie_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
    acodec: Option<String>,
}

fn parse_document(raw: &[u8]) -> Result<MediaInfo, ExtractionError> {
    let doc: Document = serde_json::from_slice(raw)
        .map_err(|e| ExtractionError::new(ExtractionErrorKind::Parse, e.to_string()))?;

    let is_collection = doc.kind.as_deref() == Some("playlist") || doc.entries.is_some();

    let stream_url = if is_collection {
        None
    } else {
        audio_format_url(&doc)
    };

    let entries = doc.entries.map(|entries| {
        entries
            .into_iter()
            .flatten()
            .map(|e| MediaEntry {
                url: entry_url(&e),
                id: e.id,
                title: e.title,
                duration_secs: e.duration,
            })
            .collect::<Vec<_>>()
    });

    Ok(MediaInfo {
        id: doc.id,
        title: doc.title,
        canonical_url: doc.webpage_url.or(doc.original_url),
        thumbnail_url: doc.thumbnail,
        stream_url,
        duration_secs: doc.duration,
        entries,
    })
}

/// Direct audio URL: merged formats list the audio part separately
fn audio_format_url(doc: &Document) -> Option<String> {
    if let Some(formats) = &doc.requested_formats {
        let audio = formats
            .iter()
            .find(|f| f.acodec.as_deref().is_some_and(|c| c != "none"))
            .and_then(|f| f.url.clone());
        if audio.is_some() {
            return audio;
        }
    }
    doc.url.clone()
}

fn entry_url(entry: &Entry) -> Option<String> {
    if let Some(url) = entry.webpage_url.as_ref().or(entry.url.as_ref()) {
        if url.starts_with("http") {
            return Some(url.clone());
        }
    }
    match (entry.ie_key.as_deref(), entry.id.as_deref()) {
        (Some("Youtube"), Some(id)) => Some(format!("https://www.youtube.com/watch?v={}", id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_video_prefers_audio_format() {
        let raw = br#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq.jpg",
            "duration": 213.0,
            "url": "https://video.example/merged",
            "requested_formats": [
                {"url": "https://video.example/v", "acodec": "none"},
                {"url": "https://audio.example/a", "acodec": "opus"}
            ]
        }"#;

        let info = parse_document(raw).unwrap();
        assert_eq!(info.title.as_deref(), Some("Never Gonna Give You Up"));
        assert_eq!(info.stream_url.as_deref(), Some("https://audio.example/a"));
        assert!(info.entries.is_none());
    }

    #[test]
    fn test_parse_flat_playlist_entries() {
        let raw = br#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"id": "aaaaaaaaaaa", "ie_key": "Youtube", "title": "First", "url": "aaaaaaaaaaa"},
                null,
                {"id": "bbbbbbbbbbb", "title": "Second", "url": "https://www.youtube.com/watch?v=bbbbbbbbbbb"}
            ]
        }"#;

        let info = parse_document(raw).unwrap();
        let entries = info.entries.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].url.as_deref(),
            Some("https://www.youtube.com/watch?v=aaaaaaaaaaa")
        );
        assert_eq!(entries[1].title.as_deref(), Some("Second"));
        assert!(info.stream_url.is_none());
    }

    #[test]
    fn test_classify_failure_kinds() {
        assert_eq!(
            classify_failure("ERROR: [youtube] x: Video unavailable").kind,
            ExtractionErrorKind::Unavailable
        );
        assert_eq!(
            classify_failure("ERROR: Unable to download webpage: <urlopen error>").kind,
            ExtractionErrorKind::Network
        );
        assert_eq!(
            classify_failure("ERROR: Unsupported URL: https://example.org").kind,
            ExtractionErrorKind::NotFound
        );
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert_eq!(
            parse_document(b"not json").unwrap_err().kind,
            ExtractionErrorKind::Parse
        );
    }
}
