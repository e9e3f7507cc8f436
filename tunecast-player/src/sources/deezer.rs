//! Deezer resolver
//!
//! Tier 1 is the public `api.deezer.com` JSON API (no credentials needed).
//! Tier 2 reads the application state embedded in the web page.

use super::{
    api_limiter, check_status, collect_pages, scrape, CascadeResolver, DirectLimiter, Page,
    PageFetcher, Platform, TierError, TierResult, TierStrategy, TrackPair,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const API_BASE: &str = "https://api.deezer.com";

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"deezer\.com/(?:[a-z]{2}/)?(track|album|playlist|artist)/(\d+)")
        .expect("invalid deezer link pattern")
});

fn parse_link(url: &str) -> TierResult<(String, String)> {
    let caps = LINK
        .captures(url)
        .ok_or_else(|| TierError::Unsupported(url.to_string()))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

pub fn cascade(client: Client, fetcher: Arc<dyn PageFetcher>, max_pages: usize) -> CascadeResolver {
    CascadeResolver::new(
        Platform::Deezer,
        vec![
            Box::new(PublicApiTier {
                client,
                max_pages,
                rate_limiter: api_limiter(8),
            }),
            Box::new(PageStateTier { fetcher }),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    title: String,
    artist: Option<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

/// Deezer reports failures with HTTP 200 and an `error` object
#[derive(Debug, Deserialize)]
struct ApiList {
    #[serde(default)]
    data: Vec<ApiTrack>,
    next: Option<String>,
    error: Option<Value>,
}

impl ApiTrack {
    fn into_pair(self) -> TrackPair {
        let artist = self.artist.map(|a| a.name).unwrap_or_default();
        TrackPair::new(&self.title, artist)
    }
}

fn decode_list(body: &str) -> TierResult<Page> {
    let list: ApiList = serde_json::from_str(body)?;
    if let Some(error) = list.error {
        return Err(TierError::Parse(format!("deezer api error: {}", error)));
    }
    Ok(Page {
        tracks: list.data.into_iter().map(ApiTrack::into_pair).collect(),
        next: list.next,
    })
}

fn decode_track(body: &str) -> TierResult<TrackPair> {
    let value: Value = serde_json::from_str(body)?;
    if let Some(error) = value.get("error") {
        return Err(TierError::Parse(format!("deezer api error: {}", error)));
    }
    let track: ApiTrack = serde_json::from_value(value)?;
    Ok(track.into_pair())
}

/// Tier 1: public JSON API
struct PublicApiTier {
    client: Client,
    max_pages: usize,
    rate_limiter: DirectLimiter,
}

impl PublicApiTier {
    async fn get_text(&self, url: &str) -> TierResult<String> {
        self.rate_limiter.until_ready().await;
        let response = self.client.get(url).send().await?;
        Ok(check_status(response)?.text().await?)
    }
}

#[async_trait]
impl TierStrategy for PublicApiTier {
    fn name(&self) -> &'static str {
        "public-api"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let (kind, id) = parse_link(url)?;

        let first = match kind.as_str() {
            "track" => {
                let body = self.get_text(&format!("{}/track/{}", API_BASE, id)).await?;
                return Ok(vec![decode_track(&body)?]);
            }
            "artist" => format!("{}/artist/{}/top?limit=50", API_BASE, id),
            other => format!("{}/{}/{}/tracks?limit=100", API_BASE, other, id),
        };

        collect_pages(first, self.max_pages, |page_url| async move {
            decode_list(&self.get_text(&page_url).await?)
        })
        .await
    }
}

/// Tier 2: `__DZR_APP_STATE__` embedded in the web page
struct PageStateTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for PageStateTier {
    fn name(&self) -> &'static str {
        "page-state"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let (kind, id) = parse_link(url)?;
        let page = self
            .fetcher
            .fetch(&format!("https://www.deezer.com/en/{}/{}", kind, id))
            .await?;
        parse_app_state(&page.body)
    }
}

fn parse_app_state(html: &str) -> TierResult<Vec<TrackPair>> {
    let state = scrape::assigned_json(html, "window.__DZR_APP_STATE__")
        .ok_or_else(|| TierError::Parse("page has no __DZR_APP_STATE__".to_string()))?;

    let song = |v: &Value| -> Option<TrackPair> {
        let title = v.get("SNG_TITLE")?.as_str()?;
        let artist = v.get("ART_NAME").and_then(Value::as_str).unwrap_or_default();
        Some(TrackPair::new(title, artist))
    };

    if let Some(Value::Array(songs)) = state.pointer("/SONGS/data") {
        return Ok(songs.iter().filter_map(song).collect());
    }
    if let Some(Value::Array(songs)) = state.pointer("/TOP/data") {
        return Ok(songs.iter().filter_map(song).collect());
    }
    Ok(state.get("DATA").and_then(song).into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_with_locale() {
        assert_eq!(
            parse_link("https://www.deezer.com/fr/playlist/908622995").unwrap(),
            ("playlist".to_string(), "908622995".to_string())
        );
    }

    #[test]
    fn test_decode_list_with_next_cursor() {
        let page = decode_list(
            r#"{"data":[{"title":"Harder","artist":{"name":"Daft Punk"}},{"title":"Untitled"}],
                "total":250,"next":"https://api.deezer.com/playlist/1/tracks?index=100"}"#,
        )
        .unwrap();
        assert_eq!(
            page.tracks,
            vec![TrackPair::new("Harder", "Daft Punk"), TrackPair::new("Untitled", "")]
        );
        assert!(page.next.is_some());
    }

    #[test]
    fn test_api_error_object_is_failure() {
        let body = r#"{"error":{"type":"DataException","message":"no data","code":800}}"#;
        assert!(decode_list(body).is_err());
        assert!(decode_track(body).is_err());
    }

    #[test]
    fn test_parse_app_state_collection_and_track() {
        let html = r#"<script>window.__DZR_APP_STATE__ = {"DATA":{"TITLE":"Album"},
            "SONGS":{"data":[{"SNG_TITLE":"One","ART_NAME":"A"},{"SNG_TITLE":"Two","ART_NAME":"B"}]}}</script>"#;
        assert_eq!(
            parse_app_state(html).unwrap(),
            vec![TrackPair::new("One", "A"), TrackPair::new("Two", "B")]
        );

        let html = r#"<script>window.__DZR_APP_STATE__ = {"DATA":{"SNG_TITLE":"Solo","ART_NAME":"S"}}</script>"#;
        assert_eq!(parse_app_state(html).unwrap(), vec![TrackPair::new("Solo", "S")]);
    }
}
