//! Spotify resolver
//!
//! Tier 1 is the Web API with a client-credentials token. Tier 2 reads the
//! track list embedded in the public embed page.

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
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tunecast_common::config::SpotifyCredentials;

const API_BASE: &str = "https://api.spotify.com/v1";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]{2}/)?(track|album|playlist|artist)/([A-Za-z0-9]+)")
        .expect("invalid spotify link pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl Kind {
    fn path(self) -> &'static str {
        match self {
            Kind::Track => "track",
            Kind::Album => "album",
            Kind::Playlist => "playlist",
            Kind::Artist => "artist",
        }
    }
}

fn parse_link(url: &str) -> TierResult<(Kind, String)> {
    let caps = LINK
        .captures(url)
        .ok_or_else(|| TierError::Unsupported(url.to_string()))?;
    let kind = match &caps[1] {
        "track" => Kind::Track,
        "album" => Kind::Album,
        "playlist" => Kind::Playlist,
        _ => Kind::Artist,
    };
    Ok((kind, caps[2].to_string()))
}

pub fn cascade(
    client: Client,
    fetcher: Arc<dyn PageFetcher>,
    credentials: Option<SpotifyCredentials>,
    max_pages: usize,
) -> CascadeResolver {
    CascadeResolver::new(
        Platform::Spotify,
        vec![
            Box::new(WebApiTier::new(client, credentials, max_pages)),
            Box::new(EmbedTier { fetcher }),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPaging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    /// Null for removed or local tracks
    track: Option<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    tracks: Vec<ApiTrack>,
}

impl ApiTrack {
    fn into_pair(self) -> TrackPair {
        let artists: Vec<&str> = self.artists.iter().map(|a| a.name.as_str()).collect();
        TrackPair::new(&self.name, artists.join(", "))
    }
}

/// Tier 1: Spotify Web API
struct WebApiTier {
    client: Client,
    credentials: Option<SpotifyCredentials>,
    max_pages: usize,
    token: Mutex<Option<(String, Instant)>>,
    rate_limiter: DirectLimiter,
}

impl WebApiTier {
    fn new(client: Client, credentials: Option<SpotifyCredentials>, max_pages: usize) -> Self {
        Self {
            client,
            credentials,
            max_pages,
            token: Mutex::new(None),
            rate_limiter: api_limiter(10),
        }
    }

    async fn access_token(&self) -> TierResult<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(TierError::NotConfigured("spotify client credentials"))?;

        let mut cached = self.token.lock().await;
        if let Some((token, expires_at)) = cached.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(token.clone());
            }
        }

        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = check_status(response)?.json().await?;

        // Refresh a minute early so requests never carry a just-expired token.
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some((token.access_token.clone(), Instant::now() + lifetime));
        Ok(token.access_token)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> TierResult<T> {
        let token = self.access_token().await?;
        self.rate_limiter.until_ready().await;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Ok(check_status(response)?.json().await?)
    }
}

#[async_trait]
impl TierStrategy for WebApiTier {
    fn name(&self) -> &'static str {
        "web-api"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let (kind, id) = parse_link(url)?;

        match kind {
            Kind::Track => {
                let track: ApiTrack = self.get(&format!("{}/tracks/{}", API_BASE, id)).await?;
                Ok(vec![track.into_pair()])
            }
            Kind::Album => {
                let first = format!("{}/albums/{}/tracks?limit=50", API_BASE, id);
                collect_pages(first, self.max_pages, |page_url| async move {
                    let page: ApiPaging<ApiTrack> = self.get(&page_url).await?;
                    Ok(Page {
                        tracks: page.items.into_iter().map(ApiTrack::into_pair).collect(),
                        next: page.next,
                    })
                })
                .await
            }
            Kind::Playlist => {
                let first = format!("{}/playlists/{}/tracks?limit=100", API_BASE, id);
                collect_pages(first, self.max_pages, |page_url| async move {
                    let page: ApiPaging<PlaylistItem> = self.get(&page_url).await?;
                    Ok(Page {
                        tracks: page
                            .items
                            .into_iter()
                            .filter_map(|item| item.track)
                            .map(ApiTrack::into_pair)
                            .collect(),
                        next: page.next,
                    })
                })
                .await
            }
            Kind::Artist => {
                let top: TopTracks = self
                    .get(&format!("{}/artists/{}/top-tracks?market=US", API_BASE, id))
                    .await?;
                Ok(top.tracks.into_iter().map(ApiTrack::into_pair).collect())
            }
        }
    }
}

/// Tier 2: embed page scraping
struct EmbedTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for EmbedTier {
    fn name(&self) -> &'static str {
        "embed-scrape"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let (kind, id) = parse_link(url)?;
        let embed = format!("https://open.spotify.com/embed/{}/{}", kind.path(), id);
        let page = self.fetcher.fetch(&embed).await?;
        parse_embed(&page.body)
    }
}

fn parse_embed(html: &str) -> TierResult<Vec<TrackPair>> {
    let data = scrape::script_json_by_id(html, "__NEXT_DATA__")
        .ok_or_else(|| TierError::Parse("embed page has no __NEXT_DATA__".to_string()))?;
    let entity = data
        .pointer("/props/pageProps/state/data/entity")
        .ok_or_else(|| TierError::Parse("embed data has no entity".to_string()))?;

    if let Some(Value::Array(list)) = entity.get("trackList") {
        return Ok(list
            .iter()
            .filter_map(|t| {
                let title = t.get("title").and_then(Value::as_str)?;
                let artist = t.get("subtitle").and_then(Value::as_str).unwrap_or_default();
                Some(TrackPair::new(title, artist))
            })
            .filter(|p| !p.title.is_empty())
            .collect());
    }

    let title = entity
        .get("name")
        .or_else(|| entity.get("title"))
        .and_then(Value::as_str)
        .ok_or_else(|| TierError::Parse("embed entity has no title".to_string()))?;
    Ok(vec![TrackPair::new(title, scrape::joined_names(entity.get("artists")))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_kinds() {
        assert_eq!(
            parse_link("https://open.spotify.com/intl-de/album/1DFixLWuPkv3KT3TnV35m3?si=x").unwrap(),
            (Kind::Album, "1DFixLWuPkv3KT3TnV35m3".to_string())
        );
        assert!(parse_link("https://open.spotify.com/show/abc").is_err());
    }

    #[test]
    fn test_api_payloads_to_pairs() {
        let page: ApiPaging<PlaylistItem> = serde_json::from_str(
            r#"{"items":[
                {"track":{"name":"Song A","artists":[{"name":"X"},{"name":"Y"}]}},
                {"track":null},
                {"track":{"name":"Song B","artists":[]}}
            ],"next":"https://api.spotify.com/v1/playlists/p/tracks?offset=100"}"#,
        )
        .unwrap();

        assert!(page.next.is_some());
        let pairs: Vec<_> = page
            .items
            .into_iter()
            .filter_map(|i| i.track)
            .map(ApiTrack::into_pair)
            .collect();
        assert_eq!(pairs, vec![TrackPair::new("Song A", "X, Y"), TrackPair::new("Song B", "")]);
    }

    #[test]
    fn test_parse_embed_track_list() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"state":{"data":{"entity":{
                "name":"Road Trip",
                "trackList":[{"title":"One","subtitle":"A"},{"title":"Two","subtitle":"B, C"}]
            }}}}}}</script>"#;

        assert_eq!(
            parse_embed(html).unwrap(),
            vec![TrackPair::new("One", "A"), TrackPair::new("Two", "B, C")]
        );
    }

    #[test]
    fn test_parse_embed_single_track() {
        let html = r#"<script id="__NEXT_DATA__">
            {"props":{"pageProps":{"state":{"data":{"entity":{
                "name":"Solo","artists":[{"name":"Someone"}]
            }}}}}}</script>"#;
        assert_eq!(parse_embed(html).unwrap(), vec![TrackPair::new("Solo", "Someone")]);
        assert!(parse_embed("<html></html>").is_err());
    }
}
