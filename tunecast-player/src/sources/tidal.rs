//! Tidal resolver
//!
//! Tier 1 is the v1 API authenticated with an `X-Tidal-Token`, paginated by
//! offset. Tier 2 reads the public page's structured metadata.

use super::{
    api_limiter, check_status, collect_pages, scrape, CascadeResolver, DirectLimiter, Page,
    PageFetcher, Platform, TierError, TierResult, TierStrategy, TrackPair,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tunecast_common::config::TidalCredentials;

const API_BASE: &str = "https://api.tidal.com/v1";
const PAGE_LIMIT: usize = 100;

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"tidal\.com/(?:browse/)?(track|album|playlist|mix)/([A-Za-z0-9-]+)")
        .expect("invalid tidal link pattern")
});

fn parse_link(url: &str) -> TierResult<(String, String)> {
    let caps = LINK
        .captures(url)
        .ok_or_else(|| TierError::Unsupported(url.to_string()))?;
    Ok((caps[1].to_string(), caps[2].to_string()))
}

pub fn cascade(
    client: Client,
    fetcher: Arc<dyn PageFetcher>,
    credentials: Option<TidalCredentials>,
    max_pages: usize,
) -> CascadeResolver {
    CascadeResolver::new(
        Platform::Tidal,
        vec![
            Box::new(ApiTier {
                client,
                token: credentials.map(|c| c.token),
                max_pages,
                rate_limiter: api_limiter(5),
            }),
            Box::new(PageMetaTier { fetcher }),
        ],
    )
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    title: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    artist: Option<ApiArtist>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItems {
    items: Vec<ApiItem>,
    #[serde(default)]
    total_number_of_items: usize,
    #[serde(default)]
    offset: usize,
}

/// Playlist items wrap the track; album items are the track itself
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiItem {
    Wrapped { item: ApiTrack },
    Bare(ApiTrack),
}

impl ApiTrack {
    fn into_pair(self) -> TrackPair {
        let artist = if self.artists.is_empty() {
            self.artist.map(|a| a.name).unwrap_or_default()
        } else {
            self.artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        TrackPair::new(&self.title, artist)
    }
}

/// Decode one page; the next cursor is the offset URL if items remain
fn decode_items(body: &str, page_url: &str) -> TierResult<Page> {
    let list: ApiItems = serde_json::from_str(body)?;
    let received = list.items.len();
    let consumed = list.offset + received;

    let next = (received > 0 && consumed < list.total_number_of_items)
        .then(|| with_offset(page_url, consumed));

    Ok(Page {
        tracks: list
            .items
            .into_iter()
            .map(|i| match i {
                ApiItem::Wrapped { item } => item.into_pair(),
                ApiItem::Bare(track) => track.into_pair(),
            })
            .collect(),
        next,
    })
}

fn with_offset(url: &str, offset: usize) -> String {
    let base = url.split("&offset=").next().unwrap_or(url);
    format!("{}&offset={}", base, offset)
}

struct ApiTier {
    client: Client,
    token: Option<String>,
    max_pages: usize,
    rate_limiter: DirectLimiter,
}

impl ApiTier {
    async fn get_text(&self, token: &str, url: &str) -> TierResult<String> {
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(url)
            .header("x-tidal-token", token)
            .send()
            .await?;
        Ok(check_status(response)?.text().await?)
    }
}

#[async_trait]
impl TierStrategy for ApiTier {
    fn name(&self) -> &'static str {
        "v1-api"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let token = self
            .token
            .as_deref()
            .ok_or(TierError::NotConfigured("tidal token"))?;
        let (kind, id) = parse_link(url)?;

        let collection = match kind.as_str() {
            "track" => {
                let body = self
                    .get_text(token, &format!("{}/tracks/{}?countryCode=US", API_BASE, id))
                    .await?;
                let track: ApiTrack = serde_json::from_str(&body)?;
                return Ok(vec![track.into_pair()]);
            }
            "album" => "albums",
            "playlist" => "playlists",
            _ => "mixes",
        };

        let first = format!(
            "{}/{}/{}/items?countryCode=US&limit={}&offset=0",
            API_BASE, collection, id, PAGE_LIMIT
        );
        collect_pages(first, self.max_pages, |page_url| async move {
            let body = self.get_text(token, &page_url).await?;
            decode_items(&body, &page_url)
        })
        .await
    }
}

struct PageMetaTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for PageMetaTier {
    fn name(&self) -> &'static str {
        "page-meta"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let page = self.fetcher.fetch(url).await?;
        Ok(parse_page(&page.body))
    }
}

fn parse_page(html: &str) -> Vec<TrackPair> {
    let pairs = scrape::pairs_from_json_ld(&scrape::json_ld_objects(html));
    if !pairs.is_empty() {
        return pairs;
    }

    // Track pages title themselves "Title - Artist".
    scrape::meta_content(html, "og:title")
        .and_then(|t| {
            let (title, artist) = t.split_once(" - ")?;
            Some(TrackPair::new(title, artist))
        })
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_items_wrapped_and_bare() {
        let body = r#"{"limit":2,"offset":0,"totalNumberOfItems":3,"items":[
            {"item":{"title":"A","artists":[{"name":"X"}]},"type":"track"},
            {"title":"B","artist":{"name":"Y"}}
        ]}"#;

        let page = decode_items(body, "https://api.tidal.com/v1/playlists/p/items?countryCode=US&limit=2&offset=0").unwrap();
        assert_eq!(page.tracks, vec![TrackPair::new("A", "X"), TrackPair::new("B", "Y")]);
        assert_eq!(
            page.next.as_deref(),
            Some("https://api.tidal.com/v1/playlists/p/items?countryCode=US&limit=2&offset=2")
        );
    }

    #[test]
    fn test_decode_items_last_page_has_no_cursor() {
        let body = r#"{"offset":2,"totalNumberOfItems":3,"items":[{"title":"C","artists":[]}]}"#;
        let page = decode_items(body, "u?x=1&offset=2").unwrap();
        assert!(page.next.is_none());
    }

    #[test]
    fn test_parse_page_og_title() {
        let html = r#"<meta property="og:title" content="Around the World - Daft Punk">"#;
        assert_eq!(parse_page(html), vec![TrackPair::new("Around the World", "Daft Punk")]);
    }

    #[test]
    fn test_parse_link_uuid_playlist() {
        let (kind, id) =
            parse_link("https://tidal.com/browse/playlist/4261748a-4287-4758-aaab-6d5be3e99e52").unwrap();
        assert_eq!(kind, "playlist");
        assert_eq!(id, "4261748a-4287-4758-aaab-6d5be3e99e52");
    }
}
