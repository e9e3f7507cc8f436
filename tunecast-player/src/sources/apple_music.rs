//! Apple Music resolver
//!
//! Both tiers read the public web page: tier 1 its JSON-LD metadata, tier 2
//! the rendered song rows.

use super::{scrape, CascadeResolver, PageFetcher, Platform, TierResult, TierStrategy, TrackPair};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;

pub fn cascade(fetcher: Arc<dyn PageFetcher>) -> CascadeResolver {
    CascadeResolver::new(
        Platform::AppleMusic,
        vec![
            Box::new(JsonLdTier {
                fetcher: fetcher.clone(),
            }),
            Box::new(SongRowTier { fetcher }),
        ],
    )
}

struct JsonLdTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for JsonLdTier {
    fn name(&self) -> &'static str {
        "json-ld"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let page = self.fetcher.fetch(url).await?;
        Ok(scrape::pairs_from_json_ld(&scrape::json_ld_objects(&page.body)))
    }
}

struct SongRowTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for SongRowTier {
    fn name(&self) -> &'static str {
        "song-rows"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let page = self.fetcher.fetch(url).await?;
        Ok(parse_song_rows(&page.body))
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid css selector")
}

static ROW: Lazy<Selector> = Lazy::new(|| selector(r#"div.songs-list-row, [data-testid="track-list-item"]"#));
static SONG_NAME: Lazy<Selector> =
    Lazy::new(|| selector(r#".songs-list-row__song-name, [data-testid="track-title"]"#));
static BY_LINE: Lazy<Selector> =
    Lazy::new(|| selector(r#".songs-list-row__by-line, [data-testid="track-title-by-line"]"#));
static PAGE_ARTIST: Lazy<Selector> =
    Lazy::new(|| selector(r#".headings__subtitles, [data-testid="product-subtitles"]"#));

fn text_of(element: ElementRef<'_>, sel: &Selector) -> Option<String> {
    let text: String = element.select(sel).next()?.text().collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn parse_song_rows(html: &str) -> Vec<TrackPair> {
    let document = Html::parse_document(html);
    let page_artist = text_of(document.root_element(), &PAGE_ARTIST).unwrap_or_default();

    let rows: Vec<TrackPair> = document
        .select(&ROW)
        .filter_map(|row| {
            let title = text_of(row, &SONG_NAME)?;
            let artist = text_of(row, &BY_LINE).unwrap_or_else(|| page_artist.clone());
            Some(TrackPair::new(title, artist))
        })
        .collect();
    if !rows.is_empty() {
        return rows;
    }

    // Single song pages only carry "Title by Artist" in the page title.
    scrape::meta_content(html, "og:title")
        .and_then(|t| split_by_line(&t))
        .into_iter()
        .collect()
}

fn split_by_line(title: &str) -> Option<TrackPair> {
    let title = title.trim_end_matches(" on Apple Music");
    let (song, artist) = title.rsplit_once(" by ")?;
    Some(TrackPair::new(song, artist))
}
