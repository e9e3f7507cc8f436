//! Amazon Music resolver
//!
//! Tier 1 reads JSON-LD metadata; tier 2 reads the attributes of the
//! page's `music-*` web components.

use super::{scrape, CascadeResolver, PageFetcher, Platform, TierResult, TierStrategy, TrackPair};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::sync::Arc;

pub fn cascade(fetcher: Arc<dyn PageFetcher>) -> CascadeResolver {
    CascadeResolver::new(
        Platform::AmazonMusic,
        vec![
            Box::new(JsonLdTier {
                fetcher: fetcher.clone(),
            }),
            Box::new(ComponentTier { fetcher }),
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

struct ComponentTier {
    fetcher: Arc<dyn PageFetcher>,
}

#[async_trait]
impl TierStrategy for ComponentTier {
    fn name(&self) -> &'static str {
        "web-components"
    }

    async fn fetch(&self, url: &str) -> TierResult<Vec<TrackPair>> {
        let page = self.fetcher.fetch(url).await?;
        Ok(parse_components(&page.body, url.contains("/tracks/")))
    }
}

static HEADER: Lazy<Selector> =
    Lazy::new(|| Selector::parse("music-detail-header").expect("invalid css selector"));
static ROW: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("music-text-row, music-image-row").expect("invalid css selector")
});

fn parse_components(html: &str, single_track: bool) -> Vec<TrackPair> {
    let document = Html::parse_document(html);
    let header = document.select(&HEADER).next();
    let header_attr = |name: &str| {
        header
            .and_then(|h| h.value().attr(name))
            .map(str::to_string)
            .unwrap_or_default()
    };

    if single_track {
        let title = header_attr("headline");
        if title.is_empty() {
            return Vec::new();
        }
        return vec![TrackPair::new(title, header_attr("primary-text"))];
    }

    let collection_artist = header_attr("primary-text");
    document
        .select(&ROW)
        .filter_map(|row| {
            let attrs = row.value();
            let title = attrs.attr("primary-text")?;
            let artist = attrs
                .attr("secondary-text-1")
                .filter(|a| !a.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| collection_artist.clone());
            Some(TrackPair::new(title, artist))
        })
        .filter(|p| !p.title.is_empty())
        .collect()
}
