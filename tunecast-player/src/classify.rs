//! Source classifier
//!
//! Routes a raw input string to a resolution strategy by matching it, in
//! priority order, against known URL shapes. The first match wins. Anything
//! that matches nothing is a free-text search term, so classification never
//! fails.

use crate::sources::Platform;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Hosts handled directly by the generic media resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaHost {
    YouTube,
    YouTubeMusic,
    SoundCloud,
    Bandcamp,
    /// Any other http(s) link
    Web,
}

/// Routing decision for one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Short share link that must be expanded before classifying again
    ShareLink { platform: Platform, url: String },
    /// Catalog platform resolved through a platform resolver
    Catalog { platform: Platform, url: String },
    /// Direct link for the generic media resolver
    Media { host: MediaHost, url: String },
    /// Free-text search term
    Search(String),
}

struct Rule {
    pattern: Regex,
    route: Route,
}

#[derive(Clone, Copy)]
enum Route {
    Share(Platform),
    Catalog(Platform),
    Media(MediaHost),
}

fn rule(pattern: &str, route: Route) -> Rule {
    Rule {
        // Patterns are compile-time literals covered by tests below.
        pattern: Regex::new(pattern).expect("invalid classifier pattern"),
        route,
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            r"(?i)^https?://(?:spotify\.link|spoti\.fi)/\S+",
            Route::Share(Platform::Spotify),
        ),
        rule(
            r"(?i)^https?://(?:link\.deezer\.com|deezer\.page\.link)/\S+",
            Route::Share(Platform::Deezer),
        ),
        rule(r"(?i)^https?://tidal\.link/\S+", Route::Share(Platform::Tidal)),
        rule(r"(?i)^https?://amzn\.to/\S+", Route::Share(Platform::AmazonMusic)),
        rule(
            r"(?i)^https?://open\.spotify\.com/(?:intl-[a-z]{2}/)?(?:track|album|playlist|artist)/[A-Za-z0-9]+",
            Route::Catalog(Platform::Spotify),
        ),
        rule(
            r"(?i)^https?://(?:www\.)?deezer\.com/(?:[a-z]{2}/)?(?:track|album|playlist|artist)/\d+",
            Route::Catalog(Platform::Deezer),
        ),
        rule(
            r"(?i)^https?://(?:embed\.)?music\.apple\.com/[a-z]{2}/(?:album|playlist|song|artist)/",
            Route::Catalog(Platform::AppleMusic),
        ),
        rule(
            r"(?i)^https?://(?:listen\.|www\.)?tidal\.com/(?:browse/)?(?:track|album|playlist|mix)/[A-Za-z0-9-]+",
            Route::Catalog(Platform::Tidal),
        ),
        rule(
            r"(?i)^https?://music\.amazon\.[a-z.]+/(?:.*/)?(?:tracks|albums|playlists|artists)/[A-Za-z0-9]+",
            Route::Catalog(Platform::AmazonMusic),
        ),
        rule(
            r"(?i)^https?://music\.youtube\.com/",
            Route::Media(MediaHost::YouTubeMusic),
        ),
        rule(
            r"(?i)^https?://(?:(?:www|m)\.)?(?:youtube\.com|youtu\.be)/",
            Route::Media(MediaHost::YouTube),
        ),
        rule(
            r"(?i)^https?://(?:(?:www|m|on)\.)?soundcloud\.(?:com|app\.goo\.gl)/",
            Route::Media(MediaHost::SoundCloud),
        ),
        rule(
            r"(?i)^https?://[a-z0-9-]+\.bandcamp\.com/",
            Route::Media(MediaHost::Bandcamp),
        ),
    ]
});

static SPOTIFY_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^spotify:(track|album|playlist|artist):([A-Za-z0-9]+)$")
        .expect("invalid spotify uri pattern")
});

/// Classify an already-sanitized input
pub fn classify(input: &str) -> Classification {
    let input = input.trim();

    // spotify:track:ID style URIs are rewritten to their web form
    if let Some(caps) = SPOTIFY_URI.captures(input) {
        return Classification::Catalog {
            platform: Platform::Spotify,
            url: format!("https://open.spotify.com/{}/{}", &caps[1], &caps[2]),
        };
    }

    for rule in RULES.iter() {
        if rule.pattern.is_match(input) {
            let url = input.to_string();
            return match rule.route {
                Route::Share(platform) => Classification::ShareLink { platform, url },
                Route::Catalog(platform) => Classification::Catalog { platform, url },
                Route::Media(host) => Classification::Media { host, url },
            };
        }
    }

    if is_web_link(input) {
        return Classification::Media {
            host: MediaHost::Web,
            url: input.to_string(),
        };
    }

    Classification::Search(input.to_string())
}

fn is_web_link(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}
