//! Share-link expansion
//!
//! Short links (`spotify.link`, `link.deezer.com`, `tidal.link`, ...) are
//! followed to their canonical page and classified again.

use super::{scrape, PageFetcher, ResolutionError};
use crate::classify::{classify, Classification};
use tracing::debug;

/// Redirect hops followed before giving up on a share link
pub const MAX_SHARE_HOPS: usize = 3;

/// Classify `input`, expanding share links to their canonical form first
pub async fn canonicalize(
    input: &str,
    fetcher: &dyn PageFetcher,
) -> Result<Classification, ResolutionError> {
    let mut classification = classify(input);

    for hop in 1..=MAX_SHARE_HOPS {
        let (platform, url) = match classification {
            Classification::ShareLink { platform, url } => (platform, url),
            other => return Ok(other),
        };

        let page = fetcher.fetch(&url).await.map_err(|e| ResolutionError {
            platform,
            reason: format!("share link {} could not be expanded: {}", url, e),
        })?;

        let target = if page.final_url != url {
            page.final_url
        } else {
            // No HTTP redirect: the landing page names its canonical URL.
            scrape::meta_content(&page.body, "og:url").ok_or_else(|| ResolutionError {
                platform,
                reason: format!("share link {} did not redirect", url),
            })?
        };

        debug!(platform = %platform, hop, from = %url, to = %target, "Share link expanded");
        classification = classify(&target);
    }

    match classification {
        Classification::ShareLink { platform, url } => Err(ResolutionError {
            platform,
            reason: format!("share link {} still unresolved after {} hops", url, MAX_SHARE_HOPS),
        }),
        other => Ok(other),
    }
}
