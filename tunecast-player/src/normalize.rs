//! Input normalization
//!
//! User input and platform metadata arrive with stray control characters,
//! zero-width characters and irregular whitespace. Everything that becomes a
//! query or a cache key passes through here first.

/// Strip control characters and collapse whitespace runs to one space
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for c in input.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if c.is_control() || is_invisible(c) {
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }

    out
}

/// Cache key for a (title, artist) pair
///
/// Keys are sanitized and lower-cased so that case and spacing differences
/// between platforms map to the same entry.
pub fn cache_key(title: &str, artist: &str) -> String {
    normalize_key(&format!("{} {}", title, artist))
}

/// Normalize an arbitrary string into cache-key form
pub fn normalize_key(raw: &str) -> String {
    sanitize(raw).to_lowercase()
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  never \t gonna\n\ngive  "), "never gonna give");
    }

    #[test]
    fn test_sanitize_strips_control_and_zero_width() {
        assert_eq!(sanitize("ab\u{0007}c\u{200B}d"), "abcd");
        assert_eq!(sanitize("\u{FEFF}title"), "title");
    }

    #[test]
    fn test_cache_key_is_case_insensitive() {
        assert_eq!(
            cache_key("Bohemian  Rhapsody", "QUEEN"),
            cache_key("bohemian rhapsody", "Queen")
        );
        assert_eq!(cache_key("Song", "Artist"), "song artist");
    }

    #[test]
    fn test_cache_key_with_empty_artist_has_no_trailing_space() {
        assert_eq!(cache_key("Intro", ""), "intro");
    }

    #[test]
    fn test_sanitize_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" \n\t "), "");
    }
}
