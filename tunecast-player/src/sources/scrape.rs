//! HTML extraction helpers shared by the platform tiers
//!
//! Structured data is read from JSON-LD blocks, OpenGraph meta tags, and
//! JSON documents embedded in `<script>` elements.

use super::TrackPair;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

fn selector(css: &str) -> Selector {
    // Selectors are literals exercised by the tests in this module.
    Selector::parse(css).expect("invalid css selector")
}

static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));

/// Every JSON-LD object on the page (arrays and `@graph` flattened)
pub fn json_ld_objects(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let mut objects = Vec::new();

    for script in document.select(&JSON_LD) {
        let text: String = script.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(text.trim()) else {
            continue;
        };
        flatten_into(value, &mut objects);
    }
    objects
}

fn flatten_into(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => items.into_iter().for_each(|v| flatten_into(v, out)),
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_into(graph, out);
            }
            if !map.is_empty() {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// Track pairs described by schema.org music objects
///
/// Handles `MusicRecording`, and `MusicAlbum`/`MusicPlaylist` with
/// `track`/`tracks` given either as a list or as an `ItemList`. Tracks
/// without their own artist inherit the album's.
pub fn pairs_from_json_ld(objects: &[Value]) -> Vec<TrackPair> {
    let mut pairs = Vec::new();

    for object in objects {
        match schema_type(object).as_deref() {
            Some("MusicRecording") => {
                if let Some(pair) = recording_pair(object, "") {
                    pairs.push(pair);
                }
            }
            Some("MusicAlbum") | Some("MusicPlaylist") => {
                let parent_artist = artist_name(object).unwrap_or_default();
                for track in track_list(object) {
                    if let Some(pair) = recording_pair(track, &parent_artist) {
                        pairs.push(pair);
                    }
                }
            }
            _ => {}
        }
    }
    pairs
}

fn schema_type(object: &Value) -> Option<String> {
    match object.get("@type")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(types) => types.iter().find_map(|t| t.as_str().map(str::to_string)),
        _ => None,
    }
}

fn track_list(object: &Value) -> Vec<&Value> {
    let list = object.get("track").or_else(|| object.get("tracks"));
    match list {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item_list @ Value::Object(_)) => match item_list.get("itemListElement") {
            Some(Value::Array(elements)) => elements
                .iter()
                .map(|e| e.get("item").unwrap_or(e))
                .collect(),
            _ => vec![item_list],
        },
        _ => Vec::new(),
    }
}

fn recording_pair(track: &Value, fallback_artist: &str) -> Option<TrackPair> {
    let title = track.get("name")?.as_str()?;
    let artist = artist_name(track).unwrap_or_else(|| fallback_artist.to_string());
    let pair = TrackPair::new(title, artist);
    (!pair.title.is_empty()).then_some(pair)
}

fn artist_name(object: &Value) -> Option<String> {
    let by = object.get("byArtist").or_else(|| object.get("author"))?;
    let names: Vec<&str> = match by {
        Value::Array(artists) => artists
            .iter()
            .filter_map(|a| a.get("name").and_then(Value::as_str))
            .collect(),
        Value::Object(_) => by.get("name").and_then(Value::as_str).into_iter().collect(),
        Value::String(s) => vec![s.as_str()],
        _ => Vec::new(),
    };
    (!names.is_empty()).then(|| names.join(", "))
}

/// Content of a `<meta property=..>` or `<meta name=..>` tag
pub fn meta_content(html: &str, property: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let css = format!(r#"meta[property="{0}"], meta[name="{0}"]"#, property);
    let sel = Selector::parse(&css).ok()?;
    document
        .select(&sel)
        .find_map(|m| m.value().attr("content"))
        .map(str::to_string)
}

/// JSON body of `<script id="{id}">`
pub fn script_json_by_id(html: &str, id: &str) -> Option<Value> {
    let document = Html::parse_document(html);
    let sel = Selector::parse(&format!(r#"script[id="{}"]"#, id)).ok()?;
    let text: String = document.select(&sel).next()?.text().collect();
    serde_json::from_str(text.trim()).ok()
}

/// JSON value assigned to a script variable, e.g. `window.__STATE__ = {...};`
pub fn assigned_json(html: &str, variable: &str) -> Option<Value> {
    let start = html.find(variable)? + variable.len();
    let rest = html[start..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Joined `name` fields of an artist array
pub fn joined_names(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|a| a.get("name").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Object(o)) => o
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_ld_album_inherits_artist() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@context":"https://schema.org","@type":"MusicAlbum","name":"Discovery",
             "byArtist":{"@type":"MusicGroup","name":"Daft Punk"},
             "tracks":[{"@type":"MusicRecording","name":"One More Time"},
                       {"@type":"MusicRecording","name":"Aerodynamic"}]}
            </script></head><body></body></html>"#;

        let pairs = pairs_from_json_ld(&json_ld_objects(html));
        assert_eq!(
            pairs,
            vec![
                TrackPair::new("One More Time", "Daft Punk"),
                TrackPair::new("Aerodynamic", "Daft Punk"),
            ]
        );
    }

    #[test]
    fn test_json_ld_playlist_item_list() {
        let objects = vec![json!({
            "@type": "MusicPlaylist",
            "track": {"@type": "ItemList", "itemListElement": [
                {"@type": "ListItem", "item": {"name": "A", "byArtist": [{"name": "X"}, {"name": "Y"}]}},
                {"@type": "ListItem", "item": {"name": "B", "byArtist": {"name": "Z"}}}
            ]}
        })];

        let pairs = pairs_from_json_ld(&objects);
        assert_eq!(pairs, vec![TrackPair::new("A", "X, Y"), TrackPair::new("B", "Z")]);
    }

    #[test]
    fn test_json_ld_graph_and_invalid_blocks() {
        let html = r#"<script type="application/ld+json">not json</script>
            <script type="application/ld+json">{"@graph":[{"@type":"MusicRecording","name":"Solo","byArtist":"Someone"}]}</script>"#;
        let pairs = pairs_from_json_ld(&json_ld_objects(html));
        assert_eq!(pairs, vec![TrackPair::new("Solo", "Someone")]);
    }

    #[test]
    fn test_meta_and_script_json() {
        let html = r#"<head><meta property="og:title" content="Song - Artist">
            <script id="__NEXT_DATA__" type="application/json">{"a":{"b":1}}</script></head>"#;
        assert_eq!(meta_content(html, "og:title").as_deref(), Some("Song - Artist"));
        assert_eq!(meta_content(html, "og:image"), None);
        assert_eq!(script_json_by_id(html, "__NEXT_DATA__").unwrap()["a"]["b"], 1);
    }

    #[test]
    fn test_assigned_json_ignores_trailing_script() {
        let html = "<script>window.__STATE__ = {\"k\": [1, 2]}; console.log(1);</script>";
        assert_eq!(assigned_json(html, "window.__STATE__").unwrap()["k"][1], 2);
        assert!(assigned_json(html, "window.__MISSING__").is_none());
    }
}
