use nanoid::nanoid;

use crate::data_models::{GroundingChunk, GroundingSource, Restaurant};

/// Block delimiter the model is instructed to emit between candidates.
pub const SEPARATOR: &str = "---SEPARATOR---";

/// Out-of-band signal for "zero results" inside otherwise free-text output.
pub const NO_MATCHES_SENTINEL: &str = "NO_MATCHES_FOUND";

const MAX_RESULTS: usize = 3;

const DEFAULT_CUISINE: &str = "Variety";
const DEFAULT_ADDRESS: &str = "Nearby";
const DEFAULT_RATING: &str = "N/A";
const DEFAULT_STATUS: &str = "Check hours";
const DEFAULT_REASON: &str = "Worth a try!";

pub fn contains_no_matches(raw_text: &str) -> bool {
    raw_text.contains(NO_MATCHES_SENTINEL)
}

/// Pull one labelled field out of a segment of model output.
///
/// Line-oriented and tolerant: the first line starting with `Label:` wins,
/// the value is the rest of that line trimmed. A missing label, or a label
/// with nothing after it, yields `None` and the caller applies its default.
pub fn extract_field(segment: &str, label: &str) -> Option<String> {
    for line in segment.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix(label) else {
            continue;
        };
        let Some(value) = rest.strip_prefix(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        return Some(value.to_string());
    }
    None
}

fn title_contains(source: Option<&GroundingSource>, needle: &str) -> bool {
    source
        .and_then(|s| s.title.as_deref())
        .map(|title| title.to_lowercase().contains(needle))
        .unwrap_or(false)
}

fn source_uri(source: Option<&GroundingSource>) -> Option<String> {
    source.and_then(|s| s.uri.clone())
}

/// Resolve a map link for a restaurant from the grounding chunks.
///
/// First chunk (in original order) whose web or maps title contains the name
/// case-insensitively wins; maps URI is preferred over web URI. Unanchored
/// substring matching is deliberate and can false-positive on short names.
pub fn resolve_map_link(name: &str, address: &str, chunks: &[GroundingChunk]) -> String {
    let needle = name.to_lowercase();
    let related = chunks.iter().find(|chunk| {
        title_contains(chunk.web.as_ref(), &needle) || title_contains(chunk.maps.as_ref(), &needle)
    });

    if let Some(chunk) = related {
        if let Some(uri) = source_uri(chunk.maps.as_ref()).or_else(|| source_uri(chunk.web.as_ref()))
        {
            return uri;
        }
    }

    fallback_search_url(name, address)
}

fn fallback_search_url(name: &str, address: &str) -> String {
    let query: String =
        url::form_urlencoded::byte_serialize(format!("{name} {address}").as_bytes()).collect();
    format!("https://www.google.com/maps/search/?api=1&query={query}")
}

/// Convert raw model output plus grounding metadata into restaurant records.
///
/// Segments without a parsable non-empty name are dropped silently, every
/// other missing field falls back to its default, and the result is capped at
/// three records in order of appearance.
pub fn parse_response(raw_text: &str, chunks: &[GroundingChunk]) -> Vec<Restaurant> {
    if contains_no_matches(raw_text) {
        return Vec::new();
    }

    let mut restaurants = Vec::new();

    for (index, segment) in raw_text.split(SEPARATOR).enumerate() {
        let Some(name) = extract_field(segment, "Name") else {
            continue;
        };

        let address = extract_field(segment, "Address");
        let google_map_link = resolve_map_link(&name, address.as_deref().unwrap_or(""), chunks);

        restaurants.push(Restaurant {
            id: format!("rest-{index}-{}", nanoid!(8)),
            name,
            cuisine: extract_field(segment, "Cuisine")
                .unwrap_or_else(|| DEFAULT_CUISINE.to_string()),
            address: address.unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            rating: extract_field(segment, "Rating").unwrap_or_else(|| DEFAULT_RATING.to_string()),
            open_status: extract_field(segment, "Status")
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            reason: extract_field(segment, "Reason").unwrap_or_else(|| DEFAULT_REASON.to_string()),
            google_map_link,
        });

        if restaurants.len() == MAX_RESULTS {
            break;
        }
    }

    restaurants
}

#[test]
fn test_extract_field_takes_first_match_and_trims() {
    let segment = "Name:   Thai Palace  \nCuisine: Thai\nName: Second";
    assert_eq!(extract_field(segment, "Name").as_deref(), Some("Thai Palace"));
    assert_eq!(extract_field(segment, "Cuisine").as_deref(), Some("Thai"));
}

#[test]
fn test_extract_field_missing_or_blank_is_none() {
    assert_eq!(extract_field("Cuisine: Thai", "Name"), None);
    assert_eq!(extract_field("Name:   \nCuisine: Thai", "Name"), None);
    // A longer word starting with the label is not the label.
    assert_eq!(extract_field("Nameplate: brass", "Name"), None);
}
