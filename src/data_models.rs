use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
}

/// Search parameters posted by the client. `location_query` stays optional so
/// the handler can reject a missing value with its own 400 body instead of a
/// deserialization error.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub location_query: Option<String>,
    #[serde(default = "default_cuisine")]
    pub cuisine: String,
    #[serde(default)]
    pub exclude_names: Vec<String>,
    #[serde(default)]
    pub coords: Option<GeoLocation>,
    #[serde(default = "default_radius")]
    pub radius: String,
}

fn default_cuisine() -> String {
    "Any".to_string()
}

fn default_radius() -> String {
    "15".to_string()
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub cuisine: String,
    pub address: String,
    pub rating: String,
    pub open_status: String,
    pub reason: String,
    pub google_map_link: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub restaurants: Vec<Restaurant>,
    pub raw_text: String,
}

/// Citation metadata the model attaches to generated text, linking it to a
/// web or maps source.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct GroundingChunk {
    pub web: Option<GroundingSource>,
    pub maps: Option<GroundingSource>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct GroundingSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}
