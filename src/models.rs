use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Map, Value as JsonValue};
use std::{path::PathBuf, sync::Arc};

use crate::pipeline::Pipeline;

/* ---------- App state ---------- */
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub upload_dir: PathBuf,
}

/* ---------- Species identifier ---------- */

/// Best match picked out of a `PlantNet` response.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SpeciesCandidate {
    pub scientific_name: String,
    pub common_names: Vec<String>,
    pub family: String,
    #[serde(rename = "score")]
    pub confidence_score: Option<f64>,
}

/// The `plantnet` half of an identification response.
#[derive(Serialize, Clone, Debug)]
pub struct PlantNetSummary {
    /// Untouched provider payload, for client-side display/debugging.
    pub raw: JsonValue,
    pub best_result: JsonValue,
    #[serde(flatten)]
    pub candidate: SpeciesCandidate,
}

#[derive(Serialize, Clone, Debug)]
pub struct IdentifyResponse {
    pub plantnet: PlantNetSummary,
    pub ai: PlantProfile,
}

/* ---------- LLM enrichment ---------- */

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Care {
    #[serde(default, deserialize_with = "text")]
    pub watering: String,
    #[serde(default, deserialize_with = "text")]
    pub sunlight: String,
    #[serde(default, deserialize_with = "text")]
    pub soil: String,
    #[serde(default, deserialize_with = "text")]
    pub temperature: String,
    #[serde(default, deserialize_with = "text")]
    pub fertilizer: String,
    #[serde(default, deserialize_with = "text")]
    pub pruning: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Care/description record produced by the LLM.
///
/// The model is asked for this shape but nothing forces it to comply, so every
/// field is optional on the way in and keys we don't know about are kept.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PlantProfile {
    #[serde(default, deserialize_with = "text")]
    pub scientific_name: String,
    #[serde(default, deserialize_with = "text_list")]
    pub common_names: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    pub family: String,
    #[serde(default, deserialize_with = "text")]
    pub category: String,
    #[serde(default, deserialize_with = "text")]
    pub short_description: String,
    #[serde(default, deserialize_with = "object_or_default")]
    pub care: Care,
    #[serde(default, deserialize_with = "text")]
    pub pests_and_diseases: String,
    #[serde(default, deserialize_with = "text")]
    pub medicinal_use: String,
    #[serde(default, deserialize_with = "text")]
    pub pet_friendly: String,
    #[serde(default, deserialize_with = "text")]
    pub typical_health_issues: String,
    #[serde(default, deserialize_with = "text")]
    pub recommended_action: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/* ---------- Location recommendations ---------- */

#[derive(Deserialize, Debug, Default)]
pub struct RecommendRequest {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LocationInfo {
    #[serde(default, deserialize_with = "text")]
    pub climate_zone: String,
    #[serde(default, deserialize_with = "text")]
    pub season: String,
    #[serde(default, deserialize_with = "text")]
    pub temperature_range: String,
    #[serde(default, deserialize_with = "text")]
    pub humidity: String,
    #[serde(default, deserialize_with = "text")]
    pub soil_type: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RecommendedPlant {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub scientific_name: String,
    #[serde(default, deserialize_with = "text")]
    pub category: String,
    /// "Easy" | "Medium" | "Hard", unchecked.
    #[serde(default, deserialize_with = "text")]
    pub difficulty: String,
    #[serde(default, deserialize_with = "text")]
    pub best_season: String,
    #[serde(default, deserialize_with = "text")]
    pub growth_time: String,
    #[serde(default, deserialize_with = "text")]
    pub benefits: String,
    #[serde(default, deserialize_with = "text")]
    pub care_tips: String,
    #[serde(default, deserialize_with = "text")]
    pub watering_frequency: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RecommendationData {
    #[serde(default, deserialize_with = "object_or_default")]
    pub location_info: LocationInfo,
    #[serde(default, deserialize_with = "object_list")]
    pub recommended_plants: Vec<RecommendedPlant>,
    #[serde(default, deserialize_with = "text")]
    pub seasonal_tips: String,
    #[serde(default, deserialize_with = "text")]
    pub local_considerations: String,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/* ---------- lenient field decoding ---------- */

/// Render any JSON value as display text. Arrays are joined with ", ".
#[must_use]
pub fn value_to_text(v: JsonValue) -> String {
    match v {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s,
        JsonValue::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    JsonValue::deserialize(d).map(value_to_text)
}

fn text_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let list = match JsonValue::deserialize(d)? {
        JsonValue::Null => vec![],
        JsonValue::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect(),
        other => {
            let s = value_to_text(other);
            if s.is_empty() { vec![] } else { vec![s] }
        }
    };
    Ok(list)
}

fn object_or_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    match JsonValue::deserialize(d)? {
        v @ JsonValue::Object(_) => serde_json::from_value(v).map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

fn object_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let JsonValue::Array(items) = JsonValue::deserialize(d)? else {
        return Ok(vec![]);
    };
    items
        .into_iter()
        .filter(JsonValue::is_object)
        .map(|v| serde_json::from_value(v).map_err(D::Error::custom))
        .collect()
}
