//! Prompt text for the enrichment and recommendation flows.

use crate::intake::Coordinates;

pub const PROFILE_SYSTEM_PROMPT: &str =
    "You must return only valid JSON matching the requested schema.";

pub const RECOMMEND_SYSTEM_PROMPT: &str =
    "You are a plant expert providing location-specific recommendations. Return only valid JSON.";

const PROFILE_SCHEMA: &str = r#"{
  "scientific_name": "string",
  "common_names": ["string"],
  "family": "string",
  "category": "string",
  "short_description": "string",
  "care": {
    "watering": "string",
    "sunlight": "string",
    "soil": "string",
    "temperature": "string",
    "fertilizer": "string",
    "pruning": "string"
  },
  "pests_and_diseases": "string",
  "medicinal_use": "string",
  "pet_friendly": "string",
  "typical_health_issues": "string",
  "recommended_action": "string"
}"#;

const RECOMMEND_SCHEMA: &str = r#"{
  "location_info": {
    "climate_zone": "string",
    "season": "string",
    "temperature_range": "string",
    "humidity": "string",
    "soil_type": "string"
  },
  "recommended_plants": [
    {
      "name": "string",
      "scientific_name": "string",
      "category": "string",
      "difficulty": "Easy|Medium|Hard",
      "best_season": "string",
      "growth_time": "string",
      "benefits": "string",
      "care_tips": "string",
      "watering_frequency": "string"
    }
  ],
  "seasonal_tips": "string",
  "local_considerations": "string"
}"#;

fn or_unknown(s: &str) -> &str {
    let s = s.trim();
    if s.is_empty() { "unknown" } else { s }
}

/// Build the care-profile prompt for a species.
///
/// `confidence` is the identifier's score; `None` means the name was typed by
/// the user rather than recognised from a photo.
#[must_use]
pub fn enrichment_prompt(species_name: &str, family: &str, confidence: Option<f64>) -> String {
    let subject = if confidence.is_some() {
        "the species identified below"
    } else {
        "the plant name below"
    };
    let confidence = confidence.map_or_else(
        || "not available (name supplied by the user)".to_string(),
        |c| c.to_string(),
    );

    format!(
        r#"You are a plant-care assistant. Given {subject}, produce a single JSON object (no surrounding text) with the following fields:
{PROFILE_SCHEMA}

Species info:
- scientific_name: "{name}"
- family: "{family}"
- identification_confidence: {confidence}

Return valid JSON only. If you are unsure about any field, provide a best-effort reasonable value and mark it with the word 'approx' in the text."#,
        name = or_unknown(species_name),
        family = or_unknown(family),
    )
}

#[must_use]
pub fn recommendation_prompt(at: &Coordinates) -> String {
    let place = at
        .address
        .as_deref()
        .map(|a| format!(" in {a}"))
        .unwrap_or_default();

    format!(
        r"You are a plant expert. Based on the location coordinates ({lat}, {lon}){place}, recommend the best plants to grow in this area. Consider climate, soil conditions, and local growing conditions.

Provide recommendations in this exact JSON format:
{RECOMMEND_SCHEMA}

Return only valid JSON with 5-8 plant recommendations.",
        lat = at.latitude,
        lon = at.longitude,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_embeds_species_and_schema() {
        let p = enrichment_prompt("Monstera deliciosa", "Araceae", Some(0.87));
        assert!(p.contains(r#"scientific_name: "Monstera deliciosa""#));
        assert!(p.contains(r#"family: "Araceae""#));
        assert!(p.contains("identification_confidence: 0.87"));
        assert!(p.contains(r#""pet_friendly": "string""#));
        assert!(p.contains("Return valid JSON only."));
    }

    #[test]
    fn enrichment_fills_unknowns() {
        let p = enrichment_prompt("  ", "", None);
        assert!(p.contains(r#"scientific_name: "unknown""#));
        assert!(p.contains(r#"family: "unknown""#));
        assert!(p.contains("name supplied by the user"));
        assert!(p.contains("Given the plant name below"));
    }

    #[test]
    fn recommendation_mentions_address_only_when_given() {
        let mut at = Coordinates {
            latitude: 48.85,
            longitude: 2.35,
            address: None,
        };
        let p = recommendation_prompt(&at);
        assert!(p.contains("(48.85, 2.35), recommend"));
        assert!(p.contains("5-8 plant recommendations"));

        at.address = Some("Paris, France".into());
        assert!(recommendation_prompt(&at).contains("(48.85, 2.35) in Paris, France, recommend"));
    }
}
