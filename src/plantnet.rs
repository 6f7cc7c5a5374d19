use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

use crate::intake::StagedImage;
use crate::models::SpeciesCandidate;

#[derive(Debug, Error)]
pub enum IdentifyError {
    #[error("PlantNet API key is not configured")]
    NotConfigured,
    #[error("PlantNet request timed out")]
    Timeout,
    #[error("PlantNet request failed: {detail}")]
    Upstream { status: Option<u16>, detail: String },
    #[error("unsupported image content type {0:?}")]
    InvalidImage(String),
    #[error("failed to read staged image: {0}")]
    Io(#[from] std::io::Error),
}

impl IdentifyError {
    /// Status code reported by the provider, if it got that far.
    #[must_use]
    pub const fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

/// Image-based species recognition.
///
/// Returns the provider's raw JSON; candidate selection happens in the caller.
#[async_trait]
pub trait SpeciesIdentifier: Send + Sync {
    async fn identify(&self, images: &[StagedImage]) -> Result<JsonValue, IdentifyError>;
}

#[derive(Debug, Clone)]
pub struct PlantNetClient {
    http: reqwest::Client,
    pub base: String,
    pub project: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl PlantNetClient {
    #[must_use]
    pub const fn new(
        http: reqwest::Client,
        base: String,
        project: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            project,
            api_key,
            timeout,
        }
    }

    async fn form(images: &[StagedImage]) -> Result<Form, IdentifyError> {
        let mut form = Form::new();
        for img in images {
            let bytes = tokio::fs::read(&img.path).await?;
            let part = Part::bytes(bytes)
                .file_name(img.file_name.clone())
                .mime_str(&img.content_type)
                .map_err(|_| IdentifyError::InvalidImage(img.content_type.clone()))?;
            form = form.text("organs", img.organ.clone()).part("images", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl SpeciesIdentifier for PlantNetClient {
    async fn identify(&self, images: &[StagedImage]) -> Result<JsonValue, IdentifyError> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(IdentifyError::NotConfigured)?;

        let url = format!(
            "{}/v2/identify/{}",
            self.base.trim_end_matches('/'),
            self.project
        );
        let form = Self::form(images).await?;

        let resp = self
            .http
            .post(url)
            .query(&[("api-key", key)])
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            return Err(IdentifyError::Upstream {
                status: Some(status.as_u16()),
                detail: text.chars().take(500).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| IdentifyError::Upstream {
            status: Some(status.as_u16()),
            detail: format!("invalid PlantNet JSON: {e}"),
        })
    }
}

fn transport_error(e: &reqwest::Error) -> IdentifyError {
    if e.is_timeout() {
        IdentifyError::Timeout
    } else {
        IdentifyError::Upstream {
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        }
    }
}

/// The `results` array of a `PlantNet` payload; empty when absent.
#[must_use]
pub fn results(raw: &JsonValue) -> &[JsonValue] {
    raw.get("results")
        .and_then(JsonValue::as_array)
        .map_or(&[][..], Vec::as_slice)
}

fn score(result: &JsonValue) -> Option<f64> {
    result.get("score").and_then(JsonValue::as_f64)
}

/// Highest-scoring result, scanning left to right.
///
/// Only a strictly greater score replaces the running best, so ties and
/// results without a score keep the earlier entry.
#[must_use]
pub fn select_best(results: &[JsonValue]) -> Option<&JsonValue> {
    let (first, rest) = results.split_first()?;
    Some(rest.iter().fold(first, |best, cur| {
        let best_score = score(best).unwrap_or(-1.0);
        if score(cur).is_some_and(|s| s > best_score) {
            cur
        } else {
            best
        }
    }))
}

#[must_use]
pub fn candidate_from(result: &JsonValue) -> SpeciesCandidate {
    let species = result.get("species");
    let text_at = |ptr: &str| {
        species
            .and_then(|s| s.pointer(ptr))
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let common_names = species
        .and_then(|s| s.get("commonNames"))
        .and_then(JsonValue::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(JsonValue::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();

    SpeciesCandidate {
        scientific_name: text_at("/scientificNameWithoutAuthor"),
        common_names,
        family: text_at("/family/scientificNameWithoutAuthor"),
        confidence_score: score(result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(name: &str, score: JsonValue) -> JsonValue {
        json!({
            "score": score,
            "species": {
                "scientificNameWithoutAuthor": name,
                "family": { "scientificNameWithoutAuthor": "Araceae" },
                "commonNames": ["Swiss cheese plant", 7]
            }
        })
    }

    #[test]
    fn best_score_dominates_every_other() {
        let lists = [
            vec![0.1, 0.7, 0.3],
            vec![0.9],
            vec![0.2, 0.2, 0.95, 0.94],
            vec![0.0, 0.0],
            vec![0.5, 0.6, 0.7, 0.8, 0.1],
        ];
        for scores in lists {
            let rs: Vec<JsonValue> = scores.iter().map(|s| result("x", json!(s))).collect();
            let best = score(select_best(&rs).unwrap()).unwrap();
            assert!(scores.iter().all(|s| best >= *s), "{scores:?}");
        }
    }

    #[test]
    fn ties_keep_the_first_entry() {
        let rs = vec![
            result("A", json!(0.4)),
            result("B", json!(0.8)),
            result("C", json!(0.8)),
        ];
        let best = candidate_from(select_best(&rs).unwrap());
        assert_eq!(best.scientific_name, "B");
    }

    #[test]
    fn missing_scores_default_to_first() {
        let rs = vec![result("A", JsonValue::Null), result("B", JsonValue::Null)];
        assert_eq!(candidate_from(select_best(&rs).unwrap()).scientific_name, "A");
    }

    #[test]
    fn empty_results_select_nothing() {
        assert!(select_best(&[]).is_none());
        assert!(results(&json!({ "query": {} })).is_empty());
        assert!(results(&json!({ "results": "nope" })).is_empty());
    }

    #[test]
    fn candidate_reads_species_fields() {
        let c = candidate_from(&result("Monstera deliciosa", json!(0.87)));
        assert_eq!(
            c,
            SpeciesCandidate {
                scientific_name: "Monstera deliciosa".into(),
                common_names: vec!["Swiss cheese plant".into()],
                family: "Araceae".into(),
                confidence_score: Some(0.87),
            }
        );

        let bare = candidate_from(&json!({}));
        assert_eq!(bare, SpeciesCandidate::default());
    }
}
