use serde::de::DeserializeOwned;
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use thiserror::Error;

use crate::intake::{Coordinates, IdentificationRequest, StagedUploads};
use crate::llm::{ChatProvider, ChatRequest, LlmError, chat_json};
use crate::models::{
    IdentifyResponse, PlantNetSummary, PlantProfile, RecommendationData, SpeciesCandidate,
};
use crate::plantnet::{IdentifyError, SpeciesIdentifier, candidate_from, results, select_best};
use crate::prompts::{
    PROFILE_SYSTEM_PROMPT, RECOMMEND_SYSTEM_PROMPT, enrichment_prompt, recommendation_prompt,
};

/// Confidence reported for name lookups, where no image recognition ran.
pub const NAME_LOOKUP_SCORE: f64 = 0.9;

const PROFILE_TEMPERATURE: f32 = 0.2;
const PROFILE_MAX_TOKENS: u32 = 800;
const RECOMMEND_TEMPERATURE: f32 = 0.3;
const RECOMMEND_MAX_TOKENS: u32 = 1200;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("identification failed: {0}")]
    Identify(#[from] IdentifyError),
    #[error("No identification results from PlantNet")]
    NoResults,
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Identification and recommendation flows over injected clients.
pub struct Pipeline {
    species: Arc<dyn SpeciesIdentifier>,
    llm: Arc<dyn ChatProvider>,
}

impl Pipeline {
    #[must_use]
    pub fn new(species: Arc<dyn SpeciesIdentifier>, llm: Arc<dyn ChatProvider>) -> Self {
        Self { species, llm }
    }

    /// Run one identification request to completion.
    ///
    /// Staged uploads are consumed and their files removed when this returns,
    /// on success or failure.
    ///
    /// # Errors
    ///
    /// Propagates identifier, empty-result and LLM failures. Nothing is retried.
    pub async fn identify(
        &self,
        req: IdentificationRequest,
    ) -> Result<IdentifyResponse, PipelineError> {
        match req {
            IdentificationRequest::Images(uploads) => self.identify_images(&uploads).await,
            IdentificationRequest::Name(name) => self.identify_name(&name).await,
        }
    }

    async fn identify_images(
        &self,
        uploads: &StagedUploads,
    ) -> Result<IdentifyResponse, PipelineError> {
        let raw = self
            .species
            .identify(uploads.images())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "species identification failed"))?;

        let best = select_best(results(&raw))
            .cloned()
            .ok_or(PipelineError::NoResults)?;
        let candidate = candidate_from(&best);
        tracing::info!(
            species = %candidate.scientific_name,
            family = %candidate.family,
            score = ?candidate.confidence_score,
            candidates = results(&raw).len(),
            "species identified"
        );

        let prompt = enrichment_prompt(
            &candidate.scientific_name,
            &candidate.family,
            Some(candidate.confidence_score.unwrap_or(0.0)),
        );
        let ai = self.profile(&prompt).await?;

        Ok(IdentifyResponse {
            plantnet: PlantNetSummary {
                raw,
                best_result: best,
                candidate,
            },
            ai,
        })
    }

    async fn identify_name(&self, name: &str) -> Result<IdentifyResponse, PipelineError> {
        tracing::info!(name, "looking up plant by name");
        let ai = self.profile(&enrichment_prompt(name, "", None)).await?;

        let candidate = SpeciesCandidate {
            scientific_name: ai.scientific_name.clone(),
            common_names: ai.common_names.clone(),
            family: ai.family.clone(),
            confidence_score: Some(NAME_LOOKUP_SCORE),
        };

        Ok(IdentifyResponse {
            plantnet: PlantNetSummary {
                raw: json!({}),
                best_result: json!({}),
                candidate,
            },
            ai,
        })
    }

    async fn profile(&self, prompt: &str) -> Result<PlantProfile, PipelineError> {
        let req = ChatRequest {
            system: PROFILE_SYSTEM_PROMPT,
            user: prompt,
            temperature: PROFILE_TEMPERATURE,
            max_tokens: PROFILE_MAX_TOKENS,
        };
        let js = chat_json(self.llm.as_ref(), &req).await?;
        Ok(decode_object(js)?)
    }

    /// Plant suggestions for a location. No identifier call is made.
    ///
    /// # Errors
    ///
    /// Propagates LLM transport, empty-response and parse failures.
    pub async fn recommend(&self, at: &Coordinates) -> Result<RecommendationData, PipelineError> {
        tracing::info!(
            latitude = at.latitude,
            longitude = at.longitude,
            address = at.address.as_deref().unwrap_or("-"),
            "building recommendations"
        );
        let prompt = recommendation_prompt(at);
        let req = ChatRequest {
            system: RECOMMEND_SYSTEM_PROMPT,
            user: &prompt,
            temperature: RECOMMEND_TEMPERATURE,
            max_tokens: RECOMMEND_MAX_TOKENS,
        };
        let js = chat_json(self.llm.as_ref(), &req).await?;
        Ok(decode_object(js)?)
    }
}

/// Recovered JSON must at least be an object to fill a typed record.
fn decode_object<T: DeserializeOwned>(js: JsonValue) -> Result<T, LlmError> {
    if !js.is_object() {
        return Err(LlmError::Parse {
            preview: js.to_string().chars().take(500).collect(),
        });
    }
    serde_json::from_value(js).map_err(|e| LlmError::Parse {
        preview: e.to_string(),
    })
}
