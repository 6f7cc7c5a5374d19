use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use std::{sync::LazyLock, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{provider} API key is not configured")]
    NotConfigured { provider: &'static str },
    #[error("AI request timed out")]
    Timeout,
    #[error("AI request failed: {detail}")]
    Upstream { status: Option<u16>, detail: String },
    #[error("AI did not return a response")]
    EmptyResponse,
    #[error("Failed to parse AI JSON response")]
    Parse { preview: String },
}

impl LlmError {
    fn from_transport(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Upstream {
                status: e.status().map(|s| s.as_u16()),
                detail: e.to_string(),
            }
        }
    }
}

/// One system + user exchange.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A chat-completion backend.
///
/// `complete` returns the assistant's raw text, or `None` when the call
/// succeeded but carried no content.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, req: &ChatRequest<'_>) -> Result<Option<String>, LlmError>;
}

/// Ask the provider for JSON and recover it from the reply.
///
/// # Errors
///
/// [`LlmError::EmptyResponse`] when the reply has no text,
/// [`LlmError::Parse`] when no JSON can be recovered, or the provider's own
/// transport error.
pub async fn chat_json(
    provider: &dyn ChatProvider,
    req: &ChatRequest<'_>,
) -> Result<JsonValue, LlmError> {
    let content = provider
        .complete(req)
        .await?
        .filter(|c| !c.trim().is_empty())
        .ok_or(LlmError::EmptyResponse)?;

    parse_llm_json(&content).inspect_err(|_| {
        tracing::warn!(
            provider = provider.name(),
            preview = %preview(&content),
            "AI reply is not JSON"
        );
    })
}

/// Two-stage JSON recovery for model output.
///
/// 1. parse the whole text;
/// 2. otherwise parse the span from the first `{` to a `}` that ends the text.
///
/// Anything else (prose only, JSON followed by a trailing newline or a closing
/// code fence) is a parse error.
///
/// # Errors
///
/// Returns [`LlmError::Parse`] when both stages fail.
pub fn parse_llm_json(content: &str) -> Result<JsonValue, LlmError> {
    if let Ok(js) = serde_json::from_str::<JsonValue>(content) {
        return Ok(js);
    }
    extract_trailing_object(content)
        .and_then(|s| serde_json::from_str::<JsonValue>(s).ok())
        .ok_or_else(|| LlmError::Parse {
            preview: preview(content),
        })
}

/// Greedy `{ ... }` match anchored at the end of the text.
#[must_use]
pub fn extract_trailing_object(s: &str) -> Option<&str> {
    static TRAILING_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{[\s\S]*\}$").expect("static regex"));
    TRAILING_RE.find(s).map(|m| m.as_str())
}

fn preview(s: &str) -> String {
    s.chars().take(500).collect()
}

/* ---------------- OpenAI-compatible ---------------- */

/// `/chat/completions` client for `OpenAI`, `OpenRouter` and compatible APIs.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    pub base: String,
    pub token: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl OpenAiClient {
    #[must_use]
    pub const fn new(
        http: reqwest::Client,
        base: String,
        token: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            token,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        "LLM"
    }

    async fn complete(&self, req: &ChatRequest<'_>) -> Result<Option<String>, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        let token = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(LlmError::NotConfigured {
                provider: self.name(),
            })?;

        let url = format!("{}/chat/completions", self.base.trim_end_matches('/'));
        let body = Body {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: req.system,
                },
                Msg {
                    role: "user",
                    content: req.user,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        if !status.is_success() {
            return Err(LlmError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("LLM HTTP {status}: {}", preview(&text)),
            });
        }

        let envelope: JsonValue = serde_json::from_str(&text).map_err(|e| LlmError::Upstream {
            status: Some(status.as_u16()),
            detail: format!("invalid completion envelope: {e}"),
        })?;

        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(JsonValue::as_str)
            .or_else(|| {
                envelope
                    .pointer("/choices/0/text")
                    .and_then(JsonValue::as_str)
            })
            .map(ToString::to_string);

        Ok(content)
    }
}

/* ---------------- Gemini ---------------- */

/// Google Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    pub base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl GeminiClient {
    #[must_use]
    pub const fn new(
        http: reqwest::Client,
        base: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base,
            api_key,
            model,
            timeout,
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "Gemini"
    }

    async fn complete(&self, req: &ChatRequest<'_>) -> Result<Option<String>, LlmError> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::NotConfigured {
                provider: self.name(),
            })?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.base.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "systemInstruction": { "parts": [{ "text": req.system }] },
            "contents": [{ "role": "user", "parts": [{ "text": req.user }] }],
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens,
                "candidateCount": 1
            }
        });

        let resp = self
            .http
            .post(url)
            .query(&[("key", key)])
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        if !status.is_success() {
            return Err(LlmError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("Gemini HTTP {status}: {}", preview(&text)),
            });
        }

        let envelope: JsonValue = serde_json::from_str(&text).map_err(|e| LlmError::Upstream {
            status: Some(status.as_u16()),
            detail: format!("invalid Gemini envelope: {e}"),
        })?;

        let parts = envelope
            .pointer("/candidates/0/content/parts")
            .and_then(JsonValue::as_array);
        let content: String = parts
            .into_iter()
            .flatten()
            .filter_map(|p| p.get("text").and_then(JsonValue::as_str))
            .collect();

        Ok(Some(content).filter(|c| !c.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_json_parses_first() {
        let raw = r#"{"scientific_name":"Aloe vera","common_names":["Aloe"]}"#;
        let v = parse_llm_json(raw).unwrap();
        assert_eq!(v, serde_json::from_str::<JsonValue>(raw).unwrap());
    }

    #[test]
    fn prose_prefixed_json_is_recovered() {
        let embedded = r#"{"scientific_name":"Aloe vera","care":{"watering":"sparingly"}}"#;
        let raw = format!("Here is the data:\n{embedded}");
        let v = parse_llm_json(&raw).unwrap();
        assert_eq!(v, serde_json::from_str::<JsonValue>(embedded).unwrap());
    }

    #[test]
    fn plain_prose_is_a_parse_error() {
        let err = parse_llm_json("Sorry, I cannot identify that plant.").unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
        assert_eq!(err.to_string(), "Failed to parse AI JSON response");
    }

    #[test]
    fn match_must_reach_end_of_text() {
        // a trailing newline or closing fence defeats the anchored match
        assert!(parse_llm_json("Result:\n{\"a\":1}\n").is_err());
        assert!(parse_llm_json("```json\n{\"a\":1}\n```").is_err());
        assert_eq!(extract_trailing_object("```json\n{\"a\":1}\n```"), None);
    }

    #[test]
    fn greedy_match_starts_at_first_brace() {
        // braces in the leading prose swallow the real object
        let raw = r#"Use {curly} keys: {"a":1}"#;
        assert_eq!(extract_trailing_object(raw), Some(r#"{curly} keys: {"a":1}"#));
        assert!(parse_llm_json(raw).is_err());
    }

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl ChatProvider for Canned {
        fn name(&self) -> &'static str {
            "canned"
        }
        async fn complete(&self, _req: &ChatRequest<'_>) -> Result<Option<String>, LlmError> {
            Ok(self.0.map(ToString::to_string))
        }
    }

    const REQ: ChatRequest<'static> = ChatRequest {
        system: "s",
        user: "u",
        temperature: 0.2,
        max_tokens: 800,
    };

    #[tokio::test]
    async fn empty_reply_is_distinct_from_parse_failure() {
        let err = chat_json(&Canned(None), &REQ).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));

        let err = chat_json(&Canned(Some("  \n")), &REQ).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));

        let err = chat_json(&Canned(Some("no json here")), &REQ).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = OpenAiClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9".into(),
            Some("   ".into()),
            "m".into(),
            Duration::from_secs(1),
        );
        let err = client.complete(&REQ).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { provider: "LLM" }));
    }
}
