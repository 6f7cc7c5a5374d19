use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::intake::IntakeError;
use crate::llm::LlmError;
use crate::pipeline::PipelineError;
use crate::plantnet::IdentifyError;

#[derive(Debug)]
pub enum AppError {
    /// Return just a status code with an empty body.
    Status(StatusCode),
    /// Return a status code with a JSON `{"error": ...}` body.
    Msg(StatusCode, String),
    /// A provider call failed; detail is logged, not sent to the client.
    Upstream {
        status: StatusCode,
        message: &'static str,
        upstream_status: Option<u16>,
        detail: String,
    },
    /// Internal error -> 500 with JSON body; logged.
    Anyhow(anyhow::Error),
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        Self::Status(code)
    }
}

impl From<(StatusCode, String)> for AppError {
    fn from((code, msg): (StatusCode, String)) -> Self {
        Self::Msg(code, msg)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Anyhow(e)
    }
}

/* ---- Narrow, explicit conversions so `?` works everywhere ---- */

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Anyhow(e.into())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Self::Msg(StatusCode::BAD_REQUEST, format!("multipart error: {e}"))
    }
}

impl From<IntakeError> for AppError {
    fn from(e: IntakeError) -> Self {
        match e {
            IntakeError::Io(io) => io.into(),
            IntakeError::Multipart(m) => m.into(),
            IntakeError::ImageTooLarge => Self::Msg(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
            IntakeError::MissingName
            | IntakeError::NoImages
            | IntakeError::TooManyImages
            | IntakeError::MissingCoordinates => Self::Msg(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
}

impl From<IdentifyError> for AppError {
    fn from(e: IdentifyError) -> Self {
        match e {
            IdentifyError::InvalidImage(_) => Self::Msg(StatusCode::BAD_REQUEST, e.to_string()),
            IdentifyError::NotConfigured => {
                Self::Msg(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            _ => {
                let upstream_status = e.upstream_status();
                // provider error statuses are passed through, anything else is a 500
                let status = upstream_status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Self::Upstream {
                    status,
                    message: "Identification failed",
                    upstream_status,
                    detail: e.to_string(),
                }
            }
        }
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::EmptyResponse => Self::Msg(StatusCode::BAD_GATEWAY, e.to_string()),
            LlmError::Parse { ref preview } => Self::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Failed to parse AI JSON response",
                upstream_status: None,
                detail: preview.clone(),
            },
            LlmError::NotConfigured { .. } => {
                Self::Msg(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            LlmError::Timeout => Self::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "AI request failed",
                upstream_status: None,
                detail: e.to_string(),
            },
            LlmError::Upstream { status, ref detail } => Self::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "AI request failed",
                upstream_status: status,
                detail: detail.clone(),
            },
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Identify(e) => e.into(),
            PipelineError::NoResults => Self::Msg(StatusCode::NOT_FOUND, e.to_string()),
            PipelineError::Llm(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Status(code) => code.into_response(), // empty body
            Self::Msg(code, msg) => {
                if code.is_server_error() {
                    tracing::error!(status = %code, "{msg}");
                } else {
                    tracing::warn!(status = %code, "{msg}");
                }
                let body = Json(ErrBody {
                    error: msg,
                    upstream_status: None,
                });
                (code, body).into_response()
            }
            Self::Upstream {
                status,
                message,
                upstream_status,
                detail,
            } => {
                tracing::error!(status = %status, upstream_status = ?upstream_status, detail = %detail, "{message}");
                let body = Json(ErrBody {
                    error: message.to_string(),
                    upstream_status,
                });
                (status, body).into_response()
            }
            Self::Anyhow(err) => {
                tracing::error!("{:#}", err);
                let body = Json(ErrBody {
                    error: err.to_string(),
                    upstream_status: None,
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: impl Into<AppError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn provider_error_statuses_pass_through() {
        let e = IdentifyError::Upstream {
            status: Some(503),
            detail: "down".into(),
        };
        assert_eq!(status_of(e), StatusCode::SERVICE_UNAVAILABLE);

        let e = IdentifyError::Upstream {
            status: Some(302),
            detail: "moved".into(),
        };
        assert_eq!(status_of(e), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(IdentifyError::Timeout), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn pipeline_errors_stay_distinct() {
        assert_eq!(status_of(PipelineError::NoResults), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(PipelineError::Llm(LlmError::EmptyResponse)),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(PipelineError::Llm(LlmError::Parse {
                preview: String::new()
            })),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status_of(IntakeError::MissingName), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(IntakeError::ImageTooLarge), StatusCode::PAYLOAD_TOO_LARGE);
    }

    async fn render(e: impl Into<AppError>) -> (StatusCode, serde_json::Value) {
        let res = e.into().into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn ai_transport_failures_are_500() {
        let (status, body) = render(LlmError::Upstream {
            status: Some(503),
            detail: "LLM HTTP 503: overloaded".into(),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI request failed");
        assert_eq!(body["upstream_status"], 503);

        let (status, body) = render(LlmError::Timeout).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI request failed");
        assert!(body.get("upstream_status").is_none());
    }
}
