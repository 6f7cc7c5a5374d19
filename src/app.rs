use crate::config::{Config, LlmProvider};
use crate::intake::{MAX_IMAGE_BYTES, MAX_IMAGES};
use crate::llm::{ChatProvider, GeminiClient, OpenAiClient};
use crate::logging::log_payloads;
use crate::models::AppState;
use crate::pipeline::Pipeline;
use crate::plantnet::PlantNetClient;
use crate::routes::{identify, recommend};

use axum::body::Body;
use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::http::{Request, Response};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::{sync::Arc, time::Duration};

use tower::ServiceBuilder;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, info_span};

/// Room for a full upload plus the multipart framing and organ fields.
const BODY_LIMIT: usize = MAX_IMAGES * MAX_IMAGE_BYTES + 1024 * 1024;

async fn healthz() -> Json<&'static str> {
    Json("ok")
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Construct the provider clients once and wire them into the pipeline.
///
/// Missing API keys are not an error here; calls fail when a request needs them.
///
/// # Errors
///
/// Fails only if the HTTP client can't be built.
pub fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("bloombuddy/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let species = Arc::new(PlantNetClient::new(
        http.clone(),
        config.plantnet_api_url.clone(),
        config.plantnet_project.clone(),
        config.plantnet_api_key.clone(),
        config.plantnet_timeout(),
    ));

    let llm: Arc<dyn ChatProvider> = match config.llm_provider {
        LlmProvider::Openai => Arc::new(OpenAiClient::new(
            http,
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_timeout(),
        )),
        LlmProvider::Gemini => Arc::new(GeminiClient::new(
            http,
            config.gemini_api_url.clone(),
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.llm_timeout(),
        )),
    };

    Ok(AppState {
        pipeline: Arc::new(Pipeline::new(species, llm)),
        upload_dir: config.upload_dir(),
    })
}

pub fn build_app(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            let client_ip = req
                .extensions()
                .get::<ConnectInfo<std::net::SocketAddr>>()
                .map_or_else(|| "-".into(), |ci| ci.0.to_string());
            let rid = req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");

            info_span!("http", method=%req.method(), uri=%req.uri(), client_ip=%client_ip, request_id=%rid)
        })
        .on_request(|_req: &Request<Body>, _span: &Span| {
            tracing::info!("request started");
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &Span| {
            tracing::info!(status=%res.status(), latency_ms=%latency.as_millis(), "response completed");
        })
        .on_failure(|_class: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
            tracing::error!(latency_ms=%latency.as_millis(), "request failed");
        });

    // Request-ID is set first so the trace span and payload logs can see it.
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(trace)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors_layer())
        .layer(from_fn(log_payloads));

    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/identify",
            get(identify::by_name).post(identify::by_images),
        )
        .route("/api/recommend", post(recommend::recommend))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
        .layer(middleware)
}
