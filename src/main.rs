#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::multiple_crate_versions)]

use std::net::SocketAddr;

use bloombuddy::{
    build_app, build_state,
    config::{Cli, LlmProvider},
    logging::init_logging,
};
use clap::Parser;
use tokio::net::TcpListener;

fn set_or_not(v: Option<&String>) -> &'static str {
    if v.is_some_and(|k| !k.trim().is_empty()) {
        "<set>"
    } else {
        "<not set>"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Cli::parse().config;

    // Keep guard alive so file logger flushes correctly
    let _log_guards = init_logging(&config);

    // Log all configuration (mask sensitive values)
    tracing::info!("=== Configuration ===");
    tracing::info!("Bind address: {}", config.bind);
    tracing::info!("Log file: {}", config.log_file.display());
    tracing::info!("Upload directory: {}", config.upload_dir().display());
    tracing::info!("PlantNet API URL: {}", config.plantnet_api_url);
    tracing::info!("PlantNet project: {}", config.plantnet_project);
    tracing::info!(
        "PlantNet API key: {}",
        set_or_not(config.plantnet_api_key.as_ref())
    );
    tracing::info!("PlantNet timeout: {}s", config.plantnet_timeout_secs);
    tracing::info!("LLM provider: {:?}", config.llm_provider);
    match config.llm_provider {
        LlmProvider::Openai => {
            tracing::info!("LLM API URL: {}", config.llm_api_url);
            tracing::info!("LLM model: {}", config.llm_model);
            tracing::info!("LLM API key: {}", set_or_not(config.llm_api_key.as_ref()));
        }
        LlmProvider::Gemini => {
            tracing::info!("Gemini API URL: {}", config.gemini_api_url);
            tracing::info!("Gemini model: {}", config.gemini_model);
            tracing::info!(
                "Gemini API key: {}",
                set_or_not(config.gemini_api_key.as_ref())
            );
        }
    }
    tracing::info!("LLM timeout: {}s", config.llm_timeout_secs);
    tracing::info!("====================");

    tokio::fs::create_dir_all(config.upload_dir()).await?;

    let state = build_state(&config)?;
    let app = build_app(state);

    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("listening on {}", config.bind);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
