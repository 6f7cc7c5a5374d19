pub mod app;
pub mod config;
pub mod error;
pub mod intake;
pub mod llm;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod plantnet;
pub mod prompts;
pub mod routes;

pub use app::{build_app, build_state};
pub use models::AppState;
