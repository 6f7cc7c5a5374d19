use crate::config::Config;

use axum::body::Body;
use axum::http::{Request, Response, header};
use axum::middleware::Next;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const BODY_LIMIT: usize = 64 * 1024;
const PREVIEW_LIMIT: usize = 16 * 1024;

/// Keep guards alive for the lifetime of the app.
pub struct LogGuards {
    _file_guard: WorkerGuard,
}

fn split_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file = path
        .file_name()
        .unwrap_or_else(|| OsStr::new("bloombuddy.logs"))
        .to_string_lossy()
        .to_string();
    (dir, file)
}

pub fn init_logging(config: &Config) -> LogGuards {
    let filter = EnvFilter::new(config.log_filter());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .compact()
        .with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()));

    let (dir, file) = split_path(&config.log_file);
    let appender = tracing_appender::rolling::never(dir, file);
    let (nb, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_timer(fmt::time::ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_writer(nb);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    LogGuards { _file_guard: guard }
}

fn preview(bytes: &[u8]) -> String {
    if bytes.len() > PREVIEW_LIMIT {
        format!(
            "{}… [truncated]",
            String::from_utf8_lossy(&bytes[..PREVIEW_LIMIT])
        )
    } else {
        String::from_utf8_lossy(bytes).to_string()
    }
}

fn content_type(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

/// Logs request & response bodies at debug level.
/// Skips multipart uploads and binary responses, truncates previews.
pub async fn log_payloads(req: Request<Body>, next: Next) -> Response<Body> {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return next.run(req).await;
    }

    let req_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let req_ct = content_type(req.headers());
    let (req_parts, req_body) = req.into_parts();
    let req = if req_ct.starts_with("multipart/") {
        Request::from_parts(req_parts, req_body)
    } else {
        match axum::body::to_bytes(req_body, BODY_LIMIT).await {
            Ok(bytes) => {
                tracing::debug!(request_id=%req_id, request_body=%preview(&bytes), "request body");
                Request::from_parts(req_parts, Body::from(bytes))
            }
            Err(e) => {
                tracing::warn!(request_id=%req_id, error=%e, "failed reading request body");
                Request::from_parts(req_parts, Body::empty())
            }
        }
    };

    let res = next.run(req).await;

    let res_ct = content_type(res.headers());
    if !res_ct.starts_with("application/json") && !res_ct.starts_with("text/") {
        return res;
    }
    let (res_parts, res_body) = res.into_parts();
    match axum::body::to_bytes(res_body, usize::MAX).await {
        Ok(bytes) => {
            tracing::debug!(request_id=%req_id, response_body=%preview(&bytes), "response body");
            Response::from_parts(res_parts, Body::from(bytes))
        }
        Err(e) => {
            tracing::warn!(request_id=%req_id, error=%e, "failed reading response body");
            Response::from_parts(res_parts, Body::empty())
        }
    }
}
