use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Instant,
};

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AppConfig;
use crate::core::error::HawkError;
use crate::pipeline::analyzer::Analyzer;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    msg: String,
}

/// Fixed-window request counter per client. Enough backpressure for a
/// single-node deployment; anything bigger belongs in a gateway.
struct RateLimiter {
    windows: Mutex<HashMap<String, (u64, u32)>>,
    limit: u32,
    started: Instant,
}

impl RateLimiter {
    fn new(limit: u32) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            limit,
            started: Instant::now(),
        }
    }

    fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }
        let minute = self.started.elapsed().as_secs() / 60;
        let mut windows = self.windows.lock().expect("limiter poisoned");
        windows.retain(|_, (window, _)| *window == minute);
        let entry = windows.entry(key.to_string()).or_insert((minute, 0));
        if entry.0 != minute {
            *entry = (minute, 0);
        }
        entry.1 += 1;
        entry.1 <= self.limit
    }
}

pub struct AppState {
    analyzer: Analyzer,
    api_key: Option<String>,
    limiter: RateLimiter,
    started: Instant,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, HawkError> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!("api_key not set, authentication disabled (dev mode)");
        }
        let limiter = RateLimiter::new(config.rate_limit_per_minute);
        let analyzer = Analyzer::from_config(config)?;
        Ok(Self {
            analyzer,
            api_key,
            limiter,
            started: Instant::now(),
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

fn detail_response(status: StatusCode, msg: &str) -> Response {
    (
        status,
        Json(json!({ "detail": [ErrorDetail { msg: msg.to_string() }] })),
    )
        .into_response()
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = &state.api_key else {
        return Ok(());
    };
    match headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        None => Err(detail_response(
            StatusCode::UNAUTHORIZED,
            "Missing API key. Provide X-API-Key header.",
        )),
        Some(provided) if constant_time_eq(provided.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => Err(detail_response(StatusCode::FORBIDDEN, "Invalid API key.")),
    }
}

async fn scan_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = authenticate(&state, &headers) {
        return denied;
    }
    if !state.limiter.allow(&peer.ip().to_string()) {
        return detail_response(StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded.");
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return detail_response(StatusCode::UNPROCESSABLE_ENTITY, &rejection.body_text());
        }
    };

    match state.analyzer.scan(&request.url).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) if e.is_client_error() => {
            detail_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "scan failed");
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let predictor = state.analyzer.predictor();
    let body = json!({
        "status": "healthy",
        "uptime_seconds": state.started.elapsed().as_secs(),
        "ml": {
            "status": if predictor.is_loaded() { "loaded" } else { "unavailable" },
            "feature_count": predictor.feature_count(),
        },
    });
    (StatusCode::OK, Json(body)).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/scan", post(scan_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind and serve until the process is told to stop.
pub async fn serve(config: AppConfig) -> Result<(), HawkError> {
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| HawkError::Config(format!("bind {}: {}", bind_addr, e)))?;
    tracing::info!(addr = %bind_addr, "scan API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|e| HawkError::Internal(e.to_string()))
}
