//! Liveness endpoint.

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
}

/// `GET /health`. Bypasses routing, rate limiting and authentication.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}
