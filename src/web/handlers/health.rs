//! Health check endpoint

use axum::{Json, response::IntoResponse};
use serde_json::json;

/// Liveness check; the service holds no connections worth checking
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "image-resizer",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
