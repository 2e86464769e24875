//! Liveness check

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::warn;

use crate::{models::ApiResponse, AppState};

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let (status, database_status) = match state.db_manager.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Database health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    let body = json!({
        "status": if status.is_success() { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": state.version,
        "database_status": database_status,
        "message_backend": state.messages.backend_name(),
        "live_connections": state.websocket_manager.connection_count().await,
    });

    (status, Json(ApiResponse::success(body)))
}
