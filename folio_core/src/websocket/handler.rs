use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use tracing::info;

use crate::error::AppError;
use crate::middleware::auth::authenticate;
use crate::models::LiveQuery;
use crate::AppState;

/// `GET /api/admin/live?token=`. Browsers cannot set headers on a socket
/// upgrade, so the bearer token travels in the query string.
pub async fn live_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<LiveQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Authentication("Access token required".to_string()))?;

    let user = authenticate(&state, &token).await?;
    if !user.is_admin() {
        return Err(AppError::Authorization("Admin access required".to_string()));
    }

    info!(username = %user.username, "Live admin feed connected");
    let manager = state.websocket_manager.clone();
    Ok(ws.on_upgrade(move |socket| async move { manager.handle_connection(socket, user).await }))
}
