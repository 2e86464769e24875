//! Admin inbox endpoints, routed through [`MessageService`](crate::services::MessageService).

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::{
    error::{AppError, Result},
    models::{ApiResponse, MessageQuery, MessageStatusUpdate, ReadStatus},
    store::MessageFilter,
    AppState,
};

pub async fn handle_list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let filter = match query.filter.as_deref() {
        None | Some("") => MessageFilter::All,
        Some(raw) => raw.parse::<MessageFilter>().map_err(|_| {
            AppError::BadRequest(format!(
                "Unknown filter '{}', expected all, unread, read or today",
                raw
            ))
        })?,
    };

    let messages = state.messages.list(filter).await?;
    Ok(Json(ApiResponse::success(messages)))
}

pub async fn handle_update_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<MessageStatusUpdate>,
) -> Result<impl IntoResponse> {
    let read = update.status == ReadStatus::Read;
    if !state.messages.set_read(&id, read).await? {
        return Err(AppError::NotFound(format!("Message {} not found", id)));
    }

    Ok(Json(ApiResponse::message("Message status updated")))
}

pub async fn handle_delete_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    if !state.messages.delete(&id).await? {
        return Err(AppError::NotFound(format!("Message {} not found", id)));
    }

    Ok(Json(ApiResponse::message("Message deleted")))
}

pub async fn handle_mark_all_read(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let updated = state.messages.mark_all_read().await?;
    Ok(Json(ApiResponse::with_message(
        json!({ "updated": updated }),
        "All messages marked as read",
    )))
}

pub async fn handle_message_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.messages.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn handle_export_messages(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let (filename, body) = state.messages.export().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}

/// The request body is the exported JSON list itself.
pub async fn handle_import_messages(
    State(state): State<AppState>,
    body: String,
) -> Result<impl IntoResponse> {
    let summary = state.messages.import(&body).await?;
    Ok(Json(ApiResponse::with_message(
        summary,
        format!("Imported {} messages", summary.imported),
    )))
}

pub async fn handle_test_message(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let message = state.messages.add_test_message().await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(message, "Test message added")),
    ))
}
