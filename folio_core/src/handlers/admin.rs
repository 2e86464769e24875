//! Admin endpoints. Everything except login sits behind the JWT and admin
//! role layers.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;

use crate::{
    auth::models::LoginRequest,
    database::{CreateProjectRequest, Period, ProjectStatus, Repository, UpdateProjectRequest},
    error::{AppError, Result},
    models::{AnalyticsQuery, ApiResponse},
    store::ChangeKind,
    validation,
    AppState,
};

const RECENT_LIMIT: usize = 5;
const POPULAR_PAGES_LIMIT: i64 = 10;

pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let login = state.auth_service.login(request).await?;

    Ok(Json(json!({
        "success": true,
        "token": login.token,
        "token_type": login.token_type,
        "expires_in": login.expires_in,
        "user": login.user,
    })))
}

pub async fn handle_dashboard(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let today = Utc::now().date_naive();

    let total_projects = state.projects.count().await?;
    let unread_messages = state.messages.stats().await?.unread;
    let total_users = state.auth_service.count_users().await?;
    let today_visits = state.analytics.count_on(today).await?;
    let recent_messages = state.messages.recent(RECENT_LIMIT).await?;
    let recent_projects = state.projects.recent(RECENT_LIMIT as i64).await?;

    Ok(Json(ApiResponse::success(json!({
        "stats": {
            "total_projects": total_projects,
            "unread_messages": unread_messages,
            "total_users": total_users,
            "today_visits": today_visits,
        },
        "recent_messages": recent_messages,
        "recent_projects": recent_projects,
    }))))
}

pub async fn handle_list_projects(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let projects = state.projects.list_all().await?;
    Ok(Json(ApiResponse::success(projects)))
}

pub async fn handle_create_project(
    State(state): State<AppState>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse> {
    validation::check(&request)?;

    let project = state.projects.create(request).await?;
    info!("Project {} created: {}", project.id, project.title);
    state.announce("projects", ChangeKind::ProjectsChanged);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            json!({ "id": project.id }),
            "Project created successfully",
        )),
    ))
}

pub async fn handle_update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse> {
    validation::check(&request)?;
    if request.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let project = state.projects.update(id, request).await?;
    state.announce("projects", ChangeKind::ProjectsChanged);

    Ok(Json(ApiResponse::with_message(project, "Project updated successfully")))
}

pub async fn handle_delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.projects.delete(id).await?;
    info!("Project {} marked {}", id, ProjectStatus::Deleted.as_str());
    state.announce("projects", ChangeKind::ProjectsChanged);

    Ok(Json(ApiResponse::message("Project deleted successfully")))
}

pub async fn handle_get_settings(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let settings = state.settings.list().await?;
    Ok(Json(ApiResponse::success(settings)))
}

pub async fn handle_update_settings(
    State(state): State<AppState>,
    Json(values): Json<BTreeMap<String, Value>>,
) -> Result<impl IntoResponse> {
    if values.is_empty() {
        return Err(AppError::BadRequest("No settings supplied".to_string()));
    }

    let updated = state.settings.upsert_many(&values).await?;
    state.announce("settings", ChangeKind::SettingsChanged);

    Ok(Json(ApiResponse::with_message(
        json!({ "updated": updated }),
        "Settings updated successfully",
    )))
}

pub async fn handle_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse> {
    let period: Period = query.period.as_deref().unwrap_or_default().parse()?;
    let since = period.since(Utc::now());

    let visits = state.analytics.visits_per_day(since).await?;
    let popular_pages = state.analytics.popular_pages(since, POPULAR_PAGES_LIMIT).await?;

    Ok(Json(ApiResponse::success(json!({
        "period": period,
        "visits": visits,
        "popular_pages": popular_pages,
    }))))
}
