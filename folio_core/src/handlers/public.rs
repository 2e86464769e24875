//! Visitor-facing endpoints: portfolio summary, contact form, project list,
//! visit tracking.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header::USER_AGENT, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::info;

use crate::{
    database::{ListParams, Repository, TrackVisitRequest, Visit},
    error::Result,
    models::{ApiResponse, PaginatedResponse, Pagination, ProjectQuery},
    services::SenderInfo,
    validation::{self, ContactSubmission},
    AppState,
};

pub const DEFAULT_SITE_TITLE: &str = "My Portfolio";
const FEATURED_LIMIT: i64 = 6;

/// Client address as seen through a proxy, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn handle_portfolio(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let total_projects = state.projects.count_active().await?;
    let messages_today = state.messages.stats().await?.today;
    let site_title = state
        .settings
        .get("site_title")
        .await?
        .unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());
    let skills = state.skills.list().await?;
    let featured_projects = state.projects.featured(FEATURED_LIMIT).await?;

    Ok(Json(ApiResponse::success(json!({
        "portfolio": {
            "total_projects": total_projects,
            "messages_today": messages_today,
            "site_title": site_title,
        },
        "skills": skills,
        "featured_projects": featured_projects,
    }))))
}

pub async fn handle_contact(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(submission): Json<ContactSubmission>,
) -> Result<impl IntoResponse> {
    let sender = SenderInfo {
        ip_address: client_ip(&headers, peer.as_ref()),
        user_agent: user_agent(&headers),
    };

    let stored = state.messages.submit(&submission, sender).await?;
    info!("POST /api/contact - message from {}", stored.message.email);

    Ok(Json(ApiResponse::with_message(
        json!({
            "id": stored.message.id,
            "name": stored.message.name,
            "email": stored.message.email,
        }),
        "Message sent successfully!",
    )))
}

pub async fn handle_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
) -> Result<impl IntoResponse> {
    let params = ListParams::new(query.limit, query.offset, query.category);
    let total = state.projects.count_matching(&params).await?;
    let pagination = Pagination {
        total,
        limit: params.limit,
        offset: params.offset,
    };
    let projects = state.projects.list(params).await?;

    Ok(Json(PaginatedResponse::new(projects, pagination)))
}

pub async fn handle_track(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<TrackVisitRequest>,
) -> Result<impl IntoResponse> {
    validation::check(&request)?;

    state
        .analytics
        .record(&Visit {
            page_url: request.page_url,
            referrer: request.referrer,
            ip_address: client_ip(&headers, peer.as_ref()),
            user_agent: user_agent(&headers),
        })
        .await?;

    Ok(Json(ApiResponse::message("Visit recorded")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let peer = ConnectInfo("10.1.2.3:5000".parse::<SocketAddr>().unwrap());
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(&peer)).as_deref(), Some("10.1.2.3"));

        headers.insert("x-forwarded-for", "198.51.100.4, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some(&peer)).as_deref(), Some("198.51.100.4"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
