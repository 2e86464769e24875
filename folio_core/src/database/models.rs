use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use validator::Validate;

use crate::store::{Message, MessageId};
use crate::validation::{validate_tech_stack, validate_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Deleted,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tech_stack: Json<Vec<String>>,
    pub image_url: Option<String>,
    pub live_url: Option<String>,
    pub github_url: Option<String>,
    pub year: Option<i64>,
    pub featured: bool,
    pub sort_order: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(length(max = 50, message = "Category is too long"))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_tech_stack"))]
    pub tech_stack: Vec<String>,
    #[validate(custom(function = "validate_url"))]
    pub image_url: Option<String>,
    #[validate(custom(function = "validate_url"))]
    pub live_url: Option<String>,
    #[validate(custom(function = "validate_url"))]
    pub github_url: Option<String>,
    #[validate(range(min = 1970, max = 2100, message = "Year is out of range"))]
    pub year: Option<i64>,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub sort_order: i64,
}

/// Partial update; only the fields present in the request are written.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(length(max = 50, message = "Category is too long"))]
    pub category: Option<String>,
    #[validate(custom(function = "validate_tech_stack"))]
    pub tech_stack: Option<Vec<String>>,
    #[validate(custom(function = "validate_url"))]
    pub image_url: Option<String>,
    #[validate(custom(function = "validate_url"))]
    pub live_url: Option<String>,
    #[validate(custom(function = "validate_url"))]
    pub github_url: Option<String>,
    #[validate(range(min = 1970, max = 2100, message = "Year is out of range"))]
    pub year: Option<i64>,
    pub featured: Option<bool>,
    pub sort_order: Option<i64>,
    pub status: Option<ProjectStatus>,
}

impl UpdateProjectRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.tech_stack.is_none()
            && self.image_url.is_none()
            && self.live_url.is_none()
            && self.github_url.is_none()
            && self.year.is_none()
            && self.featured.is_none()
            && self.sort_order.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub page_url: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn is_read(&self) -> bool {
        self.status == "read"
    }

    pub fn to_message(&self) -> Message {
        Message {
            id: Some(MessageId::Numeric(self.id)),
            name: self.name.clone(),
            email: self.email.clone(),
            subject: self.subject.clone(),
            message: self.message.clone(),
            timestamp: Some(self.created_at),
            read: self.is_read(),
            page_url: self.page_url.clone(),
        }
    }
}

/// Contact submission plus what the server learns about the sender.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub page_url: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub id: i64,
    pub setting_key: String,
    pub setting_value: String,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Skill {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub proficiency: i64,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TrackVisitRequest {
    #[validate(length(min = 1, max = 2048, message = "Page URL is required"))]
    pub page_url: String,
    #[validate(length(max = 2048, message = "Referrer is too long"))]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DailyVisits {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PageVisits {
    pub page_url: String,
    pub visits: i64,
}
