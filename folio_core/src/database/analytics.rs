use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::database::models::{DailyVisits, PageVisits, Skill};
use crate::error::{AppError, Result};

/// Reporting window for the admin analytics view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "1y")]
    Year,
}

impl Period {
    pub fn days(&self) -> i64 {
        match self {
            Period::Week => 7,
            Period::Month => 30,
            Period::Year => 365,
        }
    }

    pub fn since(&self, now: DateTime<Utc>) -> NaiveDate {
        (now - Duration::days(self.days())).date_naive()
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            "1y" => Ok(Period::Year),
            other => Err(AppError::BadRequest(format!(
                "Unknown period '{}', expected 7d, 30d or 1y",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Visit {
    pub page_url: String,
    pub referrer: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: SqlitePool,
}

impl AnalyticsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, visit: &Visit) -> Result<()> {
        sqlx::query(
            "INSERT INTO analytics (page_url, referrer, ip_address, user_agent, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&visit.page_url)
        .bind(&visit.referrer)
        .bind(&visit.ip_address)
        .bind(&visit.user_agent)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn visits_per_day(&self, since: NaiveDate) -> Result<Vec<DailyVisits>> {
        let rows = sqlx::query_as::<_, DailyVisits>(
            r#"
            SELECT substr(created_at, 1, 10) as date, COUNT(*) as count
            FROM analytics
            WHERE substr(created_at, 1, 10) >= ?
            GROUP BY substr(created_at, 1, 10)
            ORDER BY date
            "#,
        )
        .bind(since.format("%Y-%m-%d").to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn popular_pages(&self, since: NaiveDate, limit: i64) -> Result<Vec<PageVisits>> {
        let rows = sqlx::query_as::<_, PageVisits>(
            r#"
            SELECT page_url, COUNT(*) as visits
            FROM analytics
            WHERE substr(created_at, 1, 10) >= ?
            GROUP BY page_url
            ORDER BY visits DESC, page_url
            LIMIT ?
            "#,
        )
        .bind(since.format("%Y-%m-%d").to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count_on(&self, date: NaiveDate) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM analytics WHERE substr(created_at, 1, 10) = ?")
                .bind(date.format("%Y-%m-%d").to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[derive(Clone)]
pub struct SkillRepository {
    pool: SqlitePool,
}

impl SkillRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Skill>> {
        let skills = sqlx::query_as::<_, Skill>(
            "SELECT id, name, category, proficiency, sort_order FROM skills ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(skills)
    }
}
