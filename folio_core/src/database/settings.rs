use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use tracing::info;

use crate::database::models::Setting;
use crate::error::{AppError, Result};
use crate::validation::validate_setting_key;

#[derive(Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Setting>> {
        let settings = sqlx::query_as::<_, Setting>(
            "SELECT id, setting_key, setting_value, category, updated_at FROM settings \
             ORDER BY category, setting_key",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(settings)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT setting_value FROM settings WHERE setting_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    /// Insert or overwrite each key. Runs in one transaction: either every
    /// key is written or none is.
    pub async fn upsert_many(&self, values: &BTreeMap<String, Value>) -> Result<usize> {
        for key in values.keys() {
            validate_setting_key(key).map_err(|e| {
                AppError::Validation(format!(
                    "{}: {}",
                    key,
                    e.message.map(|m| m.to_string()).unwrap_or_default()
                ))
            })?;
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO settings (setting_key, setting_value, category, updated_at)
                VALUES (?, ?, 'general', ?)
                ON CONFLICT(setting_key) DO UPDATE SET
                    setting_value = excluded.setting_value,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value_to_text(value))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Updated {} settings", values.len());
        Ok(values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::migrated_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_seeded_settings_ordered_by_category() {
        let (_file, pool) = migrated_pool().await;
        let repo = SettingsRepository::new(pool);

        let settings = repo.list().await.unwrap();
        let categories: Vec<&str> = settings.iter().map(|s| s.category.as_str()).collect();
        let mut sorted = categories.clone();
        sorted.sort();
        assert_eq!(categories, sorted);
        assert_eq!(repo.get("site_title").await.unwrap().as_deref(), Some("My Portfolio"));
    }

    #[tokio::test]
    async fn test_upsert_updates_and_inserts() {
        let (_file, pool) = migrated_pool().await;
        let repo = SettingsRepository::new(pool);

        let values: BTreeMap<String, Value> = serde_json::from_value(json!({
            "site_title": "Ann's Portfolio",
            "projects_per_page": 12,
        }))
        .unwrap();
        assert_eq!(repo.upsert_many(&values).await.unwrap(), 2);

        assert_eq!(repo.get("site_title").await.unwrap().as_deref(), Some("Ann's Portfolio"));
        assert_eq!(repo.get("projects_per_page").await.unwrap().as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn test_invalid_key_writes_nothing() {
        let (_file, pool) = migrated_pool().await;
        let repo = SettingsRepository::new(pool);

        let values: BTreeMap<String, Value> = serde_json::from_value(json!({
            "site_title": "Changed",
            "Bad Key": "x",
        }))
        .unwrap();
        assert!(matches!(repo.upsert_many(&values).await, Err(AppError::Validation(_))));
        assert_eq!(repo.get("site_title").await.unwrap().as_deref(), Some("My Portfolio"));
    }
}
