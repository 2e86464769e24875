use sqlx::{Row, SqlitePool};
use tracing::{error, info};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};

pub struct MigrationManager {
    pool: SqlitePool,
}

impl MigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Starting database migrations");

        self.create_migrations_table().await?;

        let current_version = self.get_current_version().await?;
        info!("Current migration version: {}", current_version);

        let mut applied_count = 0;
        for migration in migrations() {
            if migration.version > current_version {
                info!("Applying migration {}: {}", migration.version, migration.name);
                self.apply_migration(&migration).await?;
                applied_count += 1;
            }
        }

        if applied_count > 0 {
            info!("Applied {} migrations successfully", applied_count);
        } else {
            info!("No new migrations to apply");
        }

        Ok(())
    }

    async fn create_migrations_table(&self) -> Result<()> {
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL,
                checksum TEXT NOT NULL
            )
        "#)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_current_version(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) as version FROM _migrations")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("version").unwrap_or(0))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for statement in migration.statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Migration {} failed: {}", migration.name, e);
                    AppError::from(e)
                })?;
        }

        sqlx::query("INSERT INTO _migrations (version, name, applied_at, checksum) VALUES (?, ?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now())
            .bind(migration.checksum)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_migration_history(&self) -> Result<Vec<MigrationRecord>> {
        let records = sqlx::query_as::<_, MigrationRecord>(
            "SELECT version, name, applied_at, checksum FROM _migrations ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[derive(Debug, Clone)]
struct Migration {
    version: i64,
    name: &'static str,
    checksum: &'static str,
    statements: &'static [&'static str],
}

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
    pub checksum: String,
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_users_table",
            checksum: "users_v1",
            statements: &[
                r#"
                CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'editor' CHECK (role IN ('admin', 'editor')),
                    full_name TEXT,
                    is_active BOOLEAN NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    last_login TEXT
                )
                "#,
            ],
        },
        Migration {
            version: 2,
            name: "create_projects_table",
            checksum: "projects_v1",
            statements: &[
                r#"
                CREATE TABLE projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT,
                    category TEXT,
                    tech_stack TEXT NOT NULL DEFAULT '[]',
                    image_url TEXT,
                    live_url TEXT,
                    github_url TEXT,
                    year INTEGER,
                    featured BOOLEAN NOT NULL DEFAULT 0,
                    sort_order INTEGER NOT NULL DEFAULT 0,
                    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'deleted')),
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX idx_projects_status_sort ON projects(status, sort_order)",
                "CREATE INDEX idx_projects_category ON projects(category)",
            ],
        },
        Migration {
            version: 3,
            name: "create_messages_table",
            checksum: "messages_v1",
            statements: &[
                r#"
                CREATE TABLE messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    subject TEXT NOT NULL DEFAULT 'No subject',
                    message TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'unread' CHECK (status IN ('unread', 'read')),
                    page_url TEXT,
                    ip_address TEXT,
                    user_agent TEXT,
                    created_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX idx_messages_created_at ON messages(created_at)",
                "CREATE INDEX idx_messages_status ON messages(status)",
            ],
        },
        Migration {
            version: 4,
            name: "create_settings_table",
            checksum: "settings_v1",
            statements: &[
                r#"
                CREATE TABLE settings (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    setting_key TEXT NOT NULL UNIQUE,
                    setting_value TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL DEFAULT 'general',
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                )
                "#,
                r#"
                INSERT INTO settings (setting_key, setting_value, category) VALUES
                    ('site_title', 'My Portfolio', 'general'),
                    ('contact_email', '', 'general'),
                    ('primary_color', '#6C63FF', 'theme'),
                    ('secondary_color', '#FF6584', 'theme'),
                    ('accent_color', '#36D1DC', 'theme'),
                    ('github_url', '#', 'social'),
                    ('linkedin_url', '#', 'social'),
                    ('twitter_url', '#', 'social')
                "#,
            ],
        },
        Migration {
            version: 5,
            name: "create_analytics_table",
            checksum: "analytics_v1",
            statements: &[
                r#"
                CREATE TABLE analytics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    page_url TEXT NOT NULL,
                    referrer TEXT,
                    ip_address TEXT,
                    user_agent TEXT,
                    created_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX idx_analytics_created_at ON analytics(created_at)",
            ],
        },
        Migration {
            version: 6,
            name: "create_skills_table",
            checksum: "skills_v1",
            statements: &[
                r#"
                CREATE TABLE skills (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL DEFAULT 'general',
                    proficiency INTEGER NOT NULL DEFAULT 0 CHECK (proficiency BETWEEN 0 AND 100),
                    sort_order INTEGER NOT NULL DEFAULT 0
                )
                "#,
            ],
        },
    ]
}

pub async fn run_migrations(pool: SqlitePool) -> Result<()> {
    let migration_manager = MigrationManager::new(pool);
    migration_manager.run_migrations().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::connection::get_database_pool;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite:{}", temp_file.path().display()),
            ..DatabaseConfig::default()
        };

        let pool = get_database_pool(&config).await.unwrap();
        let migration_manager = MigrationManager::new(pool.clone());

        migration_manager.run_migrations().await.unwrap();
        migration_manager.run_migrations().await.unwrap();

        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM sqlite_master WHERE type='table' AND name IN \
             ('users', 'projects', 'messages', 'settings', 'analytics', 'skills')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let table_count: i64 = row.try_get("count").unwrap();
        assert_eq!(table_count, 6);

        let history = migration_manager.get_migration_history().await.unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[3].name, "create_settings_table");
    }
}
