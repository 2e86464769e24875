use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::database::models::{CreateProjectRequest, Project, ProjectStatus, UpdateProjectRequest};
use crate::error::{AppError, Result};

#[async_trait]
pub trait Repository<T> {
    type Id;
    type CreateInput;
    type UpdateInput;

    async fn create(&self, input: Self::CreateInput) -> Result<T>;
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<T>>;
    async fn update(&self, id: Self::Id, input: Self::UpdateInput) -> Result<T>;
    async fn delete(&self, id: Self::Id) -> Result<()>;
    async fn list(&self, params: ListParams) -> Result<Vec<T>>;
    async fn count(&self) -> Result<i64>;
}

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
    /// `None` (or `all` at the HTTP layer) means every category.
    pub category: Option<String>,
    pub include_deleted: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            category: None,
            include_deleted: false,
        }
    }
}

impl ListParams {
    pub fn new(limit: Option<i64>, offset: Option<i64>, category: Option<String>) -> Self {
        Self {
            limit: limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
            category: category.filter(|c| !c.is_empty() && c != "all"),
            include_deleted: false,
        }
    }
}

const PROJECT_COLUMNS: &str = "id, title, description, category, tech_stack, image_url, live_url, \
     github_url, year, featured, sort_order, status, created_at, updated_at";

#[derive(Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, params: &'a ListParams) {
        builder.push(" WHERE 1 = 1");
        if !params.include_deleted {
            builder.push(" AND status = 'active'");
        }
        if let Some(category) = &params.category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
    }

    /// Matching rows for the public listing, with the same filter applied to
    /// the total.
    pub async fn count_matching(&self, params: &ListParams) -> Result<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM projects");
        Self::push_filters(&mut builder, params);
        let total: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(total)
    }

    pub async fn count_active(&self) -> Result<i64> {
        self.count_matching(&ListParams::default()).await
    }

    pub async fn featured(&self, limit: i64) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE status = 'active' AND featured = 1 \
             ORDER BY sort_order, created_at DESC LIMIT ?",
            PROJECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects ORDER BY created_at DESC, id DESC LIMIT ?",
            PROJECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    /// Every project, deleted ones included, newest first.
    pub async fn list_all(&self) -> Result<Vec<Project>> {
        let projects = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects ORDER BY created_at DESC, id DESC",
            PROJECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }
}

#[async_trait]
impl Repository<Project> for ProjectRepository {
    type Id = i64;
    type CreateInput = CreateProjectRequest;
    type UpdateInput = UpdateProjectRequest;

    async fn create(&self, input: Self::CreateInput) -> Result<Project> {
        let now = Utc::now();

        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (title, description, category, tech_stack, image_url, live_url,
                                  github_url, year, featured, sort_order, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)
            RETURNING {}
            "#,
            PROJECT_COLUMNS
        ))
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(&input.category)
        .bind(sqlx::types::Json(&input.tech_stack))
        .bind(&input.image_url)
        .bind(&input.live_url)
        .bind(&input.github_url)
        .bind(input.year)
        .bind(input.featured)
        .bind(input.sort_order)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {} FROM projects WHERE id = ?",
            PROJECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn update(&self, id: Self::Id, input: Self::UpdateInput) -> Result<Project> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE projects SET ");
        let mut fields = builder.separated(", ");

        if let Some(title) = &input.title {
            fields.push("title = ").push_bind_unseparated(title.trim().to_string());
        }
        if let Some(description) = &input.description {
            fields.push("description = ").push_bind_unseparated(description.clone());
        }
        if let Some(category) = &input.category {
            fields.push("category = ").push_bind_unseparated(category.clone());
        }
        if let Some(tech_stack) = &input.tech_stack {
            fields
                .push("tech_stack = ")
                .push_bind_unseparated(sqlx::types::Json(tech_stack.clone()));
        }
        if let Some(image_url) = &input.image_url {
            fields.push("image_url = ").push_bind_unseparated(image_url.clone());
        }
        if let Some(live_url) = &input.live_url {
            fields.push("live_url = ").push_bind_unseparated(live_url.clone());
        }
        if let Some(github_url) = &input.github_url {
            fields.push("github_url = ").push_bind_unseparated(github_url.clone());
        }
        if let Some(year) = input.year {
            fields.push("year = ").push_bind_unseparated(year);
        }
        if let Some(featured) = input.featured {
            fields.push("featured = ").push_bind_unseparated(featured);
        }
        if let Some(sort_order) = input.sort_order {
            fields.push("sort_order = ").push_bind_unseparated(sort_order);
        }
        if let Some(status) = input.status {
            fields.push("status = ").push_bind_unseparated(status.as_str());
        }
        fields.push("updated_at = ").push_bind_unseparated(Utc::now());

        builder.push(" WHERE id = ").push_bind(id);
        builder.push(" RETURNING ").push(PROJECT_COLUMNS);

        builder
            .build_query_as::<Project>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {} not found", id)))
    }

    /// Soft delete: the row stays with status `deleted`.
    async fn delete(&self, id: Self::Id) -> Result<()> {
        let result = sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(ProjectStatus::Deleted.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Project {} not found", id)));
        }

        Ok(())
    }

    async fn list(&self, params: ListParams) -> Result<Vec<Project>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM projects", PROJECT_COLUMNS));
        Self::push_filters(&mut builder, &params);
        builder
            .push(" ORDER BY sort_order, created_at DESC LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset);

        let projects = builder
            .build_query_as::<Project>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Project listing failed: {}", e);
                AppError::from(e)
            })?;

        Ok(projects)
    }

    async fn count(&self) -> Result<i64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::migrated_pool;

    fn project(title: &str, category: &str, featured: bool) -> CreateProjectRequest {
        CreateProjectRequest {
            title: title.to_string(),
            description: Some(format!("{} description", title)),
            category: Some(category.to_string()),
            tech_stack: vec!["Rust".to_string()],
            image_url: None,
            live_url: None,
            github_url: None,
            year: Some(2024),
            featured,
            sort_order: 0,
        }
    }

    #[tokio::test]
    async fn test_create_and_partial_update() {
        let (_file, pool) = migrated_pool().await;
        let repo = ProjectRepository::new(pool);

        let created = repo.create(project("Folio", "web", false)).await.unwrap();
        assert_eq!(created.status, "active");
        assert_eq!(created.tech_stack.0, vec!["Rust".to_string()]);

        let updated = repo
            .update(
                created.id,
                UpdateProjectRequest {
                    featured: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.featured);
        assert_eq!(updated.title, "Folio");
        assert_eq!(updated.description, created.description);
        assert!(updated.updated_at >= created.updated_at);

        let missing = repo.update(9999, UpdateProjectRequest::default()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_from_public_listing() {
        let (_file, pool) = migrated_pool().await;
        let repo = ProjectRepository::new(pool);

        let keep = repo.create(project("Keep", "web", true)).await.unwrap();
        let gone = repo.create(project("Gone", "cli", true)).await.unwrap();
        repo.delete(gone.id).await.unwrap();

        let public = repo.list(ListParams::default()).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].id, keep.id);

        let all = repo.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.count_active().await.unwrap(), 1);
        assert_eq!(repo.featured(6).await.unwrap().len(), 1);

        assert!(matches!(repo.delete(4242).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_category_filter_applies_to_total() {
        let (_file, pool) = migrated_pool().await;
        let repo = ProjectRepository::new(pool);

        for i in 0..3 {
            repo.create(project(&format!("web {}", i), "web", false)).await.unwrap();
        }
        repo.create(project("tool", "cli", false)).await.unwrap();

        let params = ListParams::new(Some(2), Some(0), Some("web".to_string()));
        assert_eq!(repo.list(params.clone()).await.unwrap().len(), 2);
        assert_eq!(repo.count_matching(&params).await.unwrap(), 3);

        let params = ListParams::new(Some(500), None, Some("all".to_string()));
        assert_eq!(params.limit, MAX_PAGE_SIZE);
        assert_eq!(params.category, None);
        assert_eq!(repo.count_matching(&params).await.unwrap(), 4);
    }
}
