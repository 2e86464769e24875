use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;

use crate::database::models::{MessageRow, NewMessage};
use crate::error::Result;
use crate::store::{InboxStats, MessageFilter};

const MESSAGE_COLUMNS: &str =
    "id, name, email, subject, message, status, page_url, ip_address, user_agent, created_at";

#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

fn day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, message: &NewMessage) -> Result<MessageRow> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages (name, email, subject, message, status, page_url, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, 'unread', ?, ?, ?, ?)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        ))
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.subject)
        .bind(&message.message)
        .bind(&message.page_url)
        .bind(&message.ip_address)
        .bind(&message.user_agent)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Newest first; `today` is compared against the stored UTC date.
    pub async fn list(&self, filter: MessageFilter, today: NaiveDate) -> Result<Vec<MessageRow>> {
        let condition = match filter {
            MessageFilter::All => "1 = 1",
            MessageFilter::Unread => "status = 'unread'",
            MessageFilter::Read => "status = 'read'",
            MessageFilter::Today => "substr(created_at, 1, 10) = ?",
        };

        let sql = format!(
            "SELECT {} FROM messages WHERE {} ORDER BY created_at DESC, id DESC",
            MESSAGE_COLUMNS, condition
        );
        let mut query = sqlx::query_as::<_, MessageRow>(&sql);
        if filter == MessageFilter::Today {
            query = query.bind(day(today));
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<MessageRow>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {} FROM messages ORDER BY created_at DESC, id DESC LIMIT ?",
            MESSAGE_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Returns whether a row with `id` exists.
    pub async fn set_read(&self, id: i64, read: bool) -> Result<bool> {
        let status = if read { "read" } else { "unread" };
        let result = sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE messages SET status = 'read' WHERE status = 'unread'")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }


    pub async fn stats(&self, today: NaiveDate) -> Result<InboxStats> {
        let (total, unread, on_day): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'unread' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN substr(created_at, 1, 10) = ? THEN 1 ELSE 0 END), 0)
            FROM messages
            "#,
        )
        .bind(day(today))
        .fetch_one(&self.pool)
        .await?;

        Ok(InboxStats {
            total: total as usize,
            unread: unread as usize,
            today: on_day as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::migrated_pool;

    fn new_message(name: &str) -> NewMessage {
        NewMessage {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            subject: "No subject".to_string(),
            message: "hello".to_string(),
            page_url: None,
            ip_address: Some("127.0.0.1".to_string()),
            user_agent: Some("test-agent".to_string()),
        }
    }

    #[tokio::test]
    async fn test_status_filters_and_stats() {
        let (_file, pool) = migrated_pool().await;
        let repo = MessageRepository::new(pool);
        let today = Utc::now().date_naive();

        let ann = repo.insert(&new_message("Ann")).await.unwrap();
        let bo = repo.insert(&new_message("Bo")).await.unwrap();
        assert_eq!(ann.status, "unread");
        assert_eq!(ann.ip_address.as_deref(), Some("127.0.0.1"));

        assert!(repo.set_read(ann.id, true).await.unwrap());
        assert!(!repo.set_read(999, true).await.unwrap());

        let unread = repo.list(MessageFilter::Unread, today).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, bo.id);

        let all = repo.list(MessageFilter::All, today).await.unwrap();
        assert_eq!(all[0].id, bo.id);

        let stats = repo.stats(today).await.unwrap();
        assert_eq!(stats, InboxStats { total: 2, unread: 1, today: 2 });
        assert_eq!(repo.list(MessageFilter::Today, today).await.unwrap().len(), 2);

        let yesterday = today.pred_opt().unwrap();
        assert!(repo.list(MessageFilter::Today, yesterday).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_all_and_delete() {
        let (_file, pool) = migrated_pool().await;
        let repo = MessageRepository::new(pool);

        let ann = repo.insert(&new_message("Ann")).await.unwrap();
        repo.insert(&new_message("Bo")).await.unwrap();

        assert_eq!(repo.mark_all_read().await.unwrap(), 2);
        assert_eq!(repo.stats(Utc::now().date_naive()).await.unwrap().unread, 0);

        assert!(repo.delete(ann.id).await.unwrap());
        assert!(!repo.delete(ann.id).await.unwrap());
        assert_eq!(repo.recent(5).await.unwrap().len(), 1);
    }
}
