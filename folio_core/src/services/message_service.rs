use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::{
    config::{MessageBackend, StoreConfig},
    database::{MessageRepository, MessageRow, NewMessage},
    error::{AppError, Result},
    store::{
        ChangeKind, ChangeNotifier, FileMedium, ImportSummary, InboxStats, MemoryMedium, Message,
        MessageFilter, MessageStore, StorageMedium, StoreChange, StoreOptions, StoreResult,
    },
    validation::ContactSubmission,
};

/// Slot name reported in change events of the database backend.
pub const DATABASE_MESSAGES: &str = "messages";

/// A message as the admin inbox shows it. The sender's address details are
/// only known to the database backend.
#[derive(Debug, Clone, Serialize)]
pub struct InboxMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl From<Message> for InboxMessage {
    fn from(message: Message) -> Self {
        Self {
            message,
            ip_address: None,
            user_agent: None,
        }
    }
}

impl From<MessageRow> for InboxMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            message: row.to_message(),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
        }
    }
}

/// What the server knows about whoever submitted the form.
#[derive(Debug, Clone, Default)]
pub struct SenderInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
enum Backend {
    Database {
        repository: MessageRepository,
        notifier: ChangeNotifier,
        version: Arc<AtomicU64>,
    },
    Local(MessageStore),
}

/// Inbox operations over either the relational `messages` table or the
/// local slot store.
#[derive(Clone)]
pub struct MessageService {
    backend: Backend,
}

impl MessageService {
    pub fn with_database(repository: MessageRepository, notifier: ChangeNotifier) -> Self {
        Self {
            backend: Backend::Database {
                repository,
                notifier,
                version: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    pub fn with_local_store(store: MessageStore) -> Self {
        Self {
            backend: Backend::Local(store),
        }
    }

    /// Builds the backend selected by `store.backend`. The local backend keeps
    /// its slots as files under `store.data_dir`.
    pub fn from_config(config: &StoreConfig, pool: SqlitePool, notifier: ChangeNotifier) -> Result<Self> {
        match config.backend {
            MessageBackend::Database => Ok(Self::with_database(MessageRepository::new(pool), notifier)),
            MessageBackend::Local => {
                let primary: Arc<dyn StorageMedium> = Arc::new(FileMedium::open(&config.data_dir)?);
                let fallback: Option<Arc<dyn StorageMedium>> = if config.memory_fallback {
                    Some(Arc::new(MemoryMedium::new("memory")))
                } else {
                    None
                };
                let options = StoreOptions {
                    max_messages: config.max_messages,
                };
                let store = MessageStore::open_with_notifier(primary, fallback, options, notifier)?;
                info!(dir = %config.data_dir.display(), "Local message store opened");
                Ok(Self::with_local_store(store))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Database { .. } => "database",
            Backend::Local(_) => "local",
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        match &self.backend {
            Backend::Database { notifier, .. } => notifier,
            Backend::Local(store) => store.notifier(),
        }
    }

    fn announce(&self, kind: ChangeKind) {
        if let Backend::Database {
            notifier, version, ..
        } = &self.backend
        {
            let version = version.fetch_add(1, Ordering::SeqCst) + 1;
            notifier.publish(StoreChange::new(DATABASE_MESSAGES, version, kind));
        }
    }

    /// The calendar day used by the `today` filter and statistic.
    pub fn today(&self) -> NaiveDate {
        match &self.backend {
            Backend::Database { .. } => Utc::now().date_naive(),
            Backend::Local(_) => Local::now().date_naive(),
        }
    }

    pub async fn submit(&self, submission: &ContactSubmission, sender: SenderInfo) -> Result<InboxMessage> {
        match &self.backend {
            Backend::Database { repository, .. } => {
                let cleaned = submission.check()?;
                let row = repository
                    .insert(&NewMessage {
                        name: cleaned.name,
                        email: cleaned.email,
                        subject: cleaned
                            .subject
                            .unwrap_or_else(|| crate::store::message::DEFAULT_SUBJECT.to_string()),
                        message: cleaned.message,
                        page_url: cleaned.page_url,
                        ip_address: sender.ip_address,
                        user_agent: sender.user_agent,
                    })
                    .await?;
                self.announce(ChangeKind::Submitted);
                info!(id = row.id, "Contact message stored");
                Ok(row.into())
            }
            Backend::Local(store) => {
                let submission = submission.clone();
                Ok(on_store(store, move |s| s.submit(&submission)).await?.into())
            }
        }
    }

    pub async fn add_test_message(&self) -> Result<InboxMessage> {
        match &self.backend {
            Backend::Database { .. } => {
                let sample = ContactSubmission::new(
                    "Test User",
                    "test@example.com",
                    Some("Test Message"),
                    "This is a test message to verify the system is working.",
                );
                self.submit(&sample, SenderInfo::default()).await
            }
            Backend::Local(store) => Ok(on_store(store, |s| s.add_test_message()).await?.into()),
        }
    }

    pub async fn list(&self, filter: MessageFilter) -> Result<Vec<InboxMessage>> {
        match &self.backend {
            Backend::Database { repository, .. } => Ok(repository
                .list(filter, self.today())
                .await?
                .into_iter()
                .map(InboxMessage::from)
                .collect()),
            Backend::Local(store) => Ok(on_store(store, move |s| s.list(filter))
                .await?
                .into_iter()
                .map(InboxMessage::from)
                .collect()),
        }
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<InboxMessage>> {
        match &self.backend {
            Backend::Database { repository, .. } => Ok(repository
                .recent(limit as i64)
                .await?
                .into_iter()
                .map(InboxMessage::from)
                .collect()),
            Backend::Local(_) => {
                let mut all = self.list(MessageFilter::All).await?;
                all.truncate(limit);
                Ok(all)
            }
        }
    }

    pub async fn stats(&self) -> Result<InboxStats> {
        match &self.backend {
            Backend::Database { repository, .. } => repository.stats(self.today()).await,
            Backend::Local(store) => on_store(store, |s| s.stats()).await,
        }
    }

    /// Returns whether a message matched `key`.
    pub async fn set_read(&self, key: &str, read: bool) -> Result<bool> {
        match &self.backend {
            Backend::Database { repository, .. } => {
                let Some(id) = database_id(key) else {
                    return Ok(false);
                };
                let changed = repository.set_read(id, read).await?;
                if changed {
                    self.announce(ChangeKind::Updated);
                }
                Ok(changed)
            }
            Backend::Local(store) => {
                let key = key.to_string();
                on_store(store, move |s| s.set_read(&key, read)).await
            }
        }
    }

    pub async fn mark_all_read(&self) -> Result<u64> {
        match &self.backend {
            Backend::Database { repository, .. } => {
                let changed = repository.mark_all_read().await?;
                if changed > 0 {
                    self.announce(ChangeKind::Updated);
                }
                Ok(changed)
            }
            Backend::Local(store) => Ok(on_store(store, |s| s.mark_all_read()).await? as u64),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        match &self.backend {
            Backend::Database { repository, .. } => {
                let Some(id) = database_id(key) else {
                    return Ok(false);
                };
                let removed = repository.delete(id).await?;
                if removed {
                    self.announce(ChangeKind::Deleted);
                }
                Ok(removed)
            }
            Backend::Local(store) => {
                let key = key.to_string();
                on_store(store, move |s| s.delete(&key)).await
            }
        }
    }

    /// Pretty JSON of every stored message, with the attachment file name.
    pub async fn export(&self) -> Result<(String, String)> {
        let filename = MessageStore::export_filename(self.today());
        let body = match &self.backend {
            Backend::Database { repository, .. } => {
                let messages: Vec<Message> = repository
                    .list(MessageFilter::All, self.today())
                    .await?
                    .iter()
                    .map(MessageRow::to_message)
                    .collect();
                serde_json::to_string_pretty(&messages)?
            }
            Backend::Local(store) => on_store(store, |s| s.export()).await?,
        };
        Ok((filename, body))
    }

    pub async fn import(&self, payload: &str) -> Result<ImportSummary> {
        match &self.backend {
            Backend::Database { .. } => Err(AppError::BadRequest(
                "Import is only available with the local message store".to_string(),
            )),
            Backend::Local(store) => {
                let payload = payload.to_string();
                on_store(store, move |s| s.import(&payload)).await
            }
        }
    }
}

/// Runs a local store operation on the blocking pool; the store does
/// synchronous file I/O.
async fn on_store<T, F>(store: &MessageStore, op: F) -> Result<T>
where
    F: FnOnce(&MessageStore) -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| AppError::Other(anyhow::anyhow!("store task failed: {}", e)))?
        .map_err(AppError::from)
}

fn database_id(key: &str) -> Option<i64> {
    key.trim().parse().ok()
}
