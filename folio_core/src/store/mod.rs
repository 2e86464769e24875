//! Local (client-side) store: named slots on a key-value medium holding the
//! contact inbox, the project catalog and the site settings.
//!
//! All writers go through [`MessageStore`] or [`LocalCatalog`]; both run
//! their read-modify-write inside the medium's exclusive section and publish
//! a [`StoreChange`] after each successful mutation.

pub mod catalog;
pub mod medium;
pub mod message;
pub mod message_store;
pub mod notify;
pub mod view;

pub use catalog::{CatalogBundle, LocalCatalog, LocalProject, ProjectPatch, SiteSettings, SocialLinks, ThemeColors};
pub use medium::{with_exclusive, FileMedium, MemoryMedium, StorageMedium};
pub use message::{InboxStats, Message, MessageFilter, MessageId};
pub use message_store::{ImportSummary, InboxSnapshot, MessageStore, StoreOptions};
pub use notify::{ChangeKind, ChangeNotifier, StoreChange};
pub use view::InboxView;

use thiserror::Error;

use crate::validation::ValidationFailure;

pub const MESSAGES_SLOT: &str = "portfolio_messages";
pub const BACKUP_SLOT: &str = "contact_messages_backup";
pub const LEGACY_CONTACT_SLOT: &str = "portfolio_contact_messages";
pub const PROJECTS_SLOT: &str = "portfolio_projects";
pub const SETTINGS_SLOT: &str = "portfolio_admin_settings";
pub const LEGACY_SETTINGS_SLOT: &str = "portfolio_settings";

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
