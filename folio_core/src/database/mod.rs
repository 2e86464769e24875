pub mod analytics;
pub mod connection;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod repository;
pub mod settings;

pub use analytics::{AnalyticsRepository, Period, SkillRepository, Visit};
pub use connection::{get_database_pool, DatabaseManager};
pub use messages::MessageRepository;
pub use migrations::{run_migrations, MigrationManager};
pub use models::*;
pub use repository::{ListParams, ProjectRepository, Repository};
pub use settings::SettingsRepository;
