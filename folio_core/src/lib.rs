//! Core library for the portfolio service: local slot store, database
//! layer, auth, middleware and route handlers.

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod validation;
pub mod websocket;

pub use auth::{AuthService, JwtService, UserRepository, UserRepositoryTrait};
pub use config::AppConfig;
pub use database::{get_database_pool, run_migrations, DatabaseManager};
pub use error::{AppError, Result};
pub use handlers::routes::create_routes;
pub use middleware::auth::{jwt_auth_middleware, require_admin, AuthUser};
pub use middleware::cors::cors_layer_from_config;
pub use middleware::rate_limit::RateLimiter;
pub use services::MessageService;
pub use store::{ChangeKind, ChangeNotifier, MessageStore, StoreChange};
pub use websocket::WebSocketManager;

use axum::{middleware as axum_middleware, Router};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use database::{AnalyticsRepository, ProjectRepository, SettingsRepository, SkillRepository};

#[derive(Clone)]
pub struct AppState {
    pub app_name: String,
    pub version: String,
    pub config: Arc<AppConfig>,
    pub db_manager: DatabaseManager,
    pub projects: ProjectRepository,
    pub settings: SettingsRepository,
    pub analytics: AnalyticsRepository,
    pub skills: SkillRepository,
    pub messages: MessageService,
    pub auth_service: AuthService,
    pub rate_limiter: RateLimiter,
    pub notifier: ChangeNotifier,
    pub websocket_manager: WebSocketManager,
    catalog_version: Arc<AtomicU64>,
}

impl AppState {
    /// Wires repositories and services over a migrated pool. Must run inside
    /// a tokio runtime: the live feed forwarder is spawned here.
    pub fn new(config: AppConfig, pool: SqlitePool) -> Result<Self> {
        let notifier = ChangeNotifier::new();
        let messages = MessageService::from_config(&config.store, pool.clone(), notifier.clone())?;
        let jwt_service = JwtService::from_config(&config.auth)?;
        let auth_service = AuthService::new(UserRepository::new(pool.clone()), jwt_service);

        let websocket_manager = WebSocketManager::new();
        websocket_manager.forward(notifier.subscribe());

        Ok(Self {
            app_name: "Folio".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            config: Arc::new(config),
            db_manager: DatabaseManager::new(pool.clone()),
            projects: ProjectRepository::new(pool.clone()),
            settings: SettingsRepository::new(pool.clone()),
            analytics: AnalyticsRepository::new(pool.clone()),
            skills: SkillRepository::new(pool),
            messages,
            auth_service,
            notifier,
            websocket_manager,
            catalog_version: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Publishes a change to database-backed content on the live feed.
    pub fn announce(&self, slot: &str, kind: ChangeKind) {
        let version = self.catalog_version.fetch_add(1, Ordering::SeqCst) + 1;
        self.notifier.publish(StoreChange::new(slot, version, kind));
    }
}

/// Opens the database, applies migrations, seeds the admin account and
/// builds the application state.
pub async fn bootstrap(config: AppConfig) -> Result<AppState> {
    let pool = get_database_pool(&config.database).await?;

    if config.database.migrate_on_start {
        run_migrations(pool.clone()).await?;
    }

    let state = AppState::new(config, pool)?;
    if state.auth_service.ensure_admin(&state.config.auth).await? {
        warn!("Admin account created from configuration; change its password");
    }

    info!(
        "{} v{} ready, message backend: {}",
        state.app_name,
        state.version,
        state.messages.backend_name()
    );
    Ok(state)
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();
    let mut router = create_routes(&state);

    if config.rate_limit.enabled {
        router = router.layer(axum_middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    router = router
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_seconds,
        )))
        .layer(cors_layer_from_config(&config.cors));

    middleware::logging::with_request_tracing(router).with_state(state)
}

/// Drops idle rate limiter entries once per window.
pub fn spawn_rate_limit_cleanup(limiter: RateLimiter, window: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(window);
        loop {
            interval.tick().await;
            limiter.purge_idle();
        }
    });
}

pub async fn run_server(app: Router, addr: SocketAddr) -> Result<()> {
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
