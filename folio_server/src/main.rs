//! Entry point for the portfolio server binary

use anyhow::Result;
use folio_core::{bootstrap, create_app, run_server, spawn_rate_limit_cleanup, AppConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", config.bind_address());
    info!("Database URL: {}", config.database.url);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))?;

    let rate_window = Duration::from_secs(config.rate_limit.window_seconds);
    let rate_limiting = config.rate_limit.enabled;

    let state = bootstrap(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize application: {}", e))?;

    if rate_limiting {
        spawn_rate_limit_cleanup(state.rate_limiter.clone(), rate_window);
    }

    let app = create_app(state);
    run_server(app, addr).await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
        format!(
            "folio_server={level},folio_core={level},tower_http=info",
            level = default_level
        )
        .into()
    });

    let fmt_layer = fmt::layer().with_target(true).with_line_number(true);

    let is_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.pretty())
            .init();
    }
}
