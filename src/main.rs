mod app;
mod auth;
mod config;
mod error;
mod extract;
mod state;
mod users;

use crate::{app::build_app, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "passgate=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    tracing::info!(
        environment = ?config.environment,
        origins = ?config.cors.allowed_origins,
        allow_any_localhost = config.cors.allow_any_localhost,
        "configuration loaded"
    );

    let app_state = AppState::init(config).await?;
    let config = app_state.config.clone();
    let app = build_app(app_state);

    app::serve(app, &config).await
}
