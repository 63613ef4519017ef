use std::sync::Arc;

use anyhow::Context;
use sqlx::{migrate::Migrator, postgres::PgPoolOptions};

use crate::config::AppConfig;
use crate::users::{repo::PgUserStore, store::UserStore};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        MIGRATOR.run(&db).await.context("run migrations")?;

        Ok(Self::from_parts(
            Arc::new(PgUserStore::new(db)),
            Arc::new(config),
        ))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        Self::fake_with(crate::config::Environment::Development)
    }

    pub fn fake_with(environment: crate::config::Environment) -> Self {
        use crate::config::{CorsConfig, JwtConfig};
        use crate::users::memory::MemoryUserStore;

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 5000,
            database_url: "memory".into(),
            environment,
            static_dir: "frontend/dist".into(),
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
            },
            cors: CorsConfig {
                allowed_origins: vec!["https://app.example.com".into()],
                allow_any_localhost: true,
            },
        });
        Self::from_parts(Arc::new(MemoryUserStore::default()), config)
    }
}
