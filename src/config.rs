use anyhow::Context;

const DEFAULT_ORIGINS: &[&str] = &["http://localhost:5173", "http://localhost:3000"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

/// Cross-origin policy. Resolved once at start-up and handed to the router.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_any_localhost: bool,
}

impl CorsConfig {
    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.iter().any(|o| o == origin) {
            return true;
        }
        self.allow_any_localhost
            && (origin.starts_with("http://localhost:") || origin.starts_with("http://127.0.0.1:"))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub environment: Environment,
    pub static_dir: String,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "passgate".into()),
        };

        let port = std::env::var("APP_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("APP_PORT is not a valid port")?
            .unwrap_or(5000);

        let environment = std::env::var("APP_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Development);

        let raw_origins = std::env::var("CORS_ORIGINS").ok();
        let allow_any_localhost = std::env::var("CORS_ALLOW_LOCALHOST")
            .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            database_url,
            environment,
            static_dir: std::env::var("STATIC_DIR").unwrap_or_else(|_| "frontend/dist".into()),
            jwt,
            cors: CorsConfig {
                allowed_origins: resolve_origins(raw_origins.as_deref(), port),
                allow_any_localhost,
            },
        })
    }
}

/// Parses the comma-separated allow-list and appends the server's own local
/// origins so a production build served from this process can call itself.
fn resolve_origins(raw: Option<&str>, port: u16) -> Vec<String> {
    let mut origins: Vec<String> = match raw {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect(),
        None => DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
    };

    for local in [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
    ] {
        if !origins.contains(&local) {
            origins.push(local);
        }
    }
    origins
}
