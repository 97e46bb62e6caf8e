use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./adrotate.db"
    pub database_url: String,

    /// Plain-text admin password loaded from the environment at startup.
    /// Only its Argon2 hash is kept in the application state.
    pub admin_password: String,

    /// HS256 secret used to sign admin API tokens
    pub jwt_secret: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// How many hours a back-office session cookie remains valid
    pub session_duration_hours: u64,

    /// How many hours an admin API token remains valid
    pub token_duration_hours: u64,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let admin_password = std::env::var("ADMIN_PASSWORD")
            .context("ADMIN_PASSWORD must be set in the environment or .env file")?;

        if admin_password.trim().is_empty() {
            anyhow::bail!("ADMIN_PASSWORD must not be empty");
        }

        let jwt_secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET must be set in the environment or .env file")?;

        if jwt_secret.len() < 16 {
            anyhow::bail!("JWT_SECRET must be at least 16 characters long");
        }

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let session_duration_hours = std::env::var("SESSION_DURATION_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse::<u64>()
            .unwrap_or(24);

        let token_duration_hours = std::env::var("TOKEN_DURATION_HOURS")
            .unwrap_or_else(|_| "12".into())
            .parse::<u64>()
            .unwrap_or(12);

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./adrotate.db".into()),
            admin_password,
            jwt_secret,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            session_duration_hours,
            token_duration_hours,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
