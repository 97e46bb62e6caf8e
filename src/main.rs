use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod analytics;
mod auth;
mod config;
mod db;
mod device;
mod error;
mod handlers;
mod metrics;
mod models;
mod rotation;

use auth::SessionStore;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: config::AppConfig,
    /// Argon2 PHC hash of the admin password, computed once at startup.
    pub admin_password_hash: String,
    pub sessions: SessionStore,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let admin_router = Router::new()
        .route("/", get(handlers::admin::admin_index))
        .route(
            "/login",
            get(handlers::admin::login_page).post(handlers::admin::login),
        )
        .route("/logout", get(handlers::admin::logout))
        .route("/dashboard", get(handlers::admin::dashboard))
        .route(
            "/advertisements/:id/delete",
            post(handlers::admin::delete_advertisement),
        )
        .route(
            "/advertisements/:id/analytics",
            get(handlers::admin::analytics),
        );

    let api_router = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/advertisements",
            get(handlers::advertisements::list).post(handlers::advertisements::create),
        )
        .route(
            "/advertisements/rotation",
            get(handlers::rotation::select).post(handlers::rotation::update_settings),
        )
        .route(
            "/advertisements/analytics",
            get(handlers::analytics::summary),
        )
        .route(
            "/advertisements/analytics/:kind",
            post(handlers::analytics::record_event),
        )
        .route(
            "/advertisements/:id",
            get(handlers::advertisements::show)
                .put(handlers::advertisements::update)
                .delete(handlers::advertisements::delete),
        )
        .route("/public/advertisements", get(handlers::public::list));

    Router::new()
        // Health check, no auth required
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/admin", admin_router)
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; env vars may already be set
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adrotate=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting adrotate on {}", config.bind_addr());

    // Open SQLite connection pool, creating the file if it doesn't exist yet
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal),
        )
        .await?;

    // Run embedded migrations (files in migrations/)
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let stored = db::count_advertisements(&db).await?;
    tracing::info!("{} advertisement(s) in store", stored);

    let admin_password_hash = auth::hash_password(&config.admin_password)?;
    let sessions = SessionStore::new(config.session_duration_hours);
    let bind_addr = config.bind_addr();

    let state = Arc::new(AppState {
        db,
        config,
        admin_password_hash,
        sessions,
    });

    let app = router(state);

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
