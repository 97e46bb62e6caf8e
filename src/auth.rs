use crate::{error::ApiError, AppState};
use argon2::Argon2;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::Redirect,
};
use axum_extra::extract::CookieJar;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";
pub const ADMIN_ROLE: &str = "admin";

// ── Session Store ──────────────────────────────────────────────────────────

/// In-memory session store. Each entry maps a session token (UUID) to the
/// instant it was created. Tokens expire after `session_duration`.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Instant>>,
    pub session_duration: Duration,
}

impl SessionStore {
    pub fn new(session_duration_hours: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            session_duration: Duration::from_secs(session_duration_hours * 3600),
        }
    }

    /// Create a new session and return its token.
    pub async fn create(&self) -> String {
        let token = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        // Prune expired sessions on every login
        sessions.retain(|_, created_at| created_at.elapsed() < self.session_duration);
        sessions.insert(token.clone(), Instant::now());
        token
    }

    /// Return `true` if the token exists and has not expired.
    pub async fn is_valid(&self, token: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .map(|created_at| created_at.elapsed() < self.session_duration)
            .unwrap_or(false)
    }

    /// Invalidate a specific session (logout).
    pub async fn remove(&self, token: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(token);
    }
}

// ── Passwords ──────────────────────────────────────────────────────────────

/// Hash a password with Argon2id and a random salt (PHC string format).
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| anyhow::anyhow!("failed to encode password salt: {e}"))?;

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Check `password` against a PHC hash. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!("stored admin password hash is malformed: {}", e);
            false
        }
    }
}

// ── Bearer tokens ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

/// Sign an HS256 token; returns the token and its expiry.
pub fn issue_token(
    secret: &str,
    subject: &str,
    role: &str,
    ttl_hours: u64,
) -> Result<(String, DateTime<Utc>), jsonwebtoken::errors::Error> {
    let expires_at = Utc::now() + ChronoDuration::hours(ttl_hours as i64);
    let claims = Claims {
        sub: subject.to_owned(),
        role: role.to_owned(),
        exp: expires_at.timestamp(),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, expires_at))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ── Extractors ─────────────────────────────────────────────────────────────

/// Extractor for the HTML back office. Without a valid `session_id` cookie
/// it short-circuits with a redirect to the login page.
pub struct AuthUser;

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let valid = if let Some(cookie) = jar.get(SESSION_COOKIE) {
            state.sessions.is_valid(cookie.value()).await
        } else {
            false
        };

        if valid {
            Ok(AuthUser)
        } else {
            Err(Redirect::to("/admin/login"))
        }
    }
}

/// Extractor for admin JSON endpoints. Accepts a bearer token carrying the
/// admin role or a valid back-office session cookie.
pub struct AdminApi {
    pub subject: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminApi
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        if let Some(token) = bearer_token(parts) {
            let claims = verify_token(&state.config.jwt_secret, token).map_err(|e| {
                tracing::debug!("rejected bearer token: {}", e);
                ApiError::Unauthorized
            })?;
            if claims.role != ADMIN_ROLE {
                return Err(ApiError::Forbidden);
            }
            return Ok(AdminApi {
                subject: claims.sub,
            });
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            if state.sessions.is_valid(cookie.value()).await {
                return Ok(AdminApi {
                    subject: ADMIN_ROLE.to_owned(),
                });
            }
        }

        Err(ApiError::Unauthorized)
    }
}
