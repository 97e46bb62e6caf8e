use crate::{
    auth::{self, ADMIN_ROLE},
    error::{ApiError, ApiResult},
    handlers::{success, Envelope},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LoginRequest {
    password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Verify the admin password off the async runtime; Argon2 is CPU-bound.
pub async fn password_matches(state: &Arc<AppState>, password: String) -> bool {
    let hash = state.admin_password_hash.clone();
    match tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash)).await {
        Ok(valid) => valid,
        Err(e) => {
            tracing::error!("password verification task failed: {:?}", e);
            false
        }
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<Envelope<TokenResponse>>> {
    let Json(payload) = payload?;

    if !password_matches(&state, payload.password).await {
        // Use a small artificial delay to blunt brute-force attempts.
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        return Err(ApiError::Unauthorized);
    }

    let (token, expires_at) = auth::issue_token(
        &state.config.jwt_secret,
        ADMIN_ROLE,
        ADMIN_ROLE,
        state.config.token_duration_hours,
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {e}")))?;

    tracing::info!("issued admin API token");
    Ok(success(TokenResponse { token, expires_at }))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{post_json, send, test_state, with_token, PASSWORD};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn login_issues_a_usable_token() {
        let state = test_state().await;

        let (status, body) = send(
            &state,
            post_json("/api/auth/login", &json!({ "password": PASSWORD }), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["data"]["token"].as_str().unwrap().to_owned();

        let (status, _) = send(
            &state,
            with_token("GET", "/api/advertisements", None, &token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = test_state().await;
        let (status, body) = send(
            &state,
            post_json("/api/auth/login", &json!({ "password": "nope" }), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }
}
