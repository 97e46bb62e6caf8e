pub mod admin;
pub mod advertisements;
pub mod analytics;
pub mod auth;
pub mod public;
pub mod rotation;

use crate::error::ApiError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    Json,
};
use serde::Serialize;

/// Success body shared by every JSON endpoint: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub fn success<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data: Some(data),
    })
}

/// `{ "success": true }` with no payload.
pub fn done() -> Json<Envelope<()>> {
    Json(Envelope {
        success: true,
        data: None,
    })
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}
