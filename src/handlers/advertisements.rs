use crate::{
    auth::AdminApi,
    db::{self, AdFilter},
    error::{ApiError, ApiResult},
    handlers::{done, success, Envelope},
    models::{empty_as_none, AdStatus, AdType, Advertisement, AdvertisementInput},
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<AdStatus>,
    pub position: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "empty_as_none")]
    pub ad_type: Option<AdType>,
}

fn not_found() -> ApiError {
    ApiError::NotFound("Advertisement not found".into())
}

/// GET /api/advertisements
pub async fn list(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<Vec<Advertisement>>>> {
    let Query(params) = params?;
    let filter = AdFilter {
        status: params.status,
        position: params
            .position
            .map(|p| p.trim().to_owned())
            .filter(|p| !p.is_empty()),
        ad_type: params.ad_type,
    };
    let ads = db::list_advertisements(&state.db, &filter).await?;
    Ok(success(ads))
}

/// POST /api/advertisements
pub async fn create(
    admin: AdminApi,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AdvertisementInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<Advertisement>>)> {
    let Json(mut input) = payload?;
    input.validate()?;
    if input.created_by.is_none() {
        input.created_by = Some(admin.subject);
    }

    let ad = Advertisement::new(input, Utc::now());
    db::insert_advertisement(&state.db, &ad).await?;

    tracing::info!("created advertisement '{}' ({})", ad.name, ad.id);
    Ok((StatusCode::CREATED, success(ad)))
}

/// GET /api/advertisements/:id
pub async fn show(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<Advertisement>>> {
    let ad = db::get_advertisement(&state.db, &id)
        .await?
        .ok_or_else(not_found)?;
    Ok(success(ad))
}

/// PUT /api/advertisements/:id
pub async fn update(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AdvertisementInput>, JsonRejection>,
) -> ApiResult<Json<Envelope<Advertisement>>> {
    let Json(input) = payload?;
    input.validate()?;

    let mut ad = db::get_advertisement(&state.db, &id)
        .await?
        .ok_or_else(not_found)?;
    ad.apply_input(input);
    ad.refresh_derived(Utc::now());

    if !db::save_advertisement(&state.db, &ad).await? {
        return Err(not_found());
    }

    tracing::info!("updated advertisement '{}' ({})", ad.name, ad.id);
    Ok(success(ad))
}

/// DELETE /api/advertisements/:id
pub async fn delete(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<()>>> {
    if !db::delete_advertisement(&state.db, &id).await? {
        return Err(not_found());
    }
    tracing::info!("deleted advertisement {}", id);
    Ok(done())
}
