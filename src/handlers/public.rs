use crate::{
    db,
    error::{ApiError, ApiResult},
    handlers::{success, Envelope},
    models::{empty_as_none, AdType, Advertisement},
    rotation::{self, RotationQuery},
    AppState,
};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct PublicParams {
    pub position: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "empty_as_none")]
    pub ad_type: Option<AdType>,
    pub context: Option<String>,
    pub device: Option<String>,
    pub limit: Option<usize>,
    /// `strategy:<name>`
    pub rotation: Option<String>,
}

/// GET /api/public/advertisements
///
/// Lists servable advertisements for the storefront. Every advertisement
/// returned is counted as an impression.
pub async fn list(
    State(state): State<Arc<AppState>>,
    params: Result<Query<PublicParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<Vec<Advertisement>>>> {
    let Query(params) = params?;

    let strategy = params
        .rotation
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(rotation::parse_rotation_param)
        .transpose()
        .map_err(ApiError::Validation)?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let query = RotationQuery {
        position: params.position,
        ad_type: params.ad_type,
        context: params.context,
        rotation_group: None,
    };
    let device = params
        .device
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let now = Utc::now();
    let mut ads: Vec<Advertisement> = db::load_active(&state.db, query.slot())
        .await?
        .into_iter()
        .filter(|ad| query.admits(ad, now))
        .filter(|ad| device.map_or(true, |d| ad.matches_device(d)))
        .collect();

    rotation::order_listing(&mut ads, strategy, &mut rand::thread_rng());
    ads.truncate(limit);

    let ids: Vec<&str> = ads.iter().map(|ad| ad.id.as_str()).collect();
    db::increment_impressions(&state.db, &ids).await?;
    for ad in &mut ads {
        ad.impressions += 1;
        ad.recompute_ctr();
    }

    Ok(success(ads))
}
