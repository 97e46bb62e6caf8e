use crate::{
    analytics::{self, DEFAULT_TREND_DAYS},
    auth::AdminApi,
    db::{self, AdFilter},
    device,
    error::{ApiError, ApiResult},
    handlers::{done, success, Envelope},
    metrics::{self, AdEvent, EventKind},
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub days: Option<i64>,
}

/// POST /api/advertisements/analytics/:kind
///
/// Fetches the document, folds the event into it and saves the whole
/// document back. Concurrent events on the same advertisement may
/// overwrite each other.
pub async fn record_event(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<AdEvent>, JsonRejection>,
) -> ApiResult<Json<Envelope<()>>> {
    let kind: EventKind = kind.parse()?;
    let Json(mut event) = payload?;

    let id = event.advertisement_id.trim().to_owned();
    if id.is_empty() {
        return Err(ApiError::Validation("advertisementId is required".into()));
    }

    if event
        .device_type
        .as_deref()
        .map_or(true, |d| d.trim().is_empty())
    {
        event.device_type = Some(device::device_from_headers(&headers));
    }

    let mut ad = db::get_advertisement(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Advertisement not found".into()))?;

    let now = Utc::now();
    metrics::record(&mut ad, kind, &event, now)?;
    ad.refresh_derived(now);

    if !db::save_advertisement(&state.db, &ad).await? {
        return Err(ApiError::NotFound("Advertisement not found".into()));
    }

    tracing::debug!("recorded {:?} for advertisement '{}'", kind, id);
    Ok(done())
}

/// GET /api/advertisements/analytics
pub async fn summary(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    params: Result<Query<SummaryParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<analytics::AnalyticsSummary>>> {
    let Query(params) = params?;
    let ads = db::list_advertisements(&state.db, &AdFilter::default()).await?;
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);

    let summary = analytics::summarize(&ads, Utc::now(), days);
    Ok(success(summary))
}
