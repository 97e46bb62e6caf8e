use crate::{
    auth::AdminApi,
    db,
    error::{ApiError, ApiResult},
    handlers::success,
    models::{Advertisement, RotationSettings},
    rotation::{self, RotationQuery},
    AppState,
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRotation {
    pub advertisement_id: String,
    pub rotation_settings: RotationSettings,
}

/// GET /api/advertisements/rotation
///
/// 1. Load active advertisements for the slot.
/// 2. Filter, rank and pick one with the rotation strategies.
/// 3. Stamp `lastImpression` on the winner and save it.
/// 4. Return the winner, or an empty list when nothing is eligible.
pub async fn select(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RotationQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    let now = Utc::now();

    let pool = db::load_active(&state.db, query.slot()).await?;
    let candidates = pool.len();

    let chosen = rotation::select(pool, &query, now, &mut rand::thread_rng());

    let Some(mut ad) = chosen else {
        tracing::debug!("rotation: no eligible advertisement among {} active", candidates);
        return Ok(success(Vec::<Advertisement>::new()).into_response());
    };

    ad.last_impression = Some(now);
    ad.refresh_derived(now);
    if !db::save_advertisement(&state.db, &ad).await? {
        tracing::warn!("rotation: advertisement '{}' disappeared before save", ad.id);
    }

    tracing::debug!(
        "rotation: served '{}' ({}) out of {} active",
        ad.name,
        ad.rotation_settings.strategy.as_str(),
        candidates
    );
    Ok(success(ad).into_response())
}

/// POST /api/advertisements/rotation
pub async fn update_settings(
    _admin: AdminApi,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateRotation>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;
    let id = payload.advertisement_id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation("advertisementId is required".into()));
    }

    let mut ad = db::get_advertisement(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Advertisement not found".into()))?;

    ad.rotation_settings = payload.rotation_settings;
    ad.refresh_derived(Utc::now());
    if !db::save_advertisement(&state.db, &ad).await? {
        return Err(ApiError::NotFound("Advertisement not found".into()));
    }

    tracing::info!(
        "rotation settings of '{}' set to {}",
        ad.id,
        ad.rotation_settings.strategy.as_str()
    );
    Ok(success(ad).into_response())
}

#[cfg(test)]
mod tests {
    use crate::{
        db,
        handlers::test_support::{admin_token, get, post_json, send, test_state},
        models::{tests::input, Advertisement, RotationStrategy},
    };
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn live(name: &str) -> Advertisement {
        let mut i = input(name);
        i.start_date = Utc::now() - Duration::days(1);
        i.end_date = Utc::now() + Duration::days(1);
        Advertisement::new(i, Utc::now())
    }

    #[tokio::test]
    async fn empty_store_returns_empty_list() {
        let state = test_state().await;
        let (status, body) = send(&state, get("/api/advertisements/rotation?position=home")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn serves_fixed_ad_and_stamps_last_impression() {
        let state = test_state().await;
        let mut fixed = live("fixed");
        fixed.rotation_settings.strategy = RotationStrategy::Fixed;
        let mut random = live("random");
        random.priority = 50;
        random.rotation_settings.strategy = RotationStrategy::Random;
        db::insert_advertisement(&state.db, &fixed).await.unwrap();
        db::insert_advertisement(&state.db, &random).await.unwrap();

        let (status, body) = send(&state, get("/api/advertisements/rotation?position=home&type=banner")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "fixed");

        let stored = db::get_advertisement(&state.db, &fixed.id).await.unwrap().unwrap();
        assert!(stored.last_impression.is_some());
    }

    #[tokio::test]
    async fn blank_filters_are_ignored() {
        let state = test_state().await;
        let ad = live("any-slot");
        db::insert_advertisement(&state.db, &ad).await.unwrap();

        let (status, body) = send(
            &state,
            get("/api/advertisements/rotation?position=&type=&context=&rotationGroup="),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "any-slot");
    }

    #[tokio::test]
    async fn rotation_group_narrows_the_pool() {
        let state = test_state().await;
        let mut summer = live("summer");
        summer.rotation_settings.rotation_group = Some("summer".into());
        let mut winter = live("winter");
        winter.priority = 90;
        winter.rotation_settings.rotation_group = Some("winter".into());
        db::insert_advertisement(&state.db, &summer).await.unwrap();
        db::insert_advertisement(&state.db, &winter).await.unwrap();

        let (status, body) = send(
            &state,
            get("/api/advertisements/rotation?position=home&rotationGroup=summer"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "summer");
    }

    #[tokio::test]
    async fn invalid_type_is_a_bad_request() {
        let state = test_state().await;
        let (status, body) = send(&state, get("/api/advertisements/rotation?type=poster")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn updating_settings_requires_admin() {
        let state = test_state().await;
        let ad = live("promo");
        db::insert_advertisement(&state.db, &ad).await.unwrap();
        let body = json!({
            "advertisementId": ad.id,
            "rotationSettings": { "strategy": "balanced", "rotationGroup": "summer" }
        });

        let (status, _) = send(&state, post_json("/api/advertisements/rotation", &body, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = admin_token();
        let (status, resp) = send(
            &state,
            post_json("/api/advertisements/rotation", &body, Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp["data"]["rotationSettings"]["strategy"], "balanced");

        let stored = db::get_advertisement(&state.db, &ad.id).await.unwrap().unwrap();
        assert_eq!(stored.rotation_group(), Some("summer"));

        let missing = json!({ "advertisementId": "nope", "rotationSettings": {} });
        let (status, _) = send(
            &state,
            post_json("/api/advertisements/rotation", &missing, Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
