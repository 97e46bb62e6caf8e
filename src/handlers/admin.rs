use crate::{
    analytics::top_entries,
    auth::{AuthUser, SESSION_COOKIE},
    db::{self, AdFilter},
    handlers::auth::password_matches,
    models::{Advertisement, DailyStat},
    AppState,
};
use askama::Template;
use axum::{
    extract::{Form, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use serde::Deserialize;
use std::sync::Arc;

const RECENT_DAYS: usize = 14;

// ── Template structs ───────────────────────────────────────────────────────

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
}

/// One dashboard table row, pre-formatted for display.
struct DashboardRow {
    id: String,
    name: String,
    ad_type: String,
    position: String,
    status: String,
    strategy: String,
    priority: i32,
    impressions: i64,
    clicks: i64,
    ctr_pct: String,
    window: String,
}

impl From<&Advertisement> for DashboardRow {
    fn from(ad: &Advertisement) -> Self {
        Self {
            id: ad.id.clone(),
            name: ad.name.clone(),
            ad_type: ad.ad_type.to_string(),
            position: ad.position.clone(),
            status: ad.status.to_string(),
            strategy: ad.rotation_settings.strategy.as_str().to_owned(),
            priority: ad.priority,
            impressions: ad.impressions,
            clicks: ad.clicks,
            ctr_pct: format!("{:.2}%", ad.ctr * 100.0),
            window: format!(
                "{} → {}",
                ad.start_date.format("%Y-%m-%d"),
                ad.end_date.format("%Y-%m-%d")
            ),
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    rows: Vec<DashboardRow>,
    total_impressions: i64,
    total_clicks: i64,
    flash_success: Option<String>,
    flash_error: Option<String>,
}

#[derive(Template)]
#[template(path = "analytics.html")]
struct AnalyticsTemplate {
    row: DashboardRow,
    conversions: i64,
    relevance_pct: String,
    avg_view_ms: String,
    view_samples: usize,
    recent_days: Vec<DailyStat>,
    // Pre-computed breakdowns: (title, [(name, impressions, clicks, pct_of_impressions)])
    breakdowns: Vec<(&'static str, Vec<(String, i64, i64, i64)>)>,
}

// ── Form types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginForm {
    password: String,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// GET /admin
pub async fn admin_index() -> Redirect {
    Redirect::to("/admin/dashboard")
}

// ── Login / Logout ─────────────────────────────────────────────────────────

/// GET /admin/login
pub async fn login_page(jar: CookieJar, State(state): State<Arc<AppState>>) -> Response {
    // If already authenticated, skip the login page.
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.is_valid(cookie.value()).await {
            return Redirect::to("/admin/dashboard").into_response();
        }
    }
    LoginTemplate { error: None }.into_response()
}

/// POST /admin/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if !password_matches(&state, form.password).await {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        return LoginTemplate {
            error: Some("Incorrect password.".into()),
        }
        .into_response();
    }

    let token = state.sessions.create().await;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            state.config.session_duration_hours as i64 * 3600,
        ))
        .build();

    (jar.add(cookie), Redirect::to("/admin/dashboard")).into_response()
}

/// GET /admin/logout
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value()).await;
    }

    let removal = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::seconds(0))
        .build();

    (jar.add(removal), Redirect::to("/admin/login")).into_response()
}

// ── Dashboard ──────────────────────────────────────────────────────────────

/// GET /admin/dashboard
pub async fn dashboard(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Response {
    // Read and clear flash cookies
    let flash_success = jar.get("flash_success").map(|c| c.value().to_owned());
    let flash_error = jar.get("flash_error").map(|c| c.value().to_owned());

    let clear_success = Cookie::build(("flash_success", "")).path("/").build();
    let clear_error = Cookie::build(("flash_error", "")).path("/").build();

    let ads = match db::list_advertisements(&state.db, &AdFilter::default()).await {
        Ok(ads) => ads,
        Err(e) => {
            tracing::error!("Failed to load advertisements: {:?}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load advertisements",
            )
                .into_response();
        }
    };

    let tmpl = DashboardTemplate {
        total_impressions: ads.iter().map(|a| a.impressions).sum(),
        total_clicks: ads.iter().map(|a| a.clicks).sum(),
        rows: ads.iter().map(DashboardRow::from).collect(),
        flash_success,
        flash_error,
    };

    (jar.remove(clear_success).remove(clear_error), tmpl).into_response()
}

// ── Delete advertisement ───────────────────────────────────────────────────

/// POST /admin/advertisements/:id/delete
pub async fn delete_advertisement(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let ad = match db::get_advertisement(&state.db, &id).await {
        Ok(Some(ad)) => ad,
        Ok(None) => {
            return set_flash_and_redirect(
                jar,
                None,
                Some("Advertisement not found."),
                "/admin/dashboard",
            );
        }
        Err(e) => {
            tracing::error!("Failed to fetch advertisement {}: {:?}", id, e);
            return set_flash_and_redirect(
                jar,
                None,
                Some("Database error while looking up advertisement."),
                "/admin/dashboard",
            );
        }
    };

    match db::delete_advertisement(&state.db, &id).await {
        Ok(true) => set_flash_and_redirect(
            jar,
            Some(&format!("Advertisement '{}' deleted.", ad.name)),
            None,
            "/admin/dashboard",
        ),
        Ok(false) => set_flash_and_redirect(
            jar,
            None,
            Some("Advertisement not found."),
            "/admin/dashboard",
        ),
        Err(e) => {
            tracing::error!("Failed to delete advertisement {}: {:?}", id, e);
            set_flash_and_redirect(
                jar,
                None,
                Some("Failed to delete advertisement."),
                "/admin/dashboard",
            )
        }
    }
}

// ── Analytics ──────────────────────────────────────────────────────────────

/// GET /admin/advertisements/:id/analytics
pub async fn analytics(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let ad = match db::get_advertisement(&state.db, &id).await {
        Ok(Some(ad)) => ad,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Advertisement not found.").into_response();
        }
        Err(e) => {
            tracing::error!("Failed to load analytics for advertisement {}: {:?}", id, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load analytics.",
            )
                .into_response();
        }
    };

    let total = ad.impressions;
    let view_samples = ad.view_durations.len();
    let avg_view_ms = if view_samples > 0 {
        let sum: f64 = ad.view_durations.iter().map(|v| v.duration).sum();
        format!("{:.0} ms", sum / view_samples as f64)
    } else {
        "–".to_owned()
    };

    let mut recent_days = ad.daily_stats.clone();
    recent_days.sort_by(|a, b| b.date.cmp(&a.date));
    recent_days.truncate(RECENT_DAYS);

    AnalyticsTemplate {
        row: DashboardRow::from(&ad),
        conversions: ad.conversions,
        relevance_pct: format!("{:.0}%", ad.relevance_score * 100.0),
        avg_view_ms,
        view_samples,
        recent_days,
        breakdowns: vec![
            ("Devices", top_entries(&ad.devices, total)),
            ("Positions", top_entries(&ad.positions, total)),
            ("Pages", top_entries(&ad.pages, total)),
            ("Contexts", top_entries(&ad.contexts, total)),
            ("Keywords", top_entries(&ad.keyword_stats, total)),
            ("Rotation groups", top_entries(&ad.rotation_groups, total)),
        ],
    }
    .into_response()
}

// ── Private helpers ────────────────────────────────────────────────────────

/// Set a flash cookie and redirect to the given path.
fn set_flash_and_redirect(
    jar: CookieJar,
    success: Option<&str>,
    error: Option<&str>,
    destination: &str,
) -> Response {
    let mut jar = jar;

    for (name, msg) in [("flash_success", success), ("flash_error", error)] {
        if let Some(msg) = msg {
            let c = Cookie::build((name, msg.to_owned()))
                .path("/")
                .http_only(true)
                .same_site(SameSite::Lax)
                .max_age(time::Duration::seconds(30))
                .build();
            jar = jar.add(c);
        }
    }

    (jar, Redirect::to(destination)).into_response()
}
