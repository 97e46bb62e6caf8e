use crate::models::{
    AdStatus, AdType, Advertisement, Breakdown, Budget, Content, DailyStat, RotationSettings,
    ViewDuration,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

const AD_COLUMNS: &str = "id, name, ad_type, position, status, is_active, start_date, end_date,
     priority, last_impression, impressions, clicks, conversions, ctr,
     relevance_score, client_id, created_by, display, targeting, rotation, stats, budget,
     created_at, updated_at";

// ── Row mapping ────────────────────────────────────────────────────────────

/// Raw `advertisements` row; nested parts are still JSON text.
#[derive(Debug, sqlx::FromRow)]
struct AdRow {
    id: String,
    name: String,
    ad_type: String,
    position: String,
    status: String,
    is_active: bool,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    priority: i32,
    last_impression: Option<DateTime<Utc>>,
    impressions: i64,
    clicks: i64,
    conversions: i64,
    ctr: f64,
    relevance_score: f64,
    client_id: Option<String>,
    created_by: Option<String>,
    display: String,
    targeting: String,
    rotation: String,
    stats: String,
    budget: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct DisplayDoc {
    content: Content,
    image_url: Option<String>,
    video_url: Option<String>,
    link_url: Option<String>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct TargetingDoc {
    target_device: Vec<String>,
    target_context: Vec<String>,
    keywords: Vec<String>,
    target_audience: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct StatsDoc {
    daily_stats: Vec<DailyStat>,
    devices: Breakdown,
    positions: Breakdown,
    pages: Breakdown,
    contexts: Breakdown,
    keyword_stats: Breakdown,
    rotation_groups: Breakdown,
    view_durations: Vec<ViewDuration>,
    relevance_samples: i64,
}

/// Borrowing twin of [`StatsDoc`] so saves don't clone the counters.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsRef<'a> {
    daily_stats: &'a [DailyStat],
    devices: &'a Breakdown,
    positions: &'a Breakdown,
    pages: &'a Breakdown,
    contexts: &'a Breakdown,
    keyword_stats: &'a Breakdown,
    rotation_groups: &'a Breakdown,
    view_durations: &'a [ViewDuration],
    relevance_samples: i64,
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn parse_json<T: for<'de> Deserialize<'de>>(column: &str, raw: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(raw).map_err(|e| decode_err(format!("column '{column}': {e}")))
}

impl TryFrom<AdRow> for Advertisement {
    type Error = sqlx::Error;

    fn try_from(row: AdRow) -> Result<Self, Self::Error> {
        let ad_type: AdType = row.ad_type.parse().map_err(decode_err)?;
        let status: AdStatus = row.status.parse().map_err(decode_err)?;
        let display: DisplayDoc = parse_json("display", &row.display)?;
        let targeting: TargetingDoc = parse_json("targeting", &row.targeting)?;
        let rotation_settings: RotationSettings = parse_json("rotation", &row.rotation)?;
        let stats: StatsDoc = parse_json("stats", &row.stats)?;
        let budget: Budget = parse_json("budget", &row.budget)?;

        Ok(Advertisement {
            id: row.id,
            name: row.name,
            ad_type,
            position: row.position,
            content: display.content,
            image_url: display.image_url,
            video_url: display.video_url,
            link_url: display.link_url,
            start_date: row.start_date,
            end_date: row.end_date,
            is_active: row.is_active,
            status,
            target_device: targeting.target_device,
            target_context: targeting.target_context,
            keywords: targeting.keywords,
            target_audience: targeting.target_audience,
            rotation_settings,
            priority: row.priority,
            last_impression: row.last_impression,
            impressions: row.impressions,
            clicks: row.clicks,
            conversions: row.conversions,
            ctr: row.ctr,
            daily_stats: stats.daily_stats,
            devices: stats.devices,
            positions: stats.positions,
            pages: stats.pages,
            contexts: stats.contexts,
            keyword_stats: stats.keyword_stats,
            rotation_groups: stats.rotation_groups,
            view_durations: stats.view_durations,
            relevance_score: row.relevance_score,
            relevance_samples: stats.relevance_samples,
            budget,
            client: row.client_id,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Serialized JSON columns for one document, in bind order.
struct JsonColumns {
    display: String,
    targeting: String,
    rotation: String,
    stats: String,
    budget: String,
}

fn json_columns(ad: &Advertisement) -> Result<JsonColumns, sqlx::Error> {
    let encode = |e: serde_json::Error| sqlx::Error::Io(e.into());

    let display = serde_json::to_string(&DisplayDoc {
        content: ad.content.clone(),
        image_url: ad.image_url.clone(),
        video_url: ad.video_url.clone(),
        link_url: ad.link_url.clone(),
    })
    .map_err(encode)?;
    let targeting = serde_json::to_string(&TargetingDoc {
        target_device: ad.target_device.clone(),
        target_context: ad.target_context.clone(),
        keywords: ad.keywords.clone(),
        target_audience: ad.target_audience.clone(),
    })
    .map_err(encode)?;
    let rotation = serde_json::to_string(&ad.rotation_settings).map_err(encode)?;
    let stats = serde_json::to_string(&StatsRef {
        daily_stats: &ad.daily_stats,
        devices: &ad.devices,
        positions: &ad.positions,
        pages: &ad.pages,
        contexts: &ad.contexts,
        keyword_stats: &ad.keyword_stats,
        rotation_groups: &ad.rotation_groups,
        view_durations: &ad.view_durations,
        relevance_samples: ad.relevance_samples,
    })
    .map_err(encode)?;
    let budget = serde_json::to_string(&ad.budget).map_err(encode)?;

    Ok(JsonColumns {
        display,
        targeting,
        rotation,
        stats,
        budget,
    })
}

fn into_ads(rows: Vec<AdRow>) -> Result<Vec<Advertisement>, sqlx::Error> {
    rows.into_iter().map(Advertisement::try_from).collect()
}

// ── Advertisements ─────────────────────────────────────────────────────────

/// Optional filters for the admin listing.
#[derive(Debug, Clone, Default)]
pub struct AdFilter {
    pub status: Option<AdStatus>,
    pub position: Option<String>,
    pub ad_type: Option<AdType>,
}

pub async fn count_advertisements(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM advertisements")
        .fetch_one(pool)
        .await
}

/// Insert a new document. Derived fields must already be fresh.
pub async fn insert_advertisement(pool: &SqlitePool, ad: &Advertisement) -> Result<(), sqlx::Error> {
    let json = json_columns(ad)?;
    sqlx::query(
        "INSERT INTO advertisements
             (id, name, ad_type, position, status, is_active, start_date, end_date,
              priority, rotation_group, last_impression, impressions, clicks, conversions, ctr,
              relevance_score, client_id, created_by, display, targeting, rotation, stats, budget,
              created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                 ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
    )
    .bind(&ad.id)
    .bind(&ad.name)
    .bind(ad.ad_type.as_str())
    .bind(&ad.position)
    .bind(ad.status.as_str())
    .bind(ad.is_active)
    .bind(ad.start_date)
    .bind(ad.end_date)
    .bind(ad.priority)
    .bind(ad.rotation_group())
    .bind(ad.last_impression)
    .bind(ad.impressions)
    .bind(ad.clicks)
    .bind(ad.conversions)
    .bind(ad.ctr)
    .bind(ad.relevance_score)
    .bind(ad.client.as_deref())
    .bind(ad.created_by.as_deref())
    .bind(json.display)
    .bind(json.targeting)
    .bind(json.rotation)
    .bind(json.stats)
    .bind(json.budget)
    .bind(ad.created_at)
    .bind(ad.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Overwrite the whole stored document. Returns `false` if the id is gone.
///
/// Last write wins: two concurrent read-modify-save cycles on the same
/// advertisement can lose one of the updates.
pub async fn save_advertisement(pool: &SqlitePool, ad: &Advertisement) -> Result<bool, sqlx::Error> {
    let json = json_columns(ad)?;
    let affected = sqlx::query(
        "UPDATE advertisements SET
             name = ?2, ad_type = ?3, position = ?4, status = ?5, is_active = ?6,
             start_date = ?7, end_date = ?8, priority = ?9, rotation_group = ?10,
             last_impression = ?11, impressions = ?12, clicks = ?13, conversions = ?14,
             ctr = ?15, relevance_score = ?16, client_id = ?17, created_by = ?18,
             display = ?19, targeting = ?20, rotation = ?21, stats = ?22, budget = ?23,
             updated_at = ?24
         WHERE id = ?1",
    )
    .bind(&ad.id)
    .bind(&ad.name)
    .bind(ad.ad_type.as_str())
    .bind(&ad.position)
    .bind(ad.status.as_str())
    .bind(ad.is_active)
    .bind(ad.start_date)
    .bind(ad.end_date)
    .bind(ad.priority)
    .bind(ad.rotation_group())
    .bind(ad.last_impression)
    .bind(ad.impressions)
    .bind(ad.clicks)
    .bind(ad.conversions)
    .bind(ad.ctr)
    .bind(ad.relevance_score)
    .bind(ad.client.as_deref())
    .bind(ad.created_by.as_deref())
    .bind(json.display)
    .bind(json.targeting)
    .bind(json.rotation)
    .bind(json.stats)
    .bind(json.budget)
    .bind(ad.updated_at)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(affected > 0)
}

/// Fetch a single advertisement by id (any status).
pub async fn get_advertisement(
    pool: &SqlitePool,
    id: &str,
) -> Result<Option<Advertisement>, sqlx::Error> {
    let row: Option<AdRow> =
        sqlx::query_as(&format!("SELECT {AD_COLUMNS} FROM advertisements WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    row.map(Advertisement::try_from).transpose()
}

/// All advertisements matching `filter`, newest first.
pub async fn list_advertisements(
    pool: &SqlitePool,
    filter: &AdFilter,
) -> Result<Vec<Advertisement>, sqlx::Error> {
    let rows: Vec<AdRow> = sqlx::query_as(&format!(
        "SELECT {AD_COLUMNS} FROM advertisements
         WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL OR position = ?2)
           AND (?3 IS NULL OR ad_type = ?3)
         ORDER BY created_at DESC"
    ))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.position.as_deref())
    .bind(filter.ad_type.map(|t| t.as_str()))
    .fetch_all(pool)
    .await?;

    into_ads(rows)
}

/// Column filters for [`load_active`]. `None` matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotFilter<'a> {
    pub position: Option<&'a str>,
    pub ad_type: Option<AdType>,
    pub rotation_group: Option<&'a str>,
}

/// Active advertisements for a slot. Date window and targeting are checked
/// by the caller.
pub async fn load_active(
    pool: &SqlitePool,
    slot: SlotFilter<'_>,
) -> Result<Vec<Advertisement>, sqlx::Error> {
    let rows: Vec<AdRow> = sqlx::query_as(&format!(
        "SELECT {AD_COLUMNS} FROM advertisements
         WHERE is_active = 1
           AND (?1 IS NULL OR position = ?1)
           AND (?2 IS NULL OR ad_type = ?2)
           AND (?3 IS NULL OR rotation_group = ?3)"
    ))
    .bind(slot.position)
    .bind(slot.ad_type.map(|t| t.as_str()))
    .bind(slot.rotation_group)
    .fetch_all(pool)
    .await?;

    into_ads(rows)
}

/// Permanently delete an advertisement.
pub async fn delete_advertisement(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let affected = sqlx::query("DELETE FROM advertisements WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    Ok(affected > 0)
}

/// `impressions + 1` for every listed id, used by the public listing. All
/// rows are bumped in one transaction or none are. `ctr` is recomputed in
/// the same statement (SQLite evaluates the right-hand sides against the
/// old row).
pub async fn increment_impressions(pool: &SqlitePool, ids: &[&str]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for id in ids {
        sqlx::query(
            "UPDATE advertisements
             SET impressions = impressions + 1,
                 ctr = CAST(clicks AS REAL) / (impressions + 1)
             WHERE id = ?1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}
