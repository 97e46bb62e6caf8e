use crate::models::{
    click_through_rate, derive_status, AdStatus, Advertisement, Breakdown, DailyStat,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_TREND_DAYS: i64 = 30;
pub const MAX_TREND_DAYS: i64 = 365;
const TOP_ADS: usize = 10;

/// Admin rollup over every stored advertisement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub totals: Totals,
    pub by_type: Vec<BreakdownRow>,
    pub by_position: Vec<BreakdownRow>,
    pub daily_trends: Vec<DailyStat>,
    pub top_ads: Vec<TopAd>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub advertisements: i64,
    pub active: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownRow {
    pub key: String,
    pub advertisements: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub ctr: f64,
    /// Share of all impressions, whole percent.
    pub share: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopAd {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub ad_type: String,
    pub position: String,
    pub impressions: i64,
    pub clicks: i64,
    pub conversions: i64,
    pub ctr: f64,
}

/// Build the rollup as of `now`. `days` is clamped to `1..=MAX_TREND_DAYS`.
///
/// Activity is judged at `now`, not from the stored status, which is only
/// refreshed when a document is written.
pub fn summarize(ads: &[Advertisement], now: DateTime<Utc>, days: i64) -> AnalyticsSummary {
    let today = now.date_naive();
    let mut totals = Totals {
        advertisements: ads.len() as i64,
        ..Totals::default()
    };
    for ad in ads {
        if derive_status(ad.is_active, ad.start_date, ad.end_date, now) == AdStatus::Active {
            totals.active += 1;
        }
        totals.impressions += ad.impressions;
        totals.clicks += ad.clicks;
        totals.conversions += ad.conversions;
    }
    totals.ctr = click_through_rate(totals.clicks, totals.impressions);

    let by_type = group_by(ads, |ad| ad.ad_type.as_str().to_owned(), totals.impressions);
    let by_position = group_by(ads, |ad| ad.position.clone(), totals.impressions);

    let mut ranked: Vec<&Advertisement> = ads.iter().collect();
    ranked.sort_by(|a, b| b.impressions.cmp(&a.impressions));
    let top_ads = ranked
        .into_iter()
        .take(TOP_ADS)
        .map(|ad| TopAd {
            id: ad.id.clone(),
            name: ad.name.clone(),
            ad_type: ad.ad_type.as_str().to_owned(),
            position: ad.position.clone(),
            impressions: ad.impressions,
            clicks: ad.clicks,
            conversions: ad.conversions,
            ctr: ad.ctr,
        })
        .collect();

    AnalyticsSummary {
        totals,
        by_type,
        by_position,
        daily_trends: daily_trends(ads, today, days),
        top_ads,
    }
}

fn group_by(
    ads: &[Advertisement],
    key: impl Fn(&Advertisement) -> String,
    total_impressions: i64,
) -> Vec<BreakdownRow> {
    let mut groups: BTreeMap<String, (i64, i64, i64)> = BTreeMap::new();
    for ad in ads {
        let entry = groups.entry(key(ad)).or_default();
        entry.0 += 1;
        entry.1 += ad.impressions;
        entry.2 += ad.clicks;
    }

    let mut rows: Vec<BreakdownRow> = groups
        .into_iter()
        .map(|(key, (advertisements, impressions, clicks))| BreakdownRow {
            key,
            advertisements,
            impressions,
            clicks,
            ctr: click_through_rate(clicks, impressions),
            share: percent(impressions, total_impressions),
        })
        .collect();
    rows.sort_by(|a, b| b.impressions.cmp(&a.impressions));
    rows
}

/// Zero-filled per-day sums, oldest first, ending at `today`.
fn daily_trends(ads: &[Advertisement], today: NaiveDate, days: i64) -> Vec<DailyStat> {
    let days = days.clamp(1, MAX_TREND_DAYS);
    let first = today - Duration::days(days - 1);

    let mut trend: Vec<DailyStat> = (0..days)
        .map(|offset| DailyStat::empty(first + Duration::days(offset)))
        .collect();

    for stat in ads.iter().flat_map(|ad| ad.daily_stats.iter()) {
        if stat.date < first || stat.date > today {
            continue;
        }
        let slot = &mut trend[(stat.date - first).num_days() as usize];
        slot.impressions += stat.impressions;
        slot.clicks += stat.clicks;
        slot.conversions += stat.conversions;
    }
    trend
}

/// Top entries of one breakdown by impressions:
/// `(key, impressions, clicks, pct_of_total_impressions)`.
pub fn top_entries(breakdown: &Breakdown, total: i64) -> Vec<(String, i64, i64, i64)> {
    let mut rows: Vec<(String, i64, i64, i64)> = breakdown
        .iter()
        .map(|(key, stats)| {
            (
                key.clone(),
                stats.impressions,
                stats.clicks,
                percent(stats.impressions, total),
            )
        })
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1));
    rows.truncate(10);
    rows
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        part * 100 / total
    } else {
        0
    }
}
