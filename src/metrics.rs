//! Folding storefront events into an advertisement's analytics counters.

use crate::models::{
    Advertisement, Breakdown, DailyStat, ViewDuration, MAX_VIEW_DURATIONS,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Impression,
    Click,
    Conversion,
    ViewDuration,
    Contextual,
}

/// Why an event was refused before touching the document.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EventError {
    #[error("unknown analytics event '{0}'")]
    UnknownKind(String),
    #[error("duration must be a non-negative number")]
    InvalidDuration,
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impression" => Ok(EventKind::Impression),
            "click" => Ok(EventKind::Click),
            "conversion" => Ok(EventKind::Conversion),
            "viewDuration" => Ok(EventKind::ViewDuration),
            "contextual" => Ok(EventKind::Contextual),
            other => Err(EventError::UnknownKind(other.to_owned())),
        }
    }
}

/// Request body shared by every analytics event endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdEvent {
    pub advertisement_id: String,
    pub position: Option<String>,
    pub page: Option<String>,
    pub device_type: Option<String>,
    pub page_context: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub rotation_group: Option<String>,
    /// View time in milliseconds, `viewDuration` events only.
    pub duration: Option<f64>,
    pub viewport_size: Option<String>,
}

/// Which counter an event bumps.
#[derive(Clone, Copy)]
enum Counter {
    Impression,
    Click,
    Conversion,
}

/// Apply one event to `ad` in place and recompute derived fields.
///
/// Fails when the event is missing data it needs; the document is left
/// untouched in that case.
pub fn record(
    ad: &mut Advertisement,
    kind: EventKind,
    event: &AdEvent,
    now: DateTime<Utc>,
) -> Result<(), EventError> {
    match kind {
        EventKind::Impression => count(ad, Counter::Impression, event, now),
        EventKind::Click => count(ad, Counter::Click, event, now),
        EventKind::Conversion => count(ad, Counter::Conversion, event, now),
        EventKind::Contextual => {
            count(ad, Counter::Impression, event, now);
            update_relevance(ad, event);
        }
        EventKind::ViewDuration => {
            let duration = event
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .ok_or(EventError::InvalidDuration)?;
            push_view_duration(
                ad,
                ViewDuration {
                    duration,
                    viewport_size: event.viewport_size.clone(),
                    recorded_at: now,
                },
            );
        }
    }
    ad.recompute_ctr();
    Ok(())
}

fn count(ad: &mut Advertisement, counter: Counter, event: &AdEvent, now: DateTime<Utc>) {
    match counter {
        Counter::Impression => ad.impressions += 1,
        Counter::Click => ad.clicks += 1,
        Counter::Conversion => ad.conversions += 1,
    }

    bump(&mut ad.devices, event.device_type.as_deref(), counter);
    bump(&mut ad.positions, event.position.as_deref(), counter);
    bump(&mut ad.pages, event.page.as_deref(), counter);
    bump(&mut ad.contexts, event.page_context.as_deref(), counter);
    bump(&mut ad.rotation_groups, event.rotation_group.as_deref(), counter);
    for keyword in &event.keywords {
        bump(&mut ad.keyword_stats, Some(keyword.as_str()), counter);
    }

    let bucket = daily_bucket(&mut ad.daily_stats, now);
    match counter {
        Counter::Impression => bucket.impressions += 1,
        Counter::Click => bucket.clicks += 1,
        Counter::Conversion => bucket.conversions += 1,
    }
}

fn bump(breakdown: &mut Breakdown, key: Option<&str>, counter: Counter) {
    let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
        return;
    };
    let entry = breakdown.entry(key.to_owned()).or_default();
    match counter {
        Counter::Impression => entry.impressions += 1,
        Counter::Click => entry.clicks += 1,
        Counter::Conversion => entry.conversions += 1,
    }
}

/// Today's bucket, created on first use. Days are UTC calendar days.
pub fn daily_bucket(stats: &mut Vec<DailyStat>, now: DateTime<Utc>) -> &mut DailyStat {
    let today = now.date_naive();
    let existing = stats.iter().position(|s| s.date == today);
    match existing {
        Some(i) => &mut stats[i],
        None => {
            stats.push(DailyStat::empty(today));
            let last = stats.len() - 1;
            &mut stats[last]
        }
    }
}

/// Append a view duration, evicting the oldest entries beyond the cap.
pub fn push_view_duration(ad: &mut Advertisement, entry: ViewDuration) {
    ad.view_durations.push(entry);
    let len = ad.view_durations.len();
    if len > MAX_VIEW_DURATIONS {
        ad.view_durations.drain(..len - MAX_VIEW_DURATIONS);
    }
}

/// Running mean of per-event keyword overlap.
fn update_relevance(ad: &mut Advertisement, event: &AdEvent) {
    let sample = if ad.keywords.is_empty() {
        match event.page_context.as_deref() {
            Some(ctx) if ad.target_context.iter().any(|c| c == ctx) => 1.0,
            _ => 0.0,
        }
    } else {
        let matched = ad
            .keywords
            .iter()
            .filter(|k| event.keywords.iter().any(|e| e.eq_ignore_ascii_case(k)))
            .count();
        matched as f64 / ad.keywords.len() as f64
    };

    let n = ad.relevance_samples as f64;
    ad.relevance_score = (ad.relevance_score * n + sample) / (n + 1.0);
    ad.relevance_samples += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        click_through_rate,
        tests::{at, input},
    };
    use chrono::Duration;

    fn fresh() -> Advertisement {
        Advertisement::new(input("promo"), at(2026, 6, 1, 0))
    }

    fn event() -> AdEvent {
        AdEvent {
            advertisement_id: "x".into(),
            position: Some("home".into()),
            page: Some("/".into()),
            device_type: Some("mobile".into()),
            ..Default::default()
        }
    }

    #[test]
    fn ctr_tracks_every_counter_update() {
        let mut ad = fresh();
        let now = at(2026, 6, 2, 10);
        let ev = event();

        record(&mut ad, EventKind::Click, &ev, now).unwrap();
        assert_eq!(ad.ctr, 0.0);

        for kind in [
            EventKind::Impression,
            EventKind::Impression,
            EventKind::Click,
            EventKind::Impression,
            EventKind::Conversion,
        ] {
            record(&mut ad, kind, &ev, now).unwrap();
            assert_eq!(ad.ctr, click_through_rate(ad.clicks, ad.impressions));
        }
        assert_eq!((ad.impressions, ad.clicks, ad.conversions), (3, 2, 1));
    }

    #[test]
    fn view_durations_keep_the_newest_thousand() {
        let mut ad = fresh();
        let start = at(2026, 6, 2, 0);
        for i in 0..(MAX_VIEW_DURATIONS + 25) {
            let ev = AdEvent {
                duration: Some(i as f64),
                ..event()
            };
            record(&mut ad, EventKind::ViewDuration, &ev, start + Duration::seconds(i as i64))
                .unwrap();
            assert!(ad.view_durations.len() <= MAX_VIEW_DURATIONS);
        }
        assert_eq!(ad.view_durations.len(), MAX_VIEW_DURATIONS);
        assert_eq!(ad.view_durations[0].duration, 25.0);
        assert_eq!(ad.impressions, 0);
    }

    #[test]
    fn view_duration_requires_a_duration() {
        let mut ad = fresh();
        let err = record(&mut ad, EventKind::ViewDuration, &event(), at(2026, 6, 2, 0));
        assert_eq!(err, Err(EventError::InvalidDuration));

        let negative = AdEvent {
            duration: Some(-1.0),
            ..event()
        };
        let err = record(&mut ad, EventKind::ViewDuration, &negative, at(2026, 6, 2, 0));
        assert_eq!(err, Err(EventError::InvalidDuration));
        assert!(ad.view_durations.is_empty());
    }

    #[test]
    fn one_daily_bucket_per_day() {
        let mut ad = fresh();
        let ev = event();
        record(&mut ad, EventKind::Impression, &ev, at(2026, 6, 2, 1)).unwrap();
        record(&mut ad, EventKind::Impression, &ev, at(2026, 6, 2, 23)).unwrap();
        record(&mut ad, EventKind::Click, &ev, at(2026, 6, 2, 12)).unwrap();
        record(&mut ad, EventKind::Impression, &ev, at(2026, 6, 3, 0)).unwrap();

        assert_eq!(ad.daily_stats.len(), 2);
        assert_eq!(ad.daily_stats[0].impressions, 2);
        assert_eq!(ad.daily_stats[0].clicks, 1);
        assert_eq!(ad.daily_stats[1].impressions, 1);
    }

    #[test]
    fn breakdowns_are_upserted_per_dimension() {
        let mut ad = fresh();
        let now = at(2026, 6, 2, 0);
        let ev = AdEvent {
            page_context: Some("electronics".into()),
            keywords: vec!["phone".into(), "case".into(), " ".into()],
            rotation_group: Some("summer".into()),
            ..event()
        };
        record(&mut ad, EventKind::Impression, &ev, now).unwrap();
        record(&mut ad, EventKind::Click, &ev, now).unwrap();

        assert_eq!(ad.devices["mobile"].impressions, 1);
        assert_eq!(ad.devices["mobile"].clicks, 1);
        assert_eq!(ad.positions["home"].impressions, 1);
        assert_eq!(ad.pages["/"].impressions, 1);
        assert_eq!(ad.contexts["electronics"].clicks, 1);
        assert_eq!(ad.keyword_stats.len(), 2);
        assert_eq!(ad.rotation_groups["summer"].impressions, 1);
    }

    #[test]
    fn contextual_events_update_relevance() {
        let mut ad = fresh();
        ad.keywords = vec!["phone".into(), "case".into()];
        let now = at(2026, 6, 2, 0);

        let half = AdEvent {
            keywords: vec!["Phone".into()],
            ..event()
        };
        record(&mut ad, EventKind::Contextual, &half, now).unwrap();
        assert_eq!(ad.relevance_score, 0.5);

        let full = AdEvent {
            keywords: vec!["phone".into(), "case".into()],
            ..event()
        };
        record(&mut ad, EventKind::Contextual, &full, now).unwrap();
        assert_eq!(ad.relevance_score, 0.75);
        assert_eq!(ad.impressions, 2);
    }

    #[test]
    fn event_kind_names() {
        assert_eq!("viewDuration".parse::<EventKind>(), Ok(EventKind::ViewDuration));
        assert_eq!(
            "hover".parse::<EventKind>(),
            Err(EventError::UnknownKind("hover".into()))
        );
    }
}
