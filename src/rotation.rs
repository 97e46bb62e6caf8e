//! Advertisement selection for a single slot.
//!
//! Eligible advertisements are ranked, cut down to [`CANDIDATE_LIMIT`] and
//! grouped by their own rotation strategy. Groups are consulted in the fixed
//! order of [`RotationStrategy::PRECEDENCE`]; priority only matters inside
//! a group, never across groups.

use crate::{
    db::SlotFilter,
    models::{empty_as_none, AdType, Advertisement, RotationStrategy},
};
use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;
use std::cmp::Ordering;

/// How many ranked candidates take part in strategy grouping.
pub const CANDIDATE_LIMIT: usize = 10;

/// Slot description sent by the storefront.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationQuery {
    pub position: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "empty_as_none")]
    pub ad_type: Option<AdType>,
    pub context: Option<String>,
    pub rotation_group: Option<String>,
}

impl RotationQuery {
    /// The part of the query the store can filter on by column.
    pub fn slot(&self) -> SlotFilter<'_> {
        SlotFilter {
            position: non_empty(&self.position),
            ad_type: self.ad_type,
            rotation_group: non_empty(&self.rotation_group),
        }
    }

    /// Whether `ad` may be served for this slot at `now`.
    pub fn admits(&self, ad: &Advertisement, now: DateTime<Utc>) -> bool {
        if !ad.is_live(now) {
            return false;
        }
        if let Some(position) = non_empty(&self.position) {
            if ad.position != position {
                return false;
            }
        }
        if let Some(ad_type) = self.ad_type {
            if ad.ad_type != ad_type {
                return false;
            }
        }
        if let Some(group) = non_empty(&self.rotation_group) {
            if ad.rotation_group() != Some(group) {
                return false;
            }
        }
        match non_empty(&self.context) {
            Some(context) => ad.matches_context(context),
            None => true,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Priority desc, rotation priority desc, least recently shown first,
/// fewest impressions first.
fn rank_order(a: &Advertisement, b: &Advertisement) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| {
            b.rotation_settings
                .rotation_priority
                .cmp(&a.rotation_settings.rotation_priority)
        })
        .then_with(|| a.last_impression.cmp(&b.last_impression))
        .then_with(|| a.impressions.cmp(&b.impressions))
}

/// Sort candidates into serving order and keep the top [`CANDIDATE_LIMIT`].
pub fn rank(mut candidates: Vec<Advertisement>) -> Vec<Advertisement> {
    candidates.sort_by(rank_order);
    candidates.truncate(CANDIDATE_LIMIT);
    candidates
}

/// Impressions per unit of priority; non-positive priorities count as 1.
pub fn balance_ratio(ad: &Advertisement) -> f64 {
    ad.impressions as f64 / ad.priority.max(1) as f64
}

/// Pick one advertisement out of an already ranked list.
pub fn choose<'a, R: Rng + ?Sized>(
    ranked: &'a [Advertisement],
    rng: &mut R,
) -> Option<&'a Advertisement> {
    for strategy in RotationStrategy::PRECEDENCE {
        let group: Vec<&Advertisement> = ranked
            .iter()
            .filter(|ad| ad.rotation_settings.strategy == strategy)
            .collect();
        if group.is_empty() {
            continue;
        }

        let chosen = match strategy {
            RotationStrategy::Random => group[rng.gen_range(0..group.len())],
            RotationStrategy::Balanced => group
                .iter()
                .copied()
                .min_by(|a, b| {
                    balance_ratio(a)
                        .partial_cmp(&balance_ratio(b))
                        .unwrap_or(Ordering::Equal)
                })
                .unwrap_or(group[0]),
            // Ranking already puts the least recently shown first.
            RotationStrategy::Fixed | RotationStrategy::Sequential | RotationStrategy::Time => {
                group[0]
            }
        };
        return Some(chosen);
    }
    None
}

/// Filter, rank and choose in one go. Returns `None` when nothing is eligible.
pub fn select<R: Rng + ?Sized>(
    pool: Vec<Advertisement>,
    query: &RotationQuery,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Option<Advertisement> {
    let eligible: Vec<Advertisement> = pool.into_iter().filter(|ad| query.admits(ad, now)).collect();
    let ranked = rank(eligible);
    choose(&ranked, rng).cloned()
}

// ── Listing order ──────────────────────────────────────────────────────────

/// Parse the `rotation` query parameter of the public listing,
/// e.g. `strategy:random`.
pub fn parse_rotation_param(raw: &str) -> Result<RotationStrategy, String> {
    let value = raw
        .trim()
        .strip_prefix("strategy:")
        .ok_or_else(|| format!("rotation must look like 'strategy:<name>', got '{raw}'"))?;
    value.trim().parse()
}

/// Order a whole listing by one strategy. Without a strategy the listing
/// is ordered by priority.
pub fn order_listing<R: Rng + ?Sized>(
    ads: &mut [Advertisement],
    strategy: Option<RotationStrategy>,
    rng: &mut R,
) {
    match strategy {
        None | Some(RotationStrategy::Fixed) => ads.sort_by(|a, b| b.priority.cmp(&a.priority)),
        Some(RotationStrategy::Random) => ads.shuffle(rng),
        Some(RotationStrategy::Balanced) => ads.sort_by(|a, b| {
            balance_ratio(a)
                .partial_cmp(&balance_ratio(b))
                .unwrap_or(Ordering::Equal)
        }),
        Some(RotationStrategy::Sequential) | Some(RotationStrategy::Time) => {
            ads.sort_by(|a, b| a.last_impression.cmp(&b.last_impression))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{at, input};
    use chrono::Duration;
    use rand::{rngs::StdRng, SeedableRng};

    fn now() -> DateTime<Utc> {
        at(2026, 6, 15, 12)
    }

    fn ad(name: &str, priority: i32, strategy: RotationStrategy) -> Advertisement {
        let mut ad = Advertisement::new(input(name), now());
        ad.priority = priority;
        ad.rotation_settings.strategy = strategy;
        ad
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn inactive_or_out_of_window_ads_are_never_selected() {
        let query = RotationQuery::default();

        let mut paused = ad("paused", 5, RotationStrategy::Fixed);
        paused.is_active = false;
        assert!(select(vec![paused], &query, now(), &mut rng()).is_none());

        let mut expired = ad("expired", 5, RotationStrategy::Fixed);
        expired.end_date = now() - Duration::seconds(1);
        assert!(select(vec![expired], &query, now(), &mut rng()).is_none());

        let mut future = ad("future", 5, RotationStrategy::Fixed);
        future.start_date = now() + Duration::seconds(1);
        assert!(select(vec![future], &query, now(), &mut rng()).is_none());
    }

    #[test]
    fn empty_pool_yields_nothing() {
        assert!(select(Vec::new(), &RotationQuery::default(), now(), &mut rng()).is_none());
    }

    #[test]
    fn fixed_group_beats_random_regardless_of_priority() {
        let fixed = ad("fixed", 1, RotationStrategy::Fixed);
        let random = ad("random", 90, RotationStrategy::Random);

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let chosen = select(
                vec![random.clone(), fixed.clone()],
                &RotationQuery::default(),
                now(),
                &mut rng,
            )
            .unwrap();
            assert_eq!(chosen.name, "fixed");
        }
    }

    #[test]
    fn balanced_prefers_lowest_impressions_per_priority() {
        let mut a = ad("A", 5, RotationStrategy::Balanced);
        a.impressions = 10;
        let mut b = ad("B", 1, RotationStrategy::Balanced);
        b.impressions = 1;

        let chosen = select(vec![a, b], &RotationQuery::default(), now(), &mut rng()).unwrap();
        assert_eq!(chosen.name, "B");
    }

    #[test]
    fn balanced_treats_zero_priority_as_one() {
        let mut zero = ad("zero", 0, RotationStrategy::Balanced);
        zero.impressions = 4;
        assert_eq!(balance_ratio(&zero), 4.0);
    }

    #[test]
    fn sequential_and_time_serve_least_recently_shown() {
        for strategy in [RotationStrategy::Sequential, RotationStrategy::Time] {
            let mut recent = ad("recent", 3, strategy);
            recent.last_impression = Some(now() - Duration::minutes(1));
            let mut stale = ad("stale", 3, strategy);
            stale.last_impression = Some(now() - Duration::hours(5));

            let chosen = select(
                vec![recent, stale],
                &RotationQuery::default(),
                now(),
                &mut rng(),
            )
            .unwrap();
            assert_eq!(chosen.name, "stale");
        }
    }

    #[test]
    fn never_shown_ads_rank_before_shown_ones() {
        let mut shown = ad("shown", 3, RotationStrategy::Sequential);
        shown.last_impression = Some(now() - Duration::days(3));
        let fresh = ad("fresh", 3, RotationStrategy::Sequential);

        let ranked = rank(vec![shown, fresh]);
        assert_eq!(ranked[0].name, "fresh");
    }

    #[test]
    fn ranking_orders_by_priority_then_rotation_priority() {
        let low = ad("low", 1, RotationStrategy::Sequential);
        let mut high_b = ad("high-b", 9, RotationStrategy::Sequential);
        high_b.rotation_settings.rotation_priority = 1;
        let mut high_a = ad("high-a", 9, RotationStrategy::Sequential);
        high_a.rotation_settings.rotation_priority = 4;

        let names: Vec<String> = rank(vec![low, high_b, high_a])
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, ["high-a", "high-b", "low"]);
    }

    #[test]
    fn only_top_ten_take_part_in_grouping() {
        // Eleven sequential ads outrank a single fixed one; the fixed ad is
        // cut before grouping and cannot win.
        let mut pool: Vec<Advertisement> = (0..CANDIDATE_LIMIT)
            .map(|i| ad(&format!("seq-{i}"), 50, RotationStrategy::Sequential))
            .collect();
        pool.push(ad("fixed-low", 1, RotationStrategy::Fixed));

        let chosen = select(pool, &RotationQuery::default(), now(), &mut rng()).unwrap();
        assert!(chosen.name.starts_with("seq-"));
    }

    #[test]
    fn query_filters_slot_type_group_and_context() {
        let mut shop = ad("shop", 1, RotationStrategy::Fixed);
        shop.position = "shop".into();
        shop.ad_type = AdType::Sidebar;
        shop.target_context = vec!["electronics".into()];
        shop.rotation_settings.rotation_group = Some("summer".into());

        let query = RotationQuery {
            position: Some("shop".into()),
            ad_type: Some(AdType::Sidebar),
            context: Some("electronics".into()),
            rotation_group: Some("summer".into()),
        };
        assert!(query.admits(&shop, now()));

        let other_context = RotationQuery {
            context: Some("fashion".into()),
            ..query.clone()
        };
        assert!(!other_context.admits(&shop, now()));

        let other_group = RotationQuery {
            rotation_group: Some("winter".into()),
            ..query.clone()
        };
        assert!(!other_group.admits(&shop, now()));

        let other_type = RotationQuery {
            ad_type: Some(AdType::Popup),
            ..query
        };
        assert!(!other_type.admits(&shop, now()));
    }

    #[test]
    fn open_targeting_matches_any_context() {
        let open = ad("open", 1, RotationStrategy::Fixed);
        let query = RotationQuery {
            context: Some("anything".into()),
            ..Default::default()
        };
        assert!(query.admits(&open, now()));
    }

    #[test]
    fn random_picks_within_the_random_group() {
        let pool = vec![
            ad("r1", 2, RotationStrategy::Random),
            ad("r2", 2, RotationStrategy::Random),
            ad("b", 9, RotationStrategy::Balanced),
        ];
        let chosen = select(pool, &RotationQuery::default(), now(), &mut rng()).unwrap();
        assert!(chosen.name == "r1" || chosen.name == "r2");
    }

    #[test]
    fn balanced_group_beats_sequential_and_time() {
        let time = ad("time", 90, RotationStrategy::Time);
        let sequential = ad("sequential", 1, RotationStrategy::Sequential);
        let balanced = ad("balanced", 1, RotationStrategy::Balanced);

        let chosen = select(
            vec![time, sequential, balanced],
            &RotationQuery::default(),
            now(),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(chosen.name, "balanced");
    }

    #[test]
    fn sequential_group_beats_time() {
        let mut time = ad("time", 90, RotationStrategy::Time);
        time.last_impression = None;
        let mut sequential = ad("sequential", 1, RotationStrategy::Sequential);
        sequential.last_impression = Some(now() - Duration::minutes(5));

        let chosen = select(
            vec![time, sequential],
            &RotationQuery::default(),
            now(),
            &mut rng(),
        )
        .unwrap();
        assert_eq!(chosen.name, "sequential");
    }

    #[test]
    fn slot_filter_skips_blank_values() {
        let query = RotationQuery {
            position: Some(" home ".into()),
            ad_type: Some(AdType::Video),
            context: Some("electronics".into()),
            rotation_group: Some("  ".into()),
        };
        let slot = query.slot();
        assert_eq!(slot.position, Some("home"));
        assert_eq!(slot.ad_type, Some(AdType::Video));
        assert_eq!(slot.rotation_group, None);
    }

    #[test]
    fn rotation_param_parsing() {
        assert_eq!(parse_rotation_param("strategy:balanced"), Ok(RotationStrategy::Balanced));
        assert!(parse_rotation_param("balanced").is_err());
        assert!(parse_rotation_param("strategy:weighted").is_err());
    }

    #[test]
    fn listing_orders_by_strategy() {
        let mut heavy = ad("heavy", 1, RotationStrategy::Sequential);
        heavy.impressions = 50;
        let light = ad("light", 1, RotationStrategy::Sequential);
        let mut top = ad("top", 10, RotationStrategy::Sequential);
        top.impressions = 500;

        let mut ads = vec![heavy.clone(), light.clone(), top.clone()];
        order_listing(&mut ads, None, &mut rng());
        assert_eq!(ads[0].name, "top");

        order_listing(&mut ads, Some(RotationStrategy::Balanced), &mut rng());
        assert_eq!(ads[0].name, "light");
    }
}
