//! Windowed aggregation over ledger events.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::event::{UsageEvent, UsageWindow};

/// One provider's share of the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderShare {
    pub provider: String,
    pub tokens: u64,
    /// Percentage of the window's used tokens.
    pub percentage: f64,
}

/// Per-day totals as parallel arrays, oldest day first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySeries {
    pub labels: Vec<String>,
    pub totals: Vec<u64>,
}

impl DailySeries {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(label, total)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.totals.iter().copied())
    }
}

/// Result of an aggregate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub window: UsageWindow,
    /// Sum of all configured limits.
    pub total: u64,
    pub used: u64,
    pub remaining: u64,
    pub percent_used: f64,
    pub provider_breakdown: Vec<ProviderShare>,
    pub daily_series: DailySeries,
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Aggregate `events` for `window` as evaluated at `now`, bucketing days in `tz`.
#[must_use]
pub fn aggregate<Tz: TimeZone>(
    events: &[UsageEvent],
    limits: &BTreeMap<String, u64>,
    window: UsageWindow,
    now: DateTime<Utc>,
    tz: &Tz,
) -> UsageStats {
    let start = window.start(now);
    let in_window: Vec<&UsageEvent> = events
        .iter()
        .filter(|e| start.is_none_or(|start| e.timestamp() >= start))
        .collect();

    let total = limits.values().fold(0u64, |acc, v| acc.saturating_add(*v));
    let used = in_window
        .iter()
        .fold(0u64, |acc, e| acc.saturating_add(e.total_tokens()));

    let mut per_provider: HashMap<&str, u64> = HashMap::new();
    let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for event in &in_window {
        let tokens = per_provider.entry(event.provider()).or_default();
        *tokens = tokens.saturating_add(event.total_tokens());

        let day = event.timestamp().with_timezone(tz).date_naive();
        let day_total = per_day.entry(day).or_default();
        *day_total = day_total.saturating_add(event.total_tokens());
    }

    let mut provider_breakdown: Vec<ProviderShare> = per_provider
        .into_iter()
        .map(|(provider, tokens)| ProviderShare {
            provider: provider.to_string(),
            tokens,
            percentage: percent(tokens, used),
        })
        .collect();
    provider_breakdown.sort_by(|a, b| {
        b.tokens
            .cmp(&a.tokens)
            .then_with(|| a.provider.cmp(&b.provider))
    });

    let (labels, totals) = per_day
        .into_iter()
        .map(|(day, total)| (day.format("%Y-%m-%d").to_string(), total))
        .unzip();

    UsageStats {
        window,
        total,
        used,
        remaining: total.saturating_sub(used),
        percent_used: percent(used, total),
        provider_breakdown,
        daily_series: DailySeries { labels, totals },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn now() -> DateTime<Utc> {
        "2026-03-10T12:00:00Z".parse().expect("timestamp")
    }

    fn limits(pairs: &[(&str, u64)]) -> BTreeMap<String, u64> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    #[test]
    fn single_provider_example() {
        let events = vec![UsageEvent::new("A", "m", 40, 60).at(now() - Duration::hours(1))];
        let stats = aggregate(&events, &limits(&[("A", 1000)]), UsageWindow::Day, now(), &Utc);
        assert_eq!(stats.total, 1000);
        assert_eq!(stats.used, 100);
        assert_eq!(stats.remaining, 900);
        assert!((stats.percent_used - 10.0).abs() < f64::EPSILON);
        assert_eq!(stats.provider_breakdown.len(), 1);
        assert_eq!(stats.provider_breakdown[0].provider, "A");
        assert_eq!(stats.provider_breakdown[0].tokens, 100);
        assert!((stats.provider_breakdown[0].percentage - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_ledger_is_all_zero() {
        let stats = aggregate(&[], &BTreeMap::new(), UsageWindow::All, now(), &Utc);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.remaining, 0);
        assert!(stats.percent_used.abs() < f64::EPSILON);
        assert!(stats.provider_breakdown.is_empty());
        assert!(stats.daily_series.is_empty());
    }

    #[test]
    fn window_boundaries() {
        let events = vec![UsageEvent::new("A", "m", 10, 0).at(now() - Duration::hours(25))];
        let lim = limits(&[]);
        assert_eq!(aggregate(&events, &lim, UsageWindow::Day, now(), &Utc).used, 0);
        assert_eq!(aggregate(&events, &lim, UsageWindow::Week, now(), &Utc).used, 10);
        assert_eq!(aggregate(&events, &lim, UsageWindow::All, now(), &Utc).used, 10);
    }

    #[test]
    fn window_start_is_inclusive() {
        let events = vec![UsageEvent::new("A", "m", 5, 0).at(now() - Duration::hours(24))];
        assert_eq!(aggregate(&events, &limits(&[]), UsageWindow::Day, now(), &Utc).used, 5);
    }

    #[test]
    fn used_over_total_clamps_remaining() {
        let events = vec![UsageEvent::new("A", "m", 800, 400).at(now())];
        let stats = aggregate(&events, &limits(&[("A", 1000)]), UsageWindow::Day, now(), &Utc);
        assert_eq!(stats.remaining, 0);
        assert!((stats.percent_used - 120.0).abs() < 1e-9);
    }

    #[test]
    fn total_sums_every_limit() {
        let events = vec![UsageEvent::new("A", "m", 10, 0).at(now())];
        let stats = aggregate(
            &events,
            &limits(&[("A", 100), ("B", 300)]),
            UsageWindow::Day,
            now(),
            &Utc,
        );
        assert_eq!(stats.total, 400);
        assert_eq!(stats.provider_breakdown.len(), 1);
    }

    #[test]
    fn breakdown_orders_by_tokens_then_name() {
        let events = vec![
            UsageEvent::new("b", "m", 50, 0).at(now()),
            UsageEvent::new("a", "m", 50, 0).at(now()),
            UsageEvent::new("c", "m", 100, 0).at(now()),
        ];
        let stats = aggregate(&events, &limits(&[]), UsageWindow::Day, now(), &Utc);
        let order: Vec<&str> = stats.provider_breakdown.iter().map(|s| s.provider.as_str()).collect();
        assert_eq!(order, ["c", "a", "b"]);
        assert!((stats.provider_breakdown[0].percentage - 50.0).abs() < 1e-9);
    }

    #[test]
    fn daily_series_uses_local_dates_ascending() {
        let tz = FixedOffset::east_opt(9 * 3600).expect("offset");
        let events = vec![
            UsageEvent::new("A", "m", 1, 0).at("2026-03-09T16:00:00Z".parse().expect("ts")),
            UsageEvent::new("A", "m", 2, 0).at("2026-03-09T14:00:00Z".parse().expect("ts")),
            UsageEvent::new("A", "m", 4, 0).at("2026-03-08T10:00:00Z".parse().expect("ts")),
        ];
        let stats = aggregate(&events, &limits(&[]), UsageWindow::Week, now(), &tz);
        assert_eq!(stats.daily_series.labels, ["2026-03-08", "2026-03-09", "2026-03-10"]);
        assert_eq!(stats.daily_series.totals, [4, 2, 1]);
    }

    #[test]
    fn stats_serialize_camel_case() {
        let stats = aggregate(&[], &BTreeMap::new(), UsageWindow::Month, now(), &Utc);
        let value = serde_json::to_value(&stats).expect("serialize");
        assert_eq!(value["window"], "30d");
        assert!(value.get("percentUsed").is_some());
        assert!(value.get("providerBreakdown").is_some());
        assert!(value["dailySeries"]["labels"].is_array());
    }
}
