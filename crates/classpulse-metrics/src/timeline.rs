//! Commit cadence histograms.

use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate, Timelike};
use classpulse_reconcile::NormalizedRepo;
use serde::{Deserialize, Serialize};

/// Commits per calendar day, gap-free between the first and last day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyHistogram {
    /// ISO dates (`YYYY-MM-DD`).
    pub full_dates: Vec<String>,
    pub counts: Vec<u64>,
}

/// Commits per hour of day, always 24 buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyHistogram {
    pub hours: Vec<u32>,
    pub counts: Vec<u64>,
}

/// Bucket every retained commit by its date in `tz`.
///
/// # Examples
///
/// ```
/// use chrono::FixedOffset;
/// use classpulse_metrics::timeline::daily_histogram;
///
/// let tz = FixedOffset::east_opt(8 * 3600).unwrap();
/// let hist = daily_histogram(&[], tz);
/// assert!(hist.full_dates.is_empty());
/// ```
pub fn daily_histogram(repos: &[&NormalizedRepo], tz: FixedOffset) -> DailyHistogram {
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for commit in repos.iter().flat_map(|r| &r.commits) {
        *by_day
            .entry(commit.committed_at.with_timezone(&tz).date_naive())
            .or_insert(0) += 1;
    }
    let (Some(first), Some(last)) = (
        by_day.keys().next().copied(),
        by_day.keys().next_back().copied(),
    ) else {
        return DailyHistogram::default();
    };

    let mut hist = DailyHistogram::default();
    for day in first.iter_days().take_while(|d| *d <= last) {
        hist.full_dates.push(day.format("%Y-%m-%d").to_string());
        hist.counts.push(by_day.get(&day).copied().unwrap_or(0));
    }
    hist
}

/// Bucket every retained commit by its hour in `tz`.
pub fn hourly_histogram(repos: &[&NormalizedRepo], tz: FixedOffset) -> HourlyHistogram {
    let mut counts = vec![0u64; 24];
    for commit in repos.iter().flat_map(|r| &r.commits) {
        counts[commit.committed_at.with_timezone(&tz).hour() as usize] += 1;
    }
    HourlyHistogram {
        hours: (0..24).collect(),
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{commit_at, repo};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn tz8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn daily_axis_fills_gaps() {
        let r = repo(
            "1",
            vec![
                commit_at("a", "U1", "2025-03-01T10:00:00+08:00"),
                commit_at("b", "U1", "2025-03-04T09:00:00+08:00"),
                commit_at("c", "U1", "2025-03-04T11:00:00+08:00"),
            ],
        );
        let hist = daily_histogram(&[&r], tz8());
        assert_eq!(
            hist.full_dates,
            ["2025-03-01", "2025-03-02", "2025-03-03", "2025-03-04"]
        );
        assert_eq!(hist.counts, [1, 0, 0, 2]);
    }

    #[test]
    fn buckets_use_target_zone() {
        // 23:30 UTC on Mar 1 is 07:30 on Mar 2 in UTC+8.
        let r = repo("1", vec![commit_at("a", "U1", "2025-03-01T23:30:00Z")]);
        let daily = daily_histogram(&[&r], tz8());
        assert_eq!(daily.full_dates, ["2025-03-02"]);
        let hourly = hourly_histogram(&[&r], tz8());
        assert_eq!(hourly.counts[7], 1);
        assert_eq!(hourly.hours.len(), 24);
    }

    proptest! {
        #[test]
        fn histogram_sums_match_commit_count(offsets in proptest::collection::vec(0i64..(60 * 24 * 90), 0..60)) {
            let commits = offsets
                .iter()
                .enumerate()
                .map(|(i, mins)| {
                    let at = chrono::DateTime::parse_from_rfc3339("2025-02-01T00:00:00+08:00").unwrap()
                        + chrono::Duration::minutes(*mins);
                    commit_at(&i.to_string(), "U1", &at.to_rfc3339())
                })
                .collect();
            let r = repo("1", commits);
            let daily = daily_histogram(&[&r], tz8());
            let hourly = hourly_histogram(&[&r], tz8());
            prop_assert_eq!(daily.counts.iter().sum::<u64>(), offsets.len() as u64);
            prop_assert_eq!(hourly.counts.iter().sum::<u64>(), offsets.len() as u64);
            for pair in daily.full_dates.windows(2) {
                let a = NaiveDate::parse_from_str(&pair[0], "%Y-%m-%d").unwrap();
                let b = NaiveDate::parse_from_str(&pair[1], "%Y-%m-%d").unwrap();
                prop_assert_eq!(a.succ_opt(), Some(b));
            }
        }
    }
}
