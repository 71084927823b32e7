//! Streak computation engine.
//!
//! Every metric here is a pure function of an activity's completed-date set
//! plus a caller-supplied `today`. Nothing is cached or denormalized: the
//! handlers fetch raw entries and recompute on every read, so there is no
//! invalidation problem. The engine is total over its input domain — an
//! empty set yields zeros, never an error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::activity::{ActivityCategory, ActivityFrequency};

/// The five derived metrics for a single activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityMetrics {
    pub current_streak: i32,
    pub best_streak: i32,
    pub total_completions: i64,
    pub completed_today: bool,
    pub weekly_progress: i32,
}

pub fn compute_metrics(
    frequency: ActivityFrequency,
    target_days: i32,
    completed: &BTreeSet<NaiveDate>,
    today: NaiveDate,
) -> ActivityMetrics {
    ActivityMetrics {
        current_streak: current_streak(completed, today),
        best_streak: best_streak(completed),
        total_completions: completed.len() as i64,
        completed_today: completed.contains(&today),
        weekly_progress: weekly_progress(frequency, target_days, completed, today),
    }
}

/// Consecutive completed days ending at `today`. If `today` itself is not
/// completed the streak is 0 — the walk never looks past today's gap.
pub fn current_streak(completed: &BTreeSet<NaiveDate>, today: NaiveDate) -> i32 {
    let mut streak = 0;
    let mut cursor = today;
    while completed.contains(&cursor) {
        streak += 1;
        cursor -= Duration::days(1);
    }
    streak
}

/// Longest consecutive run anywhere in the set. BTreeSet iteration is
/// already date-ordered, so a single scan suffices.
pub fn best_streak(completed: &BTreeSet<NaiveDate>) -> i32 {
    let mut best = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;

    for &date in completed {
        match prev {
            Some(p) if date == p + Duration::days(1) => run += 1,
            _ => {
                best = best.max(run);
                run = 1;
            }
        }
        prev = Some(date);
    }
    best.max(run)
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Progress through the Monday-start week containing `today`, as a
/// percentage. Policy depends on frequency:
/// - daily:  completed days / 7
/// - weekly: 100 if any day in the week is completed, else 0
/// - custom: completed days / target_days — deliberately not clamped, so a
///   user who beats their target sees more than 100
pub fn weekly_progress(
    frequency: ActivityFrequency,
    target_days: i32,
    completed: &BTreeSet<NaiveDate>,
    today: NaiveDate,
) -> i32 {
    let start = week_start(today);
    let end = start + Duration::days(6);
    let completed_days = completed.range(start..=end).count() as i64;

    match frequency {
        ActivityFrequency::Daily => {
            let total_days = 7i64.min((end - start).num_days() + 1);
            if total_days > 0 {
                percent(completed_days, total_days)
            } else {
                0
            }
        }
        ActivityFrequency::Weekly => {
            if completed_days > 0 {
                100
            } else {
                0
            }
        }
        ActivityFrequency::Custom => {
            if target_days > 0 {
                percent(completed_days, target_days as i64)
            } else {
                0
            }
        }
    }
}

// Ties round away from zero (f64::round), so 12.5 -> 13.
fn percent(numerator: i64, denominator: i64) -> i32 {
    (numerator as f64 / denominator as f64 * 100.0).round() as i32
}

/// Share of entries marked completed, as a percentage rounded to 1 decimal.
/// The denominator is the full entry count, completed or not; 0 when no
/// entries exist.
pub fn completion_rate(completed: i64, total_entries: i64) -> f64 {
    if total_entries <= 0 {
        return 0.0;
    }
    round_1dp(completed as f64 / total_entries as f64 * 100.0)
}

/// Arithmetic mean rounded to 1 decimal place; 0 for an empty slice.
pub fn mean_1dp(values: impl Iterator<Item = f64>, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let sum: f64 = values.sum();
    round_1dp(sum / count as f64)
}

// Ties round away from zero, so 0.25 -> 0.3.
pub fn round_1dp(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Dashboard-level reduction over per-activity metrics.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct DashboardRollup {
    pub total_activities: i64,
    pub active_streaks: i64,
    pub completed_today: i64,
    pub average_streak: f64,
    pub weekly_progress: f64,
}

pub fn dashboard_rollup(metrics: &[ActivityMetrics]) -> DashboardRollup {
    let n = metrics.len();
    DashboardRollup {
        total_activities: n as i64,
        active_streaks: metrics.iter().filter(|m| m.current_streak > 0).count() as i64,
        completed_today: metrics.iter().filter(|m| m.completed_today).count() as i64,
        average_streak: mean_1dp(metrics.iter().map(|m| m.current_streak as f64), n),
        weekly_progress: mean_1dp(metrics.iter().map(|m| m.weekly_progress as f64), n),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct CategoryStats {
    pub count: i64,
    pub avg_streak: f64,
    pub avg_completions: f64,
}

/// Per-category reduction, keyed by the category display name. Reuses the
/// same per-activity metrics as the single-activity views.
pub fn category_breakdown(
    items: &[(ActivityCategory, ActivityMetrics)],
) -> BTreeMap<&'static str, CategoryStats> {
    let mut grouped: BTreeMap<&'static str, Vec<&ActivityMetrics>> = BTreeMap::new();
    for (category, metrics) in items {
        grouped.entry(category.display_name()).or_default().push(metrics);
    }

    grouped
        .into_iter()
        .map(|(name, group)| {
            let n = group.len();
            let stats = CategoryStats {
                count: n as i64,
                avg_streak: mean_1dp(group.iter().map(|m| m.current_streak as f64), n),
                avg_completions: mean_1dp(group.iter().map(|m| m.total_completions as f64), n),
            };
            (name, stats)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn set(dates: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        dates.iter().copied().collect()
    }

    #[test]
    fn test_current_streak_consecutive() {
        let today = d(2025, 3, 14);
        let completed = set(&[today, today - Duration::days(1), today - Duration::days(2)]);
        assert_eq!(current_streak(&completed, today), 3);
    }

    #[test]
    fn test_current_streak_gap_behind_today() {
        // {today, today-2}: today counts, but the chain stops at the gap
        let today = d(2025, 3, 14);
        let completed = set(&[today, today - Duration::days(2)]);
        assert_eq!(current_streak(&completed, today), 1);
    }

    #[test]
    fn test_current_streak_requires_today() {
        let today = d(2025, 3, 14);
        let completed = set(&[today - Duration::days(1), today - Duration::days(2)]);
        assert_eq!(current_streak(&completed, today), 0);
    }

    #[test]
    fn test_current_streak_empty() {
        assert_eq!(current_streak(&BTreeSet::new(), d(2025, 3, 14)), 0);
    }

    #[test]
    fn test_best_streak_over_gap() {
        let base = d(2025, 1, 1);
        let completed = set(&[
            base,
            base + Duration::days(1),
            base + Duration::days(2),
            base + Duration::days(5),
            base + Duration::days(6),
        ]);
        assert_eq!(best_streak(&completed), 3);
    }

    #[test]
    fn test_best_streak_single_day() {
        assert_eq!(best_streak(&set(&[d(2025, 1, 1)])), 1);
    }

    #[test]
    fn test_best_streak_empty() {
        assert_eq!(best_streak(&BTreeSet::new()), 0);
    }

    #[test]
    fn test_best_streak_run_at_end() {
        // Longest run is the trailing one — max must be taken after the scan
        let base = d(2025, 1, 1);
        let completed = set(&[
            base,
            base + Duration::days(3),
            base + Duration::days(4),
            base + Duration::days(5),
        ]);
        assert_eq!(best_streak(&completed), 3);
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2025-03-14 is a Friday
        assert_eq!(week_start(d(2025, 3, 14)), d(2025, 3, 10));
        // Monday maps to itself
        assert_eq!(week_start(d(2025, 3, 10)), d(2025, 3, 10));
        // Sunday maps back to the preceding Monday
        assert_eq!(week_start(d(2025, 3, 16)), d(2025, 3, 10));
    }

    #[test]
    fn test_weekly_progress_daily_five_of_seven() {
        let today = d(2025, 3, 14); // Friday; week = Mar 10..=16
        let completed = set(&[
            d(2025, 3, 10),
            d(2025, 3, 11),
            d(2025, 3, 12),
            d(2025, 3, 13),
            d(2025, 3, 14),
        ]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Daily, 1, &completed, today),
            71
        );
    }

    #[test]
    fn test_weekly_progress_daily_ignores_other_weeks() {
        let today = d(2025, 3, 14);
        // Previous Sunday + next Monday must not count
        let completed = set(&[d(2025, 3, 9), d(2025, 3, 17), d(2025, 3, 12)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Daily, 1, &completed, today),
            14
        );
    }

    #[test]
    fn test_weekly_progress_weekly() {
        let today = d(2025, 3, 14);
        let completed = set(&[d(2025, 3, 11)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Weekly, 1, &completed, today),
            100
        );
        assert_eq!(
            weekly_progress(ActivityFrequency::Weekly, 1, &BTreeSet::new(), today),
            0
        );
    }

    #[test]
    fn test_weekly_progress_custom() {
        let today = d(2025, 3, 14);
        let completed = set(&[d(2025, 3, 10), d(2025, 3, 11), d(2025, 3, 12)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Custom, 3, &completed, today),
            100
        );
        assert_eq!(
            weekly_progress(ActivityFrequency::Custom, 4, &completed, today),
            75
        );
    }

    #[test]
    fn test_weekly_progress_custom_exceeds_hundred() {
        // More completions than target is reported as-is, not clamped
        let today = d(2025, 3, 14);
        let completed = set(&[d(2025, 3, 10), d(2025, 3, 11), d(2025, 3, 12), d(2025, 3, 13)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Custom, 2, &completed, today),
            200
        );
    }

    #[test]
    fn test_weekly_progress_ties_round_away_from_zero() {
        // 1/8 of a week = 12.5%; rounds to 13, not banker's 12
        let today = d(2025, 3, 14);
        let completed = set(&[d(2025, 3, 12)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Custom, 8, &completed, today),
            13
        );
    }

    #[test]
    fn test_weekly_progress_zero_target_guard() {
        let today = d(2025, 3, 14);
        let completed = set(&[d(2025, 3, 12)]);
        assert_eq!(
            weekly_progress(ActivityFrequency::Custom, 0, &completed, today),
            0
        );
    }

    #[test]
    fn test_empty_set_boundaries() {
        let today = d(2025, 3, 14);
        let m = compute_metrics(ActivityFrequency::Daily, 1, &BTreeSet::new(), today);
        assert_eq!(m.current_streak, 0);
        assert_eq!(m.best_streak, 0);
        assert_eq!(m.total_completions, 0);
        assert!(!m.completed_today);
        assert_eq!(m.weekly_progress, 0);
    }

    #[test]
    fn test_compute_metrics_consistency() {
        let today = d(2025, 3, 14);
        let completed = set(&[today, today - Duration::days(1), d(2025, 3, 1)]);
        let m = compute_metrics(ActivityFrequency::Daily, 1, &completed, today);
        assert_eq!(m.current_streak, current_streak(&completed, today));
        assert_eq!(m.best_streak, best_streak(&completed));
        assert_eq!(m.total_completions, 3);
        assert!(m.completed_today);
    }

    fn metrics(streak: i32, completed_today: bool, progress: i32, completions: i64) -> ActivityMetrics {
        ActivityMetrics {
            current_streak: streak,
            best_streak: streak,
            total_completions: completions,
            completed_today,
            weekly_progress: progress,
        }
    }

    #[test]
    fn test_dashboard_rollup() {
        let items = [
            metrics(3, true, 71, 10),
            metrics(0, false, 0, 2),
            metrics(1, true, 100, 5),
        ];
        let rollup = dashboard_rollup(&items);
        assert_eq!(rollup.total_activities, 3);
        assert_eq!(rollup.active_streaks, 2);
        assert_eq!(rollup.completed_today, 2);
        assert_eq!(rollup.average_streak, 1.3); // (3+0+1)/3 = 1.333..
        assert_eq!(rollup.weekly_progress, 57.0); // (71+0+100)/3 = 57.0
    }

    #[test]
    fn test_dashboard_rollup_empty() {
        let rollup = dashboard_rollup(&[]);
        assert_eq!(rollup.total_activities, 0);
        assert_eq!(rollup.average_streak, 0.0);
        assert_eq!(rollup.weekly_progress, 0.0);
    }

    #[test]
    fn test_category_breakdown() {
        let items = [
            (ActivityCategory::Learning, metrics(4, true, 50, 8)),
            (ActivityCategory::Learning, metrics(1, false, 25, 3)),
            (ActivityCategory::Work, metrics(2, true, 100, 6)),
        ];
        let breakdown = category_breakdown(&items);
        let learning = &breakdown["Learning"];
        assert_eq!(learning.count, 2);
        assert_eq!(learning.avg_streak, 2.5);
        assert_eq!(learning.avg_completions, 5.5);
        let work = &breakdown["Work"];
        assert_eq!(work.count, 1);
        assert_eq!(work.avg_streak, 2.0);
    }

    #[test]
    fn test_round_1dp() {
        assert_eq!(round_1dp(1.25), 1.3); // tie rounds away from zero
        assert_eq!(round_1dp(1.24), 1.2);
        assert_eq!(round_1dp(0.25), 0.3);
        assert_eq!(round_1dp(0.0), 0.0);
    }

    #[test]
    fn test_completion_rate() {
        assert_eq!(completion_rate(3, 4), 75.0);
        assert_eq!(completion_rate(1, 3), 33.3);
        assert_eq!(completion_rate(5, 5), 100.0);
    }

    #[test]
    fn test_completion_rate_no_entries() {
        assert_eq!(completion_rate(0, 0), 0.0);
    }
}
