//! Aggregate read models: dashboard, analytics, calendar.
//!
//! These are reductions over the per-activity streak engine — the same
//! `compute_metrics` the single-activity views use, so numbers never
//! disagree between views.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::activities::load_recent_entries;
use crate::models::activity::{Activity, ActivityWithStats};
use crate::models::entry::Entry;
use crate::services::streaks::{self, ActivityMetrics, CategoryStats, DashboardRollup};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub rollup: DashboardRollup,
    pub activities: Vec<ActivityWithStats>,
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<DashboardResponse>> {
    let today = Utc::now().date_naive();
    let activities = load_activities(&state.db, auth_user.id).await?;
    let completed_by_activity = load_completed_dates_for_user(&state.db, auth_user.id).await?;

    let empty = BTreeSet::new();
    let mut metrics = Vec::with_capacity(activities.len());
    let mut with_stats = Vec::with_capacity(activities.len());

    for activity in activities {
        let completed = completed_by_activity.get(&activity.id).unwrap_or(&empty);
        let m = streaks::compute_metrics(activity.frequency, activity.target_days, completed, today);
        metrics.push(m);

        let recent = load_recent_entries(&state.db, activity.id).await?;
        with_stats.push(ActivityWithStats::new(activity, m, recent));
    }

    Ok(Json(DashboardResponse {
        rollup: streaks::dashboard_rollup(&metrics),
        activities: with_stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub total_activities: i64,
    pub total_completions: i64,
    pub average_streak: f64,
    pub category_breakdown: BTreeMap<&'static str, CategoryStats>,
}

pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<AnalyticsResponse>> {
    let today = Utc::now().date_naive();
    let activities = load_activities(&state.db, auth_user.id).await?;
    let completed_by_activity = load_completed_dates_for_user(&state.db, auth_user.id).await?;

    let empty = BTreeSet::new();
    let per_activity: Vec<(crate::models::activity::ActivityCategory, ActivityMetrics)> =
        activities
            .iter()
            .map(|a| {
                let completed = completed_by_activity.get(&a.id).unwrap_or(&empty);
                (
                    a.category,
                    streaks::compute_metrics(a.frequency, a.target_days, completed, today),
                )
            })
            .collect();

    let n = per_activity.len();
    let total_completions = per_activity.iter().map(|(_, m)| m.total_completions).sum();
    let average_streak =
        streaks::mean_1dp(per_activity.iter().map(|(_, m)| m.current_streak as f64), n);

    Ok(Json(AnalyticsResponse {
        total_activities: n as i64,
        total_completions,
        average_streak,
        category_breakdown: streaks::category_breakdown(&per_activity),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub activities: Vec<CalendarActivity>,
    pub total_completed: i64,
    pub total_activities: i64,
}

#[derive(Debug, Serialize)]
pub struct CalendarActivity {
    pub id: Uuid,
    pub title: String,
    pub color: String,
    pub completed: bool,
    pub note: String,
}

/// One record per date in [start_date, end_date] with each activity's
/// completion state — a direct fold over the entry store.
pub async fn calendar_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<Vec<CalendarDay>>> {
    let (start, end) = match (query.start_date, query.end_date) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(AppError::Validation(
                "start_date and end_date are required".into(),
            ))
        }
    };

    let activities = load_activities(&state.db, auth_user.id).await?;

    let entries = sqlx::query_as::<_, Entry>(
        r#"
        SELECT e.* FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE a.user_id = $1 AND e.entry_date BETWEEN $2 AND $3
        "#,
    )
    .bind(auth_user.id)
    .bind(start)
    .bind(end)
    .fetch_all(&state.db)
    .await?;

    let by_key: HashMap<(NaiveDate, Uuid), &Entry> = entries
        .iter()
        .map(|e| ((e.entry_date, e.activity_id), e))
        .collect();

    let mut days = Vec::new();
    for date in date_range(start, end) {
        let mut day_activities = Vec::with_capacity(activities.len());
        let mut total_completed = 0i64;

        for activity in &activities {
            let entry = by_key.get(&(date, activity.id));
            let completed = entry.map(|e| e.completed).unwrap_or(false);
            if completed {
                total_completed += 1;
            }
            day_activities.push(CalendarActivity {
                id: activity.id,
                title: activity.title.clone(),
                color: activity.color.clone(),
                completed,
                note: entry.map(|e| e.note.clone()).unwrap_or_default(),
            });
        }

        days.push(CalendarDay {
            date,
            activities: day_activities,
            total_completed,
            total_activities: activities.len() as i64,
        });
    }

    Ok(Json(days))
}

/// Every date in [start, end]; empty when the range is inverted, so an
/// inverted calendar query yields an empty list rather than an error.
fn date_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut date = start;
    while date <= end {
        dates.push(date);
        date += Duration::days(1);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_inclusive() {
        let range = date_range(d(2025, 3, 30), d(2025, 4, 2));
        assert_eq!(
            range,
            vec![d(2025, 3, 30), d(2025, 3, 31), d(2025, 4, 1), d(2025, 4, 2)]
        );
    }

    #[test]
    fn test_date_range_single_day() {
        assert_eq!(date_range(d(2025, 3, 14), d(2025, 3, 14)), vec![d(2025, 3, 14)]);
    }

    #[test]
    fn test_date_range_inverted_is_empty() {
        assert!(date_range(d(2025, 3, 14), d(2025, 3, 13)).is_empty());
    }
}

pub(crate) async fn load_activities(db: &PgPool, user_id: Uuid) -> AppResult<Vec<Activity>> {
    let activities = sqlx::query_as::<_, Activity>(
        "SELECT * FROM activities WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(activities)
}

/// All completed dates for a user's activities in one query, grouped by
/// activity. Ownership scoping happens in SQL via the join.
pub(crate) async fn load_completed_dates_for_user(
    db: &PgPool,
    user_id: Uuid,
) -> AppResult<HashMap<Uuid, BTreeSet<NaiveDate>>> {
    let rows = sqlx::query_as::<_, (Uuid, NaiveDate)>(
        r#"
        SELECT e.activity_id, e.entry_date FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE a.user_id = $1 AND e.completed = TRUE
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut grouped: HashMap<Uuid, BTreeSet<NaiveDate>> = HashMap::new();
    for (activity_id, date) in rows {
        grouped.entry(activity_id).or_default().insert(date);
    }
    Ok(grouped)
}
