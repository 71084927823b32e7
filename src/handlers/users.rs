use std::collections::BTreeSet;

use axum::{extract::State, Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::stats::{load_activities, load_completed_dates_for_user};
use crate::models::user::{User, UserProfile};
use crate::services::streaks;
use crate::AppState;

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = find_user(&state, auth_user.id).await?;
    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100, message = "First name too long"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "Last name too long"))]
    pub last_name: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<UpdateProfileRequest>,
) -> AppResult<Json<UserProfile>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth_user.id)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(user.into()))
}

#[derive(Debug, Serialize)]
pub struct ProfileStatsResponse {
    pub user: UserProfile,
    pub stats: ProfileStats,
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Serialize)]
pub struct ProfileStats {
    pub total_activities: i64,
    pub total_completions: i64,
    /// Sum of current streaks across activities.
    pub total_streaks: i64,
    /// Highest best-streak across activities.
    pub longest_streak: i32,
    pub days_active: i64,
    pub completion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct Achievement {
    pub id: i32,
    pub name: &'static str,
    pub description: &'static str,
    pub achieved: bool,
    pub icon: &'static str,
}

/// Profile-page statistics. Every streak figure comes from the same engine
/// the dashboard and detail views use, recomputed from raw entries.
pub async fn profile_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ProfileStatsResponse>> {
    let user = find_user(&state, auth_user.id).await?;
    let today = Utc::now().date_naive();

    let activities = load_activities(&state.db, auth_user.id).await?;
    let completed_by_activity = load_completed_dates_for_user(&state.db, auth_user.id).await?;

    let empty = BTreeSet::new();
    let mut total_streaks = 0i64;
    let mut longest_streak = 0i32;
    let mut total_completions = 0i64;
    for activity in &activities {
        let completed = completed_by_activity.get(&activity.id).unwrap_or(&empty);
        let m =
            streaks::compute_metrics(activity.frequency, activity.target_days, completed, today);
        total_streaks += m.current_streak as i64;
        longest_streak = longest_streak.max(m.best_streak);
        total_completions += m.total_completions;
    }

    // Completion rate counts every entry, completed or not
    let total_entries = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE a.user_id = $1
        "#,
    )
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    let first_entry_date = sqlx::query_scalar::<_, Option<NaiveDate>>(
        r#"
        SELECT MIN(e.entry_date) FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE a.user_id = $1
        "#,
    )
    .bind(auth_user.id)
    .fetch_one(&state.db)
    .await?;

    let first_activity_date = activities.iter().map(|a| a.created_at.date_naive()).min();
    let days = days_active(
        first_activity_date,
        first_entry_date,
        user.created_at.date_naive(),
        today,
    );

    let stats = ProfileStats {
        total_activities: activities.len() as i64,
        total_completions,
        total_streaks,
        longest_streak,
        days_active: days,
        completion_rate: streaks::completion_rate(total_completions, total_entries),
    };
    let achievements = achievements(stats.total_activities, days, longest_streak);

    Ok(Json(ProfileStatsResponse {
        user: user.into(),
        stats,
        achievements,
    }))
}

async fn find_user(state: &AppState, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))
}

/// Days since the user's first activity or entry (whichever is earlier),
/// inclusive of today. Falls back to the account creation date when no
/// activity data exists yet.
fn days_active(
    first_activity: Option<NaiveDate>,
    first_entry: Option<NaiveDate>,
    joined: NaiveDate,
    today: NaiveDate,
) -> i64 {
    let start = match (first_activity, first_entry) {
        (None, None) => joined,
        (a, e) => a.unwrap_or(today).min(e.unwrap_or(today)),
    };
    (today - start).num_days() + 1
}

fn achievements(total_activities: i64, days_active: i64, longest_streak: i32) -> Vec<Achievement> {
    vec![
        Achievement {
            id: 1,
            name: "First Streak",
            description: "Complete your first 7-day streak",
            achieved: longest_streak >= 7,
            icon: "🔥",
        },
        Achievement {
            id: 2,
            name: "Consistency Master",
            description: "Maintain 3 activities for 30 days",
            achieved: total_activities >= 3 && days_active >= 30,
            icon: "💪",
        },
        Achievement {
            id: 3,
            name: "Early Bird",
            description: "Complete morning activities for 14 days",
            // Entries carry no time-of-day data yet
            achieved: false,
            icon: "🌅",
        },
        Achievement {
            id: 4,
            name: "Goal Getter",
            description: "Reach 50-day streak on any activity",
            achieved: longest_streak >= 50,
            icon: "🎯",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_days_active_from_earliest_record() {
        let today = d(2025, 3, 14);
        // First entry predates the first activity's creation (backfilled day)
        let days = days_active(Some(d(2025, 3, 10)), Some(d(2025, 3, 8)), d(2025, 1, 1), today);
        assert_eq!(days, 7); // Mar 8..=14 inclusive
    }

    #[test]
    fn test_days_active_single_source() {
        let today = d(2025, 3, 14);
        // Only an activity exists; the missing entry date must not pull the
        // start earlier than it
        assert_eq!(days_active(Some(d(2025, 3, 12)), None, d(2025, 1, 1), today), 3);
        assert_eq!(days_active(None, Some(d(2025, 3, 13)), d(2025, 1, 1), today), 2);
    }

    #[test]
    fn test_days_active_falls_back_to_join_date() {
        let today = d(2025, 3, 14);
        assert_eq!(days_active(None, None, d(2025, 3, 1), today), 14);
    }

    #[test]
    fn test_days_active_today_only() {
        let today = d(2025, 3, 14);
        assert_eq!(days_active(Some(today), Some(today), today, today), 1);
    }

    #[test]
    fn test_achievement_thresholds() {
        let a = achievements(3, 30, 7);
        assert!(a[0].achieved); // 7-day streak
        assert!(a[1].achieved); // 3 activities, 30 days
        assert!(!a[2].achieved); // no time-of-day data
        assert!(!a[3].achieved); // below 50

        let a = achievements(2, 100, 50);
        assert!(!a[1].achieved); // too few activities
        assert!(a[3].achieved);
    }
}
