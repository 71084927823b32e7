use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::entry::Entry;
use crate::services::streaks::ActivityMetrics;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub category: ActivityCategory,
    pub color: String,
    pub frequency: ActivityFrequency,
    pub description: String,
    pub target_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "activity_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    HealthFitness,
    PersonalGrowth,
    Learning,
    Work,
    Hobbies,
    Social,
    Wellness,
    Other,
}

impl ActivityCategory {
    /// Human-readable label, used as the key in analytics breakdowns.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HealthFitness => "Health & Fitness",
            Self::PersonalGrowth => "Personal Growth",
            Self::Learning => "Learning",
            Self::Work => "Work",
            Self::Hobbies => "Hobbies",
            Self::Social => "Social",
            Self::Wellness => "Wellness",
            Self::Other => "Other",
        }
    }
}

impl Default for ActivityCategory {
    fn default() -> Self {
        Self::Other
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "activity_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityFrequency {
    Daily,
    Weekly,
    Custom,
}

impl Default for ActivityFrequency {
    fn default() -> Self {
        Self::Daily
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateActivityRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,
    pub category: Option<ActivityCategory>,
    #[validate(length(max = 7, message = "Color must be a hex string like #8B5CF6"))]
    pub color: Option<String>,
    pub frequency: Option<ActivityFrequency>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "target_days must be at least 1"))]
    pub target_days: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateActivityRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,
    pub category: Option<ActivityCategory>,
    #[validate(length(max = 7, message = "Color must be a hex string like #8B5CF6"))]
    pub color: Option<String>,
    pub frequency: Option<ActivityFrequency>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "target_days must be at least 1"))]
    pub target_days: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityFilter {
    pub category: Option<ActivityCategory>,
    pub frequency: Option<ActivityFrequency>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<ActivityCategory>,
}

/// Activity plus the stats recomputed from its entries on every read.
#[derive(Debug, Serialize)]
pub struct ActivityWithStats {
    #[serde(flatten)]
    pub activity: Activity,
    pub current_streak: i32,
    pub best_streak: i32,
    pub total_completions: i64,
    pub completed_today: bool,
    pub weekly_progress: i32,
    pub recent_entries: Vec<Entry>,
}

impl ActivityWithStats {
    pub fn new(activity: Activity, metrics: ActivityMetrics, recent_entries: Vec<Entry>) -> Self {
        Self {
            activity,
            current_streak: metrics.current_streak,
            best_streak: metrics.best_streak,
            total_completions: metrics.total_completions,
            completed_today: metrics.completed_today,
            weekly_progress: metrics.weekly_progress,
            recent_entries,
        }
    }
}
