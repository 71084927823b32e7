use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One day's completion record for one activity. The database enforces
/// at most one row per (activity_id, entry_date).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub entry_date: NaiveDate,
    pub completed: bool,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    pub activity_id: Uuid,
    pub date: NaiveDate,
    pub completed: bool,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    pub completed: Option<bool>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntryQuery {
    pub activity_id: Option<Uuid>,
    pub completed: Option<bool>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    #[serde(default)]
    pub note: Option<String>,
}
