use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::activities::{build_with_stats, find_owned};
use crate::models::activity::Activity;
use crate::models::entry::{CreateEntryRequest, Entry, EntryQuery, ToggleRequest, UpdateEntryRequest};
use crate::AppState;

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EntryQuery>,
) -> AppResult<Json<Vec<Entry>>> {
    let entries = sqlx::query_as::<_, Entry>(
        r#"
        SELECT e.* FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE a.user_id = $1
          AND ($2::uuid IS NULL OR e.activity_id = $2)
          AND ($3::boolean IS NULL OR e.completed = $3)
          AND ($4::date IS NULL OR e.entry_date = $4)
        ORDER BY e.entry_date DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(query.activity_id)
    .bind(query.completed)
    .bind(query.date)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(entries))
}

/// Upsert a completion record. At most one entry exists per
/// (activity, date): a write targeting an existing date overwrites it in a
/// single atomic statement, so concurrent writers can never produce two
/// rows for the same day.
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateEntryRequest>,
) -> AppResult<Json<Entry>> {
    validate_entry_date(body.date, Utc::now().date_naive())?;

    // Ownership is checked before any write. The activity lookup is
    // unscoped so that a foreign id is rejected as forbidden rather than
    // silently absorbed.
    let activity = sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = $1")
        .bind(body.activity_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("Activity not found".into()))?;

    if activity.user_id != auth_user.id {
        return Err(AppError::Forbidden(
            "You can only create entries for your own activities".into(),
        ));
    }

    let entry = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries (id, activity_id, entry_date, completed, note)
        VALUES ($1, $2, $3, $4, COALESCE($5, ''))
        ON CONFLICT (activity_id, entry_date) DO UPDATE SET
            completed = EXCLUDED.completed,
            note = COALESCE($5, entries.note),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(body.activity_id)
    .bind(body.date)
    .bind(body.completed)
    .bind(&body.note)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(entry))
}

pub async fn get_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<Entry>> {
    find_owned_entry(&state, entry_id, auth_user.id).await.map(Json)
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
    Json(body): Json<UpdateEntryRequest>,
) -> AppResult<Json<Entry>> {
    let existing = find_owned_entry(&state, entry_id, auth_user.id).await?;

    let entry = sqlx::query_as::<_, Entry>(
        r#"
        UPDATE entries SET
            completed = COALESCE($2, completed),
            note = COALESCE($3, note),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(existing.id)
    .bind(body.completed)
    .bind(&body.note)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(entry_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM entries e
        USING activities a
        WHERE e.id = $1 AND a.id = e.activity_id AND a.user_id = $2
        "#,
    )
    .bind(entry_id)
    .bind(auth_user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Entry not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Toggle today's completion for an activity. An absent entry is logically
/// "not completed", so the first toggle of a day always completes it; a
/// present entry has its flag flipped. The note is overwritten only when a
/// non-empty one is supplied. One atomic upsert, same race guarantee as
/// `create_entry`.
pub async fn toggle_today(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(activity_id): Path<Uuid>,
    Json(body): Json<ToggleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let activity = find_owned(&state.db, activity_id, auth_user.id).await?;

    let today = Utc::now().date_naive();
    let entry = sqlx::query_as::<_, Entry>(
        r#"
        INSERT INTO entries (id, activity_id, entry_date, completed, note)
        VALUES ($1, $2, $3, TRUE, COALESCE($4, ''))
        ON CONFLICT (activity_id, entry_date) DO UPDATE SET
            completed = NOT entries.completed,
            note = CASE WHEN COALESCE($4, '') <> '' THEN $4 ELSE entries.note END,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(activity_id)
    .bind(today)
    .bind(&body.note)
    .fetch_one(&state.db)
    .await?;

    let action = if entry.completed {
        "completed"
    } else {
        "uncompleted"
    };
    let refreshed = build_with_stats(&state.db, activity, today).await?;

    Ok(Json(serde_json::json!({
        "message": format!("Activity {action} successfully"),
        "entry": entry,
        "activity": refreshed,
    })))
}

async fn find_owned_entry(state: &AppState, entry_id: Uuid, user_id: Uuid) -> AppResult<Entry> {
    sqlx::query_as::<_, Entry>(
        r#"
        SELECT e.* FROM entries e
        JOIN activities a ON a.id = e.activity_id
        WHERE e.id = $1 AND a.user_id = $2
        "#,
    )
    .bind(entry_id)
    .bind(user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Entry not found".into()))
}

/// Writes may never target a date after the caller's "today".
fn validate_entry_date(date: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if date > today {
        return Err(AppError::Validation(
            "Cannot create entries for future dates".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_future_date_rejected() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let result = validate_entry_date(today + Duration::days(1), today);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_today_and_past_accepted() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert!(validate_entry_date(today, today).is_ok());
        assert!(validate_entry_date(today - Duration::days(30), today).is_ok());
    }
}
