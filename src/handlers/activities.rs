use std::collections::BTreeSet;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::activity::{
    Activity, ActivityFilter, ActivityWithStats, CreateActivityRequest, SearchQuery,
    UpdateActivityRequest,
};
use crate::models::entry::Entry;
use crate::services::streaks;
use crate::AppState;

pub async fn list_activities(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(filter): Query<ActivityFilter>,
) -> AppResult<Json<Vec<ActivityWithStats>>> {
    let activities = sqlx::query_as::<_, Activity>(
        r#"
        SELECT * FROM activities
        WHERE user_id = $1
          AND ($2::activity_category IS NULL OR category = $2)
          AND ($3::activity_frequency IS NULL OR frequency = $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(filter.category)
    .bind(filter.frequency)
    .fetch_all(&state.db)
    .await?;

    with_stats(&state.db, activities).await.map(Json)
}

pub async fn get_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(activity_id): Path<Uuid>,
) -> AppResult<Json<ActivityWithStats>> {
    let activity = find_owned(&state.db, activity_id, auth_user.id).await?;
    build_with_stats(&state.db, activity, Utc::now().date_naive())
        .await
        .map(Json)
}

pub async fn create_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<CreateActivityRequest>,
) -> AppResult<Json<ActivityWithStats>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let activity = sqlx::query_as::<_, Activity>(
        r#"
        INSERT INTO activities (id, user_id, title, category, color, frequency, description, target_days)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(body.category.unwrap_or_default())
    .bind(body.color.as_deref().unwrap_or("#8B5CF6"))
    .bind(body.frequency.unwrap_or_default())
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(body.target_days.unwrap_or(1))
    .fetch_one(&state.db)
    .await?;

    build_with_stats(&state.db, activity, Utc::now().date_naive())
        .await
        .map(Json)
}

pub async fn update_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(activity_id): Path<Uuid>,
    Json(body): Json<UpdateActivityRequest>,
) -> AppResult<Json<ActivityWithStats>> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let _existing = find_owned(&state.db, activity_id, auth_user.id).await?;

    let activity = sqlx::query_as::<_, Activity>(
        r#"
        UPDATE activities SET
            title = COALESCE($3, title),
            category = COALESCE($4, category),
            color = COALESCE($5, color),
            frequency = COALESCE($6, frequency),
            description = COALESCE($7, description),
            target_days = COALESCE($8, target_days),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(activity_id)
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(body.category)
    .bind(&body.color)
    .bind(body.frequency)
    .bind(&body.description)
    .bind(body.target_days)
    .fetch_one(&state.db)
    .await?;

    build_with_stats(&state.db, activity, Utc::now().date_naive())
        .await
        .map(Json)
}

/// Deleting an activity cascades to its entries via the FK constraint.
pub async fn delete_activity(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(activity_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM activities WHERE id = $1 AND user_id = $2")
        .bind(activity_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Activity not found".into()));
    }

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn search_activities(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<ActivityWithStats>>> {
    let pattern = query
        .q
        .as_deref()
        .map(|q| format!("%{}%", q))
        .unwrap_or_else(|| "%".into());

    let activities = sqlx::query_as::<_, Activity>(
        r#"
        SELECT * FROM activities
        WHERE user_id = $1
          AND (title ILIKE $2 OR description ILIKE $2)
          AND ($3::activity_category IS NULL OR category = $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(auth_user.id)
    .bind(&pattern)
    .bind(query.category)
    .fetch_all(&state.db)
    .await?;

    with_stats(&state.db, activities).await.map(Json)
}

/// Fetch an activity scoped to its owner. A guessed id belonging to another
/// user is indistinguishable from a missing one.
pub(crate) async fn find_owned(
    db: &PgPool,
    activity_id: Uuid,
    user_id: Uuid,
) -> AppResult<Activity> {
    sqlx::query_as::<_, Activity>("SELECT * FROM activities WHERE id = $1 AND user_id = $2")
        .bind(activity_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound("Activity not found".into()))
}

pub(crate) async fn load_completed_dates(
    db: &PgPool,
    activity_id: Uuid,
) -> AppResult<BTreeSet<NaiveDate>> {
    let dates = sqlx::query_scalar::<_, NaiveDate>(
        "SELECT entry_date FROM entries WHERE activity_id = $1 AND completed = TRUE",
    )
    .bind(activity_id)
    .fetch_all(db)
    .await?;

    Ok(dates.into_iter().collect())
}

pub(crate) async fn load_recent_entries(db: &PgPool, activity_id: Uuid) -> AppResult<Vec<Entry>> {
    let entries = sqlx::query_as::<_, Entry>(
        "SELECT * FROM entries WHERE activity_id = $1 ORDER BY entry_date DESC LIMIT 7",
    )
    .bind(activity_id)
    .fetch_all(db)
    .await?;

    Ok(entries)
}

/// Recompute stats for one activity from its raw entries. No denormalized
/// streak column exists anywhere.
pub(crate) async fn build_with_stats(
    db: &PgPool,
    activity: Activity,
    today: NaiveDate,
) -> AppResult<ActivityWithStats> {
    let completed = load_completed_dates(db, activity.id).await?;
    let metrics =
        streaks::compute_metrics(activity.frequency, activity.target_days, &completed, today);
    let recent = load_recent_entries(db, activity.id).await?;

    Ok(ActivityWithStats::new(activity, metrics, recent))
}

pub(crate) async fn with_stats(
    db: &PgPool,
    activities: Vec<Activity>,
) -> AppResult<Vec<ActivityWithStats>> {
    let today = Utc::now().date_naive();
    let mut result = Vec::with_capacity(activities.len());
    for activity in activities {
        result.push(build_with_stats(db, activity, today).await?);
    }
    Ok(result)
}
