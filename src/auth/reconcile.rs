//! Shadow-user reconciliation.
//!
//! Every authenticated request reconciles the local `users` row with the
//! identity provider's claims: get-or-create by external id, then update
//! any drifted field the provider supplied. Invoked exactly once per
//! request by the auth middleware, never from handlers.

use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::claims::{IdentityClaims, ResolvedProfile};
use crate::error::AppResult;
use crate::models::user::User;

pub async fn reconcile_user(db: &PgPool, claims: &IdentityClaims) -> AppResult<User> {
    let profile = claims.resolve();

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE external_id = $1")
        .bind(&claims.sub)
        .fetch_optional(db)
        .await?;

    match existing {
        Some(user) => update_if_drifted(db, user, &profile).await,
        None => insert_user(db, &claims.sub, &profile).await,
    }
}

async fn insert_user(db: &PgPool, external_id: &str, profile: &ResolvedProfile) -> AppResult<User> {
    let username = unique_username(db, &profile.username, external_id).await?;

    // ON CONFLICT covers the race where two first requests for the same
    // subject arrive concurrently: the loser becomes a no-op update and
    // both return the same row.
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, external_id, username, email, first_name, last_name)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (external_id) DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(external_id)
    .bind(&username)
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .fetch_one(db)
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Created shadow user");
    Ok(user)
}

async fn update_if_drifted(db: &PgPool, user: User, profile: &ResolvedProfile) -> AppResult<User> {
    let email_drift = !profile.email.is_empty() && profile.email != user.email;
    let first_drift = !profile.first_name.is_empty() && profile.first_name != user.first_name;
    let last_drift = !profile.last_name.is_empty() && profile.last_name != user.last_name;

    if !(email_drift || first_drift || last_drift) {
        return Ok(user);
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            email = CASE WHEN $2 <> '' THEN $2 ELSE email END,
            first_name = CASE WHEN $3 <> '' THEN $3 ELSE first_name END,
            last_name = CASE WHEN $4 <> '' THEN $4 ELSE last_name END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&profile.email)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .fetch_one(db)
    .await?;

    Ok(updated)
}

/// Append a numeric suffix until the candidate username is free (ignoring
/// the subject's own row, so re-reconciliation is stable).
async fn unique_username(db: &PgPool, base: &str, external_id: &str) -> AppResult<String> {
    let mut candidate = base.to_string();
    let mut counter = 1u32;

    loop {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND external_id <> $2)",
        )
        .bind(&candidate)
        .bind(external_id)
        .fetch_one(db)
        .await?;

        if !taken {
            return Ok(candidate);
        }
        candidate = format!("{base}{counter}");
        counter += 1;
    }
}
