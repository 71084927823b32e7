use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::reconcile::reconcile_user;
use crate::error::AppError;
use crate::AppState;

/// Authenticated caller, inserted as a request extension after token
/// verification and shadow-user reconciliation.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    #[allow(dead_code)]
    pub external_id: String,
    #[allow(dead_code)]
    pub email: Option<String>,
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let mut claims = state.verifier.verify(token, &state.config).await?;

    // Some session tokens carry only the subject; backfill the profile from
    // the provider's user API before reconciling.
    if !claims.has_profile_data() {
        if let Some(remote) = state
            .verifier
            .fetch_remote_profile(&claims.sub, &state.config)
            .await
        {
            claims.merge_remote(remote);
        }
    }

    let user = reconcile_user(&state.db, &claims).await?;

    let auth_user = AuthUser {
        id: user.id,
        external_id: user.external_id,
        email: if user.email.is_empty() {
            None
        } else {
            Some(user.email)
        },
    };

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}
