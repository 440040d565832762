//! Bearer-token authentication.
//!
//! User provisioning lives outside this service; the API only resolves
//! `Authorization: Bearer <token>` headers against the `users` table.
//! Handlers take [`AuthUser`] as an extractor argument, so an
//! unauthenticated request never reaches contract logic.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::api::ApiState;
use crate::db;
use crate::errors::ApiError;

/// The authenticated acting user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
}

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;

        db::find_user_by_token(&state.pool, token)
            .await?
            .ok_or(ApiError::Unauthorized)
    }
}
