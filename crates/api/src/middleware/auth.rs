//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use meshvault_core::error::CoreError;
use meshvault_core::types::UserId;

use crate::auth::jwt::{validate_token, JwtConfig};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a JWT Bearer token in the `Authorization` header.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = %user.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's id (from `claims.sub`).
    pub user_id: UserId,
}

impl AuthUser {
    /// Authenticate from the `Authorization` header, falling back to a
    /// token passed out of band (browsers cannot set headers on WebSocket
    /// upgrades, so the socket route accepts `?token=`).
    pub fn authenticate(
        headers: &HeaderMap,
        fallback_token: Option<&str>,
        config: &JwtConfig,
    ) -> Result<Self, AppError> {
        let token = match headers.get("authorization") {
            Some(value) => {
                let value = value.to_str().map_err(|_| unauthorized("Invalid Authorization header"))?;
                value
                    .strip_prefix("Bearer ")
                    .ok_or_else(|| unauthorized("Invalid Authorization format. Expected: Bearer <token>"))?
            }
            None => fallback_token.ok_or_else(|| unauthorized("Missing Authorization header"))?,
        };

        let claims =
            validate_token(token, config).map_err(|_| unauthorized("Invalid or expired token"))?;

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

fn unauthorized(msg: &str) -> AppError {
    AppError::Core(CoreError::Unauthorized(msg.into()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Self::authenticate(&parts.headers, None, &state.config.jwt)
    }
}
