use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::jwt::{self, TokenScope};
use crate::error::AppError;
use crate::state::SharedState;

/// An authenticated principal, resolved from a Bearer header or the
/// `access_token` cookie. Only full-scope session tokens are accepted.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth_header) = parts.headers.get("authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let claims = jwt::decode_scoped(token, &state.config.jwt_secret, TokenScope::Access)
                    .map_err(|_| {
                        AppError::Unauthorized("Invalid or expired token".to_string())
                    })?;
                return Ok(AuthUser {
                    user_id: claims.sub,
                });
            }
        }

        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get("access_token") {
            let claims =
                jwt::decode_scoped(cookie.value(), &state.config.jwt_secret, TokenScope::Access)
                    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
            return Ok(AuthUser {
                user_id: claims.sub,
            });
        }

        Err(AppError::Unauthorized(
            "Missing authentication token".to_string(),
        ))
    }
}
