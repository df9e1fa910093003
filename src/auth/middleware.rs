//! Authentication Middleware
//!
//! Axum middleware for JWT token validation and user authentication.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

use crate::auth::{jwt::JwtService, models::AuthUser};
use crate::error::AppError;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Authentication middleware that validates JWT tokens and injects user info
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Middleware function for validating JWT tokens
    pub async fn validate_token(
        State(jwt_service): State<Arc<JwtService>>,
        mut req: Request,
        next: Next,
    ) -> Result<Response, AppError> {
        let Some(token) = extract_token(req.headers()) else {
            tracing::debug!("Missing bearer token and access_token cookie on {} {}", req.method(), req.uri());
            return Err(AppError::Unauthorized("Access token required".into()));
        };

        let claims = jwt_service.decode_claims(&token).map_err(|e| {
            tracing::warn!("JWT validation failed: {:#}", e);
            AppError::Unauthorized("Invalid or expired token".into())
        })?;

        let auth_user = AuthUser {
            id: claims.sub,
            email: claims.email,
        };
        tracing::debug!("Authenticated user id={}", auth_user.id);

        // Downstream handlers read this through Extension<AuthUser>
        req.extensions_mut().insert(auth_user);

        Ok(next.run(req).await)
    }
}

/// Bearer header first, then the access_token cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(ACCESS_TOKEN_COOKIE)
                .map(|cookie| cookie.value().to_string())
                .filter(|token| !token.is_empty())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer header-token"));
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; access_token=cookie-token"));

        assert_eq!(extract_token(&headers).as_deref(), Some("header-token"));
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; access_token=cookie-token"));

        assert_eq!(extract_token(&headers).as_deref(), Some("cookie-token"));
    }

    #[test]
    fn no_credentials() {
        assert!(extract_token(&HeaderMap::new()).is_none());
    }
}
