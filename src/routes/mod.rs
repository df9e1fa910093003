// # Routes Module
//
// HTTP route handlers for the Cassanova API, one submodule per API group.
// Each submodule exposes a `create_*_routes` function that `server.rs` merges
// into the main router.

use std::str::FromStr;

use axum::{
    extract::FromRequest,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Registration, login, email verification
pub mod auth;

/// Game catalogue
pub mod games;

/// Health check and monitoring endpoints
pub mod health;

/// Bonus campaigns
pub mod promotions;

/// Wallet deposits, withdrawals and history
pub mod transactions;

/// Player profile, responsible gaming, favourites
pub mod users;

/// JSON body extractor and response. Malformed bodies are rejected as a 400
/// `{"message"}` instead of axum's plain-text 422.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

/// Blank query values count as absent; anything else must parse
pub(crate) fn parse_param<T: FromStr>(value: Option<&str>, name: &str) -> Result<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("Invalid {} '{}'", name, raw))),
        None => Ok(None),
    }
}

/// Trimmed, with blank treated as absent
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use chrono::Duration;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::auth::jwt::JwtService;
    use crate::config::CorsConfig;
    use crate::database::MemoryStore;
    use crate::server::{AppState, build_router};

    pub struct TestApp {
        pub router: Router,
        pub store: Arc<MemoryStore>,
    }

    impl TestApp {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let jwt = Arc::new(JwtService::new("test-secret", Duration::hours(1)));
            let router = build_router(AppState::new(store.clone(), jwt), &CorsConfig::Any);
            Self { router, store }
        }

        pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }

        pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            self.send(request("GET", uri, token, None)).await
        }

        pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.send(request("POST", uri, token, Some(body))).await
        }

        pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
            self.send(request("PUT", uri, token, Some(body))).await
        }

        /// Registers and logs in a player, returning (user id, bearer token)
        pub async fn sign_up(&self, username: &str) -> (uuid::Uuid, String) {
            let email = format!("{}@example.com", username);
            let (status, body) = self
                .post(
                    "/api/auth/register",
                    None,
                    serde_json::json!({ "username": username, "email": email, "password": "hunter22" }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{body}");
            let id = body["userId"].as_str().unwrap().parse().unwrap();

            let (status, body) = self
                .post(
                    "/api/auth/login",
                    None,
                    serde_json::json!({ "email": email, "password": "hunter22" }),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            (id, body["token"].as_str().unwrap().to_string())
        }
    }

    pub fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::GameCategory;

    #[test]
    fn blank_params_are_absent() {
        assert_eq!(parse_param::<GameCategory>(Some("  "), "category").unwrap(), None);
        assert_eq!(parse_param::<GameCategory>(None, "category").unwrap(), None);
        assert_eq!(
            parse_param::<GameCategory>(Some("slots"), "category").unwrap(),
            Some(GameCategory::Slots)
        );
        assert!(parse_param::<GameCategory>(Some("bingo"), "category").is_err());
    }
}
