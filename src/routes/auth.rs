//! Auth routes for registration, login, email verification and logout

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::json;

use crate::auth::middleware::ACCESS_TOKEN_COOKIE;
use crate::auth::models::{LoginRequest, SessionUser, TokenResponse};
use crate::auth::password;
use crate::database::models::{RegisterUser, User};
use crate::error::{AppError, Result};
use crate::routes::Json;
use crate::server::AppState;

pub async fn register(
    State(app_state): State<AppState>,
    Json(mut payload): Json<RegisterUser>,
) -> Result<impl IntoResponse> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("Username, email and password are required"));
    }
    if !payload.email.contains('@') {
        return Err(AppError::bad_request("Invalid email address"));
    }

    if app_state.store.user_exists(&payload.email, &payload.username).await? {
        return Err(AppError::bad_request("User already exists"));
    }

    let password_hash = password::hash_password(&payload.password)?;
    let user = User::new(payload, password_hash, password::generate_verification_token());

    // Lost a race with a concurrent registration
    match app_state.store.insert_user(&user).await {
        Err(AppError::Conflict(_)) => return Err(AppError::bad_request("User already exists")),
        other => other?,
    }

    tracing::info!("👤 Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully. Please verify your email.",
            "userId": user.id,
        })),
    ))
}

pub async fn login(
    State(app_state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let email = payload.email.trim().to_lowercase();

    let user = app_state
        .store
        .find_user_by_email(&email)
        .await?
        .filter(|user| password::verify_password(&payload.password, &user.password_hash))
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    let access_token = app_state.jwt_service.create_token(user.id, user.email.clone())?;

    let mut cookie = Cookie::new(ACCESS_TOKEN_COOKIE, access_token.clone());
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(app_state.jwt_service.ttl().num_seconds()));

    tracing::info!("🔑 User {} logged in", user.id);

    Ok((jar.add(cookie), Json(TokenResponse::new(access_token, SessionUser::from(&user)))))
}

pub async fn verify_email(
    State(app_state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse> {
    if !app_state.store.verify_email(&token).await? {
        return Err(AppError::not_found("Invalid verification token"));
    }
    Ok(Json(json!({ "message": "Email verified successfully" })))
}

/// Tokens are stateless; logging out only expires the cookie
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let mut cookie = Cookie::new(ACCESS_TOKEN_COOKIE, "");
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.make_removal();
    (StatusCode::NO_CONTENT, jar.add(cookie))
}

pub fn create_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/verify/{token}", get(verify_email))
}

#[cfg(test)]
mod tests {
    use axum::http::{StatusCode, header};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::database::CasinoStore;
    use crate::routes::test_support::{TestApp, request};

    #[tokio::test]
    async fn register_rejects_duplicates_and_bad_input() {
        let app = TestApp::new();
        let body = json!({ "username": "dealer", "email": " Dealer@Example.com ", "password": "pw-123456" });
        let (status, created) = app.post("/api/auth/register", None, body.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["message"], "User registered successfully. Please verify your email.");

        let stored = app.store.find_user_by_email("dealer@example.com").await.unwrap().unwrap();
        assert_eq!(stored.id.to_string(), created["userId"].as_str().unwrap());
        assert_ne!(stored.password_hash, "pw-123456");

        let (status, body) = app.post("/api/auth/register", None, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "User already exists");

        let same_username = json!({ "username": "dealer", "email": "other@example.com", "password": "pw" });
        let (status, _) = app.post("/api/auth/register", None, same_username).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let no_at = json!({ "username": "x", "email": "not-an-email", "password": "pw" });
        let (status, _) = app.post("/api/auth/register", None, no_at).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_requires_every_credential() {
        let app = TestApp::new();
        for body in [
            json!({ "email": "anon@example.com", "password": "pw-123456" }),
            json!({ "username": "anon", "password": "pw-123456" }),
            json!({ "username": "anon", "email": "anon@example.com" }),
        ] {
            let (status, body) = app.post("/api/auth/register", None, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["message"], "Username, email and password are required");
        }

        let (status, body) = app.post("/api/auth/login", None, json!({ "email": "anon@example.com" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn login_issues_token_and_cookie() {
        let app = TestApp::new();
        app.post(
            "/api/auth/register",
            None,
            json!({ "username": "nova", "email": "nova@example.com", "password": "s3cret!" }),
        )
        .await;

        let (status, body) = app
            .post("/api/auth/login", None, json!({ "email": "nova@example.com", "password": "wrong" }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");

        let (status, _) = app
            .post("/api/auth/login", None, json!({ "email": "ghost@example.com", "password": "s3cret!" }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let response = app
            .router
            .clone()
            .oneshot(request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": "NOVA@example.com", "password": "s3cret!" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("access_token="));
        assert!(cookie.contains("HttpOnly"));

        // The cookie alone authenticates
        let token_pair = cookie.split(';').next().unwrap().to_string();
        let mut profile_request = request("GET", "/api/users/profile", None, None);
        profile_request
            .headers_mut()
            .insert(header::COOKIE, token_pair.parse().unwrap());
        let (status, profile) = app.send(profile_request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["email"], "nova@example.com");
    }

    #[tokio::test]
    async fn login_response_shape() {
        let app = TestApp::new();
        app.post(
            "/api/auth/register",
            None,
            json!({ "username": "shape", "email": "shape@example.com", "password": "pw-shape" }),
        )
        .await;
        let (_, body) = app
            .post("/api/auth/login", None, json!({ "email": "shape@example.com", "password": "pw-shape" }))
            .await;
        assert_eq!(body["message"], "Login successful");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["user"]["username"], "shape");
        assert_eq!(body["user"]["balance"], 0.0);
        assert_eq!(body["user"]["bonusBalance"], 0.0);
        assert_eq!(body["user"]["vipLevel"], "bronze");
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let app = TestApp::new();
        let (user_id, _) = app.sign_up("verify").await;
        let token = app
            .store
            .find_user_by_id(user_id)
            .await
            .unwrap()
            .and_then(|u| u.verification_token)
            .unwrap();

        let (status, body) = app.get(&format!("/api/auth/verify/{}", token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Email verified successfully");
        assert!(app.store.find_user_by_id(user_id).await.unwrap().unwrap().is_verified);

        let (status, body) = app.get(&format!("/api/auth/verify/{}", token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Invalid verification token");
    }

    #[tokio::test]
    async fn logout_expires_cookie() {
        let app = TestApp::new();
        let response = app
            .router
            .clone()
            .oneshot(request("POST", "/api/auth/logout", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("access_token="));
        assert!(cookie.contains("Max-Age=0"));
    }
}
