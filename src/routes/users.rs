//! Player account routes

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{jwt::JwtService, middleware::AuthMiddleware, models::AuthUser};
use crate::database::models::{ProfileUpdate, ResponsibleGamingUpdate};
use crate::error::{AppError, Result};
use crate::routes::Json;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    #[serde(default)]
    pub game_id: String,
}

fn user_not_found() -> AppError {
    AppError::not_found("User not found")
}

pub async fn get_profile(
    State(app_state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let user = app_state
        .store
        .find_user_by_id(auth_user.id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(app_state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<impl IntoResponse> {
    let user = app_state
        .store
        .update_profile(auth_user.id, payload)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(json!({ "message": "Profile updated successfully", "user": user })))
}

pub async fn update_responsible_gaming(
    State(app_state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<ResponsibleGamingUpdate>,
) -> Result<impl IntoResponse> {
    let user = app_state
        .store
        .update_responsible_gaming(auth_user.id, payload)
        .await?
        .ok_or_else(user_not_found)?;

    tracing::info!("🛡️  Responsible gaming settings updated for {}", user.id);

    Ok(Json(json!({ "message": "Responsible gaming settings updated", "user": user })))
}

pub async fn toggle_favorite(
    State(app_state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(payload): Json<FavoriteRequest>,
) -> Result<impl IntoResponse> {
    let game_id = payload.game_id.trim();
    if game_id.is_empty() {
        return Err(AppError::bad_request("gameId is required"));
    }

    let favorite_games = app_state
        .store
        .toggle_favorite_game(auth_user.id, game_id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(json!({ "message": "Favorites updated", "favoriteGames": favorite_games })))
}

pub fn create_users_routes(jwt_service: Arc<JwtService>) -> Router<AppState> {
    Router::new()
        .route("/api/users/profile", get(get_profile).put(update_profile))
        .route("/api/users/responsible-gaming", put(update_responsible_gaming))
        .route("/api/users/favorites", post(toggle_favorite))
        .route_layer(middleware::from_fn_with_state(jwt_service, AuthMiddleware::validate_token))
}
