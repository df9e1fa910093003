//! Promotion routes

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{jwt::JwtService, middleware::AuthMiddleware, models::AuthUser};
use crate::database::models::{CreatePromotionRequest, PromotionFilter};
use crate::error::{AppError, Result};
use crate::routes::{Json, parse_param};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_active: Option<String>,
}

impl TryFrom<PromotionQuery> for PromotionFilter {
    type Error = AppError;

    fn try_from(query: PromotionQuery) -> Result<Self> {
        Ok(Self {
            kind: parse_param(query.kind.as_deref(), "promotion type")?,
            is_active: query.is_active.map(|value| value == "true"),
        })
    }
}

pub async fn list_promotions(
    State(app_state): State<AppState>,
    Query(query): Query<PromotionQuery>,
) -> Result<impl IntoResponse> {
    let filter = PromotionFilter::try_from(query)?;
    Ok(Json(app_state.store.list_promotions(&filter, Utc::now()).await?))
}

/// Active promotions open to the caller's VIP tier
pub async fn eligible_promotions(
    State(app_state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<impl IntoResponse> {
    let user = app_state
        .store
        .find_user_by_id(auth_user.id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let filter = PromotionFilter {
        kind: None,
        is_active: Some(true),
    };
    let promotions: Vec<_> = app_state
        .store
        .list_promotions(&filter, Utc::now())
        .await?
        .into_iter()
        .filter(|promotion| promotion.is_eligible(user.vip_level))
        .collect();

    Ok(Json(promotions))
}

pub async fn get_promotion(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let promotion = app_state
        .store
        .find_promotion_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Promotion not found"))?;
    Ok(Json(promotion))
}

pub async fn create_promotion(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreatePromotionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate().map_err(AppError::BadRequest)?;

    let promotion = payload.into_promotion();
    app_state.store.insert_promotion(&promotion).await?;

    tracing::info!("🎁 Promotion '{}' created by {}", promotion.slug, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Promotion created successfully", "promotion": promotion })),
    ))
}

pub fn create_promotions_routes(jwt_service: Arc<JwtService>) -> Router<AppState> {
    let require_auth = middleware::from_fn_with_state(jwt_service, AuthMiddleware::validate_token);

    Router::new()
        .route(
            "/api/promotions",
            get(list_promotions).merge(post(create_promotion).route_layer(require_auth.clone())),
        )
        .route("/api/promotions/eligible", get(eligible_promotions).route_layer(require_auth))
        .route("/api/promotions/{slug}", get(get_promotion))
}
