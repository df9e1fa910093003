//! Game catalogue routes

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{jwt::JwtService, middleware::AuthMiddleware, models::AuthUser};
use crate::database::models::{CreateGameRequest, GameFilter};
use crate::error::{AppError, Result};
use crate::routes::{Json, non_blank, parse_param};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameQuery {
    pub category: Option<String>,
    pub provider: Option<String>,
    pub is_popular: Option<String>,
    pub is_new: Option<String>,
    pub search: Option<String>,
}

impl TryFrom<GameQuery> for GameFilter {
    type Error = AppError;

    fn try_from(query: GameQuery) -> Result<Self> {
        Ok(Self {
            category: parse_param(query.category.as_deref(), "category")?,
            provider: non_blank(query.provider),
            popular_only: query.is_popular.as_deref() == Some("true"),
            new_only: query.is_new.as_deref() == Some("true"),
            search: non_blank(query.search),
        })
    }
}

pub async fn list_games(
    State(app_state): State<AppState>,
    Query(query): Query<GameQuery>,
) -> Result<impl IntoResponse> {
    let filter = GameFilter::try_from(query)?;
    Ok(Json(app_state.store.list_games(&filter).await?))
}

pub async fn jackpot_games(State(app_state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(app_state.store.list_jackpot_games().await?))
}

pub async fn get_game(
    State(app_state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let game = app_state
        .store
        .find_game_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::not_found("Game not found"))?;
    Ok(Json(game))
}

pub async fn create_game(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateGameRequest>,
) -> Result<impl IntoResponse> {
    payload.validate().map_err(AppError::BadRequest)?;

    let game = payload.into_game();
    app_state.store.insert_game(&game).await?;

    tracing::info!("🎰 Game '{}' created by {}", game.slug, user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Game created successfully", "game": game })),
    ))
}

pub fn create_games_routes(jwt_service: Arc<JwtService>) -> Router<AppState> {
    let require_auth = middleware::from_fn_with_state(jwt_service, AuthMiddleware::validate_token);

    Router::new()
        .route("/api/games", get(list_games).merge(post(create_game).route_layer(require_auth)))
        .route("/api/games/jackpots", get(jackpot_games))
        .route("/api/games/{slug}", get(get_game))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::routes::test_support::TestApp;

    fn game(slug: &str, provider: &str, extra: Value) -> Value {
        let mut body = json!({
            "title": slug.replace('-', " "),
            "slug": slug,
            "provider": provider,
            "category": "slots",
            "thumbnail": format!("/img/{}.png", slug),
            "description": "A game",
            "rtp": 96.0,
            "launchUrl": format!("https://games.example.com/{}", slug),
        });
        if let (Some(target), Value::Object(extra)) = (body.as_object_mut(), extra) {
            target.extend(extra);
        }
        body
    }

    #[tokio::test]
    async fn creating_a_game_requires_a_token() {
        let app = TestApp::new();
        let (status, body) = app.post("/api/games", None, game("starburst", "NetEnt", json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token required");

        let (status, body) = app
            .post("/api/games", Some("not-a-jwt"), game("starburst", "NetEnt", json!({})))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn catalogue_filters_and_lookup() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("croupier").await;

        for body in [
            game("starburst", "NetEnt", json!({ "isPopular": true })),
            game("book-of-dead", "Play'n GO", json!({ "isNew": true })),
            game("mega-moolah", "Microgaming", json!({ "hasJackpot": true, "jackpotAmount": 1500000 })),
            game("divine-fortune", "NetEnt", json!({ "hasJackpot": true, "jackpotAmount": 250000 })),
            game("lucky-drop", "Hacksaw", json!({ "hasJackpot": true })),
            game("blackjack-pro", "NetEnt", json!({ "category": "table-games" })),
        ] {
            let (status, _) = app.post("/api/games", Some(&token), body).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, body) = app.post("/api/games", Some(&token), game("starburst", "NetEnt", json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Game with this slug already exists");

        let (_, all) = app.get("/api/games", None).await;
        assert_eq!(all.as_array().unwrap().len(), 6);
        // Newest first
        assert_eq!(all[0]["slug"], "blackjack-pro");

        let (_, netent) = app.get("/api/games?provider=NetEnt&category=slots", None).await;
        let slugs: Vec<&str> = netent.as_array().unwrap().iter().map(|g| g["slug"].as_str().unwrap()).collect();
        assert_eq!(slugs, vec!["divine-fortune", "starburst"]);

        let (_, popular) = app.get("/api/games?isPopular=true", None).await;
        assert_eq!(popular.as_array().unwrap().len(), 1);
        let (_, ignored) = app.get("/api/games?isPopular=false", None).await;
        assert_eq!(ignored.as_array().unwrap().len(), 6);

        let (_, search) = app.get("/api/games?search=PLAY", None).await;
        assert_eq!(search[0]["slug"], "book-of-dead");

        let (status, _) = app.get("/api/games?category=bingo", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, jackpots) = app.get("/api/games/jackpots", None).await;
        let slugs: Vec<&str> = jackpots.as_array().unwrap().iter().map(|g| g["slug"].as_str().unwrap()).collect();
        // Jackpots without a known amount come last
        assert_eq!(slugs, vec!["mega-moolah", "divine-fortune", "lucky-drop"]);

        let (status, body) = app.get("/api/games/starburst", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "NetEnt");
        assert_eq!(body["minBet"], 0.1);

        let (status, body) = app.get("/api/games/unknown", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Game not found");
    }

    #[tokio::test]
    async fn invalid_game_is_rejected() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("croupier").await;
        let (status, _) = app
            .post("/api/games", Some(&token), game("broken", "NetEnt", json!({ "rtp": 120.0 })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
