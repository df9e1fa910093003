//! # Server Module
//!
//! HTTP server setup and route configuration for the Cassanova API.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
};
use chrono::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::jwt::JwtService;
use crate::config::{Config, CorsConfig, StorageBackend};
use crate::database::{CasinoStore, DatabaseConnection, MemoryStore, PgStore};
use crate::routes;

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CasinoStore>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(store: Arc<dyn CasinoStore>, jwt_service: Arc<JwtService>) -> Self {
        Self { store, jwt_service }
    }
}

/// Assembles every route group behind the tracing and CORS layers
pub fn build_router(state: AppState, cors: &CorsConfig) -> Router {
    let jwt_service = state.jwt_service.clone();

    Router::new()
        .merge(routes::health::create_health_routes())
        .merge(routes::auth::create_auth_routes())
        .merge(routes::games::create_games_routes(jwt_service.clone()))
        .merge(routes::promotions::create_promotions_routes(jwt_service.clone()))
        .merge(routes::transactions::create_transactions_routes(jwt_service.clone()))
        .merge(routes::users::create_users_routes(jwt_service))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors)),
        )
        .with_state(state)
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    let headers = [
        header::ORIGIN,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::AUTHORIZATION,
        HeaderName::from_static(routes::transactions::IDEMPOTENCY_KEY_HEADER),
    ];

    match cors {
        // Wildcard origins cannot be combined with credentials
        CorsConfig::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers),
        CorsConfig::Origins(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(methods)
                .allow_headers(headers)
                .allow_credentials(true) // Allow cookies for auth
        }
    }
}

/// Connects the configured store, builds the router and serves until the process exits
pub async fn start(config: Config) -> Result<()> {
    let store: Arc<dyn CasinoStore> = match config.storage {
        StorageBackend::Postgres => {
            let db = DatabaseConnection::new(&config.database).await?;
            db.migrate().await?;
            Arc::new(PgStore::new(db.pool().clone()))
        }
        StorageBackend::Memory => {
            tracing::warn!("🧪 Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        Duration::hours(config.auth.token_ttl_hours),
    ));

    let app = build_router(AppState::new(store, jwt_service), &config.cors);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} - port may already be in use", addr))?;

    tracing::info!("🚀 Cassanova API starting...");
    tracing::info!("📡 Listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/api/health", addr);
    tracing::info!("💾 Storage backend: {:?}", config.storage);

    axum::serve(listener, app).await.context("HTTP server terminated")?;
    Ok(())
}
