//! Wallet routes: deposits, withdrawals and transaction history
//!
//! Every route here requires authentication. Deposits and withdrawals accept
//! an optional `Idempotency-Key` header; repeating a request with the same key
//! returns the original entry instead of moving money twice.

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::auth::{jwt::JwtService, middleware::AuthMiddleware, models::AuthUser};
use crate::database::models::{PaymentMethod, TransactionFilter};
use crate::error::{AppError, Result};
use crate::routes::{Json, parse_param};
use crate::server::AppState;
use crate::services::ledger::{self, LedgerError, MovementKind, WalletMovement};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
}

impl TryFrom<TransactionQuery> for TransactionFilter {
    type Error = AppError;

    fn try_from(query: TransactionQuery) -> Result<Self> {
        Ok(Self {
            kind: parse_param(query.kind.as_deref(), "transaction type")?,
            status: parse_param(query.status.as_deref(), "transaction status")?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletRequest {
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub payment_method: String,
}

pub async fn list_transactions(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse> {
    let filter = TransactionFilter::try_from(query)?;
    Ok(Json(app_state.store.list_transactions(user.id, &filter).await?))
}

pub async fn deposit(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(payload): Json<WalletRequest>,
) -> Result<impl IntoResponse> {
    book(app_state, user, &headers, payload, MovementKind::Deposit).await
}

pub async fn withdrawal(
    State(app_state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    Json(payload): Json<WalletRequest>,
) -> Result<impl IntoResponse> {
    book(app_state, user, &headers, payload, MovementKind::Withdrawal).await
}

async fn book(
    app_state: AppState,
    user: AuthUser,
    headers: &HeaderMap,
    payload: WalletRequest,
    kind: MovementKind,
) -> Result<(StatusCode, Json<Value>)> {
    // Amount problems are reported before an unknown payment method
    let amount = payload
        .amount
        .filter(|amount| ledger::is_valid_amount(*amount))
        .ok_or(LedgerError::InvalidAmount(kind.label()))?;

    let movement = WalletMovement {
        kind,
        amount,
        payment_method: payload
            .payment_method
            .parse::<PaymentMethod>()
            .map_err(|_| AppError::bad_request(format!("Unsupported payment method '{}'", payload.payment_method)))?,
        idempotency_key: idempotency_key(headers)?,
    };

    let receipt = app_state
        .store
        .apply_wallet_movement(user.id, &movement, Utc::now())
        .await?;

    let message = match kind {
        MovementKind::Deposit => "Deposit successful",
        MovementKind::Withdrawal => "Withdrawal request submitted",
    };

    let status = if receipt.replayed {
        tracing::info!("🔁 Replayed {} {} for user {}", kind.label(), receipt.transaction.id, user.id);
        StatusCode::OK
    } else {
        tracing::info!(
            "💰 Booked {} of {} for user {}, balance now {}",
            kind.label(),
            receipt.transaction.amount,
            user.id,
            receipt.new_balance
        );
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(json!({
            "message": message,
            "transaction": receipt.transaction,
            "newBalance": receipt.new_balance,
        })),
    ))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map_err(|_| AppError::bad_request("Idempotency-Key must be visible ASCII"))?
        .trim();
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::bad_request("Idempotency-Key must be 1 to 255 characters"));
    }
    Ok(Some(key.to_string()))
}

pub fn create_transactions_routes(jwt_service: Arc<JwtService>) -> Router<AppState> {
    Router::new()
        .route("/api/transactions", get(list_transactions))
        .route("/api/transactions/deposit", post(deposit))
        .route("/api/transactions/withdrawal", post(withdrawal))
        .route_layer(middleware::from_fn_with_state(jwt_service, AuthMiddleware::validate_token))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};

    use super::IDEMPOTENCY_KEY_HEADER;
    use crate::database::models::KycStatus;
    use crate::routes::test_support::TestApp;

    fn keyed(uri: &str, token: &str, key: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn wallet_routes_require_auth() {
        let app = TestApp::new();
        let (status, _) = app.get("/api/transactions", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, body) = app
            .post("/api/transactions/deposit", None, json!({ "amount": 50, "paymentMethod": "crypto" }))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Access token required");
    }

    #[tokio::test]
    async fn deposit_then_withdraw_after_kyc() {
        let app = TestApp::new();
        let (user_id, token) = app.sign_up("player").await;

        let (status, body) = app
            .post(
                "/api/transactions/deposit",
                Some(&token),
                json!({ "amount": 250.50, "paymentMethod": "credit-card" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["message"], "Deposit successful");
        assert_eq!(body["newBalance"], 250.5);
        assert_eq!(body["transaction"]["status"], "completed");
        assert_eq!(body["transaction"]["type"], "deposit");
        assert_eq!(body["transaction"]["description"], "Deposit via credit-card");

        let withdraw = json!({ "amount": 100, "paymentMethod": "bank-transfer" });
        let (status, body) = app.post("/api/transactions/withdrawal", Some(&token), withdraw.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "KYC verification required for withdrawals");

        assert!(app.store.update_user(user_id, |u| u.kyc_status = KycStatus::Verified).await);

        let (status, body) = app.post("/api/transactions/withdrawal", Some(&token), withdraw).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["message"], "Withdrawal request submitted");
        assert_eq!(body["transaction"]["status"], "pending");
        assert_eq!(body["newBalance"], 150.5);

        let (status, body) = app
            .post(
                "/api/transactions/withdrawal",
                Some(&token),
                json!({ "amount": 500, "paymentMethod": "bank-transfer" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Insufficient balance");

        let (_, history) = app.get("/api/transactions", Some(&token)).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
        let (_, deposits) = app.get("/api/transactions?type=deposit", Some(&token)).await;
        assert_eq!(deposits.as_array().unwrap().len(), 1);
        let (_, pending) = app.get("/api/transactions?status=pending", Some(&token)).await;
        assert_eq!(pending[0]["type"], "withdrawal");
        let (status, _) = app.get("/api/transactions?status=settled", Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, profile) = app.get("/api/users/profile", Some(&token)).await;
        assert_eq!(profile["balance"], 150.5);
    }

    #[tokio::test]
    async fn amount_and_method_validation_order() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("validator").await;

        let (status, body) = app
            .post("/api/transactions/deposit", Some(&token), json!({ "amount": -5, "paymentMethod": "paypal" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid deposit amount");

        let (status, body) = app
            .post("/api/transactions/deposit", Some(&token), json!({ "amount": 50, "paymentMethod": "paypal" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unsupported payment method 'paypal'");

        let (status, _) = app
            .post("/api/transactions/deposit", Some(&token), json!({ "amount": 5, "paymentMethod": "crypto" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn idempotent_deposit_is_booked_once() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("retry").await;
        let body = json!({ "amount": 40, "paymentMethod": "e-wallet" });

        let (status, first) = app
            .send(keyed("/api/transactions/deposit", &token, "order-1", body.clone()))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, replay) = app
            .send(keyed("/api/transactions/deposit", &token, "order-1", body))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(replay["transaction"]["_id"], first["transaction"]["_id"]);
        assert_eq!(replay["newBalance"], 40.0);

        let (status, conflict) = app
            .send(keyed(
                "/api/transactions/deposit",
                &token,
                "order-1",
                json!({ "amount": 41, "paymentMethod": "e-wallet" }),
            ))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["message"], "Idempotency key already used for a different request");

        let (_, history) = app.get("/api/transactions", Some(&token)).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn self_excluded_player_cannot_deposit() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("pause").await;

        let until = (Utc::now() + Duration::days(30)).to_rfc3339();
        let (status, _) = app
            .put("/api/users/responsible-gaming", Some(&token), json!({ "selfExclusionUntil": until }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .post("/api/transactions/deposit", Some(&token), json!({ "amount": 50, "paymentMethod": "crypto" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn daily_deposit_limit_is_enforced() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("limited").await;

        let (status, _) = app
            .put(
                "/api/users/responsible-gaming",
                Some(&token),
                json!({ "depositLimit": { "daily": 100 } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let deposit = json!({ "amount": 60, "paymentMethod": "crypto" });
        let (status, _) = app.post("/api/transactions/deposit", Some(&token), deposit.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app.post("/api/transactions/deposit", Some(&token), deposit).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Daily deposit limit of $100 would be exceeded");
    }

    #[tokio::test]
    async fn incomplete_bodies_get_json_errors() {
        let app = TestApp::new();
        let (_, token) = app.sign_up("sloppy").await;

        let (status, body) = app
            .post("/api/transactions/deposit", Some(&token), json!({ "paymentMethod": "crypto" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid deposit amount");

        let (status, body) = app
            .post("/api/transactions/withdrawal", Some(&token), json!({ "amount": 20 }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unsupported payment method ''");

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/transactions/deposit")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"amount\": "))
            .unwrap();
        let (status, body) = app.send(malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn monthly_deposit_limit_rolls_over_thirty_days() {
        let app = TestApp::new();
        let (user_id, token) = app.sign_up("monthly").await;

        let (status, _) = app
            .put(
                "/api/users/responsible-gaming",
                Some(&token),
                json!({ "depositLimit": { "daily": 100, "monthly": 150 } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let deposit = json!({ "amount": 80, "paymentMethod": "crypto" });
        let (status, _) = app.post("/api/transactions/deposit", Some(&token), deposit.clone()).await;
        assert_eq!(status, StatusCode::CREATED);

        // Outside the daily window, still inside the monthly one
        app.store.age_transactions(user_id, Duration::days(10)).await;
        let (status, body) = app.post("/api/transactions/deposit", Some(&token), deposit.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Monthly deposit limit of $150 would be exceeded");

        app.store.age_transactions(user_id, Duration::days(25)).await;
        let (status, body) = app.post("/api/transactions/deposit", Some(&token), deposit).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["newBalance"], 160.0);
    }
}
