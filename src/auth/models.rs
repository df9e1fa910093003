//! Authentication Models
//!
//! Data structures for authentication requests, responses, and user information.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{User, VipLevel};

/// Authenticated user information extracted from JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
}

/// Login request payload
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Account summary returned alongside a fresh token
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub balance: Decimal,
    pub bonus_balance: Decimal,
    pub vip_level: VipLevel,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            balance: user.balance,
            bonus_balance: user.bonus_balance,
            vip_level: user.vip_level,
        }
    }
}

/// Token response after successful authentication
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub message: String,
    pub token: String,
    pub user: SessionUser,
}

impl TokenResponse {
    pub fn new(token: String, user: SessionUser) -> Self {
        Self {
            message: "Login successful".to_string(),
            token,
            user,
        }
    }
}
