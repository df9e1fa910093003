//! Store Abstraction
//!
//! Every collection operation the route handlers need, behind one trait so
//! the server can run against Postgres or an in-process store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::database::models::{
    Game, GameFilter, ProfileUpdate, Promotion, PromotionFilter, ResponsibleGamingUpdate,
    Transaction, TransactionFilter, User,
};
use crate::error::Result;
use crate::services::ledger::WalletMovement;

/// Maximum number of entries returned by a transaction history query
pub const TRANSACTION_HISTORY_LIMIT: usize = 50;

/// Outcome of booking a wallet movement
#[derive(Debug, Clone)]
pub struct WalletReceipt {
    pub transaction: Transaction,
    pub new_balance: Decimal,
    /// The idempotency key matched an earlier request; nothing new was booked
    pub replayed: bool,
}

#[async_trait]
pub trait CasinoStore: Send + Sync {
    /// Cheap connectivity probe
    async fn ping(&self) -> Result<()>;

    // Users
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn user_exists(&self, email: &str, username: &str) -> Result<bool>;
    /// Fails with `Conflict` when the email or username is taken
    async fn insert_user(&self, user: &User) -> Result<()>;
    /// Marks the owner of `token` verified and clears the token; `false` if no user holds it
    async fn verify_email(&self, token: &str) -> Result<bool>;
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>>;
    async fn update_responsible_gaming(
        &self,
        id: Uuid,
        update: ResponsibleGamingUpdate,
    ) -> Result<Option<User>>;
    /// Returns the favourites after the toggle, or `None` for an unknown user
    async fn toggle_favorite_game(&self, id: Uuid, game_id: &str) -> Result<Option<Vec<String>>>;

    // Games
    async fn list_games(&self, filter: &GameFilter) -> Result<Vec<Game>>;
    async fn list_jackpot_games(&self) -> Result<Vec<Game>>;
    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>>;
    async fn insert_game(&self, game: &Game) -> Result<()>;

    // Promotions
    async fn list_promotions(&self, filter: &PromotionFilter, now: DateTime<Utc>) -> Result<Vec<Promotion>>;
    async fn find_promotion_by_slug(&self, slug: &str) -> Result<Option<Promotion>>;
    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()>;

    // Transactions
    async fn list_transactions(&self, user_id: Uuid, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Books a deposit or withdrawal as one atomic unit: lock the user, replay
    /// a matching idempotency key, apply the ledger rules, insert the entry
    /// and write the new balance.
    async fn apply_wallet_movement(
        &self,
        user_id: Uuid,
        movement: &WalletMovement,
        now: DateTime<Utc>,
    ) -> Result<WalletReceipt>;
}
