//! In-Memory Store
//!
//! `CasinoStore` over plain collections guarded by a single tokio `RwLock`.
//! Used by the test suite and by `STORAGE_BACKEND=memory` for local demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::models::{
    Game, GameFilter, ProfileUpdate, Promotion, PromotionFilter, ResponsibleGamingUpdate,
    Transaction, TransactionFilter, User,
};
use crate::database::store::{CasinoStore, TRANSACTION_HISTORY_LIMIT, WalletReceipt};
use crate::error::{AppError, Result};
use crate::services::ledger::{self, DepositWindows, MovementKind, WalletMovement};

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    games: Vec<Game>,
    promotions: Vec<Promotion>,
    transactions: Vec<Transaction>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct write access to a user, for seeding fixtures such as KYC status
    pub async fn update_user<F>(&self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut User),
    {
        let mut inner = self.inner.write().await;
        match inner.users.get_mut(&id) {
            Some(user) => {
                f(user);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Shifts every entry of `user_id` into the past, to exercise the rolling deposit windows
    pub async fn age_transactions(&self, user_id: Uuid, by: chrono::Duration) {
        let mut inner = self.inner.write().await;
        for entry in inner.transactions.iter_mut().filter(|t| t.user_id == user_id) {
            entry.created_at -= by;
        }
    }
}

fn newest_first<T, F>(items: &mut [T], created_at: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl CasinoStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_exists(&self, email: &str, username: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().any(|u| u.email == email || u.username == username))
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.users.values().any(|u| u.email == user.email || u.username == user.username) {
            return Err(AppError::Conflict("User already exists".to_string()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn verify_email(&self, token: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token));
        Ok(match user {
            Some(user) => {
                user.is_verified = true;
                user.verification_token = None;
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&id).map(|user| {
            user.apply_profile_update(update);
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_responsible_gaming(
        &self,
        id: Uuid,
        update: ResponsibleGamingUpdate,
    ) -> Result<Option<User>> {
        let mut inner = self.inner.write().await;
        let Some(user) = inner.users.get_mut(&id) else {
            return Ok(None);
        };
        let now = Utc::now();
        user.apply_responsible_gaming_update(update, now).map_err(AppError::BadRequest)?;
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn toggle_favorite_game(&self, id: Uuid, game_id: &str) -> Result<Option<Vec<String>>> {
        let mut inner = self.inner.write().await;
        Ok(inner.users.get_mut(&id).map(|user| {
            user.toggle_favorite(game_id);
            user.updated_at = Utc::now();
            user.favorite_games.clone()
        }))
    }

    async fn list_games(&self, filter: &GameFilter) -> Result<Vec<Game>> {
        let inner = self.inner.read().await;
        let mut games: Vec<Game> = inner.games.iter().filter(|g| filter.matches(g)).cloned().collect();
        newest_first(&mut games, |g| g.created_at);
        Ok(games)
    }

    async fn list_jackpot_games(&self) -> Result<Vec<Game>> {
        let inner = self.inner.read().await;
        let mut games: Vec<Game> = inner.games.iter().filter(|g| g.has_jackpot).cloned().collect();
        // `None` sorts below every amount, so reversing puts unknown jackpots last
        games.sort_by(|a, b| b.jackpot_amount.cmp(&a.jackpot_amount));
        Ok(games)
    }

    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>> {
        let inner = self.inner.read().await;
        Ok(inner.games.iter().find(|g| g.slug == slug).cloned())
    }

    async fn insert_game(&self, game: &Game) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.games.iter().any(|g| g.slug == game.slug) {
            return Err(AppError::Conflict("Game with this slug already exists".to_string()));
        }
        inner.games.push(game.clone());
        Ok(())
    }

    async fn list_promotions(&self, filter: &PromotionFilter, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let inner = self.inner.read().await;
        let mut promotions: Vec<Promotion> = inner
            .promotions
            .iter()
            .filter(|p| filter.matches(p, now))
            .cloned()
            .collect();
        newest_first(&mut promotions, |p| p.created_at);
        Ok(promotions)
    }

    async fn find_promotion_by_slug(&self, slug: &str) -> Result<Option<Promotion>> {
        let inner = self.inner.read().await;
        Ok(inner.promotions.iter().find(|p| p.slug == slug).cloned())
    }

    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.promotions.iter().any(|p| p.slug == promotion.slug) {
            return Err(AppError::Conflict("Promotion with this slug already exists".to_string()));
        }
        inner.promotions.push(promotion.clone());
        Ok(())
    }

    async fn list_transactions(&self, user_id: Uuid, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let inner = self.inner.read().await;
        let mut entries: Vec<Transaction> = inner
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id && filter.matches(t))
            .cloned()
            .collect();
        newest_first(&mut entries, |t| t.created_at);
        entries.truncate(TRANSACTION_HISTORY_LIMIT);
        Ok(entries)
    }

    async fn apply_wallet_movement(
        &self,
        user_id: Uuid,
        movement: &WalletMovement,
        now: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        // One write guard covers lookup, decision and both writes
        let mut inner = self.inner.write().await;
        let Collections { users, transactions, .. } = &mut *inner;

        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("User not found"))?;

        if let Some(key) = movement.idempotency_key.as_deref() {
            let previous = transactions
                .iter()
                .find(|t| t.user_id == user_id && t.idempotency_key.as_deref() == Some(key));
            if let Some(previous) = previous {
                if !movement.matches(previous) {
                    return Err(AppError::Conflict(
                        "Idempotency key already used for a different request".to_string(),
                    ));
                }
                return Ok(WalletReceipt {
                    new_balance: previous.balance_after,
                    transaction: previous.clone(),
                    replayed: true,
                });
            }
        }

        let totals = match movement.kind {
            MovementKind::Deposit => DepositWindows::ending_at(now)
                .totals(transactions.iter().filter(|t| t.user_id == user_id)),
            MovementKind::Withdrawal => Default::default(),
        };

        let plan = ledger::plan_movement(user, movement, &totals, now)?;
        let transaction = plan.into_transaction(user_id, movement, now);

        user.balance = transaction.balance_after;
        user.updated_at = now;
        transactions.push(transaction.clone());

        Ok(WalletReceipt {
            new_balance: transaction.balance_after,
            transaction,
            replayed: false,
        })
    }
}
