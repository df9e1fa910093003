//! Postgres Store
//!
//! `CasinoStore` backed by tokio-postgres through the deadpool pool.
//! Wallet movements run inside a single SQL transaction that holds
//! `FOR UPDATE` on the user row until commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use rust_decimal::Decimal;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{Json, ToSql};
use uuid::Uuid;

use crate::database::models::{
    FromRow, Game, GameFilter, ProfileUpdate, Promotion, PromotionFilter, ResponsibleGamingUpdate,
    Transaction, TransactionFilter, User,
};
use crate::database::store::{CasinoStore, TRANSACTION_HISTORY_LIMIT, WalletReceipt};
use crate::error::{AppError, Result};
use crate::services::ledger::{self, DepositTotals, DepositWindows, MovementKind, WalletMovement};

type Param = Box<dyn ToSql + Sync + Send>;

/// Accumulates `WHERE` clauses with positional parameters
struct SelectBuilder {
    base: String,
    clauses: Vec<String>,
    params: Vec<Param>,
}

impl SelectBuilder {
    fn new(base: &str) -> Self {
        Self { base: base.to_string(), clauses: Vec::new(), params: Vec::new() }
    }

    /// Registers a parameter and returns its placeholder
    fn bind<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    fn filter(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    fn finish(self, tail: &str) -> (String, Vec<Param>) {
        let mut sql = self.base;
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        sql.push(' ');
        sql.push_str(tail);
        (sql, self.params)
    }
}

fn param_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| &**p as &(dyn ToSql + Sync)).collect()
}

/// Escapes LIKE metacharacters so user search terms match literally
fn like_pattern(term: &str) -> String {
    let escaped = term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{}%", escaped)
}

fn rows_into<T: FromRow>(rows: Vec<tokio_postgres::Row>) -> Result<Vec<T>> {
    rows.iter()
        .map(|row| T::from_row(row).map_err(AppError::from))
        .collect()
}

fn unique_violation(err: tokio_postgres::Error, message: &str) -> AppError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        AppError::Conflict(message.to_string())
    } else {
        AppError::from(err)
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn fetch_user(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(sql, params).await?;
        row.as_ref().map(User::from_row).transpose().map_err(AppError::from)
    }
}

#[async_trait]
impl CasinoStore for PgStore {
    async fn ping(&self) -> Result<()> {
        let client = self.pool.get().await?;
        client.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.fetch_user("SELECT * FROM users WHERE id = $1", &[&id]).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_user("SELECT * FROM users WHERE email = $1", &[&email]).await
    }

    async fn user_exists(&self, email: &str, username: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
                &[&email, &username],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO users (id, username, email, password_hash, first_name, last_name, date_of_birth, \
                 address, balance, bonus_balance, is_verified, verification_token, kyc_status, kyc_documents, \
                 vip_level, responsible_gaming, favorite_games, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
                &[
                    &user.id,
                    &user.username,
                    &user.email,
                    &user.password_hash,
                    &user.first_name,
                    &user.last_name,
                    &user.date_of_birth,
                    &user.address.as_ref().map(Json),
                    &user.balance,
                    &user.bonus_balance,
                    &user.is_verified,
                    &user.verification_token,
                    &user.kyc_status.as_str(),
                    &user.kyc_documents,
                    &user.vip_level.as_str(),
                    &Json(&user.responsible_gaming),
                    &user.favorite_games,
                    &user.created_at,
                    &user.updated_at,
                ],
            )
            .await
            .map_err(|e| unique_violation(e, "User already exists"))?;
        Ok(())
    }

    async fn verify_email(&self, token: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE users SET is_verified = TRUE, verification_token = NULL, updated_at = NOW() \
                 WHERE verification_token = $1",
                &[&token],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE users SET \
                 first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 address = COALESCE($4, address), \
                 updated_at = NOW() \
                 WHERE id = $1 RETURNING *",
                &[&id, &update.first_name, &update.last_name, &update.address.map(Json)],
            )
            .await?;
        row.as_ref().map(User::from_row).transpose().map_err(AppError::from)
    }

    async fn update_responsible_gaming(
        &self,
        id: Uuid,
        update: ResponsibleGamingUpdate,
    ) -> Result<Option<User>> {
        // Read-modify-write under a row lock keeps the JSONB merge in one place
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let Some(row) = tx.query_opt("SELECT * FROM users WHERE id = $1 FOR UPDATE", &[&id]).await? else {
            return Ok(None);
        };
        let mut user = User::from_row(&row)?;
        user.apply_responsible_gaming_update(update, Utc::now()).map_err(AppError::BadRequest)?;

        let row = tx
            .query_one(
                "UPDATE users SET responsible_gaming = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
                &[&id, &Json(&user.responsible_gaming)],
            )
            .await?;
        tx.commit().await?;
        Ok(Some(User::from_row(&row)?))
    }

    async fn toggle_favorite_game(&self, id: Uuid, game_id: &str) -> Result<Option<Vec<String>>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "UPDATE users SET favorite_games = CASE \
                   WHEN $2 = ANY(favorite_games) THEN array_remove(favorite_games, $2) \
                   ELSE array_append(favorite_games, $2) END, \
                 updated_at = NOW() \
                 WHERE id = $1 RETURNING favorite_games",
                &[&id, &game_id],
            )
            .await?;
        Ok(row.map(|r| r.get("favorite_games")))
    }

    async fn list_games(&self, filter: &GameFilter) -> Result<Vec<Game>> {
        let mut query = SelectBuilder::new("SELECT * FROM games");
        if let Some(category) = filter.category {
            let p = query.bind(category.as_str().to_string());
            query.filter(format!("category = {}", p));
        }
        if let Some(provider) = &filter.provider {
            let p = query.bind(provider.clone());
            query.filter(format!("provider = {}", p));
        }
        if filter.popular_only {
            query.filter("is_popular".to_string());
        }
        if filter.new_only {
            query.filter("is_new".to_string());
        }
        if let Some(term) = &filter.search {
            let p = query.bind(like_pattern(term));
            query.filter(format!("(title ILIKE {p} OR provider ILIKE {p})"));
        }
        let (sql, params) = query.finish("ORDER BY created_at DESC");

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &param_refs(&params)).await?;
        rows_into(rows)
    }

    async fn list_jackpot_games(&self) -> Result<Vec<Game>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT * FROM games WHERE has_jackpot ORDER BY jackpot_amount DESC NULLS LAST",
                &[],
            )
            .await?;
        rows_into(rows)
    }

    async fn find_game_by_slug(&self, slug: &str) -> Result<Option<Game>> {
        let client = self.pool.get().await?;
        let row = client.query_opt("SELECT * FROM games WHERE slug = $1", &[&slug]).await?;
        row.as_ref().map(Game::from_row).transpose().map_err(AppError::from)
    }

    async fn insert_game(&self, game: &Game) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO games (id, title, slug, provider, category, subcategory, thumbnail, description, \
                 rtp, volatility, features, min_bet, max_bet, is_popular, is_new, is_featured, has_jackpot, \
                 jackpot_amount, demo_available, launch_url, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)",
                &[
                    &game.id,
                    &game.title,
                    &game.slug,
                    &game.provider,
                    &game.category.as_str(),
                    &game.subcategory,
                    &game.thumbnail,
                    &game.description,
                    &game.rtp,
                    &game.volatility.as_str(),
                    &game.features,
                    &game.min_bet,
                    &game.max_bet,
                    &game.is_popular,
                    &game.is_new,
                    &game.is_featured,
                    &game.has_jackpot,
                    &game.jackpot_amount,
                    &game.demo_available,
                    &game.launch_url,
                    &game.created_at,
                    &game.updated_at,
                ],
            )
            .await
            .map_err(|e| unique_violation(e, "Game with this slug already exists"))?;
        Ok(())
    }

    async fn list_promotions(&self, filter: &PromotionFilter, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let mut query = SelectBuilder::new("SELECT * FROM promotions");
        if let Some(kind) = filter.kind {
            let p = query.bind(kind.as_str().to_string());
            query.filter(format!("kind = {}", p));
        }
        if let Some(active) = filter.is_active {
            let p = query.bind(active);
            query.filter(format!("is_active = {}", p));
        }
        let p = query.bind(now);
        query.filter(format!("valid_from <= {p} AND (valid_until IS NULL OR valid_until >= {p})"));
        let (sql, params) = query.finish("ORDER BY created_at DESC");

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &param_refs(&params)).await?;
        rows_into(rows)
    }

    async fn find_promotion_by_slug(&self, slug: &str) -> Result<Option<Promotion>> {
        let client = self.pool.get().await?;
        let row = client.query_opt("SELECT * FROM promotions WHERE slug = $1", &[&slug]).await?;
        row.as_ref().map(Promotion::from_row).transpose().map_err(AppError::from)
    }

    async fn insert_promotion(&self, promotion: &Promotion) -> Result<()> {
        let levels: Vec<&str> = promotion.eligible_vip_levels.iter().map(|l| l.as_str()).collect();
        let client = self.pool.get().await?;
        client
            .execute(
                "INSERT INTO promotions (id, title, slug, description, kind, bonus_amount, bonus_percentage, \
                 free_spins, min_deposit, max_bonus, wagering_requirement, valid_from, valid_until, promo_code, \
                 terms, image, is_active, eligible_vip_levels, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
                &[
                    &promotion.id,
                    &promotion.title,
                    &promotion.slug,
                    &promotion.description,
                    &promotion.kind.as_str(),
                    &promotion.bonus_amount,
                    &promotion.bonus_percentage,
                    &promotion.free_spins,
                    &promotion.min_deposit,
                    &promotion.max_bonus,
                    &promotion.wagering_requirement,
                    &promotion.valid_from,
                    &promotion.valid_until,
                    &promotion.promo_code,
                    &promotion.terms,
                    &promotion.image,
                    &promotion.is_active,
                    &levels,
                    &promotion.created_at,
                    &promotion.updated_at,
                ],
            )
            .await
            .map_err(|e| unique_violation(e, "Promotion with this slug already exists"))?;
        Ok(())
    }

    async fn list_transactions(&self, user_id: Uuid, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let mut query = SelectBuilder::new("SELECT * FROM transactions");
        let p = query.bind(user_id);
        query.filter(format!("user_id = {}", p));
        if let Some(kind) = filter.kind {
            let p = query.bind(kind.as_str().to_string());
            query.filter(format!("kind = {}", p));
        }
        if let Some(status) = filter.status {
            let p = query.bind(status.as_str().to_string());
            query.filter(format!("status = {}", p));
        }
        let (sql, params) = query.finish(&format!("ORDER BY created_at DESC LIMIT {}", TRANSACTION_HISTORY_LIMIT));

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &param_refs(&params)).await?;
        rows_into(rows)
    }

    async fn apply_wallet_movement(
        &self,
        user_id: Uuid,
        movement: &WalletMovement,
        now: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt("SELECT * FROM users WHERE id = $1 FOR UPDATE", &[&user_id])
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;
        let user = User::from_row(&row)?;

        if let Some(key) = movement.idempotency_key.as_deref() {
            let previous = tx
                .query_opt(
                    "SELECT * FROM transactions WHERE user_id = $1 AND idempotency_key = $2",
                    &[&user_id, &key],
                )
                .await?;
            if let Some(row) = previous {
                let previous = Transaction::from_row(&row)?;
                if !movement.matches(&previous) {
                    return Err(AppError::Conflict(
                        "Idempotency key already used for a different request".to_string(),
                    ));
                }
                tracing::info!("Replaying wallet movement {} for user {}", previous.id, user_id);
                return Ok(WalletReceipt {
                    new_balance: previous.balance_after,
                    transaction: previous,
                    replayed: true,
                });
            }
        }

        let totals = match movement.kind {
            MovementKind::Deposit => {
                let windows = DepositWindows::ending_at(now);
                let row = tx
                    .query_one(
                        "SELECT \
                           COALESCE(SUM(amount) FILTER (WHERE created_at >= $2), 0) AS daily, \
                           COALESCE(SUM(amount) FILTER (WHERE created_at >= $3), 0) AS weekly, \
                           COALESCE(SUM(amount) FILTER (WHERE created_at >= $4), 0) AS monthly \
                         FROM transactions \
                         WHERE user_id = $1 AND kind = 'deposit' AND status = 'completed'",
                        &[&user_id, &windows.day, &windows.week, &windows.month],
                    )
                    .await?;
                DepositTotals {
                    daily: row.try_get::<_, Decimal>("daily")?,
                    weekly: row.try_get::<_, Decimal>("weekly")?,
                    monthly: row.try_get::<_, Decimal>("monthly")?,
                }
            }
            MovementKind::Withdrawal => DepositTotals::default(),
        };

        let plan = ledger::plan_movement(&user, movement, &totals, now)?;
        let transaction = plan.into_transaction(user_id, movement, now);

        tx.execute(
            "INSERT INTO transactions (id, user_id, kind, amount, status, payment_method, transaction_id, \
             description, balance_before, balance_after, idempotency_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            &[
                &transaction.id,
                &transaction.user_id,
                &transaction.kind.as_str(),
                &transaction.amount,
                &transaction.status.as_str(),
                &transaction.payment_method,
                &transaction.transaction_id,
                &transaction.description,
                &transaction.balance_before,
                &transaction.balance_after,
                &transaction.idempotency_key,
                &transaction.created_at,
                &transaction.updated_at,
            ],
        )
        .await?;

        tx.execute(
            "UPDATE users SET balance = $2, updated_at = $3 WHERE id = $1",
            &[&user_id, &transaction.balance_after, &now],
        )
        .await?;

        tx.commit().await?;

        Ok(WalletReceipt {
            new_balance: transaction.balance_after,
            transaction,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_builder_numbers_placeholders_in_order() {
        let mut query = SelectBuilder::new("SELECT * FROM games");
        let a = query.bind("slots".to_string());
        query.filter(format!("category = {}", a));
        query.filter("is_new".to_string());
        let b = query.bind(like_pattern("book"));
        query.filter(format!("(title ILIKE {b} OR provider ILIKE {b})"));
        let (sql, params) = query.finish("ORDER BY created_at DESC");

        assert_eq!(
            sql,
            "SELECT * FROM games WHERE category = $1 AND is_new AND (title ILIKE $2 OR provider ILIKE $2) ORDER BY created_at DESC"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("100%_win"), "%100\\%\\_win%");
    }
}
