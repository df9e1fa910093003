// Database Models
//
// Records for every collection in the casino: users, games, promotions and
// transactions, plus the request payloads and filters that operate on them.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use tokio_postgres::types::Json;
use uuid::Uuid;

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self>
    where
        Self: Sized;
}

/// Declares a closed set of string values, stored as TEXT and serialised verbatim.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(anyhow::anyhow!("invalid {} value: {}", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(#[derive(Default)] KycStatus {
    #[default]
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

string_enum!(#[derive(Default)] VipLevel {
    #[default]
    Bronze => "bronze",
    Silver => "silver",
    Gold => "gold",
    Platinum => "platinum",
});

string_enum!(GameCategory {
    Slots => "slots",
    TableGames => "table-games",
    LiveCasino => "live-casino",
    VideoPoker => "video-poker",
    Specialty => "specialty",
});

string_enum!(#[derive(Default)] Volatility {
    Low => "low",
    #[default]
    Medium => "medium",
    High => "high",
});

string_enum!(PromotionType {
    WelcomeBonus => "welcome-bonus",
    ReloadBonus => "reload-bonus",
    FreeSpins => "free-spins",
    Cashback => "cashback",
    VipBonus => "vip-bonus",
});

string_enum!(TransactionType {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Bet => "bet",
    Win => "win",
    Bonus => "bonus",
});

string_enum!(TransactionStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

string_enum!(
    /// Cashier channels accepted by the wallet endpoints
    PaymentMethod {
        CreditCard => "credit-card",
        Crypto => "crypto",
        BankTransfer => "bank-transfer",
        EWallet => "e-wallet",
    }
);

fn parse_text<T: std::str::FromStr<Err = anyhow::Error>>(row: &Row, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
}

fn parse_text_array<T: std::str::FromStr<Err = anyhow::Error>>(row: &Row, column: &str) -> Result<Vec<T>> {
    let raw: Vec<String> = row.try_get(column)?;
    raw.iter().map(|value| value.parse()).collect()
}

// ============================================================================
// USER MODELS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
}

/// Daily / weekly / monthly ceilings; `None` means unlimited for that period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodLimits {
    pub daily: Option<Decimal>,
    pub weekly: Option<Decimal>,
    pub monthly: Option<Decimal>,
}

impl PeriodLimits {
    pub fn has_negative(&self) -> bool {
        [self.daily, self.weekly, self.monthly]
            .into_iter()
            .flatten()
            .any(|limit| limit.is_sign_negative())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsibleGaming {
    pub deposit_limit: Option<PeriodLimits>,
    pub loss_limit: Option<PeriodLimits>,
    /// Minutes per session
    pub session_time_limit: Option<u32>,
    pub self_exclusion_until: Option<DateTime<Utc>>,
}

impl ResponsibleGaming {
    pub fn is_self_excluded(&self, now: DateTime<Utc>) -> bool {
        self.self_exclusion_until.is_some_and(|until| until > now)
    }
}

/// Player account. Credentials and the verification token never leave the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<Address>,
    pub balance: Decimal,
    pub bonus_balance: Decimal,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub kyc_status: KycStatus,
    pub kyc_documents: Vec<String>,
    pub vip_level: VipLevel,
    pub responsible_gaming: ResponsibleGaming,
    pub favorite_games: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered, unverified account with an empty wallet
    pub fn new(request: RegisterUser, password_hash: String, verification_token: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: request.username,
            email: request.email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            date_of_birth: request.date_of_birth,
            address: None,
            balance: Decimal::ZERO,
            bonus_balance: Decimal::ZERO,
            is_verified: false,
            verification_token: Some(verification_token),
            kyc_status: KycStatus::default(),
            kyc_documents: Vec::new(),
            vip_level: VipLevel::default(),
            responsible_gaming: ResponsibleGaming::default(),
            favorite_games: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds the game if absent, removes it if present
    pub fn toggle_favorite(&mut self, game_id: &str) {
        match self.favorite_games.iter().position(|g| g == game_id) {
            Some(index) => {
                self.favorite_games.remove(index);
            }
            None => self.favorite_games.push(game_id.to_string()),
        }
    }

    pub fn apply_profile_update(&mut self, update: ProfileUpdate) {
        if let Some(first_name) = update.first_name {
            self.first_name = Some(first_name);
        }
        if let Some(last_name) = update.last_name {
            self.last_name = Some(last_name);
        }
        if let Some(address) = update.address {
            self.address = Some(address);
        }
    }

    /// Validates against the current settings, then merges the present fields.
    /// Nothing changes when validation fails.
    pub fn apply_responsible_gaming_update(
        &mut self,
        update: ResponsibleGamingUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let negative = [&update.deposit_limit, &update.loss_limit]
            .into_iter()
            .flatten()
            .any(PeriodLimits::has_negative);
        if negative {
            return Err("Limits cannot be negative".to_string());
        }
        if let Some(until) = update.self_exclusion_until {
            if until <= now {
                return Err("Self-exclusion must end in the future".to_string());
            }
            if self.responsible_gaming.self_exclusion_until.is_some_and(|current| current > now && until < current) {
                return Err("An active self-exclusion can only be extended".to_string());
            }
        }

        let settings = &mut self.responsible_gaming;
        if let Some(limit) = update.deposit_limit {
            settings.deposit_limit = Some(limit);
        }
        if let Some(limit) = update.loss_limit {
            settings.loss_limit = Some(limit);
        }
        if let Some(minutes) = update.session_time_limit {
            settings.session_time_limit = Some(minutes);
        }
        if let Some(until) = update.self_exclusion_until {
            settings.self_exclusion_until = Some(until);
        }
        Ok(())
    }
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            date_of_birth: row.try_get("date_of_birth")?,
            address: row.try_get::<_, Option<Json<Address>>>("address")?.map(|a| a.0),
            balance: row.try_get("balance")?,
            bonus_balance: row.try_get("bonus_balance")?,
            is_verified: row.try_get("is_verified")?,
            verification_token: row.try_get("verification_token")?,
            kyc_status: parse_text(row, "kyc_status")?,
            kyc_documents: row.try_get("kyc_documents")?,
            vip_level: parse_text(row, "vip_level")?,
            responsible_gaming: row.try_get::<_, Json<ResponsibleGaming>>("responsible_gaming")?.0,
            favorite_games: row.try_get("favorite_games")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Validated registration input
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsibleGamingUpdate {
    pub deposit_limit: Option<PeriodLimits>,
    pub loss_limit: Option<PeriodLimits>,
    pub session_time_limit: Option<u32>,
    pub self_exclusion_until: Option<DateTime<Utc>>,
}

// ============================================================================
// GAME MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub provider: String,
    pub category: GameCategory,
    pub subcategory: Option<String>,
    pub thumbnail: String,
    pub description: String,
    pub rtp: f64,
    pub volatility: Volatility,
    pub features: Vec<String>,
    pub min_bet: Decimal,
    pub max_bet: Decimal,
    pub is_popular: bool,
    pub is_new: bool,
    pub is_featured: bool,
    pub has_jackpot: bool,
    pub jackpot_amount: Option<Decimal>,
    pub demo_available: bool,
    pub launch_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for Game {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            provider: row.try_get("provider")?,
            category: parse_text(row, "category")?,
            subcategory: row.try_get("subcategory")?,
            thumbnail: row.try_get("thumbnail")?,
            description: row.try_get("description")?,
            rtp: row.try_get("rtp")?,
            volatility: parse_text(row, "volatility")?,
            features: row.try_get("features")?,
            min_bet: row.try_get("min_bet")?,
            max_bet: row.try_get("max_bet")?,
            is_popular: row.try_get("is_popular")?,
            is_new: row.try_get("is_new")?,
            is_featured: row.try_get("is_featured")?,
            has_jackpot: row.try_get("has_jackpot")?,
            jackpot_amount: row.try_get("jackpot_amount")?,
            demo_available: row.try_get("demo_available")?,
            launch_url: row.try_get("launch_url")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn default_min_bet() -> Decimal {
    dec!(0.10)
}

fn default_max_bet() -> Decimal {
    dec!(100)
}

fn default_true() -> bool {
    true
}

/// Create game request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub title: String,
    pub slug: String,
    pub provider: String,
    pub category: GameCategory,
    pub subcategory: Option<String>,
    pub thumbnail: String,
    pub description: String,
    pub rtp: f64,
    #[serde(default)]
    pub volatility: Volatility,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_min_bet")]
    pub min_bet: Decimal,
    #[serde(default = "default_max_bet")]
    pub max_bet: Decimal,
    #[serde(default)]
    pub is_popular: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub has_jackpot: bool,
    pub jackpot_amount: Option<Decimal>,
    #[serde(default = "default_true")]
    pub demo_available: bool,
    pub launch_url: String,
}

impl CreateGameRequest {
    /// Field-level checks; returns the first violation
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("title", &self.title),
            ("slug", &self.slug),
            ("provider", &self.provider),
            ("thumbnail", &self.thumbnail),
            ("description", &self.description),
            ("launchUrl", &self.launch_url),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("{} is required", field));
        }
        if !(0.0..=100.0).contains(&self.rtp) {
            return Err("rtp must be between 0 and 100".to_string());
        }
        if self.min_bet <= Decimal::ZERO || self.min_bet > self.max_bet {
            return Err("minBet must be positive and not exceed maxBet".to_string());
        }
        if self.jackpot_amount.is_some_and(|amount| amount.is_sign_negative()) {
            return Err("jackpotAmount cannot be negative".to_string());
        }
        Ok(())
    }

    pub fn into_game(self) -> Game {
        let now = Utc::now();
        Game {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            slug: self.slug.trim().to_string(),
            provider: self.provider.trim().to_string(),
            category: self.category,
            subcategory: self.subcategory,
            thumbnail: self.thumbnail,
            description: self.description,
            rtp: self.rtp,
            volatility: self.volatility,
            features: self.features,
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            is_popular: self.is_popular,
            is_new: self.is_new,
            is_featured: self.is_featured,
            has_jackpot: self.has_jackpot,
            jackpot_amount: self.jackpot_amount,
            demo_available: self.demo_available,
            launch_url: self.launch_url,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GameFilter {
    pub category: Option<GameCategory>,
    pub provider: Option<String>,
    pub popular_only: bool,
    pub new_only: bool,
    pub search: Option<String>,
}

impl GameFilter {
    pub fn matches(&self, game: &Game) -> bool {
        if self.category.is_some_and(|category| category != game.category) {
            return false;
        }
        if self.provider.as_ref().is_some_and(|provider| *provider != game.provider) {
            return false;
        }
        if (self.popular_only && !game.is_popular) || (self.new_only && !game.is_new) {
            return false;
        }
        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                game.title.to_lowercase().contains(&term) || game.provider.to_lowercase().contains(&term)
            }
            None => true,
        }
    }
}

// ============================================================================
// PROMOTION MODELS
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotion {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PromotionType,
    pub bonus_amount: Option<Decimal>,
    pub bonus_percentage: Option<f64>,
    pub free_spins: Option<i32>,
    pub min_deposit: Option<Decimal>,
    pub max_bonus: Option<Decimal>,
    pub wagering_requirement: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub promo_code: Option<String>,
    pub terms: String,
    pub image: String,
    pub is_active: bool,
    pub eligible_vip_levels: Vec<VipLevel>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    /// Inside its validity window at `now`; open-ended when `valid_until` is unset
    pub fn is_in_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && self.valid_until.is_none_or(|until| until >= now)
    }

    /// An empty eligibility list admits every tier
    pub fn is_eligible(&self, level: VipLevel) -> bool {
        self.eligible_vip_levels.is_empty() || self.eligible_vip_levels.contains(&level)
    }
}

impl FromRow for Promotion {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            kind: parse_text(row, "kind")?,
            bonus_amount: row.try_get("bonus_amount")?,
            bonus_percentage: row.try_get("bonus_percentage")?,
            free_spins: row.try_get("free_spins")?,
            min_deposit: row.try_get("min_deposit")?,
            max_bonus: row.try_get("max_bonus")?,
            wagering_requirement: row.try_get("wagering_requirement")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            promo_code: row.try_get("promo_code")?,
            terms: row.try_get("terms")?,
            image: row.try_get("image")?,
            is_active: row.try_get("is_active")?,
            eligible_vip_levels: parse_text_array(row, "eligible_vip_levels")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Create promotion request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromotionRequest {
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PromotionType,
    pub bonus_amount: Option<Decimal>,
    pub bonus_percentage: Option<f64>,
    pub free_spins: Option<i32>,
    pub min_deposit: Option<Decimal>,
    pub max_bonus: Option<Decimal>,
    pub wagering_requirement: f64,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
    pub promo_code: Option<String>,
    pub terms: String,
    pub image: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub eligible_vip_levels: Vec<VipLevel>,
}

impl CreatePromotionRequest {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("title", &self.title),
            ("slug", &self.slug),
            ("description", &self.description),
            ("terms", &self.terms),
            ("image", &self.image),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(format!("{} is required", field));
        }
        if self.wagering_requirement < 0.0 {
            return Err("wageringRequirement cannot be negative".to_string());
        }
        if self.valid_until.is_some_and(|until| until < self.valid_from) {
            return Err("validUntil must not precede validFrom".to_string());
        }
        Ok(())
    }

    pub fn into_promotion(self) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            slug: self.slug.trim().to_string(),
            description: self.description,
            kind: self.kind,
            bonus_amount: self.bonus_amount,
            bonus_percentage: self.bonus_percentage,
            free_spins: self.free_spins,
            min_deposit: self.min_deposit,
            max_bonus: self.max_bonus,
            wagering_requirement: self.wagering_requirement,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            promo_code: self.promo_code,
            terms: self.terms,
            image: self.image,
            is_active: self.is_active,
            eligible_vip_levels: self.eligible_vip_levels,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromotionFilter {
    pub kind: Option<PromotionType>,
    pub is_active: Option<bool>,
}

impl PromotionFilter {
    pub fn matches(&self, promotion: &Promotion, now: DateTime<Utc>) -> bool {
        self.kind.is_none_or(|kind| kind == promotion.kind)
            && self.is_active.is_none_or(|active| active == promotion.is_active)
            && promotion.is_in_window(now)
    }
}

// ============================================================================
// TRANSACTION MODELS
// ============================================================================

/// One ledger entry against a user's wallet
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub description: Option<String>,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for Transaction {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            kind: parse_text(row, "kind")?,
            amount: row.try_get("amount")?,
            status: parse_text(row, "status")?,
            payment_method: row.try_get("payment_method")?,
            transaction_id: row.try_get("transaction_id")?,
            description: row.try_get("description")?,
            balance_before: row.try_get("balance_before")?,
            balance_after: row.try_get("balance_after")?,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub kind: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.kind.is_none_or(|kind| kind == transaction.kind)
            && self.status.is_none_or(|status| status == transaction.status)
    }
}
