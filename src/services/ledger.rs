//! Wallet Ledger Rules
//!
//! Decides whether a deposit or withdrawal may be booked against a user's
//! balance, and what the resulting ledger entry looks like. The function here
//! is pure: each store calls it while it holds the user's row lock, so the
//! balance it reads is the balance it writes.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{
    KycStatus, PaymentMethod, Transaction, TransactionStatus, TransactionType, User,
};

/// Direction of a wallet movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Deposit,
    Withdrawal,
}

impl MovementKind {
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            Self::Deposit => TransactionType::Deposit,
            Self::Withdrawal => TransactionType::Withdrawal,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
        }
    }
}

/// A requested deposit or withdrawal
#[derive(Debug, Clone)]
pub struct WalletMovement {
    pub kind: MovementKind,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub idempotency_key: Option<String>,
}

impl WalletMovement {
    /// True when a stored entry was produced by an identical request
    pub fn matches(&self, existing: &Transaction) -> bool {
        existing.kind == self.kind.transaction_type()
            && existing.amount == self.amount
            && existing.payment_method.as_deref() == Some(self.payment_method.as_str())
    }
}

/// Per-method cashier limits, inclusive on both ends
#[derive(Debug, Clone, Copy)]
pub struct MethodLimits {
    pub min: Decimal,
    pub max: Decimal,
}

pub fn method_limits(kind: MovementKind, method: PaymentMethod) -> Option<MethodLimits> {
    let (min, max) = match (kind, method) {
        (MovementKind::Deposit, PaymentMethod::CreditCard) => (dec!(10), dec!(10000)),
        (MovementKind::Withdrawal, PaymentMethod::CreditCard) => return None,
        (_, PaymentMethod::Crypto) => (dec!(20), dec!(50000)),
        (_, PaymentMethod::BankTransfer) => (dec!(50), dec!(100000)),
        (_, PaymentMethod::EWallet) => (dec!(10), dec!(5000)),
    };
    Some(MethodLimits { min, max })
}

/// Completed deposits over the rolling windows ending now
#[derive(Debug, Clone, Copy, Default)]
pub struct DepositTotals {
    pub daily: Decimal,
    pub weekly: Decimal,
    pub monthly: Decimal,
}

/// Window starts for the rolling deposit totals
#[derive(Debug, Clone, Copy)]
pub struct DepositWindows {
    pub day: DateTime<Utc>,
    pub week: DateTime<Utc>,
    pub month: DateTime<Utc>,
}

impl DepositWindows {
    pub fn ending_at(now: DateTime<Utc>) -> Self {
        Self {
            day: now - Duration::days(1),
            week: now - Duration::days(7),
            month: now - Duration::days(30),
        }
    }

    /// Sums completed deposits by window; used by stores that hold entries in memory
    pub fn totals<'a>(&self, entries: impl IntoIterator<Item = &'a Transaction>) -> DepositTotals {
        let mut totals = DepositTotals::default();
        for entry in entries {
            if entry.kind != TransactionType::Deposit || entry.status != TransactionStatus::Completed {
                continue;
            }
            if entry.created_at >= self.month {
                totals.monthly += entry.amount;
            }
            if entry.created_at >= self.week {
                totals.weekly += entry.amount;
            }
            if entry.created_at >= self.day {
                totals.daily += entry.amount;
            }
        }
        totals
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid {0} amount")]
    InvalidAmount(&'static str),

    #[error("{method} is not available for {direction}s")]
    MethodNotSupported { method: PaymentMethod, direction: &'static str },

    #[error("Minimum {direction} for {method} is ${min}")]
    BelowMinimum { method: PaymentMethod, direction: &'static str, min: Decimal },

    #[error("Maximum {direction} for {method} is ${max}")]
    AboveMaximum { method: PaymentMethod, direction: &'static str, max: Decimal },

    #[error("Account is self-excluded until {until}")]
    SelfExcluded { until: DateTime<Utc> },

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("KYC verification required for withdrawals")]
    KycRequired,

    #[error("{period} deposit limit of ${limit} would be exceeded")]
    DepositLimitExceeded { period: &'static str, limit: Decimal },
}

impl LedgerError {
    pub fn is_exclusion(&self) -> bool {
        matches!(self, Self::SelfExcluded { .. })
    }
}

/// The entry a store should persist, and the balance it leaves behind
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPlan {
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub description: String,
}

impl LedgerPlan {
    pub fn into_transaction(
        self,
        user_id: Uuid,
        movement: &WalletMovement,
        now: DateTime<Utc>,
    ) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            kind: self.kind,
            amount: self.amount,
            status: self.status,
            payment_method: Some(movement.payment_method.as_str().to_string()),
            transaction_id: None,
            description: Some(self.description),
            balance_before: self.balance_before,
            balance_after: self.balance_after,
            idempotency_key: movement.idempotency_key.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Positive, in whole cents
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount.normalize().scale() <= 2
}

/// Applies the cashier rules in order and returns the entry to book.
///
/// Deposits complete immediately. Withdrawals stay `pending` for the payout
/// processor, but the funds are debited now so they cannot be spent twice.
pub fn plan_movement(
    user: &User,
    movement: &WalletMovement,
    deposits: &DepositTotals,
    now: DateTime<Utc>,
) -> Result<LedgerPlan, LedgerError> {
    let direction = movement.kind.label();
    let amount = movement.amount;

    if !is_valid_amount(amount) {
        return Err(LedgerError::InvalidAmount(direction));
    }

    let method = movement.payment_method;
    let limits = method_limits(movement.kind, method)
        .ok_or(LedgerError::MethodNotSupported { method, direction })?;
    if amount < limits.min {
        return Err(LedgerError::BelowMinimum { method, direction, min: limits.min });
    }
    if amount > limits.max {
        return Err(LedgerError::AboveMaximum { method, direction, max: limits.max });
    }

    let settings = &user.responsible_gaming;
    if settings.is_self_excluded(now) {
        if let Some(until) = settings.self_exclusion_until {
            return Err(LedgerError::SelfExcluded { until });
        }
    }

    let balance_before = user.balance;
    let (balance_after, status) = match movement.kind {
        MovementKind::Deposit => {
            check_deposit_limits(user, deposits, amount)?;
            (balance_before + amount, TransactionStatus::Completed)
        }
        MovementKind::Withdrawal => {
            if balance_before < amount {
                return Err(LedgerError::InsufficientBalance);
            }
            if user.kyc_status != KycStatus::Verified {
                return Err(LedgerError::KycRequired);
            }
            (balance_before - amount, TransactionStatus::Pending)
        }
    };

    let verb = match movement.kind {
        MovementKind::Deposit => "Deposit",
        MovementKind::Withdrawal => "Withdrawal",
    };

    Ok(LedgerPlan {
        kind: movement.kind.transaction_type(),
        status,
        amount,
        balance_before,
        balance_after,
        description: format!("{} via {}", verb, method),
    })
}

fn check_deposit_limits(
    user: &User,
    deposits: &DepositTotals,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let Some(limits) = &user.responsible_gaming.deposit_limit else {
        return Ok(());
    };
    let periods = [
        ("Daily", limits.daily, deposits.daily),
        ("Weekly", limits.weekly, deposits.weekly),
        ("Monthly", limits.monthly, deposits.monthly),
    ];
    for (period, limit, spent) in periods {
        if let Some(limit) = limit {
            if spent + amount > limit {
                return Err(LedgerError::DepositLimitExceeded { period, limit });
            }
        }
    }
    Ok(())
}
