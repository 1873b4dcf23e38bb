//! Worker wallet - prepaid balance that gates dispatch
//!
//! Key characteristics:
//! - Balance is never negative
//! - Balance only moves through signed `load`/`deduct` transactions
//! - Version field for optimistic concurrency
//! - Transactions are append-only and sum to the balance

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{TransactionId, TripId, WorkerId};
use crate::error::{Result, RutaError};

/// Direction of a wallet transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Load,
    Deduct,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Load => "load",
            TransactionType::Deduct => "deduct",
        }
    }

    /// Loads never subtract (a zero load is a recorded no-op), deducts are strictly negative.
    pub fn validate_amount(&self, amount: Decimal) -> Result<()> {
        match self {
            TransactionType::Load if amount < Decimal::ZERO => Err(RutaError::Validation(
                format!("load amount must not be negative, got {}", amount),
            )),
            TransactionType::Deduct if amount >= Decimal::ZERO => Err(RutaError::Validation(
                format!("deduct amount must be negative, got {}", amount),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spendable balance of one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAccount {
    pub owner_id: WorkerId,

    /// Never negative
    pub balance: Decimal,

    /// Version for optimistic concurrency control
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletAccount {
    /// Create a new empty account
    pub fn new(owner_id: WorkerId) -> Self {
        let now = Utc::now();
        Self {
            owner_id,
            balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a signed amount, refusing anything that would take the balance below zero.
    ///
    /// Nothing is modified on error. Callers must hold exclusive access to the account
    /// for the read-modify-write to be atomic.
    pub fn apply(&mut self, amount: Decimal, kind: TransactionType) -> Result<Decimal> {
        kind.validate_amount(amount)?;

        let next = self.balance.checked_add(amount).ok_or_else(|| {
            RutaError::Validation(format!("balance {} cannot absorb {}", self.balance, amount))
        })?;
        if next < Decimal::ZERO {
            return Err(RutaError::InsufficientFunds {
                required: -amount,
                available: self.balance,
            });
        }

        self.balance = next;
        self.touch();
        Ok(next)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for WalletAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WalletAccount(owner={}, balance={}, v{})",
            self.owner_id, self.balance, self.version
        )
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub owner_id: WorkerId,
    /// Signed: positive for loads, negative for deducts
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub trip_id: Option<TripId>,
    pub reference: String,
    /// Account balance right after this entry was applied
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}
