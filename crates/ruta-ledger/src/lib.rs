//! # Ruta Ledger
//!
//! Prepaid worker balances. Every balance change is a signed, append-only
//! [`WalletTransaction`]; the balance is never written directly and never goes
//! negative.
//!
//! ```text
//! load   (+amount) ──┐
//!                    ├──► LedgerStore::apply ──► balance' = balance + amount  (>= 0)
//! deduct (-amount) ──┘        (atomic)           + transaction appended
//! ```
//!
//! Dispatch consults [`Ledger::transaction_capacity`] before letting a worker accept a
//! trip, and charges platform fees and no-show penalties through
//! [`Ledger::apply_transaction`].

pub mod store;

pub use store::{InMemoryLedgerStore, LedgerStore, TransactionDraft};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use ruta_common::{Result, RutaError, TransactionType, TripId, WalletTransaction, WorkerId};

/// Capacity below which a worker is warned to reload
pub const DEFAULT_LOW_BALANCE_TRIPS: u64 = 5;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Remaining fee-charging trips that trigger a low-balance warning
    pub low_balance_trips: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            low_balance_trips: DEFAULT_LOW_BALANCE_TRIPS,
        }
    }
}

/// How close a worker is to being blocked from new assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BalanceStatus {
    Healthy,
    Low { remaining_trips: u64 },
    /// Cannot cover a single fee; new assignments are refused
    Blocked,
}

/// Balance vs. transaction sum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub owner_id: WorkerId,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
    pub transaction_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_sum
    }

    pub fn drift(&self) -> Decimal {
        self.balance - self.ledger_sum
    }
}

/// Wallet ledger service
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Ledger over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLedgerStore::new()), LedgerConfig::default())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Current balance, zero for a worker who never transacted
    pub async fn get_balance(&self, worker_id: &WorkerId) -> Result<Decimal> {
        Ok(self
            .store
            .account(worker_id)
            .await?
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Append a signed transaction and return the new balance
    #[instrument(skip(self, reference))]
    pub async fn apply_transaction(
        &self,
        worker_id: WorkerId,
        amount: Decimal,
        kind: TransactionType,
        trip_id: Option<TripId>,
        reference: Option<String>,
    ) -> Result<Decimal> {
        let reference = reference.unwrap_or_else(|| kind.as_str().to_string());
        let draft = TransactionDraft {
            owner_id: worker_id,
            amount,
            kind,
            trip_id,
            reference,
        };

        match self.store.apply(draft).await {
            Ok(tx) => {
                info!(
                    worker = %worker_id,
                    amount = %tx.amount,
                    balance = %tx.balance_after,
                    reference = %tx.reference,
                    "Wallet {}", kind
                );
                Ok(tx.balance_after)
            }
            Err(err @ RutaError::InsufficientFunds { .. }) => {
                warn!(worker = %worker_id, amount = %amount, "Deduct refused: {}", err);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Top up a wallet by a positive amount
    pub async fn load(
        &self,
        worker_id: WorkerId,
        amount: Decimal,
        reference: impl Into<String>,
    ) -> Result<Decimal> {
        self.apply_transaction(
            worker_id,
            amount,
            TransactionType::Load,
            None,
            Some(reference.into()),
        )
        .await
    }

    /// Charge a positive amount against a wallet
    pub async fn deduct(
        &self,
        worker_id: WorkerId,
        amount: Decimal,
        trip_id: Option<TripId>,
        reference: impl Into<String>,
    ) -> Result<Decimal> {
        self.apply_transaction(
            worker_id,
            -amount,
            TransactionType::Deduct,
            trip_id,
            Some(reference.into()),
        )
        .await
    }

    /// Number of further trips the balance can pay `fee_per_trip` for
    pub async fn transaction_capacity(
        &self,
        worker_id: &WorkerId,
        fee_per_trip: Decimal,
    ) -> Result<u64> {
        if fee_per_trip <= Decimal::ZERO {
            return Err(RutaError::Validation(format!(
                "fee per trip must be positive, got {}",
                fee_per_trip
            )));
        }
        let balance = self.get_balance(worker_id).await?;
        // Quotients past u64 saturate
        Ok(balance
            .checked_div(fee_per_trip)
            .and_then(|trips| trips.floor().to_u64())
            .unwrap_or(u64::MAX))
    }

    /// Healthy / low / blocked, from the capacity at `fee_per_trip`
    pub async fn balance_status(
        &self,
        worker_id: &WorkerId,
        fee_per_trip: Decimal,
    ) -> Result<BalanceStatus> {
        let capacity = self.transaction_capacity(worker_id, fee_per_trip).await?;
        Ok(match capacity {
            0 => BalanceStatus::Blocked,
            n if n < self.config.low_balance_trips => BalanceStatus::Low { remaining_trips: n },
            _ => BalanceStatus::Healthy,
        })
    }

    /// Transaction history in append order
    pub async fn transactions(&self, worker_id: &WorkerId) -> Result<Vec<WalletTransaction>> {
        self.store.transactions(worker_id).await
    }

    /// Compare the stored balance with the sum of the transaction log
    #[instrument(skip(self))]
    pub async fn reconcile(&self, worker_id: &WorkerId) -> Result<Reconciliation> {
        let balance = self.get_balance(worker_id).await?;
        let transactions = self.store.transactions(worker_id).await?;
        let ledger_sum: Decimal = transactions.iter().map(|tx| tx.amount).sum();

        let report = Reconciliation {
            owner_id: *worker_id,
            balance,
            ledger_sum,
            transaction_count: transactions.len(),
        };
        if !report.is_consistent() {
            warn!(worker = %worker_id, drift = %report.drift(), "Ledger drift detected");
        }
        Ok(report)
    }
}
