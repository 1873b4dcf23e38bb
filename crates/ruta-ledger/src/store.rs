//! Ledger storage backends
//!
//! A store owns both logical tables (`wallet_accounts`, `wallet_transactions`) and must
//! apply a transaction and its balance change as one atomic read-modify-write.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;

use ruta_common::{
    Result, RutaError, TransactionId, TransactionType, TripId, WalletAccount, WalletTransaction,
    WorkerId,
};

/// Transaction about to be applied
#[derive(Debug, Clone)]
pub struct TransactionDraft {
    pub owner_id: WorkerId,
    /// Signed: positive for loads, negative for deducts
    pub amount: Decimal,
    pub kind: TransactionType,
    pub trip_id: Option<TripId>,
    pub reference: String,
}

/// Trait for ledger storage backends
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Append a transaction and move the balance, atomically.
    ///
    /// A deduct that would take the balance below zero fails with
    /// `InsufficientFunds` and records nothing.
    async fn apply(&self, draft: TransactionDraft) -> Result<WalletTransaction>;

    /// Get an account, `None` if the worker never transacted
    async fn account(&self, owner_id: &WorkerId) -> Result<Option<WalletAccount>>;

    /// All transactions of a worker in append order
    async fn transactions(&self, owner_id: &WorkerId) -> Result<Vec<WalletTransaction>>;

    /// Number of accounts
    async fn account_count(&self) -> usize;
}

/// Account row plus its transaction log, guarded together
#[derive(Debug, Clone)]
struct LedgerEntry {
    account: WalletAccount,
    transactions: Vec<WalletTransaction>,
}

impl LedgerEntry {
    fn new(owner_id: WorkerId) -> Self {
        Self {
            account: WalletAccount::new(owner_id),
            transactions: Vec::new(),
        }
    }

    fn append(&mut self, draft: TransactionDraft) -> Result<WalletTransaction> {
        let balance_after = self.account.apply(draft.amount, draft.kind)?;
        let tx = WalletTransaction {
            id: TransactionId::new(),
            owner_id: draft.owner_id,
            amount: draft.amount,
            kind: draft.kind,
            trip_id: draft.trip_id,
            reference: draft.reference,
            balance_after,
            created_at: Utc::now(),
        };
        self.transactions.push(tx.clone());
        Ok(tx)
    }
}

/// In-memory ledger
///
/// Uses DashMap; the shard write lock held by an entry guard makes each
/// `apply` a single read-modify-write.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    entries: DashMap<WorkerId, LedgerEntry>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply(&self, draft: TransactionDraft) -> Result<WalletTransaction> {
        draft.kind.validate_amount(draft.amount)?;
        let owner_id = draft.owner_id;

        let tx = match draft.kind {
            TransactionType::Load => self
                .entries
                .entry(owner_id)
                .or_insert_with(|| LedgerEntry::new(owner_id))
                .append(draft)?,
            // No account yet means nothing to deduct from; don't create one
            TransactionType::Deduct => match self.entries.get_mut(&owner_id) {
                Some(mut entry) => entry.append(draft)?,
                None => {
                    return Err(RutaError::InsufficientFunds {
                        required: -draft.amount,
                        available: Decimal::ZERO,
                    })
                }
            },
        };

        debug!(
            owner = %owner_id,
            amount = %tx.amount,
            balance = %tx.balance_after,
            "Transaction applied"
        );
        Ok(tx)
    }

    async fn account(&self, owner_id: &WorkerId) -> Result<Option<WalletAccount>> {
        Ok(self.entries.get(owner_id).map(|e| e.account.clone()))
    }

    async fn transactions(&self, owner_id: &WorkerId) -> Result<Vec<WalletTransaction>> {
        Ok(self
            .entries
            .get(owner_id)
            .map(|e| e.transactions.clone())
            .unwrap_or_default())
    }

    async fn account_count(&self) -> usize {
        self.entries.len()
    }
}
