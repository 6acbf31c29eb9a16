use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    ledger::{Transaction, TransactionId},
    records::AuxRecord,
    wallet::{Wallet, WalletId},
};

pub mod in_memory;

/// Opaque token that changes on every persisted wallet write.
///
/// Random rather than a counter, so it does not leak how often a wallet changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionToken(Uuid);

impl VersionToken {
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.simple().fmt(f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Wallet {0} not found")]
    WalletNotFound(String),
    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),
    #[error("Customer {customer_id} already has a {currency_code} wallet")]
    WalletAlreadyExists {
        customer_id: String,
        currency_code: String,
    },
    #[error("Wallet {wallet_id} was modified concurrently, reload and retry")]
    ConcurrentModification { wallet_id: WalletId },
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn wallet_not_found(id: WalletId) -> Self {
        StoreError::WalletNotFound(id.to_string())
    }
}

/// Everything one operation writes. Applied entirely or not at all.
///
/// Wallets are borrowed mutably so the store can stamp the fresh
/// [`VersionToken`] on them once the write went through.
#[derive(Debug, Default)]
pub struct CommitBatch<'a> {
    pub wallets: Vec<&'a mut Wallet>,
    pub transactions: Vec<Transaction>,
    pub records: Vec<AuxRecord>,
}

impl<'a> CommitBatch<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallet(mut self, wallet: &'a mut Wallet) -> Self {
        self.wallets.push(wallet);
        self
    }

    pub fn transaction(mut self, transaction: &Transaction) -> Self {
        self.transactions.push(transaction.clone());
        self
    }

    pub fn record(mut self, record: AuxRecord) -> Self {
        self.records.push(record);
        self
    }
}

/// Field a transaction history page is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[default]
    CreatedAt,
    Amount,
}

impl SortKey {
    /// Orders by the key, ties broken by id so the order is total.
    pub fn compare(self, a: &Transaction, b: &Transaction) -> Ordering {
        let by_key = match self {
            SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            SortKey::Amount => a.amount.cmp(&b.amount),
        };
        by_key.then_with(|| a.id.cmp(&b.id))
    }
}

/// Cursor-based page request. `after` is the id of the last entry of the
/// previous page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPage {
    pub sort: SortKey,
    pub descending: bool,
    pub after: Option<TransactionId>,
    pub limit: usize,
}

impl Default for TransactionPage {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            descending: false,
            after: None,
            limit: 50,
        }
    }
}

impl TransactionPage {
    /// Sorts `transactions` and cuts the requested page out of them.
    pub fn apply(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        transactions.sort_by(|a, b| {
            let ord = self.sort.compare(a, b);
            if self.descending { ord.reverse() } else { ord }
        });
        let start = match self.after {
            Some(cursor) => transactions
                .iter()
                .position(|tx| tx.id == cursor)
                .map_or(transactions.len(), |pos| pos + 1),
            None => 0,
        };
        transactions.into_iter().skip(start).take(self.limit).collect()
    }
}

/// Persistence the engine depends on.
///
/// Loads hand out independent copies. `commit` must apply the whole batch
/// atomically, and must refuse it with [`StoreError::ConcurrentModification`]
/// when any wallet's [`VersionToken`] no longer matches storage.
pub trait WalletStore: Send + Sync {
    /// Persists a brand new wallet; one wallet per (customer, currency).
    fn create_wallet(&self, wallet: Wallet) -> Result<Wallet, StoreError>;

    fn load_wallet(&self, id: WalletId) -> Result<Wallet, StoreError>;

    fn load_wallet_by_customer_and_currency(
        &self,
        customer_id: &str,
        currency_code: &str,
    ) -> Result<Wallet, StoreError>;

    fn load_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError>;

    fn list_transactions(
        &self,
        wallet_id: WalletId,
        page: &TransactionPage,
    ) -> Result<Vec<Transaction>, StoreError>;

    fn commit(&self, batch: CommitBatch<'_>) -> Result<(), StoreError>;
}
