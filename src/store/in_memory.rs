use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use crate::{
    ledger::{Transaction, TransactionId},
    records::AuxRecord,
    wallet::{Wallet, WalletId},
};

use super::{CommitBatch, StoreError, TransactionPage, VersionToken, WalletStore};

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<WalletId, Wallet>,
    owners: HashMap<(String, String), WalletId>,
    transactions: HashMap<TransactionId, Transaction>,
    records: Vec<AuxRecord>,
}

/// Process-local [`WalletStore`]. Every commit runs under one write lock,
/// which is what makes it atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wallets(&self) -> Vec<Wallet> {
        self.tables.read().wallets.values().cloned().collect()
    }

    pub fn records_for(&self, wallet_id: WalletId) -> Vec<AuxRecord> {
        self.tables
            .read()
            .records
            .iter()
            .filter(|record| record.wallet_id() == wallet_id)
            .cloned()
            .collect()
    }

    pub fn transaction_count(&self) -> usize {
        self.tables.read().transactions.len()
    }
}

impl WalletStore for InMemoryStore {
    fn create_wallet(&self, mut wallet: Wallet) -> Result<Wallet, StoreError> {
        let mut tables = self.tables.write();
        let owner = (wallet.customer_id.clone(), wallet.currency_code.clone());
        if tables.owners.contains_key(&owner) {
            return Err(StoreError::WalletAlreadyExists {
                customer_id: owner.0,
                currency_code: owner.1,
            });
        }
        if tables.wallets.contains_key(&wallet.id) {
            return Err(StoreError::Storage(format!("duplicate wallet id {}", wallet.id)));
        }
        wallet.set_version(VersionToken::fresh());
        tables.owners.insert(owner, wallet.id);
        tables.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    fn load_wallet(&self, id: WalletId) -> Result<Wallet, StoreError> {
        self.tables
            .read()
            .wallets
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::wallet_not_found(id))
    }

    fn load_wallet_by_customer_and_currency(
        &self,
        customer_id: &str,
        currency_code: &str,
    ) -> Result<Wallet, StoreError> {
        let tables = self.tables.read();
        tables
            .owners
            .get(&(customer_id.to_string(), currency_code.to_string()))
            .and_then(|id| tables.wallets.get(id))
            .cloned()
            .ok_or_else(|| StoreError::WalletNotFound(format!("{customer_id}/{currency_code}")))
    }

    fn load_transaction(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.tables
            .read()
            .transactions
            .get(&id)
            .cloned()
            .ok_or(StoreError::TransactionNotFound(id))
    }

    fn list_transactions(
        &self,
        wallet_id: WalletId,
        page: &TransactionPage,
    ) -> Result<Vec<Transaction>, StoreError> {
        let tables = self.tables.read();
        if !tables.wallets.contains_key(&wallet_id) {
            return Err(StoreError::wallet_not_found(wallet_id));
        }
        let history = tables
            .transactions
            .values()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect();
        Ok(page.apply(history))
    }

    fn commit(&self, batch: CommitBatch<'_>) -> Result<(), StoreError> {
        let CommitBatch {
            wallets,
            transactions,
            records,
        } = batch;
        let mut tables = self.tables.write();

        // validate everything first, nothing is written on failure
        let mut seen = HashSet::new();
        for wallet in &wallets {
            if !seen.insert(wallet.id) {
                return Err(StoreError::Storage(format!(
                    "wallet {} appears twice in one commit",
                    wallet.id
                )));
            }
            let stored = tables
                .wallets
                .get(&wallet.id)
                .ok_or_else(|| StoreError::wallet_not_found(wallet.id))?;
            if stored.version() != wallet.version() {
                return Err(StoreError::ConcurrentModification {
                    wallet_id: wallet.id,
                });
            }
        }

        for wallet in wallets {
            wallet.set_version(VersionToken::fresh());
            tables.wallets.insert(wallet.id, wallet.clone());
        }
        for transaction in transactions {
            tables.transactions.insert(transaction.id, transaction);
        }
        tables.records.extend(records);
        Ok(())
    }
}
