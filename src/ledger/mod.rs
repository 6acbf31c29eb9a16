use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    id::IdGenerator,
    wallet::{Wallet, WalletId, credited_amount},
};

pub mod reversal;

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Deposit,
    Withdrawal,
    Transfer,
    Swap,
    Reversal,
}

impl Category {
    /// Only withdrawal debits can be reversed.
    pub fn is_reversible(self, direction: Direction) -> bool {
        matches!((self, direction), (Category::Withdrawal, Direction::Debit))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    pub fn can_transition_to(self, next: TransactionStatus) -> Result<(), LedgerError> {
        match (self, next) {
            (TransactionStatus::Pending, TransactionStatus::Completed)
            | (TransactionStatus::Pending, TransactionStatus::Failed) => Ok(()),
            (from, to) => Err(LedgerError::InvalidStatusTransition { from, to }),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Transaction status cannot change from {from} to {to}")]
    InvalidStatusTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    #[error("Transaction is already reversed")]
    AlreadyReversed,
    #[error("Reversal is not supported for {category:?} {direction:?} transactions")]
    UnsupportedReversalType {
        category: Category,
        direction: Direction,
    },
    #[error("Transaction {transaction_id} does not belong to wallet {wallet_id}")]
    InvalidTransactionObject {
        transaction_id: TransactionId,
        wallet_id: WalletId,
    },
}

/// What the caller wants recorded for a balance mutation it already applied.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub direction: Direction,
    pub amount: Decimal,
    pub fee: Decimal,
    pub category: Category,
    pub status: TransactionStatus,
    pub narration: Option<String>,
}

/// One side of a balance movement.
///
/// `balance_after` is the wallet's available balance right after the entry
/// was applied and is never recomputed. Once the status is terminal, only
/// a reversal may touch the entry again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub customer_id: String,
    pub currency_code: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
    pub balance_after: Decimal,
    pub category: Category,
    status: TransactionStatus,
    pub narration: Option<String>,
    counterparty_transaction_id: Option<TransactionId>,
    reversed: bool,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Snapshots `wallet` into a new entry. The matching wallet mutation must
/// already have been applied.
pub fn record_entry(ids: &dyn IdGenerator, wallet: &Wallet, entry: NewEntry) -> Transaction {
    let NewEntry {
        direction,
        amount,
        fee,
        category,
        status,
        narration,
    } = entry;
    let (fee, total) = match direction {
        // the debit already succeeded, so the sum is representable
        Direction::Debit => (fee, amount.saturating_add(fee)),
        Direction::Credit => {
            let total = credited_amount(amount, fee);
            // a waived fee is not collected, so it is not recorded either
            if total == amount { (Decimal::ZERO, total) } else { (fee, total) }
        }
    };
    let now = Utc::now();
    Transaction {
        id: ids.next_id(),
        wallet_id: wallet.id,
        customer_id: wallet.customer_id.clone(),
        currency_code: wallet.currency_code.clone(),
        direction,
        amount,
        fee,
        total,
        balance_after: wallet.available(),
        category,
        status,
        narration,
        counterparty_transaction_id: None,
        reversed: false,
        idempotency_key: ids.next_id().simple().to_string(),
        created_at: now,
        updated_at: now,
    }
}

/// Cross-links the two halves of a double-entry pair.
pub fn link_pair(first: &mut Transaction, second: &mut Transaction) {
    first.counterparty_transaction_id = Some(second.id);
    second.counterparty_transaction_id = Some(first.id);
}

impl Transaction {
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn counterparty_transaction_id(&self) -> Option<TransactionId> {
        self.counterparty_transaction_id
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn update_status(&mut self, next: TransactionStatus) -> Result<(), LedgerError> {
        self.status.can_transition_to(next)?;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Checks that this entry can be reversed against `wallet_id`.
    pub fn check_reversible(&self, wallet_id: WalletId) -> Result<(), LedgerError> {
        if self.wallet_id != wallet_id {
            return Err(LedgerError::InvalidTransactionObject {
                transaction_id: self.id,
                wallet_id,
            });
        }
        if self.reversed {
            return Err(LedgerError::AlreadyReversed);
        }
        if !self.category.is_reversible(self.direction) {
            return Err(LedgerError::UnsupportedReversalType {
                category: self.category,
                direction: self.direction,
            });
        }
        Ok(())
    }

    /// Marks the entry as reversed. It no longer represents settled value,
    /// so the status becomes `Failed` whatever it was before.
    fn mark_reversed(&mut self) {
        self.reversed = true;
        self.status = TransactionStatus::Failed;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use crate::id::SequentialIds;

    use super::*;

    fn entry(direction: Direction, amount: Decimal, fee: Decimal) -> NewEntry {
        NewEntry {
            direction,
            amount,
            fee,
            category: Category::Deposit,
            status: TransactionStatus::Completed,
            narration: None,
        }
    }

    #[test]
    fn debit_entry_snapshots_balance_after_mutation() {
        let ids = SequentialIds::starting_at(10);
        let mut wallet = Wallet::new(Uuid::from_u128(1), "cus_1", "USD");
        wallet.credit(dec!(100), dec!(0)).unwrap();
        wallet.debit(dec!(30), dec!(0)).unwrap();

        let tx = record_entry(&ids, &wallet, entry(Direction::Debit, dec!(30), dec!(0)));
        assert_eq!(tx.id, Uuid::from_u128(10));
        assert_eq!(tx.balance_after, dec!(70));
        assert_eq!(tx.total, dec!(30));
        assert_eq!(tx.wallet_id, wallet.id);
        assert_eq!(tx.customer_id, "cus_1");
        assert_eq!(tx.currency_code, "USD");
        assert!(!tx.is_reversed());
        assert!(tx.counterparty_transaction_id().is_none());
        assert_ne!(tx.idempotency_key, tx.id.simple().to_string());

        // later mutations do not move the snapshot
        wallet.debit(dec!(10), dec!(0)).unwrap();
        assert_eq!(tx.balance_after, dec!(70));
    }

    #[test]
    fn totals_follow_direction() {
        let ids = SequentialIds::default();
        let wallet = Wallet::new(Uuid::from_u128(1), "cus_1", "USD");

        let debit = record_entry(&ids, &wallet, entry(Direction::Debit, dec!(100), dec!(5)));
        assert_eq!(debit.total, dec!(105));
        assert_eq!(debit.fee, dec!(5));

        let credit = record_entry(&ids, &wallet, entry(Direction::Credit, dec!(100), dec!(5)));
        assert_eq!(credit.total, dec!(95));
        assert_eq!(credit.fee, dec!(5));

        let waived = record_entry(&ids, &wallet, entry(Direction::Credit, dec!(10), dec!(15)));
        assert_eq!(waived.total, dec!(10));
        assert_eq!(waived.fee, dec!(0));
    }

    #[test]
    fn link_pair_points_both_ways() {
        let ids = SequentialIds::default();
        let wallet = Wallet::new(Uuid::from_u128(1), "cus_1", "USD");
        let mut a = record_entry(&ids, &wallet, entry(Direction::Debit, dec!(1), dec!(0)));
        let mut b = record_entry(&ids, &wallet, entry(Direction::Credit, dec!(1), dec!(0)));
        link_pair(&mut a, &mut b);
        assert_eq!(a.counterparty_transaction_id(), Some(b.id));
        assert_eq!(b.counterparty_transaction_id(), Some(a.id));
    }

    #[test]
    fn status_state_machine() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Completed).is_ok());
        assert!(Pending.can_transition_to(Failed).is_ok());
        for from in [Completed, Failed] {
            assert!(from.is_terminal());
            for to in [Pending, Completed, Failed] {
                assert_eq!(
                    from.can_transition_to(to).unwrap_err(),
                    LedgerError::InvalidStatusTransition { from, to }
                );
            }
        }
        assert!(Pending.can_transition_to(Pending).is_err());
    }

    #[test]
    fn update_status_succeeds_once() {
        let ids = SequentialIds::default();
        let wallet = Wallet::new(Uuid::from_u128(1), "cus_1", "USD");
        let mut tx = record_entry(
            &ids,
            &wallet,
            NewEntry {
                status: TransactionStatus::Pending,
                ..entry(Direction::Credit, dec!(1), dec!(0))
            },
        );
        tx.update_status(TransactionStatus::Completed).unwrap();
        assert_eq!(tx.status(), TransactionStatus::Completed);

        let err = tx.update_status(TransactionStatus::Failed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transaction status cannot change from Completed to Failed"
        );
        assert_eq!(tx.status(), TransactionStatus::Completed);
    }
}
