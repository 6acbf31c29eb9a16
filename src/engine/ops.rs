//! Operations as pure functions over owned wallet copies.
//!
//! Each function validates everything up front, then mutates its copies and
//! records the ledger entries. On error the copies are simply dropped, so a
//! failed operation never leaves a half-applied wallet behind.
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    command::{
        CreditRequest, DebitRequest, LienRequest, StateChangeRequest, SwapRequest, TransferRequest,
    },
    error::{OperationError, OperationResult},
    id::IdGenerator,
    ledger::{
        Category, Direction, LedgerError, NewEntry, Transaction, TransactionStatus, link_pair,
        record_entry,
    },
    records::{LienRecord, StateAction, StateChangeRecord},
    wallet::Wallet,
};

/// A single-wallet movement.
#[derive(Debug, Clone, Serialize)]
pub struct Posting {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

/// Both sides of a transfer or swap.
#[derive(Debug, Clone, Serialize)]
pub struct PairedPosting {
    pub source: Wallet,
    pub destination: Wallet,
    pub debit: Transaction,
    pub credit: Transaction,
}

#[derive(Debug, Clone, Serialize)]
pub struct LienPosting {
    pub wallet: Wallet,
    pub record: LienRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub wallet: Wallet,
    pub record: StateChangeRecord,
}

pub fn credit(
    ids: &dyn IdGenerator,
    mut wallet: Wallet,
    request: &CreditRequest,
) -> OperationResult<Posting> {
    wallet.credit(request.amount, request.fee)?;
    let transaction = record_entry(
        ids,
        &wallet,
        NewEntry {
            direction: Direction::Credit,
            amount: request.amount,
            fee: request.fee,
            category: Category::Deposit,
            status: request.status,
            narration: request.narration.clone(),
        },
    );
    Ok(Posting { wallet, transaction })
}

pub fn debit(
    ids: &dyn IdGenerator,
    mut wallet: Wallet,
    request: &DebitRequest,
) -> OperationResult<Posting> {
    wallet.debit(request.amount, request.fee)?;
    let transaction = record_entry(
        ids,
        &wallet,
        NewEntry {
            direction: Direction::Debit,
            amount: request.amount,
            fee: request.fee,
            category: Category::Withdrawal,
            status: request.status,
            narration: request.narration.clone(),
        },
    );
    Ok(Posting { wallet, transaction })
}

/// Debits `amount + fee` from one wallet and credits `amount` to the other
/// and records both sides as one linked pair.
fn move_between(
    ids: &dyn IdGenerator,
    mut source: Wallet,
    mut destination: Wallet,
    (debit_amount, fee): (Decimal, Decimal),
    credit_amount: Decimal,
    category: Category,
    narration: Option<String>,
) -> OperationResult<PairedPosting> {
    source.check_debit(debit_amount, fee)?;
    destination.check_credit(credit_amount, Decimal::ZERO)?;

    source.debit(debit_amount, fee)?;
    destination.credit(credit_amount, Decimal::ZERO)?;

    let mut debit = record_entry(
        ids,
        &source,
        NewEntry {
            direction: Direction::Debit,
            amount: debit_amount,
            fee,
            category,
            status: TransactionStatus::Completed,
            narration: narration.clone(),
        },
    );
    let mut credit = record_entry(
        ids,
        &destination,
        NewEntry {
            direction: Direction::Credit,
            amount: credit_amount,
            fee: Decimal::ZERO,
            category,
            status: TransactionStatus::Completed,
            narration,
        },
    );
    link_pair(&mut debit, &mut credit);

    Ok(PairedPosting {
        source,
        destination,
        debit,
        credit,
    })
}

pub fn transfer(
    ids: &dyn IdGenerator,
    source: Wallet,
    destination: Wallet,
    request: &TransferRequest,
) -> OperationResult<PairedPosting> {
    if source.id == destination.id {
        return Err(OperationError::InvalidSameOwnerTransfer);
    }
    if source.currency_code != destination.currency_code {
        return Err(OperationError::CurrencyMismatch {
            source_currency: source.currency_code,
            destination_currency: destination.currency_code,
        });
    }
    move_between(
        ids,
        source,
        destination,
        (request.amount, request.fee),
        request.amount,
        Category::Transfer,
        request.narration.clone(),
    )
}

/// Converts between two wallets of the same customer. The source pays
/// `source_amount + fee`, the destination receives `destination_amount`.
pub fn swap(
    ids: &dyn IdGenerator,
    source: Wallet,
    destination: Wallet,
    request: &SwapRequest,
) -> OperationResult<PairedPosting> {
    if source.currency_code == destination.currency_code {
        return Err(OperationError::SameCurrencySwap);
    }
    if source.customer_id != destination.customer_id {
        return Err(OperationError::SwapOwnerMismatch);
    }
    request.validate()?;
    move_between(
        ids,
        source,
        destination,
        (request.source_amount, request.fee),
        request.destination_amount,
        Category::Swap,
        request.narration.clone(),
    )
}

/// Moves a pending entry to `next`. An entry that fails to settle gives its
/// effect on the balance back: a failed credit takes the money out again,
/// a failed debit returns it.
pub fn settle(
    mut wallet: Wallet,
    mut transaction: Transaction,
    next: TransactionStatus,
) -> OperationResult<Posting> {
    if transaction.wallet_id != wallet.id {
        return Err(LedgerError::InvalidTransactionObject {
            transaction_id: transaction.id,
            wallet_id: wallet.id,
        }
        .into());
    }
    transaction.update_status(next)?;
    if next == TransactionStatus::Failed {
        match transaction.direction {
            Direction::Credit => wallet.revert_credit(transaction.total)?,
            Direction::Debit => wallet.revert_debit(transaction.total)?,
        }
    }
    Ok(Posting {
        wallet,
        transaction,
    })
}

pub fn lien(
    ids: &dyn IdGenerator,
    mut wallet: Wallet,
    request: &LienRequest,
) -> OperationResult<LienPosting> {
    wallet.lien(request.amount)?;
    let record = LienRecord {
        id: ids.next_id(),
        wallet_id: wallet.id,
        amount: request.amount,
        reference_id: request.reference_id.clone(),
        description: request.description.clone(),
        created_at: Utc::now(),
        released_at: None,
    };
    Ok(LienPosting { wallet, record })
}

pub fn unlien(
    ids: &dyn IdGenerator,
    mut wallet: Wallet,
    request: &LienRequest,
) -> OperationResult<LienPosting> {
    wallet.unlien(request.amount)?;
    let now = Utc::now();
    let record = LienRecord {
        id: ids.next_id(),
        wallet_id: wallet.id,
        amount: request.amount,
        reference_id: request.reference_id.clone(),
        description: request.description.clone(),
        created_at: now,
        released_at: Some(now),
    };
    Ok(LienPosting { wallet, record })
}

pub fn change_state(
    ids: &dyn IdGenerator,
    mut wallet: Wallet,
    action: StateAction,
    request: &StateChangeRequest,
) -> OperationResult<StateChange> {
    let previous_state = wallet.state().clone();
    match action {
        StateAction::Freeze => wallet.freeze(&request.reason, &request.initiated_by)?,
        StateAction::Unfreeze => wallet.unfreeze()?,
        StateAction::Close => wallet.close()?,
        StateAction::Reopen => wallet.reopen()?,
    }
    let record = StateChangeRecord {
        id: ids.next_id(),
        wallet_id: wallet.id,
        action,
        reason: request.reason.clone(),
        initiated_by: request.initiated_by.clone(),
        previous_state,
        new_state: wallet.state().clone(),
        created_at: Utc::now(),
    };
    Ok(StateChange { wallet, record })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::{id::SequentialIds, wallet::{WalletError, WalletState}};

    use super::*;

    fn wallet(id: u128, customer: &str, currency: &str, balance: Decimal) -> Wallet {
        let mut wallet = Wallet::new(Uuid::from_u128(id), customer, currency);
        if !balance.is_zero() {
            wallet.credit(balance, Decimal::ZERO).unwrap();
        }
        wallet
    }

    fn transfer_request(amount: Decimal, fee: Decimal) -> TransferRequest {
        TransferRequest {
            source_wallet_id: Uuid::from_u128(1),
            destination_wallet_id: Uuid::from_u128(2),
            amount,
            fee,
            narration: Some("rent".to_string()),
        }
    }

    #[test]
    fn debit_scenario() {
        let ids = SequentialIds::default();
        let request = DebitRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(30),
            fee: dec!(0),
            status: TransactionStatus::Completed,
            narration: None,
        };
        let Posting { wallet, transaction } =
            debit(&ids, wallet(1, "cus_1", "USD", dec!(100)), &request).unwrap();
        assert_eq!(wallet.available(), dec!(70));
        assert_eq!(transaction.direction, Direction::Debit);
        assert_eq!(transaction.category, Category::Withdrawal);
        assert_eq!(transaction.balance_after, dec!(70));
    }

    #[test]
    fn credit_keeps_requested_status() {
        let ids = SequentialIds::default();
        let request = CreditRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(10),
            fee: dec!(15),
            status: TransactionStatus::Pending,
            narration: None,
        };
        let Posting { wallet, transaction } =
            credit(&ids, wallet(1, "cus_1", "USD", dec!(0)), &request).unwrap();
        assert_eq!(wallet.available(), dec!(10));
        assert_eq!(transaction.total, dec!(10));
        assert_eq!(transaction.status(), TransactionStatus::Pending);
    }

    #[test]
    fn failed_settlement_undoes_the_balance_change() {
        let ids = SequentialIds::default();
        let deposit = CreditRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(100),
            fee: dec!(1),
            status: TransactionStatus::Pending,
            narration: None,
        };
        let pending = credit(&ids, wallet(1, "cus_1", "USD", dec!(20)), &deposit).unwrap();
        assert_eq!(pending.wallet.available(), dec!(119));

        let failed = settle(
            pending.wallet,
            pending.transaction,
            TransactionStatus::Failed,
        )
        .unwrap();
        assert_eq!(failed.wallet.available(), dec!(20));
        assert_eq!(failed.transaction.status(), TransactionStatus::Failed);

        let payout = DebitRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(10),
            fee: dec!(0.5),
            status: TransactionStatus::Pending,
            narration: None,
        };
        let pending = debit(&ids, failed.wallet, &payout).unwrap();
        assert_eq!(pending.wallet.available(), dec!(9.5));
        let failed = settle(
            pending.wallet,
            pending.transaction,
            TransactionStatus::Failed,
        )
        .unwrap();
        assert_eq!(failed.wallet.available(), dec!(20));
    }

    #[test]
    fn completed_settlement_keeps_the_balance() {
        let ids = SequentialIds::default();
        let deposit = CreditRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(100),
            fee: dec!(0),
            status: TransactionStatus::Pending,
            narration: None,
        };
        let pending = credit(&ids, wallet(1, "cus_1", "USD", dec!(0)), &deposit).unwrap();

        let other = wallet(2, "cus_1", "USD", dec!(0));
        let err = settle(
            other,
            pending.transaction.clone(),
            TransactionStatus::Failed,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            OperationError::Ledger(LedgerError::InvalidTransactionObject { .. })
        ));

        let done = settle(
            pending.wallet,
            pending.transaction,
            TransactionStatus::Completed,
        )
        .unwrap();
        assert_eq!(done.wallet.available(), dec!(100));

        let err = settle(done.wallet, done.transaction, TransactionStatus::Failed).unwrap_err();
        assert_eq!(
            err,
            OperationError::Ledger(LedgerError::InvalidStatusTransition {
                from: TransactionStatus::Completed,
                to: TransactionStatus::Failed
            })
        );
    }

    #[test]
    fn transfer_produces_linked_pair() {
        let ids = SequentialIds::default();
        let source = wallet(1, "cus_1", "USD", dec!(100));
        let destination = wallet(2, "cus_2", "USD", dec!(0));

        let posting = transfer(
            &ids,
            source,
            destination,
            &transfer_request(dec!(40), dec!(2)),
        )
        .unwrap();
        assert_eq!(posting.source.available(), dec!(58));
        assert_eq!(posting.destination.available(), dec!(40));
        assert_eq!(posting.debit.counterparty_transaction_id(), Some(posting.credit.id));
        assert_eq!(posting.credit.counterparty_transaction_id(), Some(posting.debit.id));
        assert_eq!(posting.debit.total, dec!(42));
        assert_eq!(posting.credit.total, dec!(40));
        // value moved plus the fee kept by the system
        assert_eq!(posting.debit.amount + posting.debit.fee, posting.credit.amount + dec!(2));
        assert_eq!(posting.debit.narration.as_deref(), Some("rent"));
    }

    #[test]
    fn transfer_preconditions() {
        let ids = SequentialIds::default();
        let request = transfer_request(dec!(10), dec!(0));

        let err = transfer(
            &ids,
            wallet(1, "a", "USD", dec!(100)),
            wallet(1, "a", "USD", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert_eq!(err, OperationError::InvalidSameOwnerTransfer);

        let err = transfer(
            &ids,
            wallet(1, "a", "USD", dec!(100)),
            wallet(2, "b", "EUR", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert_eq!(
            err,
            OperationError::CurrencyMismatch {
                source_currency: "USD".to_string(),
                destination_currency: "EUR".to_string()
            }
        );

        let err = transfer(
            &ids,
            wallet(1, "a", "USD", dec!(5)),
            wallet(2, "b", "USD", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::Wallet(WalletError::InsufficientFunds { .. })));

        let mut frozen = wallet(1, "a", "USD", dec!(100));
        frozen.freeze("fraud", "risk").unwrap();
        let err = transfer(&ids, frozen, wallet(2, "b", "USD", dec!(0)), &request).unwrap_err();
        assert_eq!(err, OperationError::Wallet(WalletError::WalletFrozen));

        let mut closed = wallet(2, "b", "USD", dec!(0));
        closed.close().unwrap();
        let err = transfer(&ids, wallet(1, "a", "USD", dec!(100)), closed, &request).unwrap_err();
        assert_eq!(err, OperationError::Wallet(WalletError::WalletClosed));
    }

    #[test]
    fn transfer_into_frozen_wallet_is_allowed() {
        let ids = SequentialIds::default();
        let mut destination = wallet(2, "b", "USD", dec!(0));
        destination.freeze("review", "ops").unwrap();
        let posting = transfer(
            &ids,
            wallet(1, "a", "USD", dec!(10)),
            destination,
            &transfer_request(dec!(10), dec!(0)),
        )
        .unwrap();
        assert_eq!(posting.destination.available(), dec!(10));
        assert!(posting.destination.is_frozen());
    }

    #[test]
    fn swap_scenario() {
        let ids = SequentialIds::default();
        let request = SwapRequest {
            source_wallet_id: Uuid::from_u128(1),
            destination_wallet_id: Uuid::from_u128(2),
            source_amount: dec!(50),
            destination_amount: dec!(45.0),
            exchange_rate: dec!(0.9),
            fee: dec!(1),
            narration: None,
        };
        let posting = swap(
            &ids,
            wallet(1, "cus_1", "USD", dec!(100)),
            wallet(2, "cus_1", "EUR", dec!(0)),
            &request,
        )
        .unwrap();
        assert_eq!(posting.source.available(), dec!(49));
        assert_eq!(posting.destination.available(), dec!(45));
        assert_eq!(posting.debit.status(), TransactionStatus::Completed);
        assert_eq!(posting.credit.status(), TransactionStatus::Completed);
        assert_eq!(posting.debit.category, Category::Swap);
        assert_eq!(posting.credit.fee, dec!(0));
        assert_eq!(posting.debit.counterparty_transaction_id(), Some(posting.credit.id));
        assert_eq!(posting.credit.counterparty_transaction_id(), Some(posting.debit.id));
    }

    #[test]
    fn swap_preconditions() {
        let ids = SequentialIds::default();
        let request = SwapRequest {
            source_wallet_id: Uuid::from_u128(1),
            destination_wallet_id: Uuid::from_u128(2),
            source_amount: dec!(50),
            destination_amount: dec!(45),
            exchange_rate: dec!(0.9),
            fee: dec!(0),
            narration: None,
        };

        let err = swap(
            &ids,
            wallet(1, "a", "USD", dec!(100)),
            wallet(2, "a", "USD", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert_eq!(err, OperationError::SameCurrencySwap);

        let err = swap(
            &ids,
            wallet(1, "a", "USD", dec!(100)),
            wallet(2, "b", "EUR", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert_eq!(err, OperationError::SwapOwnerMismatch);

        let mismatched = SwapRequest {
            destination_amount: dec!(44.99),
            ..request.clone()
        };
        let err = swap(
            &ids,
            wallet(1, "a", "USD", dec!(100)),
            wallet(2, "a", "EUR", dec!(0)),
            &mismatched,
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::ExchangeRateMismatch { .. }));

        let err = swap(
            &ids,
            wallet(1, "a", "USD", dec!(49)),
            wallet(2, "a", "EUR", dec!(0)),
            &request,
        )
        .unwrap_err();
        assert!(matches!(err, OperationError::Wallet(WalletError::InsufficientFunds { .. })));
    }

    #[test]
    fn lien_and_unlien_records() {
        let ids = SequentialIds::default();
        let request = LienRequest {
            wallet_id: Uuid::from_u128(1),
            amount: dec!(25),
            reference_id: "order-17".to_string(),
            description: Some("card hold".to_string()),
        };
        let placed = lien(&ids, wallet(1, "a", "USD", dec!(100)), &request).unwrap();
        assert_eq!(placed.wallet.available(), dec!(75));
        assert_eq!(placed.wallet.lien_balance(), dec!(25));
        assert_eq!(placed.record.reference_id, "order-17");
        assert!(placed.record.released_at.is_none());

        let released = unlien(&ids, placed.wallet, &request).unwrap();
        assert_eq!(released.wallet.available(), dec!(100));
        assert!(released.record.released_at.is_some());

        let err = unlien(&ids, released.wallet, &request).unwrap_err();
        assert!(matches!(err, OperationError::Wallet(WalletError::InsufficientLien { .. })));
    }

    #[test]
    fn state_changes_are_audited() {
        let ids = SequentialIds::default();
        let request = StateChangeRequest {
            wallet_id: Uuid::from_u128(1),
            reason: "chargeback investigation".to_string(),
            initiated_by: "risk-team".to_string(),
        };
        let frozen = change_state(
            &ids,
            wallet(1, "a", "USD", dec!(0)),
            StateAction::Freeze,
            &request,
        )
        .unwrap();
        assert_eq!(frozen.record.previous_state, WalletState::Active);
        assert!(matches!(frozen.record.new_state, WalletState::Frozen(_)));
        assert_eq!(frozen.record.action, StateAction::Freeze);

        let closed = change_state(&ids, frozen.wallet, StateAction::Close, &request).unwrap();
        assert_eq!(closed.record.new_state, WalletState::Closed);

        let err = change_state(
            &ids,
            closed.wallet.clone(),
            StateAction::Unfreeze,
            &request,
        )
        .unwrap_err();
        assert_eq!(err, OperationError::Wallet(WalletError::WalletClosed));

        let reopened = change_state(&ids, closed.wallet, StateAction::Reopen, &request).unwrap();
        assert_eq!(reopened.wallet.state(), &WalletState::Active);
    }
}
