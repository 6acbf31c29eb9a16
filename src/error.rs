//! Errors returned by the operation engine.
//!
//! Every entry point reports through [`OperationError`], which wraps the
//! per-concern errors:
//!
//! - [`WalletError`] for wallet state and balance violations,
//! - [`LedgerError`] for status and reversal violations,
//! - [`RateError`] for currency lookups and rate configuration,
//! - [`StoreError`] for lookups and optimistic-lock conflicts,
//!
//! plus the operation-specific preconditions defined here. Only
//! [`StoreError::ConcurrentModification`] is worth retrying.
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{ledger::LedgerError, rate::RateError, store::StoreError, wallet::WalletError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Exchange rate must be positive, got {0}")]
    InvalidExchangeRate(Decimal),
    #[error("Exchange rate {supplied} deviates too far from the reference rate {reference}")]
    ExchangeRateOutOfRange { supplied: Decimal, reference: Decimal },
    #[error("Destination amount {supplied} does not equal source amount x rate ({expected})")]
    ExchangeRateMismatch { supplied: Decimal, expected: Decimal },
    #[error("Swap requires two different currencies")]
    SameCurrencySwap,
    #[error("Swap wallets must belong to the same customer")]
    SwapOwnerMismatch,
    #[error("Source and destination wallet must differ")]
    InvalidSameOwnerTransfer,
    #[error("Currency mismatch: {source_currency} cannot pay into {destination_currency}")]
    CurrencyMismatch {
        source_currency: String,
        destination_currency: String,
    },
}

impl OperationError {
    /// `true` when reloading and running the same request again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperationError::Store(StoreError::ConcurrentModification { .. })
        )
    }
}

pub type OperationResult<T> = Result<T, OperationError>;
