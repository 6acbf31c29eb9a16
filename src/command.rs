use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    error::{OperationError, OperationResult},
    ledger::{TransactionId, TransactionStatus},
    wallet::WalletId,
};

/// Money in. Status is `Pending` for provider-settled deposits and
/// `Completed` for internal credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRequest {
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub status: TransactionStatus,
    pub narration: Option<String>,
}

/// Money out, recorded as a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitRequest {
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub status: TransactionStatus,
    pub narration: Option<String>,
}

/// `amount` leaves the source together with `fee`; the destination receives
/// `amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_wallet_id: WalletId,
    pub destination_wallet_id: WalletId,
    pub amount: Decimal,
    pub fee: Decimal,
    pub narration: Option<String>,
}

impl TransferRequest {
    pub fn validate(&self) -> OperationResult<()> {
        if self.source_wallet_id == self.destination_wallet_id {
            return Err(OperationError::InvalidSameOwnerTransfer);
        }
        Ok(())
    }
}

/// Currency conversion between two wallets of one customer.
///
/// The caller supplies pre-rounded figures: `destination_amount` has to be
/// exactly `source_amount * exchange_rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub source_wallet_id: WalletId,
    pub destination_wallet_id: WalletId,
    pub source_amount: Decimal,
    pub destination_amount: Decimal,
    pub exchange_rate: Decimal,
    pub fee: Decimal,
    pub narration: Option<String>,
}

impl SwapRequest {
    /// Checks the figures are consistent, independent of any wallet.
    pub fn validate(&self) -> OperationResult<()> {
        if self.source_wallet_id == self.destination_wallet_id {
            return Err(OperationError::SameCurrencySwap);
        }
        if self.exchange_rate <= Decimal::ZERO {
            return Err(OperationError::InvalidExchangeRate(self.exchange_rate));
        }
        let expected = self
            .source_amount
            .checked_mul(self.exchange_rate)
            .ok_or(OperationError::InvalidExchangeRate(self.exchange_rate))?;
        if self.destination_amount != expected {
            return Err(OperationError::ExchangeRateMismatch {
                supplied: self.destination_amount,
                expected,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LienRequest {
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub reference_id: String,
    pub description: Option<String>,
}

/// Freeze, unfreeze, close and reopen all carry the same audit data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRequest {
    pub wallet_id: WalletId,
    pub reason: String,
    pub initiated_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseRequest {
    pub transaction_id: TransactionId,
}

/// Any engine operation, for callers that dispatch dynamically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Credit(CreditRequest),
    Debit(DebitRequest),
    Transfer(TransferRequest),
    Swap(SwapRequest),
    Lien(LienRequest),
    Unlien(LienRequest),
    Freeze(StateChangeRequest),
    Unfreeze(StateChangeRequest),
    Close(StateChangeRequest),
    Reopen(StateChangeRequest),
    Reverse(ReverseRequest),
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;

    fn swap(source_amount: Decimal, rate: Decimal, destination_amount: Decimal) -> SwapRequest {
        SwapRequest {
            source_wallet_id: Uuid::from_u128(1),
            destination_wallet_id: Uuid::from_u128(2),
            source_amount,
            destination_amount,
            exchange_rate: rate,
            fee: dec!(1),
            narration: None,
        }
    }

    #[test]
    fn swap_amounts_must_match_exactly() {
        swap(dec!(50), dec!(0.9), dec!(45.0)).validate().unwrap();
        swap(dec!(50), dec!(0.9), dec!(45)).validate().unwrap();

        let err = swap(dec!(50), dec!(0.9), dec!(45.01)).validate().unwrap_err();
        assert_eq!(
            err,
            OperationError::ExchangeRateMismatch {
                supplied: dec!(45.01),
                expected: dec!(45.0)
            }
        );
        // no rounding tolerance
        let err = swap(dec!(10), dec!(0.333), dec!(3.33)).validate().unwrap_err();
        assert!(matches!(err, OperationError::ExchangeRateMismatch { .. }));
    }

    #[test]
    fn swap_rate_must_be_positive() {
        let err = swap(dec!(50), dec!(0), dec!(0)).validate().unwrap_err();
        assert_eq!(err, OperationError::InvalidExchangeRate(dec!(0)));
        let err = swap(dec!(50), dec!(-1), dec!(-50)).validate().unwrap_err();
        assert_eq!(err, OperationError::InvalidExchangeRate(dec!(-1)));
    }

    #[test]
    fn same_wallet_is_rejected() {
        let mut request = swap(dec!(1), dec!(1), dec!(1));
        request.destination_wallet_id = request.source_wallet_id;
        assert_eq!(request.validate().unwrap_err(), OperationError::SameCurrencySwap);

        let transfer = TransferRequest {
            source_wallet_id: Uuid::from_u128(3),
            destination_wallet_id: Uuid::from_u128(3),
            amount: dec!(1),
            fee: dec!(0),
            narration: None,
        };
        assert_eq!(
            transfer.validate().unwrap_err(),
            OperationError::InvalidSameOwnerTransfer
        );
    }
}
