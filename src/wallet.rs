use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::VersionToken;

pub type WalletId = Uuid;

/// Who froze a wallet, why, and when. Only exists while the wallet is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeInfo {
    pub reason: String,
    pub initiated_by: String,
    pub frozen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletState {
    Active,
    /// Outflow is blocked, inflow is still accepted.
    Frozen(FreezeInfo),
    /// Terminal until reopened. Only reachable with both balances at zero.
    Closed,
}

impl WalletState {
    pub fn name(&self) -> &'static str {
        match self {
            WalletState::Active => "active",
            WalletState::Frozen(_) => "frozen",
            WalletState::Closed => "closed",
        }
    }
}

impl fmt::Display for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet is closed")]
    WalletClosed,
    #[error("Wallet is frozen, outgoing operations are not allowed")]
    WalletFrozen,
    #[error("Wallet is already closed")]
    WalletAlreadyClosed,
    #[error("Wallet is already frozen")]
    WalletAlreadyFrozen,
    #[error("Wallet is not closed")]
    WalletNotClosed,
    #[error("Wallet is not frozen")]
    WalletNotFrozen,
    #[error("Wallet cannot be closed while holding {available} available and {lien} under lien")]
    WalletNotEmpty { available: Decimal, lien: Decimal },
    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("Fee must not be negative, got {0}")]
    InvalidFee(Decimal),
    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },
    #[error("Insufficient lien: {lien} under lien, {required} required")]
    InsufficientLien { lien: Decimal, required: Decimal },
}

/// Net amount a credit adds to the balance.
///
/// A fee larger than the credited amount is waived rather than pushing the
/// balance down, so the full `amount` lands in the wallet.
pub fn credited_amount(amount: Decimal, fee: Decimal) -> Decimal {
    let net = amount.saturating_sub(fee);
    if net < Decimal::ZERO { amount } else { net }
}

/// Recorded totals may be zero when a credit fee eats the whole amount.
fn validate_total(total: Decimal) -> Result<(), WalletError> {
    if total < Decimal::ZERO {
        return Err(WalletError::InvalidAmount(total));
    }
    Ok(())
}

fn validate_amount(amount: Decimal) -> Result<(), WalletError> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::InvalidAmount(amount));
    }
    Ok(())
}

fn validate_amount_and_fee(amount: Decimal, fee: Decimal) -> Result<(), WalletError> {
    validate_amount(amount)?;
    if fee < Decimal::ZERO {
        return Err(WalletError::InvalidFee(fee));
    }
    Ok(())
}

/// Balance holder for one customer in one currency.
///
/// Balances are only reachable through the validated primitives below, so
/// neither `available` nor `lien` can go negative. Callers must hold
/// exclusive access to the value while mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub customer_id: String,
    pub currency_code: String,
    available: Decimal,
    lien: Decimal,
    state: WalletState,
    version: VersionToken,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(
        id: WalletId,
        customer_id: impl Into<String>,
        currency_code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer_id: customer_id.into(),
            currency_code: currency_code.into(),
            available: Decimal::ZERO,
            lien: Decimal::ZERO,
            state: WalletState::Active,
            version: VersionToken::fresh(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available(&self) -> Decimal {
        self.available
    }

    pub fn lien_balance(&self) -> Decimal {
        self.lien
    }

    pub fn total_balance(&self) -> Decimal {
        self.available + self.lien
    }

    pub fn state(&self) -> &WalletState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, WalletState::Closed)
    }

    pub fn is_frozen(&self) -> bool {
        matches!(self.state, WalletState::Frozen(_))
    }

    /// Token the wallet was loaded with; storage refuses writes when it is stale.
    pub fn version(&self) -> VersionToken {
        self.version
    }

    /// Stamps the token assigned by storage after a successful write.
    pub fn set_version(&mut self, version: VersionToken) {
        self.version = version;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn can_be_debited(&self) -> Result<(), WalletError> {
        match self.state {
            WalletState::Active => Ok(()),
            WalletState::Frozen(_) => Err(WalletError::WalletFrozen),
            WalletState::Closed => Err(WalletError::WalletClosed),
        }
    }

    pub fn can_be_credited(&self) -> Result<(), WalletError> {
        match self.state {
            WalletState::Closed => Err(WalletError::WalletClosed),
            _ => Ok(()),
        }
    }

    /// Available balance after taking `amount + fee`.
    fn balance_after_debit(&self, amount: Decimal, fee: Decimal) -> Result<Decimal, WalletError> {
        let required = amount
            .checked_add(fee)
            .ok_or(WalletError::InvalidAmount(amount))?;
        self.balance_after_withdrawing(required)
    }

    fn balance_after_withdrawing(&self, required: Decimal) -> Result<Decimal, WalletError> {
        if self.available < required {
            return Err(WalletError::InsufficientFunds {
                available: self.available,
                required,
            });
        }
        Ok(self.available - required)
    }

    /// Available balance after adding `net`. The total balance has to stay
    /// representable too, so `total_balance` never overflows.
    fn balance_after_deposit(&self, net: Decimal) -> Result<Decimal, WalletError> {
        let available = self.available.checked_add(net);
        available
            .and_then(|available| available.checked_add(self.lien))
            .and(available)
            .ok_or(WalletError::InvalidAmount(net))
    }

    /// Checks everything [`Wallet::debit`] checks without touching the balance.
    pub fn check_debit(&self, amount: Decimal, fee: Decimal) -> Result<(), WalletError> {
        self.can_be_debited()?;
        validate_amount_and_fee(amount, fee)?;
        self.balance_after_debit(amount, fee).map(drop)
    }

    /// Checks everything [`Wallet::credit`] checks without touching the balance.
    pub fn check_credit(&self, amount: Decimal, fee: Decimal) -> Result<(), WalletError> {
        self.can_be_credited()?;
        validate_amount_and_fee(amount, fee)?;
        self.balance_after_deposit(credited_amount(amount, fee)).map(drop)
    }

    /// Removes `amount + fee` from the available balance.
    pub fn debit(&mut self, amount: Decimal, fee: Decimal) -> Result<(), WalletError> {
        self.can_be_debited()?;
        validate_amount_and_fee(amount, fee)?;
        self.available = self.balance_after_debit(amount, fee)?;
        self.touch();
        Ok(())
    }

    /// Adds `amount - fee` to the available balance, see [`credited_amount`].
    pub fn credit(&mut self, amount: Decimal, fee: Decimal) -> Result<(), WalletError> {
        self.can_be_credited()?;
        validate_amount_and_fee(amount, fee)?;
        self.available = self.balance_after_deposit(credited_amount(amount, fee))?;
        self.touch();
        Ok(())
    }

    /// Takes back `total` credited by a pending entry that failed to
    /// settle. Freezes do not block it, the money never arrived.
    pub fn revert_credit(&mut self, total: Decimal) -> Result<(), WalletError> {
        validate_total(total)?;
        self.available = self.balance_after_withdrawing(total)?;
        self.touch();
        Ok(())
    }

    /// Gives back `total` taken by a pending entry that failed to settle.
    pub fn revert_debit(&mut self, total: Decimal) -> Result<(), WalletError> {
        self.can_be_credited()?;
        validate_total(total)?;
        self.available = self.balance_after_deposit(total)?;
        self.touch();
        Ok(())
    }

    /// Reserves `amount` of the available balance.
    pub fn lien(&mut self, amount: Decimal) -> Result<(), WalletError> {
        self.can_be_credited()?;
        validate_amount(amount)?;
        if self.available < amount {
            return Err(WalletError::InsufficientFunds {
                available: self.available,
                required: amount,
            });
        }
        self.available -= amount;
        self.lien += amount;
        self.touch();
        Ok(())
    }

    /// Releases `amount` of reserved funds back to the available balance.
    pub fn unlien(&mut self, amount: Decimal) -> Result<(), WalletError> {
        self.can_be_credited()?;
        validate_amount(amount)?;
        if self.lien < amount {
            return Err(WalletError::InsufficientLien {
                lien: self.lien,
                required: amount,
            });
        }
        self.lien -= amount;
        self.available += amount;
        self.touch();
        Ok(())
    }

    pub fn freeze(
        &mut self,
        reason: impl Into<String>,
        initiated_by: impl Into<String>,
    ) -> Result<(), WalletError> {
        match self.state {
            WalletState::Closed => Err(WalletError::WalletClosed),
            WalletState::Frozen(_) => Err(WalletError::WalletAlreadyFrozen),
            WalletState::Active => {
                self.state = WalletState::Frozen(FreezeInfo {
                    reason: reason.into(),
                    initiated_by: initiated_by.into(),
                    frozen_at: Utc::now(),
                });
                self.touch();
                Ok(())
            }
        }
    }

    pub fn unfreeze(&mut self) -> Result<(), WalletError> {
        match self.state {
            WalletState::Closed => Err(WalletError::WalletClosed),
            WalletState::Active => Err(WalletError::WalletNotFrozen),
            WalletState::Frozen(_) => {
                self.state = WalletState::Active;
                self.touch();
                Ok(())
            }
        }
    }

    /// Closes an empty wallet. A frozen wallet may be closed, its freeze
    /// metadata is dropped.
    pub fn close(&mut self) -> Result<(), WalletError> {
        if self.is_closed() {
            return Err(WalletError::WalletAlreadyClosed);
        }
        if !self.available.is_zero() || !self.lien.is_zero() {
            return Err(WalletError::WalletNotEmpty {
                available: self.available,
                lien: self.lien,
            });
        }
        self.state = WalletState::Closed;
        self.touch();
        Ok(())
    }

    pub fn reopen(&mut self) -> Result<(), WalletError> {
        if !self.is_closed() {
            return Err(WalletError::WalletNotClosed);
        }
        self.state = WalletState::Active;
        self.touch();
        Ok(())
    }
}
