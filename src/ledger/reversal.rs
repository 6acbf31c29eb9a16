use rust_decimal::Decimal;
use serde::Serialize;

use crate::{error::OperationError, id::IdGenerator, wallet::Wallet};

use super::{Category, Direction, NewEntry, Transaction, TransactionStatus, link_pair, record_entry};

/// Result of reversing a withdrawal, ready to be committed as one unit.
#[derive(Debug, Clone, Serialize)]
pub struct Reversal {
    pub wallet: Wallet,
    pub original: Transaction,
    pub reversal: Transaction,
}

/// Gives back everything a withdrawal took, `amount + fee`, and records it as
/// a completed credit linked to the original.
///
/// Checks, in order: the entry belongs to `wallet`, it is not reversed yet,
/// and it is a withdrawal debit.
pub fn reverse(
    ids: &dyn IdGenerator,
    mut original: Transaction,
    mut wallet: Wallet,
) -> Result<Reversal, OperationError> {
    original.check_reversible(wallet.id)?;

    let restored = original.total;
    wallet.credit(restored, Decimal::ZERO)?;

    let mut reversal = record_entry(
        ids,
        &wallet,
        NewEntry {
            direction: Direction::Credit,
            amount: restored,
            fee: Decimal::ZERO,
            category: Category::Reversal,
            status: TransactionStatus::Completed,
            narration: Some(format!("Reversal of {}", original.id)),
        },
    );
    original.mark_reversed();
    link_pair(&mut original, &mut reversal);

    Ok(Reversal {
        wallet,
        original,
        reversal,
    })
}
