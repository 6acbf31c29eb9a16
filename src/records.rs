use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wallet::{WalletId, WalletState};

/// Funds placed under (or released from) a lien.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LienRecord {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub reference_id: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when the record describes a release.
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Freeze,
    Unfreeze,
    Close,
    Reopen,
}

/// Audit trail of a wallet state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRecord {
    pub id: Uuid,
    pub wallet_id: WalletId,
    pub action: StateAction,
    pub reason: String,
    pub initiated_by: String,
    pub previous_state: WalletState,
    pub new_state: WalletState,
    pub created_at: DateTime<Utc>,
}

/// Records committed next to wallets and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuxRecord {
    Lien(LienRecord),
    StateChange(StateChangeRecord),
}

impl AuxRecord {
    pub fn wallet_id(&self) -> WalletId {
        match self {
            AuxRecord::Lien(record) => record.wallet_id,
            AuxRecord::StateChange(record) => record.wallet_id,
        }
    }
}
