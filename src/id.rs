use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Source of identifiers for wallets, ledger entries, idempotency keys and
/// aux records.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// Random (v4) ids, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Monotonic ids `00000000-0000-0000-0000-000000000001`, `...02`, ...
///
/// Handy in tests where ids end up in assertions.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first.saturating_sub(1)),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u128(u128::from(n))
    }
}
