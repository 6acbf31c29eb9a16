use std::{collections::HashMap, sync::Arc};

use parking_lot::{Mutex, RawMutex, lock_api::ArcMutexGuard};

use crate::wallet::WalletId;

/// One exclusive lock per wallet id, created on first use and dropped again
/// once no guard holds or waits for it.
#[derive(Debug, Default)]
pub struct WalletLocks {
    slots: Mutex<HashMap<WalletId, Arc<Mutex<()>>>>,
}

/// Holds one or two wallet locks until dropped.
#[must_use = "the wallets are unlocked as soon as the guard is dropped"]
pub struct WalletGuard<'a> {
    locks: &'a WalletLocks,
    held: Vec<(WalletId, ArcMutexGuard<RawMutex, ()>)>,
}

impl Drop for WalletGuard<'_> {
    fn drop(&mut self) {
        let ids: Vec<WalletId> = self.held.iter().map(|(id, _)| *id).collect();
        self.held.clear();
        // clones of a slot are only taken under this lock, so a count of one
        // means nobody holds or waits for it
        let mut slots = self.locks.slots.lock();
        for id in ids {
            if slots.get(&id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(&id);
            }
        }
    }
}

impl WalletLocks {
    fn slot(&self, id: WalletId) -> Arc<Mutex<()>> {
        self.slots.lock().entry(id).or_default().clone()
    }

    pub fn lock(&self, id: WalletId) -> WalletGuard<'_> {
        WalletGuard {
            locks: self,
            held: vec![(id, self.slot(id).lock_arc())],
        }
    }

    /// Locks both wallets, always lowest id first, whatever the argument
    /// order. Two opposite transfers between the same pair can therefore
    /// never wait on each other in a cycle.
    pub fn lock_pair(&self, a: WalletId, b: WalletId) -> WalletGuard<'_> {
        if a == b {
            return self.lock(a);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.slot(first).lock_arc();
        let second_guard = self.slot(second).lock_arc();
        WalletGuard {
            locks: self,
            held: vec![(first, first_guard), (second, second_guard)],
        }
    }

    #[cfg(test)]
    fn is_locked(&self, id: WalletId) -> bool {
        self.slots.lock().get(&id).is_some_and(|slot| slot.is_locked())
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use uuid::Uuid;

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let locks = WalletLocks::default();
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        {
            let _guard = locks.lock_pair(b, a);
            assert!(locks.is_locked(a));
            assert!(locks.is_locked(b));
        }
        assert!(!locks.is_locked(a));
        assert!(!locks.is_locked(b));

        let _guard = locks.lock_pair(a, a);
        assert!(locks.is_locked(a));
    }

    #[test]
    fn opposite_pairs_do_not_deadlock() {
        let locks = WalletLocks::default();
        let (a, b) = (Uuid::from_u128(1), Uuid::from_u128(2));
        let barrier = Barrier::new(2);
        let counter = Mutex::new(0u32);

        thread::scope(|s| {
            for (x, y) in [(a, b), (b, a)] {
                let locks = &locks;
                let barrier = &barrier;
                let counter = &counter;
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..1_000 {
                        let _guard = locks.lock_pair(x, y);
                        *counter.lock() += 1;
                    }
                });
            }
        });
        assert_eq!(*counter.lock(), 2_000);
        assert_eq!(locks.slot_count(), 0);
    }

    #[test]
    fn slots_are_released_with_the_last_guard() {
        let locks = WalletLocks::default();
        let ids: Vec<_> = (1..=100).map(Uuid::from_u128).collect();
        for pair in ids.windows(2) {
            let _guard = locks.lock_pair(pair[1], pair[0]);
            assert_eq!(locks.slot_count(), 2);
        }
        assert_eq!(locks.slot_count(), 0);

        // a waiter keeps the slot alive after the holder lets go
        let a = ids[0];
        let guard = locks.lock(a);
        thread::scope(|s| {
            let waiter = s.spawn(|| {
                let _guard = locks.lock(a);
                locks.slot_count()
            });
            while Arc::strong_count(&locks.slots.lock()[&a]) < 3 {
                thread::yield_now();
            }
            drop(guard);
            assert_eq!(waiter.join().unwrap(), 1);
        });
        assert_eq!(locks.slot_count(), 0);
    }
}
