use crate::state::snapshot::StateSnapshot;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::Arc;

/// The two views of ledger state.
///
/// `committed` is read by admission and proposal and is replaced wholesale on a
/// successful block. `delivered` is the working view; holding its lock serializes
/// block application. Work happens on a clone of it, so a failed block just drops
/// the clone.
pub struct LedgerState {
    committed: RwLock<Arc<StateSnapshot>>,
    delivered: Mutex<StateSnapshot>,
}

impl LedgerState {
    pub fn new(snapshot: StateSnapshot) -> Self {
        LedgerState {
            committed: RwLock::new(Arc::new(snapshot.clone())),
            delivered: Mutex::new(snapshot),
        }
    }

    pub fn committed(&self) -> Arc<StateSnapshot> {
        self.committed.read().clone()
    }

    pub fn lock_delivered(&self) -> MutexGuard<'_, StateSnapshot> {
        self.delivered.lock()
    }

    /// Installs `snapshot` as both the delivered and committed view.
    pub fn commit(&self, delivered: &mut MutexGuard<'_, StateSnapshot>, snapshot: StateSnapshot) {
        **delivered = snapshot.clone();
        *self.committed.write() = Arc::new(snapshot);
    }
}
