use std::collections::HashSet;
use std::sync::Mutex;

use crate::data::models::CoreError;

/// Keyed try-lock: at most one in-flight operation per owner. A second
/// request for a busy owner fails immediately instead of waiting.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    busy: Mutex<HashSet<i64>>,
}

/// Releases the owner when dropped.
#[derive(Debug)]
pub struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owner_id: i64,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, owner_id: i64) -> Result<OwnerGuard<'_>, CoreError> {
        let mut busy = self.busy.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !busy.insert(owner_id) {
            log::warn!("Concurrent request for user {} rejected", owner_id);
            return Err(CoreError::Conflict(
                "Another request is still being processed. Please try again.".into(),
            ));
        }
        Ok(OwnerGuard {
            locks: self,
            owner_id,
        })
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        let mut busy = self
            .locks
            .busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        busy.remove(&self.owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_for_same_owner_conflicts() {
        let locks = OwnerLocks::new();
        let guard = locks.try_acquire(1).unwrap();
        assert!(matches!(locks.try_acquire(1), Err(CoreError::Conflict(_))));
        assert!(locks.try_acquire(2).is_ok());
        drop(guard);
        assert!(locks.try_acquire(1).is_ok());
    }
}
