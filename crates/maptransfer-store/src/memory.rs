//! In-process store for tests, backed by `Arc<Mutex<...>>` so a cloned
//! handle observes the same state.

use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::{CommitOutcome, MapStore};

struct Installed {
    version: u64,
    bytes: Vec<u8>,
}

/// In-memory [`MapStore`] for unit and integration tests.
///
/// Holds at most one "backup" (the previously installed bytes), matching
/// the real [`crate::FsMapStore`]'s single-most-recent `backup_map`
/// pointer semantics without needing a directory.
#[derive(Clone, Default)]
pub struct MemoryMapStore {
    inner: Arc<Mutex<Option<Installed>>>,
}

impl MemoryMapStore {
    /// Build an empty store (nothing installed, `installed_version() == 0`).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store as if `version` were already installed, bypassing
    /// the commit path. Useful for setting up `VersionTooOld` /
    /// `VersionRaceLost` test scenarios.
    pub fn seed(&self, version: u64, bytes: Vec<u8>) {
        #[allow(clippy::unwrap_used)]
        let mut guard = self.inner.lock().unwrap();
        *guard = Some(Installed { version, bytes });
    }

    /// The bytes currently installed, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned (a thread panicked while
    /// holding the lock). Acceptable for test code.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn active_bytes(&self) -> Option<Vec<u8>> {
        self.inner.lock().expect("mutex poisoned").as_ref().map(|i| i.bytes.clone())
    }
}

impl MapStore for MemoryMapStore {
    #[allow(clippy::expect_used)]
    fn installed_version(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().expect("mutex poisoned").as_ref().map_or(0, |i| i.version))
    }

    #[allow(clippy::expect_used)]
    fn commit(&self, canonical_bytes: &[u8], version: u64) -> Result<CommitOutcome, StoreError> {
        let mut guard = self.inner.lock().expect("mutex poisoned");
        let installed = guard.as_ref().map_or(0, |i| i.version);
        if version <= installed {
            return Err(StoreError::VersionRaceLost { version, installed });
        }
        let backup = guard.as_ref().map(|i| format!("memory-backup-v{}", i.version));
        *guard = Some(Installed { version, bytes: canonical_bytes.to_vec() });
        Ok(CommitOutcome { backup, version })
    }
}
