//! Error types for the atomic store (C5, §4.5, §7).

use thiserror::Error;

/// Failures from [`crate::MapStore::commit`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The on-disk version advanced past `version` between the session
    /// accepting `transfer_init` and the commit running (§4.5 step 1).
    #[error("version race lost: {version} is not newer than installed version {installed}")]
    VersionRaceLost {
        /// Version this commit was attempting to install.
        version: u64,
        /// Version currently on disk.
        installed: u64,
    },

    /// The filesystem rejected a write for lack of space.
    #[error("insufficient storage: {0}")]
    InsufficientStorage(String),

    /// Any other I/O failure (permission, missing directory, ...).
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Stable wire error code (§7).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::VersionRaceLost { .. } => "VersionRaceLost",
            Self::InsufficientStorage(_) => "InsufficientStorage",
            Self::Io(_) => "SystemError",
        }
    }

    /// Every store failure is terminal for the session; the backup/active
    /// file is left untouched (§7 "restore backup untouched").
    #[must_use]
    pub fn is_transient(&self) -> bool {
        false
    }
}

/// `ENOSPC` on Linux; other platforms fall back to the generic `Io` variant.
const ENOSPC: i32 = 28;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(ENOSPC) {
            return Self::InsufficientStorage(err.to_string());
        }
        Self::Io(err.to_string())
    }
}
