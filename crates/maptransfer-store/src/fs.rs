//! Durable filesystem-backed [`MapStore`] (§4.5, §6 "Persisted layout").
//!
//! Every fallible operation is wrapped in an explicit `.map_err(...)` into
//! a [`StoreError`] variant. The atomicity unit is one file: a staging
//! write plus a single rename-over, not a set of table mutations.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::StoreError;
use crate::{CommitOutcome, MapStore};

/// Name of the small pointer file identifying the newest backup (§6
/// "a stable `backup_map` pointer").
const BACKUP_MAP_POINTER: &str = "backup_map";

/// Durable [`MapStore`] writing to a real directory (§4.5).
///
/// `Clone` is cheap: all fields are plain owned paths/integers, and every
/// method re-reads the filesystem rather than caching state, so clones
/// observe each other's commits immediately (§5 "readers always observe
/// either the old complete file or the new complete file").
#[derive(Clone)]
pub struct FsMapStore {
    active_path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl FsMapStore {
    /// Default backup retention (§6 `max_backups`).
    pub const DEFAULT_MAX_BACKUPS: usize = 10;

    /// Build a store rooted at `active_path`, with backups under
    /// `backup_dir`. Does not touch the filesystem until a method is
    /// called.
    #[must_use]
    pub fn new(active_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            active_path: active_path.into(),
            backup_dir: backup_dir.into(),
            max_backups: Self::DEFAULT_MAX_BACKUPS,
        }
    }

    /// Override the backup retention count (default
    /// [`Self::DEFAULT_MAX_BACKUPS`]).
    #[must_use]
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.active_path.file_name().map_or_else(
            || std::ffi::OsString::from("map"),
            std::ffi::OsStr::to_os_string,
        );
        name.push(".staging");
        self.active_path.with_file_name(name)
    }

    fn write_staging(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let staging = self.staging_path();
        let mut file = File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(staging)
    }

    fn rotate_backup(&self) -> Result<Option<String>, StoreError> {
        if !self.active_path.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.backup_dir)?;

        let timestamp = backup_timestamp();
        let name = format!("backup_map_{timestamp}.json");
        let backup_path = self.backup_dir.join(&name);
        fs::copy(&self.active_path, &backup_path)?;
        fs::write(self.backup_dir.join(BACKUP_MAP_POINTER), &name)?;

        evict_oldest(&self.backup_dir, self.max_backups)?;
        Ok(Some(name))
    }

    fn rename_over(&self, staging: &Path) -> Result<(), StoreError> {
        match fs::rename(staging, &self.active_path) {
            Ok(()) => Ok(()),
            // Cross-device rename isn't atomic; fall back to link + unlink
            // (§4.5 step 4 "on platforms lacking atomic rename-over").
            Err(_) => {
                fs::hard_link(staging, &self.active_path).or_else(|_| {
                    fs::copy(staging, &self.active_path).map(|_| ())
                })?;
                fs::remove_file(staging)?;
                Ok(())
            },
        }
    }
}

impl MapStore for FsMapStore {
    fn installed_version(&self) -> Result<u64, StoreError> {
        if !self.active_path.exists() {
            return Ok(0);
        }
        let bytes = fs::read(&self.active_path)?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Io(format!("active file is not valid JSON: {e}")))?;
        value
            .pointer("/metadata/version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| StoreError::Io("active file missing metadata.version".to_string()))
    }

    fn commit(&self, canonical_bytes: &[u8], version: u64) -> Result<CommitOutcome, StoreError> {
        let installed = self.installed_version()?;
        if version <= installed {
            return Err(StoreError::VersionRaceLost { version, installed });
        }

        let staging = self.write_staging(canonical_bytes)?;
        let backup = self.rotate_backup().inspect_err(|_| {
            let _ = fs::remove_file(&staging);
        })?;
        self.rename_over(&staging)?;

        tracing::info!(version, backup = ?backup, "committed map to active path");
        Ok(CommitOutcome { backup, version })
    }
}

fn backup_timestamp() -> String {
    let now = SystemTime::now();
    let datetime: chrono::DateTime<chrono::Utc> = now.into();
    datetime.format("%Y%m%d_%H%M%S").to_string()
}

/// Keep at most `max_backups` files named `backup_map_*.json` in `dir`,
/// evicting the oldest by mtime (§4.5 step 5).
fn evict_oldest(dir: &Path, max_backups: usize) -> Result<(), StoreError> {
    let mut entries: Vec<(std::time::SystemTime, PathBuf)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| {
            entry.file_name().to_string_lossy().starts_with("backup_map_")
                && entry.file_name().to_string_lossy().ends_with(".json")
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();

    if entries.len() <= max_backups {
        return Ok(());
    }
    entries.sort_by_key(|(modified, _)| *modified);
    let evict_count = entries.len() - max_backups;
    for (_, path) in entries.into_iter().take(evict_count) {
        fs::remove_file(path)?;
    }
    Ok(())
}
