//! Timestamped backups of files Zappy is about to overwrite or delete.
//!
//! Layout: `<backup_dir>/<category>/<category>_<name>_<YYYYmmdd_HHMMSS>.bak`.
//! Backups are never pruned.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fs_abstraction::FileSystem;

/// Backup categories in use.
pub const NGINX: &str = "nginx";
pub const SSH: &str = "ssh";
pub const FAIL2BAN: &str = "fail2ban";
pub const UPDATES: &str = "updates";

/// Backups may hold credentials (sshd, jails), keep them owner-only.
const BACKUP_MODE: u32 = 0o600;

pub struct BackupStore<'a> {
    fs: &'a dyn FileSystem,
    dir: PathBuf,
}

impl<'a> BackupStore<'a> {
    pub fn new(fs: &'a dyn FileSystem, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    /// Path a backup taken now would get, before collision handling.
    pub fn path_for(&self, category: &str, name: &str, stamp: &str) -> PathBuf {
        let name = name.replace(['/', '\\'], "_");
        self.dir
            .join(category)
            .join(format!("{}_{}_{}.bak", category, name, stamp))
    }

    /// Copy `source` into the store and return the backup path.
    pub fn backup(&self, category: &str, name: &str, source: &Path) -> Result<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut target = self.path_for(category, name, &stamp);
        // Two backups of the same file within one second
        let mut n = 1;
        while self.fs.exists(&target) {
            target = self.path_for(category, name, &format!("{}_{}", stamp, n));
            n += 1;
        }

        let parent = self.dir.join(category);
        self.fs
            .create_dir_all(&parent)
            .with_context(|| format!("Failed to create backup directory: {:?}", parent))?;
        self.fs
            .copy(source, &target)
            .with_context(|| format!("Failed to back up {:?} to {:?}", source, target))?;
        self.fs
            .set_permissions_mode(&target, BACKUP_MODE)
            .with_context(|| format!("Failed to restrict permissions on {:?}", target))?;
        debug!("Backed up {:?} to {:?}", source, target);
        Ok(target)
    }

    /// Put a backup's content back into `target`, keeping the target's mode.
    pub fn restore(&self, backup: &Path, target: &Path) -> Result<()> {
        let content = self
            .fs
            .read_to_string(backup)
            .with_context(|| format!("Failed to read backup {:?}", backup))?;
        self.fs
            .write(target, content.as_bytes())
            .with_context(|| format!("Failed to restore {:?} from {:?}", target, backup))?;
        debug!("Restored {:?} from {:?}", target, backup);
        Ok(())
    }

    /// Most recent backups of a category, newest first.
    pub fn list(&self, category: &str) -> Result<Vec<PathBuf>> {
        let dir = self.dir.join(category);
        if !self.fs.exists(&dir) {
            return Ok(Vec::new());
        }
        let mut entries: Vec<PathBuf> = self
            .fs
            .read_dir(&dir)
            .with_context(|| format!("Failed to list backups in {:?}", dir))?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|e| e == "bak"))
            .collect();
        entries.sort();
        entries.reverse();
        Ok(entries)
    }
}
