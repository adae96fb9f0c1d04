//! Filesystem abstraction layer for testability
//!
//! The nginx site manager, backups and the config writers (sshd, fail2ban,
//! auto-updates) reach the filesystem only through [`FileSystem`], so their
//! ordering and failure handling can be tested with a mock or against a
//! temporary directory.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::cmd_abstraction::Runner;
use crate::utils::shell_join;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting filesystem operations for dependency injection.
///
/// # Example (testing)
/// ```ignore
/// use zappy::fs_abstraction::MockFileSystem;
/// use std::path::Path;
///
/// let mut mock_fs = MockFileSystem::new();
/// mock_fs.expect_is_symlink().returning(|_| false);
/// ```
#[cfg_attr(test, automock)]
pub trait FileSystem: Send + Sync {
    /// Read file contents as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Write bytes to a file, creating or truncating it.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Check if a path exists (follows symlinks).
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a regular file (follows symlinks).
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is itself a symlink, dangling or not.
    fn is_symlink(&self, path: &Path) -> bool;

    /// Create a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Copy a file from one location to another.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Remove a file or symlink.
    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Create a symlink at `link` pointing to `target`.
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// List the entries of a directory (full paths, unsorted).
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Set Unix file permissions mode (e.g., 0o600).
    fn set_permissions_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}

/// Real filesystem implementation using std::fs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        path.symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        std::fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect()
    }

    fn set_permissions_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }
}

static REAL_FS: RealFileSystem = RealFileSystem;

/// Get a reference to the global real filesystem instance.
pub fn real_fs() -> &'static RealFileSystem {
    &REAL_FS
}

/// Filesystem for a regular user running with `privilege: sudo`.
///
/// Queries use std directly. Every change goes through `sudo` (`cp`, `ln`,
/// `rm`, `mkdir`, `chmod`), and reads fall back to `sudo cat` when the file
/// is not readable, as root-owned backups are.
pub struct SudoFileSystem {
    runner: Runner,
}

impl SudoFileSystem {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    fn sudo(&self, argv: &[&str]) -> io::Result<String> {
        let result = self.runner.run(argv, true);
        if result.success {
            Ok(result.stdout)
        } else {
            Err(io::Error::other(format!(
                "{}: {}",
                shell_join(argv),
                result.stderr.trim()
            )))
        }
    }
}

impl FileSystem for SudoFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        match std::fs::read_to_string(path) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                self.sudo(&["cat", "--", &*path.to_string_lossy()])
            }
            other => other,
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        // cp keeps the mode and owner of an existing target; new files get 0644
        let mut staged = tempfile::NamedTempFile::new()?;
        staged.write_all(contents)?;
        staged.flush()?;
        std::fs::set_permissions(staged.path(), std::fs::Permissions::from_mode(0o644))?;
        self.sudo(&[
            "cp",
            "--",
            &*staged.path().to_string_lossy(),
            &*path.to_string_lossy(),
        ])?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        RealFileSystem.is_symlink(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        self.sudo(&["mkdir", "-p", "--", &*path.to_string_lossy()])?;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.sudo(&["cp", "--", &*from.to_string_lossy(), &*to.to_string_lossy()])?;
        Ok(std::fs::metadata(to).map(|m| m.len()).unwrap_or(0))
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.sudo(&["rm", "--", &*path.to_string_lossy()])?;
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.sudo(&[
            "ln",
            "-s",
            "--",
            &*target.to_string_lossy(),
            &*link.to_string_lossy(),
        ])?;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        RealFileSystem.read_dir(path)
    }

    fn set_permissions_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.sudo(&["chmod", &*format!("{:o}", mode), "--", &*path.to_string_lossy()])?;
        Ok(())
    }
}
