//! Automatic security updates.
//!
//! Debian family hosts use `unattended-upgrades`; RHEL family hosts use
//! `dnf-automatic`. Other families are reported as unsupported.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backup::{self, BackupStore};
use crate::cmd_abstraction::{CommandResult, Runner};
use crate::distro::DistroFamily;
use crate::error::ZappyError;
use crate::fs_abstraction::FileSystem;
use crate::packages::PackageInstaller;
use crate::service::Systemd;

const UNATTENDED_UPGRADES_CONF: &str = r#"// Managed by zappy
Unattended-Upgrade::Allowed-Origins {
    "${distro_id}:${distro_codename}";
    "${distro_id}:${distro_codename}-security";
    "${distro_id}ESMApps:${distro_codename}-apps-security";
    "${distro_id}ESM:${distro_codename}-infra-security";
};

Unattended-Upgrade::Remove-Unused-Kernel-Packages "true";
Unattended-Upgrade::Remove-Unused-Dependencies "true";
Unattended-Upgrade::Automatic-Reboot "false";
Unattended-Upgrade::Automatic-Reboot-Time "02:00";
"#;

const AUTO_UPGRADES_CONF: &str = r#"APT::Periodic::Update-Package-Lists "1";
APT::Periodic::Unattended-Upgrade "1";
APT::Periodic::AutocleanInterval "7";
"#;

const DNF_AUTOMATIC_CONF: &str = "# Managed by zappy
[commands]
upgrade_type = security
random_sleep = 0
download_updates = yes
apply_updates = yes

[emitters]
emit_via = stdio

[command]
upgrade_cmd = dnf
command_args = -y
";

const UNATTENDED_LOG: &str = "/var/log/unattended-upgrades/unattended-upgrades.log";

/// `dnf check-update` exit code meaning updates are available.
const DNF_UPDATES_AVAILABLE: i32 = 100;

/// Update mechanism for a distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateTool {
    UnattendedUpgrades,
    DnfAutomatic,
}

impl UpdateTool {
    pub fn for_family(family: DistroFamily) -> crate::error::Result<Self> {
        match family {
            DistroFamily::Debian => Ok(UpdateTool::UnattendedUpgrades),
            DistroFamily::Rhel => Ok(UpdateTool::DnfAutomatic),
            other => Err(ZappyError::UnsupportedSystem(format!(
                "automatic updates are only managed on Debian and RHEL families (detected {:?})",
                other
            ))),
        }
    }

    pub fn package(&self) -> &'static str {
        match self {
            UpdateTool::UnattendedUpgrades => "unattended-upgrades",
            UpdateTool::DnfAutomatic => "dnf-automatic",
        }
    }

    /// systemd unit driving the updates.
    pub fn unit(&self) -> &'static str {
        match self {
            UpdateTool::UnattendedUpgrades => "unattended-upgrades",
            UpdateTool::DnfAutomatic => "dnf-automatic.timer",
        }
    }

    /// Configuration files as (path relative to `/`, content).
    pub fn config_files(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            UpdateTool::UnattendedUpgrades => &[
                (
                    "etc/apt/apt.conf.d/50unattended-upgrades",
                    UNATTENDED_UPGRADES_CONF,
                ),
                ("etc/apt/apt.conf.d/20auto-upgrades", AUTO_UPGRADES_CONF),
            ],
            UpdateTool::DnfAutomatic => &[("etc/dnf/automatic.conf", DNF_AUTOMATIC_CONF)],
        }
    }
}

/// Service state plus recent activity.
#[derive(Debug, Clone)]
pub struct UpdateStatus {
    pub tool: UpdateTool,
    pub service: CommandResult,
    pub activity: CommandResult,
}

pub struct AutoUpdates<'a> {
    runner: Runner,
    fs: &'a dyn FileSystem,
    root: PathBuf,
    backups: BackupStore<'a>,
}

impl<'a> AutoUpdates<'a> {
    pub fn new(runner: Runner, fs: &'a dyn FileSystem, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            fs,
            root: PathBuf::from("/"),
            backups: BackupStore::new(fs, backup_dir),
        }
    }

    /// Write configuration under `root` instead of `/`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    fn target(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Install the update tool, write its configuration and start it.
    pub fn setup(&self, installer: &PackageInstaller<'_>, family: DistroFamily) -> Result<UpdateTool> {
        let tool = UpdateTool::for_family(family)?;
        installer.install(&[tool.package()])?;
        self.write_config(tool)?;
        Systemd::new(self.runner.clone())
            .enable_now(tool.unit())
            .check(&format!("systemctl enable --now {}", tool.unit()))?;
        info!("Automatic updates enabled via {}", tool.package());
        Ok(tool)
    }

    /// Write the tool's configuration files, backing up existing ones.
    /// Returns the backups taken.
    pub fn write_config(&self, tool: UpdateTool) -> Result<Vec<PathBuf>> {
        let mut backups = Vec::new();
        for (relative, content) in tool.config_files() {
            let path = self.target(relative);
            if self.fs.exists(&path) {
                backups.push(self.backups.backup(backup::UPDATES, file_name(&path), &path)?);
            }
            if let Some(parent) = path.parent() {
                self.fs
                    .create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
            self.fs
                .write(&path, content.as_bytes())
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("Wrote {:?}", path);
        }
        Ok(backups)
    }

    pub fn status(&self, family: DistroFamily) -> Result<UpdateStatus> {
        let tool = UpdateTool::for_family(family)?;
        let service = Systemd::new(self.runner.clone()).status(tool.unit());
        let activity = match tool {
            UpdateTool::UnattendedUpgrades => {
                self.runner.run(&["tail", "-n", "20", UNATTENDED_LOG], true)
            }
            UpdateTool::DnfAutomatic => self.runner.run(
                &["systemctl", "list-timers", "dnf-automatic.timer", "--no-pager"],
                false,
            ),
        };
        Ok(UpdateStatus {
            tool,
            service,
            activity,
        })
    }

    /// List pending updates without installing anything.
    ///
    /// For dnf the result is successful both when nothing is pending and
    /// when security updates are listed.
    pub fn check(&self, family: DistroFamily) -> Result<CommandResult> {
        match UpdateTool::for_family(family)? {
            UpdateTool::UnattendedUpgrades => {
                self.runner.run_checked(&["apt-get", "update"], true)?;
                Ok(self.runner.run(&["apt", "list", "--upgradable"], false))
            }
            UpdateTool::DnfAutomatic => {
                let mut result = self
                    .runner
                    .run(&["dnf", "check-update", "--security"], true);
                if result.code == Some(DNF_UPDATES_AVAILABLE) {
                    result.success = true;
                }
                Ok(result)
            }
        }
    }
}

fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{args_to_strings, MockCommandExecutor, Privilege};
    use crate::distro::{PackageManager, PathProbe};
    use crate::fs_abstraction::RealFileSystem;
    use mockall::Sequence;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct NoBinaries;

    impl PathProbe for NoBinaries {
        fn has_binary(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_tool_per_family() {
        assert_eq!(
            UpdateTool::for_family(DistroFamily::Debian).unwrap(),
            UpdateTool::UnattendedUpgrades
        );
        assert_eq!(
            UpdateTool::for_family(DistroFamily::Rhel).unwrap().unit(),
            "dnf-automatic.timer"
        );
        assert!(matches!(
            UpdateTool::for_family(DistroFamily::Arch),
            Err(ZappyError::UnsupportedSystem(_))
        ));
    }

    #[test]
    fn test_config_contents() {
        assert!(UNATTENDED_UPGRADES_CONF.contains("\"${distro_id}:${distro_codename}-security\";"));
        assert!(UNATTENDED_UPGRADES_CONF.contains("Automatic-Reboot \"false\";"));
        assert!(AUTO_UPGRADES_CONF.contains("APT::Periodic::Unattended-Upgrade \"1\";"));
        assert!(DNF_AUTOMATIC_CONF.contains("upgrade_type = security"));
        assert!(DNF_AUTOMATIC_CONF.contains("apply_updates = yes"));
    }

    #[test]
    fn test_setup_debian() {
        let dir = TempDir::new().unwrap();
        let fs = RealFileSystem;
        let apt_conf = dir.path().join("etc/apt/apt.conf.d");
        std::fs::create_dir_all(&apt_conf).unwrap();
        std::fs::write(apt_conf.join("20auto-upgrades"), "APT::Periodic::Unattended-Upgrade \"0\";\n")
            .unwrap();

        let mut mock = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .withf(|cmd, args, _| {
                cmd == "apt-get" && args == args_to_strings(&["install", "-y", "unattended-upgrades"]).as_slice()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("")));
        mock.expect_execute()
            .withf(|cmd, args, _| {
                cmd == "systemctl"
                    && args == args_to_strings(&["enable", "--now", "unattended-upgrades"]).as_slice()
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("")));
        let runner = Runner::new(Arc::new(mock), Privilege::None);

        let probe = NoBinaries;
        let installer = PackageInstaller::new(runner.clone(), PackageManager::Apt, &probe);
        let updates = AutoUpdates::new(runner, &fs, dir.path().join("backups")).with_root(dir.path());

        let tool = updates.setup(&installer, DistroFamily::Debian).unwrap();
        assert_eq!(tool, UpdateTool::UnattendedUpgrades);
        assert_eq!(
            std::fs::read_to_string(apt_conf.join("20auto-upgrades")).unwrap(),
            AUTO_UPGRADES_CONF
        );
        assert_eq!(
            std::fs::read_to_string(apt_conf.join("50unattended-upgrades")).unwrap(),
            UNATTENDED_UPGRADES_CONF
        );

        let backups = BackupStore::new(&fs, dir.path().join("backups"))
            .list(backup::UPDATES)
            .unwrap();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn test_setup_unsupported_family_runs_nothing() {
        let runner = Runner::new(Arc::new(MockCommandExecutor::new()), Privilege::None);
        let probe = NoBinaries;
        let installer = PackageInstaller::new(runner.clone(), PackageManager::Pacman, &probe);
        let fs = RealFileSystem;
        let updates = AutoUpdates::new(runner, &fs, "/var/backups/zappy");

        let err = updates.setup(&installer, DistroFamily::Arch).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::UnsupportedSystem(_))
        ));
    }

    #[test]
    fn test_dnf_check_exit_100_is_success() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args, _| {
                cmd == "dnf" && args == args_to_strings(&["check-update", "--security"]).as_slice()
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(CommandResult {
                    stdout: "openssl.x86_64  1:3.0.7-27.el9  baseos\n".to_string(),
                    stderr: String::new(),
                    success: false,
                    code: Some(100),
                })
            });
        let fs = RealFileSystem;
        let updates = AutoUpdates::new(
            Runner::new(Arc::new(mock), Privilege::None),
            &fs,
            "/var/backups/zappy",
        );
        let result = updates.check(DistroFamily::Rhel).unwrap();
        assert!(result.success);
        assert!(result.stdout.contains("openssl"));
    }

    #[test]
    fn test_apt_check_refreshes_first() {
        let mut mock = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        mock.expect_execute()
            .withf(|cmd, args, _| cmd == "apt-get" && args == ["update".to_string()])
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("")));
        mock.expect_execute()
            .withf(|cmd, args, _| cmd == "apt" && args == args_to_strings(&["list", "--upgradable"]).as_slice())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(CommandResult::ok("Listing...\n")));
        let fs = RealFileSystem;
        let updates = AutoUpdates::new(
            Runner::new(Arc::new(mock), Privilege::None),
            &fs,
            "/var/backups/zappy",
        );
        assert!(updates.check(DistroFamily::Debian).unwrap().success);
    }
}
