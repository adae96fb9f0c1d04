//! fail2ban installation, configuration and ban management.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::backup::{self, BackupStore};
use crate::cmd_abstraction::{CommandResult, Runner};
use crate::distro::{DistroFamily, PackageManager};
use crate::error::ZappyError;
use crate::fs_abstraction::FileSystem;
use crate::packages::PackageInstaller;
use crate::service::Systemd;
use crate::validation::validate_ip;

pub const SERVICE: &str = "fail2ban";
pub const CLIENT: &str = "fail2ban-client";

/// Default `jail.local`.
///
/// The file-based `sshd` jail reads `/var/log/auth.log`, which only Debian
/// family hosts write; elsewhere the journal-based `sshd-systemd` jail is
/// enabled instead. fail2ban refuses to start on a missing logpath.
pub fn render_jail_local(family: DistroFamily) -> String {
    let auth_log = family == DistroFamily::Debian;
    format!(
        "# Managed by zappy
[DEFAULT]
# Ban hosts for 1 hour
bantime = 1h

# Find time window (10 minutes)
findtime = 10m

# Max retries before ban
maxretry = 5

# Never ban localhost
ignoreip = 127.0.0.1/8 ::1

[sshd]
enabled = {}
port = ssh
filter = sshd
logpath = /var/log/auth.log
maxretry = 3
bantime = 1h

[sshd-systemd]
enabled = {}
backend = systemd
filter = sshd
maxretry = 3
bantime = 1h
",
        auth_log, !auth_log
    )
}

/// Jail names from `fail2ban-client status`.
pub fn parse_jail_list(status: &str) -> Vec<String> {
    status
        .lines()
        .find_map(|line| line.split_once("Jail list:").map(|(_, jails)| jails))
        .map(|jails| {
            jails
                .split(',')
                .map(str::trim)
                .filter(|j| !j.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Banned addresses from `fail2ban-client status <jail>`.
pub fn parse_banned_ips(jail_status: &str) -> Vec<String> {
    jail_status
        .lines()
        .find_map(|line| line.split_once("Banned IP list:").map(|(_, ips)| ips))
        .map(|ips| ips.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JailBans {
    pub jail: String,
    pub banned: Vec<String>,
}

pub struct Fail2ban<'a> {
    runner: Runner,
    fs: &'a dyn FileSystem,
    jail_local: PathBuf,
    backups: BackupStore<'a>,
}

impl<'a> Fail2ban<'a> {
    pub fn new(
        runner: Runner,
        fs: &'a dyn FileSystem,
        jail_local: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fs,
            jail_local: jail_local.into(),
            backups: BackupStore::new(fs, backup_dir),
        }
    }

    /// Install the package, write the default jails and start the service.
    pub fn install(&self, installer: &PackageInstaller<'_>, family: DistroFamily) -> Result<()> {
        if installer.package_manager() == PackageManager::Apk {
            return Err(ZappyError::UnsupportedSystem(
                "fail2ban is not packaged for Alpine Linux (consider sshguard)".to_string(),
            )
            .into());
        }

        installer.install(&[SERVICE])?;
        self.write_config(family)?;
        Systemd::new(self.runner.clone())
            .enable_now(SERVICE)
            .check("systemctl enable --now fail2ban")?;
        info!("fail2ban installed and running");
        Ok(())
    }

    /// Write the default `jail.local`, backing up any existing one.
    pub fn write_config(&self, family: DistroFamily) -> Result<Option<PathBuf>> {
        let backup = if self.fs.exists(&self.jail_local) {
            Some(
                self.backups
                    .backup(backup::FAIL2BAN, "jail.local", &self.jail_local)?,
            )
        } else {
            None
        };

        if let Some(parent) = self.jail_local.parent() {
            self.fs
                .create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        self.fs
            .write(&self.jail_local, render_jail_local(family).as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.jail_local))?;
        info!("Wrote {:?}", self.jail_local);
        Ok(backup)
    }

    /// `fail2ban-client status`
    pub fn status(&self) -> CommandResult {
        self.runner.run(&[CLIENT, "status"], true)
    }

    pub fn jails(&self) -> Result<Vec<String>> {
        let result = self.status().check("fail2ban-client status")?;
        Ok(parse_jail_list(&result.stdout))
    }

    /// Banned addresses for every active jail.
    pub fn banned(&self) -> Result<Vec<JailBans>> {
        self.jails()?
            .into_iter()
            .map(|jail| -> Result<JailBans> {
                let result = self
                    .runner
                    .run(&[CLIENT, "status", &jail], true)
                    .check(&format!("fail2ban-client status {}", jail))?;
                Ok(JailBans {
                    banned: parse_banned_ips(&result.stdout),
                    jail,
                })
            })
            .collect()
    }

    /// Lift a ban in every jail.
    pub fn unban(&self, ip: &str) -> Result<CommandResult> {
        let ip = validate_ip(ip)?.to_string();
        Ok(self.runner.run(&[CLIENT, "unban", &ip], true))
    }
}
