//! Per-invocation context: configuration, command runner and the detected
//! system facts, built once in `main` and handed to every command.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

use crate::certbot::CertbotManager;
use crate::cmd_abstraction::{check_root, Privilege, Runner};
use crate::config::{Config, PrivilegeMode};
use crate::distro::{self, DistroFamily, DistroInfo, PackageManager, PathProbe, SearchPath};
use crate::fail2ban::Fail2ban;
use crate::firewall::{create_backend, detect_backend, FirewallBackend, FirewallKind};
use crate::fs_abstraction::{FileSystem, RealFileSystem, SudoFileSystem};
use crate::nginx::SiteManager;
use crate::packages::PackageInstaller;
use crate::ssh::SshManager;
use crate::updates::AutoUpdates;

pub struct Context {
    config: Config,
    config_path: PathBuf,
    runner: Runner,
    fs: Box<dyn FileSystem>,
    probe: Box<dyn PathProbe>,
    package_manager: OnceLock<PackageManager>,
    firewall: OnceLock<FirewallKind>,
    distro: OnceLock<DistroInfo>,
}

impl Context {
    /// Context running real commands against the real filesystem.
    pub fn new(config: Config, config_path: impl Into<PathBuf>) -> Self {
        let privilege = match config.privilege {
            PrivilegeMode::Auto => Privilege::detect(),
            PrivilegeMode::Sudo => Privilege::Sudo,
            PrivilegeMode::None => Privilege::None,
        };
        let runner = Runner::system(privilege).with_echo(config.echo_commands);
        let fs: Box<dyn FileSystem> = match privilege {
            Privilege::Sudo => Box::new(SudoFileSystem::new(runner.clone())),
            Privilege::None => Box::new(RealFileSystem),
        };
        Self::with_parts(config, config_path, runner, fs, Box::new(SearchPath::from_env()))
    }

    pub fn with_parts(
        config: Config,
        config_path: impl Into<PathBuf>,
        runner: Runner,
        fs: Box<dyn FileSystem>,
        probe: Box<dyn PathProbe>,
    ) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            runner,
            fs,
            probe,
            package_manager: OnceLock::new(),
            firewall: OnceLock::new(),
            distro: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn probe(&self) -> &dyn PathProbe {
        self.probe.as_ref()
    }

    /// Fail unless this invocation may change the system.
    ///
    /// An explicit `privilege: sudo` lets a regular user through; commands
    /// and file changes are then elevated one by one.
    pub fn require_root(&self) -> Result<()> {
        if self.config.privilege == PrivilegeMode::Sudo {
            return Ok(());
        }
        check_root()
    }

    /// Configured or detected package manager, detected at most once.
    pub fn package_manager(&self) -> Result<PackageManager> {
        if let Some(pm) = self.package_manager.get() {
            return Ok(*pm);
        }
        let pm = match self.config.package_manager.forced() {
            Some(pm) => pm,
            None => distro::detect(self.probe())?,
        };
        debug!("Package manager: {}", pm);
        Ok(*self.package_manager.get_or_init(|| pm))
    }

    /// Configured or detected firewall backend, detected at most once.
    pub fn firewall_kind(&self) -> Result<FirewallKind> {
        if let Some(kind) = self.firewall.get() {
            return Ok(*kind);
        }
        let kind = match self.config.firewall.forced() {
            Some(kind) => kind,
            None => detect_backend(self.probe())?,
        };
        debug!("Firewall backend: {}", kind);
        Ok(*self.firewall.get_or_init(|| kind))
    }

    pub fn distro(&self) -> &DistroInfo {
        self.distro.get_or_init(DistroInfo::load)
    }

    /// Distribution family from os-release, or implied by the package
    /// manager when os-release is inconclusive.
    pub fn family(&self) -> Result<DistroFamily> {
        match self.distro().family() {
            DistroFamily::Unknown => Ok(family_of(self.package_manager()?)),
            family => Ok(family),
        }
    }

    pub fn installer(&self) -> Result<PackageInstaller<'_>> {
        Ok(PackageInstaller::new(
            self.runner.clone(),
            self.package_manager()?,
            self.probe(),
        ))
    }

    pub fn sites(&self) -> SiteManager<'_> {
        let nginx = &self.config.nginx;
        SiteManager::new(
            self.fs.as_ref(),
            self.runner.clone(),
            &nginx.sites_available,
            &nginx.sites_enabled,
            nginx.template_settings(),
            &self.config.backup_dir,
        )
    }

    pub fn certbot(&self) -> CertbotManager {
        CertbotManager::new(self.runner.clone())
    }

    pub fn firewall(&self) -> Result<Box<dyn FirewallBackend>> {
        Ok(create_backend(self.firewall_kind()?, self.runner.clone()))
    }

    pub fn fail2ban(&self) -> Fail2ban<'_> {
        Fail2ban::new(
            self.runner.clone(),
            self.fs.as_ref(),
            &self.config.fail2ban.jail_local,
            &self.config.backup_dir,
        )
    }

    pub fn ssh(&self) -> SshManager<'_> {
        SshManager::new(
            self.runner.clone(),
            self.fs.as_ref(),
            &self.config.ssh.config_path,
            &self.config.ssh.service,
            &self.config.backup_dir,
        )
    }

    pub fn updates(&self) -> AutoUpdates<'_> {
        AutoUpdates::new(self.runner.clone(), self.fs.as_ref(), &self.config.backup_dir)
    }
}

fn family_of(pm: PackageManager) -> DistroFamily {
    match pm {
        PackageManager::Apt => DistroFamily::Debian,
        PackageManager::Dnf | PackageManager::Yum => DistroFamily::Rhel,
        PackageManager::Pacman => DistroFamily::Arch,
        PackageManager::Apk => DistroFamily::Alpine,
        PackageManager::Zypper => DistroFamily::Suse,
    }
}
