//! Configuration management for Zappy.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::distro::PackageManager;
use crate::firewall::FirewallKind;
use crate::nginx::TemplateSettings;
use crate::validation::validate_email;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/zappy/config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// How elevated commands are run (auto, sudo, none)
    pub privilege: PrivilegeMode,

    /// Log every external command at INFO level
    pub echo_commands: bool,

    /// Package manager override (auto, apt, dnf, yum, pacman, apk, zypper)
    pub package_manager: PackageManagerSetting,

    /// Firewall backend override (auto, ufw, firewalld)
    pub firewall: FirewallSetting,

    /// nginx layout and template defaults
    pub nginx: NginxConfig,

    /// Where backups of edited files are kept
    pub backup_dir: PathBuf,

    pub certbot: CertbotConfig,

    pub ssh: SshConfig,

    pub fail2ban: Fail2banConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            privilege: PrivilegeMode::Auto,
            echo_commands: false,
            package_manager: PackageManagerSetting::Auto,
            firewall: FirewallSetting::Auto,
            nginx: NginxConfig::default(),
            backup_dir: PathBuf::from("/var/backups/zappy"),
            certbot: CertbotConfig::default(),
            ssh: SshConfig::default(),
            fail2ban: Fail2banConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("nginx.sites_available", &self.nginx.sites_available),
            ("nginx.sites_enabled", &self.nginx.sites_enabled),
            ("nginx.log_dir", &self.nginx.log_dir),
            ("nginx.web_root", &self.nginx.web_root),
            ("backup_dir", &self.backup_dir),
            ("ssh.config_path", &self.ssh.config_path),
            ("fail2ban.jail_local", &self.fail2ban.jail_local),
        ];
        for (name, path) in paths {
            if !path.is_absolute() {
                anyhow::bail!("{} must be an absolute path, got {:?}", name, path);
            }
        }

        if self.nginx.php_fpm_socket.trim().is_empty() {
            anyhow::bail!("nginx.php_fpm_socket cannot be empty");
        }

        if self.ssh.service.trim().is_empty() {
            anyhow::bail!("ssh.service cannot be empty");
        }

        if !self.certbot.email.is_empty() {
            validate_email(&self.certbot.email).context("Invalid certbot.email")?;
        }

        Ok(())
    }

    /// Save configuration to YAML file atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let path = path.as_ref();
        let content = serde_yaml::to_string(self).with_context(|| "Failed to serialize config")?;

        let parent_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", parent_dir))?;
        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for config")?;

        temp_file.write_all(content.as_bytes())?;
        temp_file.as_file().sync_all()?;

        temp_file
            .persist(path)
            .with_context(|| format!("Failed to persist config file: {:?}", path))?;

        Ok(())
    }

    /// Generate default config with comments
    pub fn generate_default_yaml() -> String {
        include_str!("../templates/config.yaml").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeMode {
    /// sudo unless already running as root
    #[default]
    Auto,
    /// Always prefix elevated commands with sudo
    Sudo,
    /// Never use sudo
    None,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageManagerSetting {
    /// Probe the search path (apt, dnf, yum, pacman, apk, zypper)
    #[default]
    Auto,
    Apt,
    Dnf,
    Yum,
    Pacman,
    Apk,
    Zypper,
}

impl PackageManagerSetting {
    /// The forced package manager, or `None` for auto-detection.
    pub fn forced(&self) -> Option<PackageManager> {
        match self {
            PackageManagerSetting::Auto => None,
            PackageManagerSetting::Apt => Some(PackageManager::Apt),
            PackageManagerSetting::Dnf => Some(PackageManager::Dnf),
            PackageManagerSetting::Yum => Some(PackageManager::Yum),
            PackageManagerSetting::Pacman => Some(PackageManager::Pacman),
            PackageManagerSetting::Apk => Some(PackageManager::Apk),
            PackageManagerSetting::Zypper => Some(PackageManager::Zypper),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FirewallSetting {
    /// Probe for ufw, then firewall-cmd
    #[default]
    Auto,
    Ufw,
    Firewalld,
}

impl FirewallSetting {
    pub fn forced(&self) -> Option<FirewallKind> {
        match self {
            FirewallSetting::Auto => None,
            FirewallSetting::Ufw => Some(FirewallKind::Ufw),
            FirewallSetting::Firewalld => Some(FirewallKind::Firewalld),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NginxConfig {
    pub sites_available: PathBuf,
    pub sites_enabled: PathBuf,
    pub log_dir: PathBuf,
    /// PHP-FPM socket path, or `host:port`
    pub php_fpm_socket: String,
    /// Parent of the default document roots (`<web_root>/<domain>`)
    pub web_root: PathBuf,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            sites_available: PathBuf::from("/etc/nginx/sites-available"),
            sites_enabled: PathBuf::from("/etc/nginx/sites-enabled"),
            log_dir: PathBuf::from("/var/log/nginx"),
            php_fpm_socket: "/run/php/php-fpm.sock".to_string(),
            web_root: PathBuf::from("/var/www"),
        }
    }
}

impl NginxConfig {
    pub fn template_settings(&self) -> TemplateSettings {
        TemplateSettings {
            log_dir: self.log_dir.clone(),
            php_fpm_socket: self.php_fpm_socket.clone(),
            web_root: self.web_root.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CertbotConfig {
    /// Contact email remembered after the first issuance
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfig {
    pub config_path: PathBuf,
    /// systemd unit restarted after changes
    pub service: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("/etc/ssh/sshd_config"),
            service: "sshd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Fail2banConfig {
    pub jail_local: PathBuf,
}

impl Default for Fail2banConfig {
    fn default() -> Self {
        Self {
            jail_local: PathBuf::from("/etc/fail2ban/jail.local"),
        }
    }
}
