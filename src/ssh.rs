//! sshd configuration inspection and hardening.
//!
//! Every edit backs up `sshd_config`, writes the new content, and validates
//! it with `sshd -t`. A rejected file is replaced by the backup so the
//! daemon never restarts on a broken configuration.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::backup::{self, BackupStore};
use crate::cmd_abstraction::{CommandResult, Runner};
use crate::error::ZappyError;
use crate::fs_abstraction::FileSystem;
use crate::service::Systemd;

/// Directives applied by [`SshManager::harden`].
pub const HARDENING: &[(&str, &str)] = &[
    ("PermitRootLogin", "prohibit-password"),
    ("PubkeyAuthentication", "yes"),
    ("MaxAuthTries", "3"),
    ("ClientAliveInterval", "300"),
    ("ClientAliveCountMax", "2"),
];

/// Values accepted for `PermitRootLogin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootLogin {
    No,
    ProhibitPassword,
    Yes,
}

impl fmt::Display for RootLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootLogin::No => write!(f, "no"),
            RootLogin::ProhibitPassword => write!(f, "prohibit-password"),
            RootLogin::Yes => write!(f, "yes"),
        }
    }
}

impl FromStr for RootLogin {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no" => Ok(RootLogin::No),
            "prohibit-password" | "without-password" => Ok(RootLogin::ProhibitPassword),
            "yes" => Ok(RootLogin::Yes),
            _ => Err(format!(
                "Invalid value '{}'. Valid values: no, prohibit-password, yes",
                s
            )),
        }
    }
}

/// Active directives of the global section, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshSettings {
    entries: Vec<(String, String)>,
}

impl SshSettings {
    pub fn parse(content: &str) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if key.eq_ignore_ascii_case("Match") {
                break;
            }
            if !entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                entries.push((key.to_string(), value.trim().to_string()));
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Value, or OpenSSH's compiled-in default when unset.
    pub fn effective(&self, key: &str) -> &str {
        self.get(key).unwrap_or(match key {
            "Port" => "22",
            "PermitRootLogin" => "prohibit-password",
            "PasswordAuthentication" | "PubkeyAuthentication" => "yes",
            _ => "",
        })
    }
}

/// Set `key` to `value` in the global section of an sshd_config.
///
/// The first line setting `key`, active or commented out, is replaced.
/// Otherwise the directive is inserted before the first `Match` block, or
/// appended when there is none.
pub fn set_directive(content: &str, key: &str, value: &str) -> String {
    let pattern = format!(r"(?i)^#?\s*{}\s+.*$", regex::escape(key));
    let matcher = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };
    let new_line = format!("{} {}", key, value);

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let match_block = lines.iter().position(|l| {
        l.trim_start()
            .split_whitespace()
            .next()
            .is_some_and(|w| w.eq_ignore_ascii_case("Match"))
    });
    let global_end = match_block.unwrap_or(lines.len());

    match lines[..global_end].iter().position(|l| matcher.is_match(l)) {
        Some(i) => lines[i] = new_line,
        None => {
            // Keep a trailing blank line separating the new directive
            // from a Match block
            let mut insert_at = global_end;
            while insert_at > 0 && lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            lines.insert(insert_at, new_line);
        }
    }

    let mut result = lines.join("\n");
    result.push('\n');
    result
}

/// One line of the SSH security report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshCheck {
    pub setting: &'static str,
    pub value: String,
    pub ok: bool,
    pub advice: &'static str,
}

/// Rate the settings that matter most for exposure.
pub fn security_report(settings: &SshSettings) -> Vec<SshCheck> {
    let port = settings.effective("Port").to_string();
    let root = settings.effective("PermitRootLogin").to_string();
    let password = settings.effective("PasswordAuthentication").to_string();
    let pubkey = settings.effective("PubkeyAuthentication").to_string();

    vec![
        SshCheck {
            ok: port != "22",
            setting: "Port",
            value: port,
            advice: "a non-default port reduces automated scans",
        },
        SshCheck {
            ok: matches!(root.as_str(), "no" | "prohibit-password" | "without-password"),
            setting: "PermitRootLogin",
            value: root,
            advice: "set to 'no' or 'prohibit-password'",
        },
        SshCheck {
            ok: password == "no",
            setting: "PasswordAuthentication",
            value: password,
            advice: "disable once key authentication works",
        },
        SshCheck {
            ok: pubkey == "yes",
            setting: "PubkeyAuthentication",
            value: pubkey,
            advice: "enable key authentication",
        },
    ]
}

pub struct SshManager<'a> {
    runner: Runner,
    fs: &'a dyn FileSystem,
    config_path: PathBuf,
    service: String,
    backups: BackupStore<'a>,
}

impl<'a> SshManager<'a> {
    pub fn new(
        runner: Runner,
        fs: &'a dyn FileSystem,
        config_path: impl Into<PathBuf>,
        service: impl Into<String>,
        backup_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            fs,
            config_path: config_path.into(),
            service: service.into(),
            backups: BackupStore::new(fs, backup_dir),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn read(&self) -> Result<String> {
        self.fs
            .read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read {:?}", self.config_path))
    }

    pub fn settings(&self) -> Result<SshSettings> {
        Ok(SshSettings::parse(&self.read()?))
    }

    /// Apply `changes`, validate with `sshd -t`, restore the backup on failure.
    /// Returns the backup path.
    pub fn apply(&self, changes: &[(&str, &str)]) -> Result<PathBuf> {
        let original = self.read()?;
        let backup = self
            .backups
            .backup(backup::SSH, "sshd_config", &self.config_path)?;

        let updated = changes
            .iter()
            .fold(original, |content, (key, value)| set_directive(&content, key, value));
        self.fs
            .write(&self.config_path, updated.as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.config_path))?;

        let test = self.runner.run(&["sshd", "-t"], true);
        if !test.success {
            self.backups.restore(&backup, &self.config_path)?;
            warn!("sshd rejected the new configuration, restored {:?}", backup);
            return Err(ZappyError::command("sshd -t", test.output_text()).into());
        }

        for (key, value) in changes {
            info!("Set {} {}", key, value);
        }
        Ok(backup)
    }

    pub fn set_port(&self, port: u16) -> Result<PathBuf> {
        if port == 0 {
            return Err(ZappyError::InvalidPort("0 is out of range (1-65535)".to_string()).into());
        }
        self.apply(&[("Port", &port.to_string())])
    }

    pub fn set_root_login(&self, value: RootLogin) -> Result<PathBuf> {
        self.apply(&[("PermitRootLogin", &value.to_string())])
    }

    pub fn set_password_auth(&self, enabled: bool) -> Result<PathBuf> {
        self.apply(&[(
            "PasswordAuthentication",
            if enabled { "yes" } else { "no" },
        )])
    }

    pub fn harden(&self) -> Result<PathBuf> {
        self.apply(HARDENING)
    }

    pub fn restart(&self) -> CommandResult {
        Systemd::new(self.runner.clone()).restart(&self.service)
    }
}
