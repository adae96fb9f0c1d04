//! Package installation through the detected package manager, and the
//! catalog of common command-line tools.

use crate::cmd_abstraction::{CommandResult, Runner};
use crate::distro::{PackageManager, PathProbe};
use crate::error::Result;
use crate::utils::shell_join;

/// A tool from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tool {
    pub name: &'static str,
    pub description: &'static str,
    command: &'static str,
    /// Binary name on Debian/Ubuntu when it differs
    apt_command: Option<&'static str>,
    /// Package names differing from `name`
    packages: &'static [(PackageManager, &'static str)],
}

impl Tool {
    const fn simple(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            command: name,
            apt_command: None,
            packages: &[],
        }
    }

    /// Package name under `pm`.
    pub fn package(&self, pm: PackageManager) -> &'static str {
        self.packages
            .iter()
            .find(|(manager, _)| *manager == pm)
            .map(|(_, package)| *package)
            .unwrap_or(self.name)
    }

    /// Binary that shows the tool is installed.
    pub fn command(&self, pm: PackageManager) -> &'static str {
        match (pm, self.apt_command) {
            (PackageManager::Apt, Some(command)) => command,
            _ => self.command,
        }
    }
}

pub const CATALOG: &[Tool] = &[
    Tool::simple("htop", "Interactive process viewer"),
    Tool::simple("micro", "Modern terminal text editor"),
    Tool::simple("ncdu", "Disk usage analyzer"),
    Tool::simple("tmux", "Terminal multiplexer"),
    Tool::simple("tree", "Directory tree viewer"),
    Tool::simple("jq", "JSON processor"),
    Tool {
        name: "bat",
        description: "Cat with syntax highlighting",
        command: "bat",
        apt_command: Some("batcat"),
        packages: &[],
    },
    Tool {
        name: "ripgrep",
        description: "Fast recursive grep",
        command: "rg",
        apt_command: None,
        packages: &[],
    },
    Tool {
        name: "fd",
        description: "Fast find alternative",
        command: "fd",
        apt_command: Some("fdfind"),
        packages: &[
            (PackageManager::Apt, "fd-find"),
            (PackageManager::Dnf, "fd-find"),
            (PackageManager::Yum, "fd-find"),
        ],
    },
    Tool::simple("neofetch", "System info display"),
    Tool::simple("flatpak", "Flatpak app platform"),
];

/// Look a tool up by catalog name.
pub fn find_tool(name: &str) -> Option<&'static Tool> {
    CATALOG.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

/// Installs packages with one package manager.
pub struct PackageInstaller<'a> {
    runner: Runner,
    pm: PackageManager,
    probe: &'a dyn PathProbe,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(runner: Runner, pm: PackageManager, probe: &'a dyn PathProbe) -> Self {
        Self { runner, pm, probe }
    }

    pub fn package_manager(&self) -> PackageManager {
        self.pm
    }

    /// Refresh the package index.
    pub fn refresh(&self) -> CommandResult {
        let argv = self.pm.update_command();
        self.run(&argv)
    }

    /// Install `packages` in one transaction.
    pub fn install(&self, packages: &[&str]) -> Result<CommandResult> {
        let argv = self.pm.install_command(packages);
        let result = self.run(&argv);
        result.check(&shell_join(&argv))
    }

    /// Whether the package manager reports `package` as installed.
    pub fn is_package_installed(&self, package: &str) -> bool {
        let argv = self.pm.query_command(package);
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.runner.run(&refs, false).success
    }

    pub fn has_command(&self, command: &str) -> bool {
        self.probe.has_binary(command)
    }

    /// Install `package` unless `command` is already available.
    /// Returns `true` when something was installed.
    pub fn ensure_installed(&self, command: &str, package: &str) -> Result<bool> {
        if self.has_command(command) {
            return Ok(false);
        }
        self.install(&[package])?;
        Ok(true)
    }

    pub fn is_tool_installed(&self, tool: &Tool) -> bool {
        self.has_command(tool.command(self.pm))
    }

    /// Install a catalog tool unless present. Returns `true` when installed now.
    pub fn install_tool(&self, tool: &Tool) -> Result<bool> {
        self.ensure_installed(tool.command(self.pm), tool.package(self.pm))
    }

    fn run(&self, argv: &[String]) -> CommandResult {
        let refs: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.runner.run(&refs, true)
    }
}
