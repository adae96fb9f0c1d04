//! Thin systemd wrapper (`systemctl`).

use crate::cmd_abstraction::{CommandResult, Runner};
use crate::utils::first_line;

#[derive(Debug, Clone)]
pub struct Systemd {
    runner: Runner,
}

impl Systemd {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// `systemctl is-active --quiet <unit>`
    pub fn is_active(&self, unit: &str) -> bool {
        self.runner
            .run(&["systemctl", "is-active", "--quiet", unit], false)
            .success
    }

    /// `systemctl is-enabled --quiet <unit>`
    pub fn is_enabled(&self, unit: &str) -> bool {
        self.runner
            .run(&["systemctl", "is-enabled", "--quiet", unit], false)
            .success
    }

    /// Enable the unit at boot and start it now.
    pub fn enable_now(&self, unit: &str) -> CommandResult {
        self.runner
            .run(&["systemctl", "enable", "--now", unit], true)
    }

    pub fn restart(&self, unit: &str) -> CommandResult {
        self.runner.run(&["systemctl", "restart", unit], true)
    }

    pub fn reload(&self, unit: &str) -> CommandResult {
        self.runner.run(&["systemctl", "reload", unit], true)
    }

    pub fn status(&self, unit: &str) -> CommandResult {
        self.runner
            .run(&["systemctl", "status", unit, "--no-pager"], false)
    }

    /// One-word state (`active`, `inactive`, `failed`, ...).
    pub fn state(&self, unit: &str) -> String {
        let result = self.runner.run(&["systemctl", "is-active", unit], false);
        first_line(&result.stdout).unwrap_or("unknown").to_string()
    }
}
