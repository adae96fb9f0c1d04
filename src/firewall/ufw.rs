//! UFW backend implementation.

use super::{FirewallBackend, FirewallKind, FirewallRule};
use crate::cmd_abstraction::{CommandResult, Runner};

/// UFW backend. Every rule change is a single `ufw` call.
#[derive(Debug, Clone)]
pub struct UfwBackend {
    runner: Runner,
}

impl UfwBackend {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    fn ufw(&self, args: &[&str]) -> CommandResult {
        let mut argv = vec!["ufw"];
        argv.extend_from_slice(args);
        self.runner.run(&argv, true)
    }
}

impl FirewallBackend for UfwBackend {
    fn kind(&self) -> FirewallKind {
        FirewallKind::Ufw
    }

    fn allow(&self, rule: &FirewallRule) -> CommandResult {
        self.ufw(&["allow", &rule.to_string()])
    }

    fn deny(&self, rule: &FirewallRule) -> CommandResult {
        self.ufw(&["deny", &rule.to_string()])
    }

    fn close(&self, rule: &FirewallRule) -> CommandResult {
        self.ufw(&["delete", "allow", &rule.to_string()])
    }

    fn enable(&self) -> CommandResult {
        // Keep SSH reachable before the default-deny policy kicks in
        let ssh = self.ufw(&["allow", "ssh"]);
        if !ssh.success {
            return ssh;
        }
        self.ufw(&["--force", "enable"])
    }

    fn disable(&self) -> CommandResult {
        self.ufw(&["disable"])
    }

    fn status(&self) -> CommandResult {
        self.ufw(&["status", "verbose"])
    }

    fn list_rules(&self) -> CommandResult {
        self.ufw(&["status", "numbered"])
    }

    fn is_active(&self) -> bool {
        let result = self.ufw(&["status"]);
        result.success && result.stdout.contains("Status: active")
    }
}
