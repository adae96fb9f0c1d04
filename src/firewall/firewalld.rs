//! firewalld backend implementation.
//!
//! Rule changes are written to the permanent configuration and then applied
//! with `firewall-cmd --reload`. The reload only runs when the permanent
//! change succeeded, and the operation succeeds only if both steps do.

use tracing::warn;

use super::{FirewallBackend, FirewallKind, FirewallRule};
use crate::cmd_abstraction::{CommandResult, Runner};

/// firewalld backend.
#[derive(Debug, Clone)]
pub struct FirewalldBackend {
    runner: Runner,
}

impl FirewalldBackend {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    fn firewall_cmd(&self, args: &[&str]) -> CommandResult {
        let mut argv = vec!["firewall-cmd"];
        argv.extend_from_slice(args);
        self.runner.run(&argv, true)
    }

    /// Run a permanent change, then reload.
    fn mutate_and_reload(&self, change: &str) -> CommandResult {
        let staged = self.firewall_cmd(&[change, "--permanent"]);
        if !staged.success {
            return staged;
        }

        let reload = self.firewall_cmd(&["--reload"]);
        if reload.success {
            return CommandResult {
                stdout: format!("{}{}", staged.stdout, reload.stdout),
                ..reload
            };
        }

        warn!("firewalld rule staged but reload failed: {}", reload.stderr.trim());
        CommandResult {
            stdout: staged.stdout,
            stderr: format!("rule staged, not applied: {}", reload.stderr.trim()),
            success: false,
            code: reload.code,
        }
    }

    fn reject_rich_rule(rule: &FirewallRule) -> String {
        match rule {
            FirewallRule::Service(name) => {
                format!("--add-rich-rule=rule service name=\"{}\" reject", name)
            }
            FirewallRule::Port { port, protocol } => format!(
                "--add-rich-rule=rule port port=\"{}\" protocol=\"{}\" reject",
                port, protocol
            ),
        }
    }
}

impl FirewallBackend for FirewalldBackend {
    fn kind(&self) -> FirewallKind {
        FirewallKind::Firewalld
    }

    fn allow(&self, rule: &FirewallRule) -> CommandResult {
        let change = match rule {
            FirewallRule::Service(name) => format!("--add-service={}", name),
            FirewallRule::Port { .. } => format!("--add-port={}", rule),
        };
        self.mutate_and_reload(&change)
    }

    fn deny(&self, rule: &FirewallRule) -> CommandResult {
        self.mutate_and_reload(&Self::reject_rich_rule(rule))
    }

    fn close(&self, rule: &FirewallRule) -> CommandResult {
        let change = match rule {
            FirewallRule::Service(name) => format!("--remove-service={}", name),
            FirewallRule::Port { .. } => format!("--remove-port={}", rule),
        };
        self.mutate_and_reload(&change)
    }

    fn enable(&self) -> CommandResult {
        self.runner
            .run(&["systemctl", "enable", "--now", "firewalld"], true)
    }

    fn disable(&self) -> CommandResult {
        self.runner
            .run(&["systemctl", "disable", "--now", "firewalld"], true)
    }

    fn status(&self) -> CommandResult {
        self.firewall_cmd(&["--list-all"])
    }

    fn list_rules(&self) -> CommandResult {
        let services = self.firewall_cmd(&["--list-services"]);
        if !services.success {
            return services;
        }
        let ports = self.firewall_cmd(&["--list-ports"]);
        CommandResult {
            stdout: format!(
                "Services: {}\nPorts: {}\n",
                services.stdout.trim(),
                ports.stdout.trim()
            ),
            ..ports
        }
    }

    fn is_active(&self) -> bool {
        let result = self.firewall_cmd(&["--state"]);
        result.success && result.stdout.trim() == "running"
    }
}
