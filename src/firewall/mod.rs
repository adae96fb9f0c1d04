//! Firewall backends (UFW, firewalld).
//!
//! Logical operations (allow, deny, close, enable, disable, status, list) are
//! dispatched to whichever control tool the host has. Every backend runs its
//! commands through a [`Runner`], so tests can assert on the exact argv.

mod firewalld;
mod ufw;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use firewalld::FirewalldBackend;
pub use ufw::UfwBackend;

use crate::cmd_abstraction::{CommandResult, Runner};
use crate::distro::PathProbe;
use crate::error::{Result, ZappyError};

/// Supported firewall control tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallKind {
    Ufw,
    Firewalld,
}

impl FirewallKind {
    /// Control binary probed during detection.
    pub fn binary(&self) -> &'static str {
        match self {
            FirewallKind::Ufw => "ufw",
            FirewallKind::Firewalld => "firewall-cmd",
        }
    }

    /// Package providing the backend.
    pub fn package(&self) -> &'static str {
        match self {
            FirewallKind::Ufw => "ufw",
            FirewallKind::Firewalld => "firewalld",
        }
    }
}

impl fmt::Display for FirewallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirewallKind::Ufw => write!(f, "ufw"),
            FirewallKind::Firewalld => write!(f, "firewalld"),
        }
    }
}

/// Transport protocol of a port rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(format!("Invalid protocol '{}'. Valid values: tcp, udp", s)),
        }
    }
}

/// A single firewall rule target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirewallRule {
    /// A named service (`ssh`, `http`, `https`, ...)
    Service(String),
    /// A port with its protocol
    Port { port: u16, protocol: Protocol },
}

impl FirewallRule {
    /// Build a service rule, rejecting names that cannot be service names.
    pub fn service(name: &str) -> Result<Self> {
        let valid = !name.is_empty()
            && name.len() <= 64
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ZappyError::InvalidParameter(format!(
                "'{}' is not a valid service name",
                name
            )));
        }
        Ok(FirewallRule::Service(name.to_string()))
    }

    pub fn port(port: u16, protocol: Protocol) -> Self {
        FirewallRule::Port { port, protocol }
    }
}

impl fmt::Display for FirewallRule {
    /// UFW-style rule spec: `ssh` or `8080/tcp`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirewallRule::Service(name) => write!(f, "{}", name),
            FirewallRule::Port { port, protocol } => write!(f, "{}/{}", port, protocol),
        }
    }
}

/// Trait for firewall backends.
///
/// Mutations return the [`CommandResult`] of the whole operation; a
/// multi-step backend folds its steps into one result.
pub trait FirewallBackend: Send + Sync {
    fn kind(&self) -> FirewallKind;

    /// Open a service or port.
    fn allow(&self, rule: &FirewallRule) -> CommandResult;

    /// Explicitly reject a service or port.
    fn deny(&self, rule: &FirewallRule) -> CommandResult;

    /// Remove a previously added allow rule.
    fn close(&self, rule: &FirewallRule) -> CommandResult;

    /// Turn the firewall on.
    fn enable(&self) -> CommandResult;

    /// Turn the firewall off.
    fn disable(&self) -> CommandResult;

    /// Human-readable status.
    fn status(&self) -> CommandResult;

    /// Currently configured rules.
    fn list_rules(&self) -> CommandResult;

    /// Whether the firewall is currently filtering traffic.
    fn is_active(&self) -> bool;
}

/// Detect the available firewall backend (`ufw` first, then `firewall-cmd`).
pub fn detect_backend(probe: &dyn PathProbe) -> Result<FirewallKind> {
    [FirewallKind::Ufw, FirewallKind::Firewalld]
        .into_iter()
        .find(|kind| probe.has_binary(kind.binary()))
        .ok_or_else(|| {
            ZappyError::UnsupportedSystem(
                "no firewall backend available (ufw or firewall-cmd required)".to_string(),
            )
        })
}

/// Create the backend for `kind`, running its commands through `runner`.
pub fn create_backend(kind: FirewallKind, runner: Runner) -> Box<dyn FirewallBackend> {
    match kind {
        FirewallKind::Ufw => Box::new(UfwBackend::new(runner)),
        FirewallKind::Firewalld => Box::new(FirewalldBackend::new(runner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{MockCommandExecutor, Privilege};
    use std::sync::Arc;

    struct FakeProbe(&'static [&'static str]);

    impl PathProbe for FakeProbe {
        fn has_binary(&self, name: &str) -> bool {
            self.0.iter().any(|b| *b == name)
        }
    }

    #[test]
    fn test_detect_backend_prefers_ufw() {
        assert_eq!(
            detect_backend(&FakeProbe(&["firewall-cmd", "ufw"])).unwrap(),
            FirewallKind::Ufw
        );
        assert_eq!(
            detect_backend(&FakeProbe(&["firewall-cmd"])).unwrap(),
            FirewallKind::Firewalld
        );
    }

    #[test]
    fn test_detect_backend_none() {
        let err = detect_backend(&FakeProbe(&["iptables"])).unwrap_err();
        assert!(matches!(err, ZappyError::UnsupportedSystem(_)));
    }

    #[test]
    fn test_create_backend_kind() {
        let runner = Runner::new(Arc::new(MockCommandExecutor::new()), Privilege::None);
        assert_eq!(
            create_backend(FirewallKind::Ufw, runner.clone()).kind(),
            FirewallKind::Ufw
        );
        assert_eq!(
            create_backend(FirewallKind::Firewalld, runner).kind(),
            FirewallKind::Firewalld
        );
    }

    #[test]
    fn test_rule_display() {
        assert_eq!(FirewallRule::service("ssh").unwrap().to_string(), "ssh");
        assert_eq!(FirewallRule::port(8080, Protocol::Tcp).to_string(), "8080/tcp");
        assert_eq!(FirewallRule::port(53, Protocol::Udp).to_string(), "53/udp");
    }

    #[test]
    fn test_service_name_validation() {
        assert!(FirewallRule::service("http-alt").is_ok());
        assert!(FirewallRule::service("").is_err());
        assert!(matches!(
            FirewallRule::service("ssh;reboot"),
            Err(ZappyError::InvalidParameter(_))
        ));
        assert!(FirewallRule::service("a b").is_err());
    }

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("TCP".parse::<Protocol>().unwrap(), Protocol::Tcp);
        assert_eq!("udp".parse::<Protocol>().unwrap(), Protocol::Udp);
        assert!("icmp".parse::<Protocol>().is_err());
    }
}
