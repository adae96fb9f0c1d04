//! Firewall command implementation.

use anyhow::Result;
use tracing::info;

use super::{print_output, report};
use crate::cli::{FirewallAction, RuleArgs};
use crate::cmd_abstraction::CommandResult;
use crate::context::Context;
use crate::distro::PackageManager;
use crate::error::ZappyError;
use crate::firewall::{FirewallBackend, FirewallKind, FirewallRule, Protocol};
use crate::validation::validate_port;

/// Run the firewall command
pub fn run(action: FirewallAction, ctx: &Context) -> Result<()> {
    match action {
        FirewallAction::Status => {
            let backend = ctx.firewall()?;
            println!("Backend: {}", backend.kind());
            print_output(&backend.status());
            Ok(())
        }
        FirewallAction::Rules => {
            print_output(&ctx.firewall()?.list_rules());
            Ok(())
        }
        FirewallAction::Enable => enable(ctx),
        FirewallAction::Disable => {
            ctx.require_root()?;
            let backend = ctx.firewall()?;
            report(backend.disable(), "firewall disable", "Firewall disabled")
        }
        FirewallAction::Allow { rule } => apply(ctx, &rule, "allow", |b, r| b.allow(r)),
        FirewallAction::Deny { rule } => apply(ctx, &rule, "deny", |b, r| b.deny(r)),
        FirewallAction::Close { rule } => apply(ctx, &rule, "close", |b, r| b.close(r)),
    }
}

/// Rules described by `--service` or `--port`/`--proto`.
///
/// `--proto both` expands to one TCP and one UDP rule.
pub fn rules_from_args(args: &RuleArgs) -> Result<Vec<FirewallRule>> {
    if let Some(service) = &args.service {
        return Ok(vec![FirewallRule::service(service.trim())?]);
    }

    let port = args
        .port
        .as_deref()
        .ok_or_else(|| ZappyError::InvalidParameter("pass --service or --port".to_string()))?;
    let port = validate_port(port)?;

    let protocols = match args.proto.trim().to_ascii_lowercase().as_str() {
        "both" => vec![Protocol::Tcp, Protocol::Udp],
        other => vec![other.parse::<Protocol>().map_err(ZappyError::InvalidParameter)?],
    };
    Ok(protocols
        .into_iter()
        .map(|protocol| FirewallRule::port(port, protocol))
        .collect())
}

fn apply<F>(ctx: &Context, args: &RuleArgs, verb: &str, op: F) -> Result<()>
where
    F: Fn(&dyn FirewallBackend, &FirewallRule) -> CommandResult,
{
    let rules = rules_from_args(args)?;
    ctx.require_root()?;
    let backend = ctx.firewall()?;

    for rule in &rules {
        report(
            op(backend.as_ref(), rule),
            &format!("firewall {} {}", verb, rule),
            &format!("{} {} ({})", verb, rule, backend.kind()),
        )?;
    }
    Ok(())
}

/// Backend to install when none is present.
fn preferred_backend(pm: PackageManager) -> FirewallKind {
    match pm {
        PackageManager::Apt | PackageManager::Pacman | PackageManager::Apk => FirewallKind::Ufw,
        PackageManager::Dnf | PackageManager::Yum | PackageManager::Zypper => {
            FirewallKind::Firewalld
        }
    }
}

fn enable(ctx: &Context) -> Result<()> {
    ctx.require_root()?;

    if ctx.firewall_kind().is_err() {
        let kind = preferred_backend(ctx.package_manager()?);
        info!("No firewall found, installing {}", kind.package());
        ctx.installer()?.install(&[kind.package()])?;
    }

    let backend = ctx.firewall()?;
    report(
        backend.enable(),
        "firewall enable",
        &format!("Firewall enabled ({}), SSH allowed", backend.kind()),
    )
}
