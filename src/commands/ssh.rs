//! SSH command implementation.

use anyhow::Result;

use super::{mark, report};
use crate::cli::SshAction;
use crate::context::Context;
use crate::error::ZappyError;
use crate::ssh::{security_report, RootLogin, SshManager};
use crate::validation::validate_port;

/// Run the ssh command
pub fn run(action: SshAction, ctx: &Context) -> Result<()> {
    match action {
        SshAction::Status => status(ctx),
        SshAction::Port { port, restart } => {
            let port = validate_port(&port)?;
            ctx.require_root()?;
            let ssh = ctx.ssh();
            ssh.set_port(port)?;
            println!("[OK] SSH port set to {}", port);
            println!(
                "[WARN] Open it first: zappy firewall allow --port {} (keep this session open)",
                port
            );
            finish(ctx, &ssh, restart)
        }
        SshAction::RootLogin { value, restart } => {
            let value: RootLogin = value.parse().map_err(ZappyError::InvalidParameter)?;
            ctx.require_root()?;
            let ssh = ctx.ssh();
            ssh.set_root_login(value)?;
            println!("[OK] PermitRootLogin {}", value);
            finish(ctx, &ssh, restart)
        }
        SshAction::PasswordAuth { value, restart } => {
            let enabled = parse_yes_no(&value)?;
            ctx.require_root()?;
            let ssh = ctx.ssh();
            ssh.set_password_auth(enabled)?;
            println!(
                "[OK] PasswordAuthentication {}",
                if enabled { "yes" } else { "no" }
            );
            if !enabled {
                println!("[WARN] Make sure your SSH key works before closing this session");
            }
            finish(ctx, &ssh, restart)
        }
        SshAction::Harden { restart } => {
            ctx.require_root()?;
            let ssh = ctx.ssh();
            let backup = ssh.harden()?;
            println!("[OK] sshd hardened (backup: {})", backup.display());
            finish(ctx, &ssh, restart)
        }
    }
}

fn parse_yes_no(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" => Ok(true),
        "no" | "off" | "false" => Ok(false),
        other => Err(ZappyError::InvalidParameter(format!(
            "expected yes or no, got '{}'",
            other
        ))
        .into()),
    }
}

fn finish(ctx: &Context, ssh: &SshManager<'_>, restart: bool) -> Result<()> {
    let service = &ctx.config().ssh.service;
    if restart {
        report(
            ssh.restart(),
            &format!("systemctl restart {}", service),
            &format!("{} restarted", service),
        )
    } else {
        println!("     Run 'systemctl restart {}' to apply", service);
        Ok(())
    }
}

fn status(ctx: &Context) -> Result<()> {
    let ssh = ctx.ssh();
    let settings = ssh.settings()?;

    println!("{}", ssh.config_path().display());
    for check in security_report(&settings) {
        if check.ok {
            println!("{} {:<24} {}", mark(true), check.setting, check.value);
        } else {
            println!(
                "{} {:<24} {} ({})",
                mark(false),
                check.setting,
                check.value,
                check.advice
            );
        }
    }
    Ok(())
}
