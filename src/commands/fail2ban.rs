//! Fail2ban command implementation.

use anyhow::Result;

use super::{print_output, report};
use crate::cli::Fail2banAction;
use crate::context::Context;

/// Run the fail2ban command
pub fn run(action: Fail2banAction, ctx: &Context) -> Result<()> {
    match action {
        Fail2banAction::Install => {
            ctx.require_root()?;
            let installer = ctx.installer()?;
            ctx.fail2ban().install(&installer, ctx.family()?)?;
            println!("[OK] fail2ban installed (bantime 1h, maxretry 5, SSH jail enabled)");
            Ok(())
        }
        Fail2banAction::Status => {
            print_output(&ctx.fail2ban().status());
            Ok(())
        }
        Fail2banAction::Banned { json } => {
            let bans = ctx.fail2ban().banned()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bans)?);
                return Ok(());
            }
            for jail in &bans {
                if jail.banned.is_empty() {
                    println!("{}: no banned IPs", jail.jail);
                } else {
                    println!("{}: {}", jail.jail, jail.banned.join(", "));
                }
            }
            Ok(())
        }
        Fail2banAction::Unban { ip } => {
            ctx.require_root()?;
            let result = ctx.fail2ban().unban(&ip)?;
            report(result, "fail2ban-client unban", &format!("Unbanned {}", ip.trim()))
        }
    }
}
