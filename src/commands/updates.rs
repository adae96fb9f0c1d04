//! Automatic updates command implementation.

use anyhow::Result;

use super::print_output;
use crate::cli::UpdatesAction;
use crate::context::Context;

/// Run the updates command
pub fn run(action: UpdatesAction, ctx: &Context) -> Result<()> {
    match action {
        UpdatesAction::Setup => {
            ctx.require_root()?;
            let installer = ctx.installer()?;
            let tool = ctx.updates().setup(&installer, ctx.family()?)?;
            println!(
                "[OK] Automatic security updates enabled ({})",
                tool.package()
            );
            Ok(())
        }
        UpdatesAction::Status => {
            let status = ctx.updates().status(ctx.family()?)?;
            println!("{}:", status.tool.unit());
            print_output(&status.service);
            println!();
            print_output(&status.activity);
            Ok(())
        }
        UpdatesAction::Check => {
            ctx.require_root()?;
            let result = ctx.updates().check(ctx.family()?)?;
            print_output(&result);
            result.check("update check")?;
            Ok(())
        }
    }
}
