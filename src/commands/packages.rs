//! Packages command implementation.

use anyhow::Result;
use tracing::warn;

use super::mark;
use crate::cli::PackagesAction;
use crate::context::Context;
use crate::packages::{find_tool, CATALOG};

/// Run the packages command
pub fn run(action: PackagesAction, ctx: &Context) -> Result<()> {
    match action {
        PackagesAction::List => list(ctx),
        PackagesAction::Install { tool } => install(ctx, &tool),
        PackagesAction::InstallMissing => install_missing(ctx),
    }
}

fn list(ctx: &Context) -> Result<()> {
    let installer = ctx.installer()?;
    for tool in CATALOG {
        let installed = installer.is_tool_installed(tool);
        println!(
            "{} {:<10} {}{}",
            mark(installed),
            tool.name,
            tool.description,
            if installed { "" } else { " (not installed)" }
        );
    }
    Ok(())
}

fn install(ctx: &Context, name: &str) -> Result<()> {
    let Some(tool) = find_tool(name) else {
        let names: Vec<&str> = CATALOG.iter().map(|t| t.name).collect();
        anyhow::bail!("Unknown tool '{}'. Available: {}", name, names.join(", "));
    };
    ctx.require_root()?;

    if ctx.installer()?.install_tool(tool)? {
        println!("[OK] Installed {}", tool.name);
    } else {
        println!("[OK] {} is already installed", tool.name);
    }
    Ok(())
}

fn install_missing(ctx: &Context) -> Result<()> {
    ctx.require_root()?;
    let installer = ctx.installer()?;

    let missing: Vec<_> = CATALOG
        .iter()
        .filter(|tool| !installer.is_tool_installed(tool))
        .collect();
    if missing.is_empty() {
        println!("[OK] All tools are already installed");
        return Ok(());
    }

    installer.refresh().check("package index refresh")?;

    let mut failed = Vec::new();
    for tool in missing {
        match installer.install_tool(tool) {
            Ok(_) => println!("[OK] Installed {}", tool.name),
            Err(e) => {
                warn!("{}", e);
                println!("[FAIL] {}", tool.name);
                failed.push(tool.name);
            }
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Failed to install: {}", failed.join(", "));
    }
    Ok(())
}
