//! Status command implementation.

use anyhow::Result;
use serde::Serialize;

use crate::context::Context;
use crate::fail2ban;
use crate::service::Systemd;

#[derive(Debug, Serialize)]
struct StatusReport {
    version: &'static str,
    distro: String,
    family: Option<String>,
    package_manager: Option<String>,
    firewall: Option<String>,
    firewall_active: bool,
    nginx: String,
    sites: usize,
    sites_enabled: usize,
    fail2ban: String,
    certbot_installed: bool,
}

fn collect(ctx: &Context) -> StatusReport {
    let systemd = Systemd::new(ctx.runner().clone());
    let firewall = ctx.firewall().ok();
    let sites = ctx.sites().list().unwrap_or_default();
    let distro = ctx.distro();

    StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        distro: if distro.version.is_empty() {
            distro.name.clone()
        } else {
            format!("{} {}", distro.name, distro.version)
        },
        family: ctx.family().ok().map(|f| format!("{:?}", f).to_lowercase()),
        package_manager: ctx.package_manager().ok().map(|pm| pm.to_string()),
        firewall: firewall.as_ref().map(|fw| fw.kind().to_string()),
        firewall_active: firewall.as_ref().is_some_and(|fw| fw.is_active()),
        nginx: systemd.state("nginx"),
        sites_enabled: sites.iter().filter(|s| s.enabled).count(),
        sites: sites.len(),
        fail2ban: systemd.state(fail2ban::SERVICE),
        certbot_installed: ctx.probe().has_binary("certbot"),
    }
}

/// Run the status command
pub fn run(ctx: &Context, json: bool) -> Result<()> {
    let report = collect(ctx);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let none = "not found".to_string();
    println!();
    println!("Zappy {}", report.version);
    println!("System:          {}", report.distro);
    println!(
        "Package manager: {}",
        report.package_manager.as_ref().unwrap_or(&none)
    );
    println!(
        "Firewall:        {}{}",
        report.firewall.as_ref().unwrap_or(&none),
        if report.firewall_active { " (active)" } else { "" }
    );
    println!("nginx:           {}", report.nginx);
    println!(
        "Sites:           {} ({} enabled)",
        report.sites, report.sites_enabled
    );
    println!("fail2ban:        {}", report.fail2ban);
    println!(
        "certbot:         {}",
        if report.certbot_installed { "installed" } else { "not installed" }
    );
    println!();

    Ok(())
}
