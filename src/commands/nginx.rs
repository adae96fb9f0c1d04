//! Nginx command implementation.

use anyhow::Result;

use super::{print_output, report};
use crate::cli::{NginxAction, SiteArgs};
use crate::context::Context;
use crate::nginx::{render, RedirectStatus, SiteParams, SiteSpec, TemplateKind};
use crate::service::Systemd;

/// Run the nginx command
pub fn run(action: NginxAction, ctx: &Context) -> Result<()> {
    match action {
        NginxAction::Install => install(ctx),
        NginxAction::List { json } => list(ctx, json),
        NginxAction::Add {
            site,
            overwrite,
            enable,
        } => add(ctx, &site, overwrite, enable),
        NginxAction::Templates => {
            for kind in TemplateKind::ALL {
                println!("{:<10} {}", kind.name(), kind.description());
            }
            Ok(())
        }
        NginxAction::Backups => {
            let backups = ctx.sites().backups()?;
            if backups.is_empty() {
                println!("No site backups.");
            }
            for backup in backups {
                println!("{}", backup.display());
            }
            Ok(())
        }
        NginxAction::Render { site } => {
            let spec = site_spec(&site)?;
            let settings = ctx.config().nginx.template_settings();
            print!("{}", render(spec.kind, &spec.domain, &spec.params, &settings)?);
            Ok(())
        }
        NginxAction::Enable { domain } => {
            ctx.require_root()?;
            ctx.sites().enable(&domain)?;
            println!("[OK] Enabled {}", domain);
            Ok(())
        }
        NginxAction::Disable { domain } => {
            ctx.require_root()?;
            ctx.sites().disable(&domain)?;
            println!("[OK] Disabled {}", domain);
            Ok(())
        }
        NginxAction::Delete { domain } => {
            ctx.require_root()?;
            let backup = ctx.sites().delete(&domain)?;
            println!("[OK] Deleted {} (backup: {})", domain, backup.display());
            Ok(())
        }
        NginxAction::View { domain } => {
            print!("{}", ctx.sites().view(&domain)?);
            Ok(())
        }
        NginxAction::Test => {
            let result = ctx.sites().test_config();
            print_output(&result);
            report(result, "nginx -t", "nginx configuration is valid")
        }
        NginxAction::Reload => {
            ctx.require_root()?;
            report(ctx.sites().reload(), "systemctl reload nginx", "nginx reloaded")
        }
        NginxAction::Status => {
            print_output(&ctx.sites().status());
            Ok(())
        }
    }
}

/// Build a site description from command-line arguments.
pub fn site_spec(args: &SiteArgs) -> Result<SiteSpec> {
    let kind: TemplateKind = args.template.parse()?;
    Ok(SiteSpec {
        domain: args.domain.trim().to_lowercase(),
        kind,
        params: SiteParams {
            upstream: args.upstream.clone(),
            root: args.root.clone(),
            redirect_target: args.target.clone(),
            redirect_status: RedirectStatus::try_from(args.status)?,
            php_fpm_socket: args.php_socket.clone(),
        },
    })
}

fn install(ctx: &Context) -> Result<()> {
    ctx.require_root()?;
    let installer = ctx.installer()?;
    installer.install(&["nginx"])?;
    Systemd::new(ctx.runner().clone())
        .enable_now("nginx")
        .check("systemctl enable --now nginx")?;
    println!("[OK] nginx installed and running");
    Ok(())
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let sites = ctx.sites().list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sites)?);
        return Ok(());
    }

    if sites.is_empty() {
        println!("No sites configured.");
        return Ok(());
    }

    println!("{:<40} {:<9} SSL", "DOMAIN", "ENABLED");
    for site in &sites {
        println!(
            "{:<40} {:<9} {}",
            site.name,
            if site.enabled { "yes" } else { "no" },
            if site.ssl { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn add(ctx: &Context, site: &SiteArgs, overwrite: bool, enable: bool) -> Result<()> {
    let spec = site_spec(site)?;
    ctx.require_root()?;

    let sites = ctx.sites();
    let path = sites.create(&spec, overwrite)?;
    println!("[OK] Wrote {} ({})", path.display(), spec.kind);

    if enable && !sites.is_enabled(&spec.domain) {
        sites.enable(&spec.domain)?;
        println!("[OK] Enabled {}", spec.domain);
    } else if !enable && !sites.is_enabled(&spec.domain) {
        println!("     Run 'zappy nginx enable {}' to activate it", spec.domain);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ZappyError;

    fn args(template: &str) -> SiteArgs {
        SiteArgs {
            domain: " App.Example.com ".to_string(),
            template: template.to_string(),
            upstream: Some("3000".to_string()),
            root: None,
            target: None,
            status: 301,
            php_socket: None,
        }
    }

    #[test]
    fn test_site_spec_from_args() {
        let spec = site_spec(&args("proxy_ws")).unwrap();
        assert_eq!(spec.domain, "app.example.com");
        assert_eq!(spec.kind, TemplateKind::ProxyWs);
        assert_eq!(spec.params.upstream.as_deref(), Some("3000"));
        assert_eq!(spec.params.redirect_status, RedirectStatus::Permanent);
    }

    #[test]
    fn test_site_spec_rejects_bad_input() {
        let err = site_spec(&args("wordpress")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::InvalidTemplate(_))
        ));

        let mut bad_status = args("redirect");
        bad_status.status = 307;
        let err = site_spec(&bad_status).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZappyError>(),
            Some(ZappyError::InvalidParameter(_))
        ));
    }
}
