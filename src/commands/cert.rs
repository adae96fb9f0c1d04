//! Certificate command implementation.

use anyhow::Result;
use tracing::warn;

use super::{print_output, report};
use crate::certbot::{self, CertificateInfo, Issuance};
use crate::cli::CertAction;
use crate::context::Context;
use crate::error::ZappyError;

/// Run the cert command
pub fn run(action: CertAction, ctx: &Context) -> Result<()> {
    match action {
        CertAction::Install => install(ctx),
        CertAction::Issue { domain, email } => issue(ctx, &domain, email),
        CertAction::List { json } => list(ctx, json),
        CertAction::Renew { name, dry_run } => {
            ctx.require_root()?;
            let result = ctx.certbot().renew(name.as_deref(), dry_run);
            print_output(&result);
            let done = match (&name, dry_run) {
                (_, true) => "Renewal dry run succeeded".to_string(),
                (Some(name), false) => format!("Renewed {}", name),
                (None, false) => "Certificates renewed".to_string(),
            };
            report(result, "certbot renew", &done)
        }
        CertAction::Delete { name } => {
            ctx.require_root()?;
            let result = ctx.certbot().delete(&name)?;
            report(result, "certbot delete", &format!("Deleted certificate {}", name))
        }
        CertAction::Timer => {
            print_output(&ctx.certbot().timer_status());
            Ok(())
        }
    }
}

fn install(ctx: &Context) -> Result<()> {
    ctx.require_root()?;
    let installer = ctx.installer()?;
    installer.install(certbot::packages(installer.package_manager()))?;
    println!("[OK] certbot installed");
    Ok(())
}

/// The email to register with: the flag, else the remembered one.
fn contact_email(flag: Option<String>, remembered: &str) -> Result<String> {
    match flag {
        Some(email) => Ok(email.trim().to_string()),
        None if !remembered.is_empty() => Ok(remembered.to_string()),
        None => Err(ZappyError::InvalidEmail(
            "no email configured, pass --email".to_string(),
        )
        .into()),
    }
}

fn issue(ctx: &Context, domain: &str, email: Option<String>) -> Result<()> {
    let email = contact_email(email, &ctx.config().certbot.email)?;
    ctx.require_root()?;

    let sites = ctx.sites();
    let issuance = ctx.certbot().issue(domain, &email, &sites)?;
    let result = &issuance.result;
    print_output(result);

    if !result.success {
        if let Some(hint) = certbot::failure_hint(result) {
            println!("[FAIL] {}", hint);
        }
        println!("     The HTTP site for {} is unchanged", domain);
        result.clone().check("certbot")?;
    }
    println!("[OK] {}", issued_message(domain, &issuance));

    if ctx.config().certbot.email != email {
        let mut config = ctx.config().clone();
        config.certbot.email = email;
        if let Err(e) = config.save(ctx.config_path()) {
            warn!("Could not remember the certbot email: {:#}", e);
        }
    }
    Ok(())
}

fn issued_message(domain: &str, issuance: &Issuance) -> String {
    match &issuance.renewed {
        Some(name) => format!("Renewed existing certificate {} for {}", name, domain),
        None => format!("HTTPS enabled for {}", domain),
    }
}

fn list(ctx: &Context, json: bool) -> Result<()> {
    let certs: Vec<CertificateInfo> = ctx.certbot().certificates()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&certs)?);
        return Ok(());
    }

    if certs.is_empty() {
        println!("No certificates found.");
        return Ok(());
    }

    for cert in &certs {
        println!("{}", cert.name);
        println!("  Domains: {}", cert.domains.join(" "));
        println!("  Expires: {}", cert.expiry);
    }
    Ok(())
}
