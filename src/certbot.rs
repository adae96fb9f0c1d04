//! Let's Encrypt certificates through certbot's nginx plugin.

use serde::Serialize;

use crate::cmd_abstraction::{CommandResult, Runner};
use crate::distro::PackageManager;
use crate::error::{Result, ZappyError};
use crate::nginx::SiteManager;
use crate::validation::{validate_domain, validate_email};

/// One entry of `certbot certificates`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    pub name: String,
    pub domains: Vec<String>,
    pub expiry: String,
    pub path: String,
}

/// Outcome of [`CertbotManager::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuance {
    pub result: CommandResult,
    /// Name of the existing certificate that was renewed instead.
    pub renewed: Option<String>,
}

/// Parse the human-readable output of `certbot certificates`.
pub fn parse_certificates(output: &str) -> Vec<CertificateInfo> {
    let mut certs = Vec::new();
    let mut current: Option<CertificateInfo> = None;

    for line in output.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "Certificate Name" => {
                if let Some(cert) = current.take() {
                    certs.push(cert);
                }
                current = Some(CertificateInfo {
                    name: value.to_string(),
                    ..Default::default()
                });
            }
            "Domains" => {
                if let Some(cert) = current.as_mut() {
                    cert.domains = value.split_whitespace().map(str::to_string).collect();
                }
            }
            "Expiry Date" => {
                if let Some(cert) = current.as_mut() {
                    cert.expiry = value.to_string();
                }
            }
            "Certificate Path" => {
                if let Some(cert) = current.as_mut() {
                    cert.path = value.to_string();
                }
            }
            _ => {}
        }
    }

    if let Some(cert) = current {
        certs.push(cert);
    }
    certs
}

/// Packages providing certbot and its nginx plugin.
pub fn packages(pm: PackageManager) -> &'static [&'static str] {
    match pm {
        PackageManager::Apt | PackageManager::Dnf | PackageManager::Yum | PackageManager::Zypper => {
            &["certbot", "python3-certbot-nginx"]
        }
        PackageManager::Pacman | PackageManager::Apk => &["certbot", "certbot-nginx"],
    }
}

/// A likely cause for a failed issuance, if the output reveals one.
pub fn failure_hint(result: &CommandResult) -> Option<&'static str> {
    let text = format!("{}{}", result.stdout, result.stderr);
    if text.contains("Challenge failed") || text.contains("challenge failed") {
        Some("DNS may not point to this server, or port 80 is not reachable")
    } else if text.contains("too many certificates") || text.contains("rateLimited") {
        Some("Let's Encrypt rate limit reached, try again later")
    } else {
        None
    }
}

fn validate_cert_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !valid {
        return Err(ZappyError::InvalidParameter(format!(
            "'{}' is not a valid certificate name",
            name
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CertbotManager {
    runner: Runner,
}

impl CertbotManager {
    pub fn new(runner: Runner) -> Self {
        Self { runner }
    }

    /// All certificates known to certbot.
    pub fn certificates(&self) -> Result<Vec<CertificateInfo>> {
        let result = self
            .runner
            .run_checked(&["certbot", "certificates"], true)?;
        Ok(parse_certificates(&result.stdout))
    }

    /// The certificate named after, or covering, `domain`.
    pub fn find_certificate(&self, domain: &str) -> Result<Option<CertificateInfo>> {
        Ok(self
            .certificates()?
            .into_iter()
            .find(|c| c.name == domain || c.domains.iter().any(|d| d == domain)))
    }

    /// Obtain a certificate for an enabled site and switch it to HTTPS.
    ///
    /// Renews instead when a certificate already exists. A failure leaves
    /// the HTTP site as it is.
    pub fn issue(&self, domain: &str, email: &str, sites: &SiteManager<'_>) -> Result<Issuance> {
        validate_domain(domain)?;
        validate_email(email)?;
        if !sites.is_enabled(domain) {
            return Err(ZappyError::SiteNotEnabled(domain.to_string()));
        }

        if let Some(existing) = self.find_certificate(domain)? {
            return Ok(Issuance {
                result: self.renew(Some(&existing.name), false),
                renewed: Some(existing.name),
            });
        }

        let result = self.runner.run(
            &[
                "certbot",
                "--nginx",
                "-d",
                domain,
                "--email",
                email,
                "--agree-tos",
                "--non-interactive",
                "--redirect",
            ],
            true,
        );
        Ok(Issuance {
            result,
            renewed: None,
        })
    }

    /// Renew all certificates, or only `name`.
    pub fn renew(&self, name: Option<&str>, dry_run: bool) -> CommandResult {
        if let Some(name) = name {
            if let Err(e) = validate_cert_name(name) {
                return CommandResult::failed(e.to_string());
            }
        }

        let mut argv = vec!["certbot", "renew"];
        if let Some(name) = name {
            argv.extend(["--cert-name", name]);
        }
        if dry_run {
            argv.push("--dry-run");
        }
        self.runner.run(&argv, true)
    }

    pub fn delete(&self, name: &str) -> Result<CommandResult> {
        validate_cert_name(name)?;
        Ok(self.runner.run(
            &["certbot", "delete", "--cert-name", name, "--non-interactive"],
            true,
        ))
    }

    /// Status of the systemd renewal timer.
    pub fn timer_status(&self) -> CommandResult {
        self.runner
            .run(&["systemctl", "status", "certbot.timer", "--no-pager"], false)
    }
}
