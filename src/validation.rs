//! Centralized validation functions for Zappy.
//!
//! Everything here runs before any file is written or any command is
//! started, so a rejected input never leaves a side effect behind.
//!
//! - Domains (nginx `server_name`, certbot `-d`)
//! - Ports and upstream targets
//! - Email addresses (certbot contact)
//! - IP addresses (fail2ban unban)

use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;

use crate::error::{Result, ZappyError};

/// Maximum length of a fully qualified domain name.
pub const MAX_DOMAIN_LEN: usize = 253;

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
            .expect("static domain regex")
    })
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static email regex")
    })
}

/// Validate a hostname usable as an nginx `server_name` and a file name.
///
/// # Examples
/// ```
/// use zappy::validation::validate_domain;
/// assert!(validate_domain("example.com").is_ok());
/// assert!(validate_domain("api.example.co.uk").is_ok());
/// assert!(validate_domain(".example.com").is_err());
/// assert!(validate_domain("exa mple.com").is_err());
/// ```
pub fn validate_domain(domain: &str) -> Result<()> {
    let invalid = |reason: &str| ZappyError::InvalidDomain {
        domain: domain.to_string(),
        reason: reason.to_string(),
    };

    if domain.is_empty() {
        return Err(invalid("domain cannot be empty"));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(invalid("domain name too long"));
    }
    if !domain_regex().is_match(domain) {
        return Err(invalid("invalid domain format"));
    }
    Ok(())
}

/// Parse and validate a TCP/UDP port (1-65535).
///
/// # Examples
/// ```
/// use zappy::validation::validate_port;
/// assert_eq!(validate_port("8080").unwrap(), 8080);
/// assert!(validate_port("0").is_err());
/// assert!(validate_port("70000").is_err());
/// ```
pub fn validate_port(port: &str) -> Result<u16> {
    let trimmed = port.trim();
    let value: u32 = trimmed
        .parse()
        .map_err(|_| ZappyError::InvalidPort(format!("'{}' is not a number", trimmed)))?;
    if !(1..=65535).contains(&value) {
        return Err(ZappyError::InvalidPort(format!(
            "{} is out of range (1-65535)",
            value
        )));
    }
    Ok(value as u16)
}

/// Validate an email address for certificate notifications.
pub fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() || !email_regex().is_match(email) {
        return Err(ZappyError::InvalidEmail(email.to_string()));
    }
    Ok(())
}

/// Validate an IP address string and return the parsed IpAddr.
///
/// # Examples
/// ```
/// use zappy::validation::validate_ip;
/// assert!(validate_ip("192.168.1.1").is_ok());
/// assert!(validate_ip("::1").is_ok());
/// assert!(validate_ip("invalid").is_err());
/// ```
pub fn validate_ip(ip_str: &str) -> Result<IpAddr> {
    ip_str
        .trim()
        .parse()
        .map_err(|_| ZappyError::InvalidIp(ip_str.to_string()))
}

/// Normalize a proxy target into a URL usable by `proxy_pass`.
///
/// - `"5001"` becomes `http://127.0.0.1:5001`
/// - `"localhost:5001"` becomes `http://localhost:5001`
/// - URLs with an `http://` or `https://` scheme are kept as-is
///
/// # Examples
/// ```
/// use zappy::validation::normalize_upstream;
/// assert_eq!(normalize_upstream("8080").unwrap(), "http://127.0.0.1:8080");
/// assert_eq!(normalize_upstream("app:3000").unwrap(), "http://app:3000");
/// assert_eq!(normalize_upstream("https://backend").unwrap(), "https://backend");
/// ```
pub fn normalize_upstream(target: &str) -> Result<String> {
    let target = target.trim();
    if target.is_empty() {
        return Err(ZappyError::InvalidUpstream(
            "backend target is required".to_string(),
        ));
    }
    if target.contains(char::is_whitespace) || target.contains(';') || target.contains('{') {
        return Err(ZappyError::InvalidUpstream(format!(
            "'{}' contains characters not allowed in proxy_pass",
            target
        )));
    }

    let lower = target.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(target.to_string());
    }

    if target.bytes().all(|b| b.is_ascii_digit()) {
        let port = validate_port(target)
            .map_err(|e| ZappyError::InvalidUpstream(e.to_string()))?;
        return Ok(format!("http://127.0.0.1:{}", port));
    }

    if let Some((_, port)) = target.rsplit_once(':') {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            validate_port(port).map_err(|e| ZappyError::InvalidUpstream(e.to_string()))?;
        }
    }

    Ok(format!("http://{}", target))
}
