//! nginx server-block templates.
//!
//! Rendering is pure: it validates its inputs and returns the configuration
//! text. Writing, testing and reloading are done by the site manager.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Result, ZappyError};
use crate::validation::{normalize_upstream, validate_domain};

/// Kinds of server block Zappy can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// Reverse proxy to an HTTP upstream
    Proxy,
    /// Reverse proxy with WebSocket upgrade headers
    ProxyWs,
    /// Static files from a document root
    Static,
    /// PHP application behind PHP-FPM
    Php,
    /// Redirect every request to another origin
    Redirect,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::Proxy,
        TemplateKind::ProxyWs,
        TemplateKind::Static,
        TemplateKind::Php,
        TemplateKind::Redirect,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TemplateKind::Proxy => "proxy",
            TemplateKind::ProxyWs => "proxy-ws",
            TemplateKind::Static => "static",
            TemplateKind::Php => "php",
            TemplateKind::Redirect => "redirect",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TemplateKind::Proxy => "Reverse proxy",
            TemplateKind::ProxyWs => "Reverse proxy with WebSocket support",
            TemplateKind::Static => "Static file serving",
            TemplateKind::Php => "PHP application (php-fpm)",
            TemplateKind::Redirect => "HTTP redirect",
        }
    }

    /// Whether the kind forwards requests to an upstream.
    pub fn is_proxy(&self) -> bool {
        matches!(self, TemplateKind::Proxy | TemplateKind::ProxyWs)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateKind {
    type Err = ZappyError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| ZappyError::InvalidTemplate(s.to_string()))
    }
}

/// HTTP status used by the redirect template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectStatus {
    #[default]
    Permanent,
    Temporary,
}

impl RedirectStatus {
    pub fn code(&self) -> u16 {
        match self {
            RedirectStatus::Permanent => 301,
            RedirectStatus::Temporary => 302,
        }
    }
}

impl TryFrom<u16> for RedirectStatus {
    type Error = ZappyError;

    fn try_from(code: u16) -> Result<Self> {
        match code {
            301 => Ok(RedirectStatus::Permanent),
            302 => Ok(RedirectStatus::Temporary),
            other => Err(ZappyError::InvalidParameter(format!(
                "redirect status must be 301 or 302, got {}",
                other
            ))),
        }
    }
}

/// Per-site inputs. Which fields matter depends on the [`TemplateKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteParams {
    /// Port, `host:port` or URL (proxy kinds)
    pub upstream: Option<String>,
    /// Document root (static, php). Defaults to `<web_root>/<domain>`.
    pub root: Option<PathBuf>,
    /// Redirect destination. Defaults to `https://<domain>`.
    pub redirect_target: Option<String>,
    pub redirect_status: RedirectStatus,
    /// PHP-FPM socket or `host:port`, overriding the configured one
    pub php_fpm_socket: Option<String>,
}

/// Host-wide template defaults, taken from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSettings {
    pub log_dir: PathBuf,
    pub php_fpm_socket: String,
    pub web_root: PathBuf,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/log/nginx"),
            php_fpm_socket: "/run/php/php-fpm.sock".to_string(),
            web_root: PathBuf::from("/var/www"),
        }
    }
}

fn has_unsafe_chars(value: &str) -> bool {
    value
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '{' | '}' | '"' | '\'' | '$'))
}

fn document_root(domain: &str, params: &SiteParams, settings: &TemplateSettings) -> Result<PathBuf> {
    let root = params
        .root
        .clone()
        .unwrap_or_else(|| settings.web_root.join(domain));
    let text = root.to_string_lossy();
    if !root.is_absolute() || has_unsafe_chars(&text) {
        return Err(ZappyError::InvalidParameter(format!(
            "document root {:?} must be an absolute path without spaces or quotes",
            root
        )));
    }
    Ok(root)
}

fn fastcgi_target(params: &SiteParams, settings: &TemplateSettings) -> Result<String> {
    let socket = params
        .php_fpm_socket
        .as_deref()
        .unwrap_or(&settings.php_fpm_socket)
        .trim();
    if socket.is_empty() || has_unsafe_chars(socket) {
        return Err(ZappyError::InvalidParameter(format!(
            "invalid PHP-FPM socket '{}'",
            socket
        )));
    }
    Ok(match socket.strip_prefix("unix:") {
        Some(_) => socket.to_string(),
        None if socket.starts_with('/') => format!("unix:{}", socket),
        None => socket.to_string(),
    })
}

fn redirect_target(domain: &str, params: &SiteParams) -> Result<String> {
    let target = match params.redirect_target.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => format!("https://{}", domain),
    };
    let lower = target.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) || has_unsafe_chars(&target) {
        return Err(ZappyError::InvalidParameter(format!(
            "redirect target '{}' must be an http:// or https:// URL",
            target
        )));
    }
    Ok(target.trim_end_matches('/').to_string())
}

fn log_path(log_dir: &Path, domain: &str, suffix: &str) -> String {
    log_dir
        .join(format!("{}_{}.log", domain, suffix))
        .display()
        .to_string()
}

const PROXY_HEADERS: &str = "        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
";

fn proxy_body(upstream: &str, websocket: bool) -> String {
    let mut body = String::from("    location / {\n");
    let _ = writeln!(body, "        proxy_pass {};", upstream);
    body.push_str(PROXY_HEADERS);
    body.push('\n');
    if websocket {
        body.push_str("        # WebSocket support\n");
        body.push_str("        proxy_http_version 1.1;\n");
        body.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
        body.push_str("        proxy_set_header Connection \"upgrade\";\n\n");
        body.push_str("        proxy_connect_timeout 60s;\n");
        body.push_str("        proxy_send_timeout 86400s;\n");
        body.push_str("        proxy_read_timeout 86400s;\n");
    } else {
        body.push_str("        proxy_connect_timeout 60s;\n");
        body.push_str("        proxy_send_timeout 60s;\n");
        body.push_str("        proxy_read_timeout 60s;\n");
    }
    body.push_str("    }\n");
    body
}

fn static_body(root: &Path) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "    root {};", root.display());
    body.push_str("    index index.html index.htm;\n\n");
    body.push_str("    location / {\n        try_files $uri $uri/ =404;\n    }\n\n");
    body.push_str("    # Cache static assets\n");
    body.push_str("    location ~* \\.(jpg|jpeg|png|gif|ico|css|js|woff2?)$ {\n");
    body.push_str("        expires 30d;\n");
    body.push_str("        add_header Cache-Control \"public, immutable\";\n");
    body.push_str("    }\n\n");
    body.push_str("    add_header X-Frame-Options \"SAMEORIGIN\" always;\n");
    body.push_str("    add_header X-Content-Type-Options \"nosniff\" always;\n");
    body
}

fn php_body(root: &Path, fastcgi_pass: &str) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "    root {};", root.display());
    body.push_str("    index index.php index.html index.htm;\n\n");
    body.push_str("    location / {\n        try_files $uri $uri/ /index.php?$query_string;\n    }\n\n");
    body.push_str("    location ~ \\.php$ {\n");
    body.push_str("        include snippets/fastcgi-php.conf;\n");
    let _ = writeln!(body, "        fastcgi_pass {};", fastcgi_pass);
    body.push_str("        fastcgi_param SCRIPT_FILENAME $document_root$fastcgi_script_name;\n");
    body.push_str("        include fastcgi_params;\n");
    body.push_str("    }\n\n");
    body.push_str("    # Hidden files (.git, .env, ...)\n");
    body.push_str("    location ~ /\\. {\n        deny all;\n    }\n");
    body
}

/// Render the server block for `domain`.
///
/// Fails before producing anything if the domain, the kind's target or a
/// path is unusable.
pub fn render(
    kind: TemplateKind,
    domain: &str,
    params: &SiteParams,
    settings: &TemplateSettings,
) -> Result<String> {
    validate_domain(domain)?;

    let body = match kind {
        TemplateKind::Proxy | TemplateKind::ProxyWs => {
            let upstream = params.upstream.as_deref().ok_or_else(|| {
                ZappyError::InvalidUpstream(format!("template '{}' requires a backend target", kind))
            })?;
            let upstream = normalize_upstream(upstream)?;
            proxy_body(&upstream, kind == TemplateKind::ProxyWs)
        }
        TemplateKind::Static => static_body(&document_root(domain, params, settings)?),
        TemplateKind::Php => php_body(
            &document_root(domain, params, settings)?,
            &fastcgi_target(params, settings)?,
        ),
        TemplateKind::Redirect => format!(
            "    return {} {}$request_uri;\n",
            params.redirect_status.code(),
            redirect_target(domain, params)?
        ),
    };

    let mut config = String::from("server {\n");
    config.push_str("    listen 80;\n");
    config.push_str("    listen [::]:80;\n");
    let _ = writeln!(config, "    server_name {};\n", domain);
    let _ = writeln!(
        config,
        "    error_log {};",
        log_path(&settings.log_dir, domain, "error")
    );
    let _ = writeln!(
        config,
        "    access_log {};\n",
        log_path(&settings.log_dir, domain, "access")
    );
    config.push_str(&body);
    config.push_str("}\n");
    Ok(config)
}
