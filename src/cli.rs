//! CLI argument parsing with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "zappy")]
#[command(author, version, about = "VPS hardening and service deployment toolbox")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "/etc/zappy/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output, every command run)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default configuration file
    Init {
        /// Replace an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Show detected system and service status
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage nginx and its sites
    Nginx {
        #[command(subcommand)]
        action: NginxAction,
    },

    /// Manage Let's Encrypt certificates
    Cert {
        #[command(subcommand)]
        action: CertAction,
    },

    /// Manage the firewall (ufw or firewalld)
    Firewall {
        #[command(subcommand)]
        action: FirewallAction,
    },

    /// Manage fail2ban
    Fail2ban {
        #[command(subcommand)]
        action: Fail2banAction,
    },

    /// Inspect and harden the SSH daemon
    Ssh {
        #[command(subcommand)]
        action: SshAction,
    },

    /// Configure automatic security updates
    Updates {
        #[command(subcommand)]
        action: UpdatesAction,
    },

    /// Install common command-line tools
    Packages {
        #[command(subcommand)]
        action: PackagesAction,
    },

    /// Show resources, services, network and logs
    System {
        #[command(subcommand)]
        action: SystemAction,
    },

    /// Show version
    Version,
}

/// Options shared by `nginx add` and `nginx render`.
#[derive(Args, Clone, Debug)]
pub struct SiteArgs {
    /// Domain name (server_name)
    pub domain: String,

    /// Template: proxy, proxy-ws, static, php, redirect
    #[arg(long, short, default_value = "proxy")]
    pub template: String,

    /// Upstream for proxy templates (port, host:port or URL)
    #[arg(long)]
    pub upstream: Option<String>,

    /// Document root for static and php templates
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Target URL for the redirect template
    #[arg(long)]
    pub target: Option<String>,

    /// Redirect status code (301 or 302)
    #[arg(long, default_value = "301")]
    pub status: u16,

    /// PHP-FPM socket or host:port (defaults to the configured one)
    #[arg(long)]
    pub php_socket: Option<String>,
}

#[derive(Subcommand)]
pub enum NginxAction {
    /// Install nginx
    Install,
    /// List configured sites
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Create a site from a template
    Add {
        #[command(flatten)]
        site: SiteArgs,
        /// Replace an existing configuration
        #[arg(long)]
        overwrite: bool,
        /// Enable the site right away
        #[arg(long)]
        enable: bool,
    },
    /// List available site templates
    Templates,
    /// List backups of site configurations, newest first
    Backups,
    /// Print a generated configuration without writing it
    Render {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// Enable a site
    Enable { domain: String },
    /// Disable a site
    Disable { domain: String },
    /// Delete a site (a backup is kept)
    Delete { domain: String },
    /// Show a site's configuration
    View { domain: String },
    /// Run nginx -t
    Test,
    /// Reload nginx
    Reload,
    /// Show the nginx service status
    Status,
}

#[derive(Subcommand)]
pub enum CertAction {
    /// Install certbot and its nginx plugin
    Install,
    /// Obtain a certificate for an enabled site
    Issue {
        domain: String,
        /// Contact email (remembered in the config file)
        #[arg(long)]
        email: Option<String>,
    },
    /// List certificates
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Renew certificates
    Renew {
        /// Only renew this certificate
        #[arg(long)]
        name: Option<String>,
        /// Test renewal without saving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete a certificate
    Delete { name: String },
    /// Show the renewal timer status
    Timer,
}

/// A service name or a port, as accepted by allow/deny/close.
#[derive(Args, Clone, Debug)]
pub struct RuleArgs {
    /// Service name (ssh, http, https, ...)
    #[arg(long, required_unless_present = "port", conflicts_with = "port")]
    pub service: Option<String>,

    /// Port number
    #[arg(long)]
    pub port: Option<String>,

    /// Protocol for --port: tcp, udp or both
    #[arg(long, default_value = "tcp")]
    pub proto: String,
}

#[derive(Subcommand)]
pub enum FirewallAction {
    /// Show firewall status
    Status,
    /// Enable the firewall (SSH is allowed first)
    Enable,
    /// Disable the firewall
    Disable,
    /// Allow a service or port
    Allow {
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Reject a service or port
    Deny {
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// Remove an allow rule
    Close {
        #[command(flatten)]
        rule: RuleArgs,
    },
    /// List configured rules
    Rules,
}

#[derive(Subcommand)]
pub enum Fail2banAction {
    /// Install fail2ban with the default jails
    Install,
    /// Show fail2ban status
    Status,
    /// List banned IPs per jail
    Banned {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Unban an IP address
    Unban { ip: String },
}

#[derive(Subcommand)]
pub enum SshAction {
    /// Show the security-relevant sshd settings
    Status,
    /// Change the SSH port
    Port {
        port: String,
        /// Restart sshd afterwards
        #[arg(long)]
        restart: bool,
    },
    /// Set PermitRootLogin (no, prohibit-password, yes)
    RootLogin {
        value: String,
        #[arg(long)]
        restart: bool,
    },
    /// Enable or disable password authentication (yes, no)
    PasswordAuth {
        value: String,
        #[arg(long)]
        restart: bool,
    },
    /// Apply the recommended hardening settings
    Harden {
        #[arg(long)]
        restart: bool,
    },
}

#[derive(Subcommand)]
pub enum UpdatesAction {
    /// Install and enable automatic security updates
    Setup,
    /// Show the automatic update service status
    Status,
    /// List pending updates
    Check,
}

#[derive(Subcommand)]
pub enum PackagesAction {
    /// List catalog tools and whether they are installed
    List,
    /// Install one catalog tool
    Install { tool: String },
    /// Install every catalog tool not yet present
    InstallMissing,
}

#[derive(Subcommand)]
pub enum SystemAction {
    /// CPU, memory, disk and load
    Resources,
    /// Running service units
    Services {
        /// Only show failed units
        #[arg(long)]
        failed: bool,
    },
    /// Listening ports, connections and addresses
    Network,
    /// Recent log lines
    Logs {
        /// Log to show: system, nginx, ssh, kernel
        #[arg(default_value = "system")]
        source: String,
        /// Number of lines
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}
