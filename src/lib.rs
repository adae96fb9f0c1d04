//! # Zappy - VPS hardening and service deployment toolbox
//!
//! Detects the host's package manager and firewall, generates nginx server
//! blocks from templates and manages their lifecycle, obtains certificates
//! with certbot, and applies common hardening (fail2ban, sshd, automatic
//! security updates).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Zappy                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap) -> commands -> Context (config + detection)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Managers                                                   │
//! │    ├── nginx: templates + sites-available/enabled           │
//! │    ├── certbot, fail2ban, ssh, updates, packages, monitor   │
//! │    └── firewall (FirewallBackend trait): ufw, firewalld     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runner (sudo, echo) -> CommandExecutor trait               │
//! │  FileSystem trait, BackupStore                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use zappy::cmd_abstraction::{Privilege, Runner};
//! use zappy::fs_abstraction::real_fs;
//! use zappy::nginx::{SiteManager, SiteParams, SiteSpec, TemplateKind, TemplateSettings};
//!
//! fn main() -> anyhow::Result<()> {
//!     let sites = SiteManager::new(
//!         real_fs(),
//!         Runner::system(Privilege::detect()),
//!         "/etc/nginx/sites-available",
//!         "/etc/nginx/sites-enabled",
//!         TemplateSettings::default(),
//!         "/var/backups/zappy",
//!     );
//!     let spec = SiteSpec {
//!         domain: "app.example.com".to_string(),
//!         kind: TemplateKind::Proxy,
//!         params: SiteParams {
//!             upstream: Some("3000".to_string()),
//!             ..Default::default()
//!         },
//!     };
//!     sites.create(&spec, false)?;
//!     sites.enable(&spec.domain)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`backup`] - Timestamped backups of edited files
//! - [`certbot`] - Let's Encrypt certificates
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - External command execution
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`context`] - Per-invocation configuration and detection
//! - [`distro`] - Package manager and distribution detection
//! - [`fail2ban`] - fail2ban setup and bans
//! - [`firewall`] - Firewall backends (ufw, firewalld)
//! - [`monitor`] - Read-only resource, service, network and log views
//! - [`nginx`] - Server block templates and site management
//! - [`packages`] - Package installation and the tool catalog
//! - [`ssh`] - sshd configuration and hardening
//! - [`updates`] - Automatic security updates

pub mod backup;
pub mod certbot;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod context;
pub mod distro;
pub mod error;
pub mod fail2ban;
pub mod firewall;
pub mod fs_abstraction;
pub mod monitor;
pub mod nginx;
pub mod packages;
pub mod service;
pub mod ssh;
pub mod updates;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use context::Context;
pub use error::ZappyError;
