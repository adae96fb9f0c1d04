//! Error types for Zappy.

use thiserror::Error;

use crate::utils::truncate;

/// Maximum stderr length kept in a [`ZappyError::CommandExecution`] message.
const MAX_STDERR_LEN: usize = 500;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZappyError {
    #[error("Unsupported system: {0}")]
    UnsupportedSystem(String),

    #[error("Command failed: {command}: {stderr}")]
    CommandExecution { command: String, stderr: String },

    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid template '{0}'. Valid templates: proxy, proxy-ws, static, php, redirect")]
    InvalidTemplate(String),

    #[error("Invalid upstream: {0}")]
    InvalidUpstream(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Invalid IP address: {0}")]
    InvalidIp(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("nginx configuration test failed: {0}")]
    ConfigSyntax(String),

    #[error("No configuration found for '{0}'")]
    SiteNotFound(String),

    #[error("Domain '{0}' is not enabled")]
    SiteNotEnabled(String),

    #[error("Domain '{0}' is already enabled")]
    AlreadyEnabled(String),

    #[error("Configuration for '{0}' already exists (use --overwrite to replace it)")]
    SiteExists(String),

    #[error("Permission denied: {0}")]
    Permission(String),
}

impl ZappyError {
    /// Build a `CommandExecution` error, keeping stderr readable.
    pub fn command(command: impl Into<String>, stderr: &str) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: truncate(stderr.trim(), MAX_STDERR_LEN),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZappyError>;
