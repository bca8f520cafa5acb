//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the path given on the command line
//! 2. `$MAILPOLL_CONFIG` (environment variable)
//! 3. `~/.config/mailpoll/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailpoll\config.toml` (Windows)
//!
//! Unlike a viewer, the poller cannot run on defaults alone: the server
//! section has no usable default host or user, so a missing or invalid
//! file is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};
use crate::parser::decoder::DecodeOptions;
use crate::poller::PollOptions;
use crate::session::transport::ImapConnector;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub general: GeneralConfig,
    /// Server address and credentials.
    pub server: ServerConfig,
    /// Mailbox polling behavior.
    pub mailbox: MailboxConfig,
    /// Message decoding options.
    pub decode: DecodeConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Also write logs to this file.
    pub log_file: Option<PathBuf>,
}

/// Server address and credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// Defaults to 993 with TLS and 143 without.
    pub port: Option<u16>,
    /// Wrap the connection in TLS.
    pub secure: bool,
    /// Reject invalid server certificates.
    pub verify_cert: bool,
    pub user: String,
    /// Overridden by `$MAILPOLL_PASSWORD` when set.
    pub password: String,
    /// Connect, read and write timeout for the socket.
    pub timeout_secs: u64,
}

/// Mailbox polling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Mailbox to select.
    pub folder: String,
    /// Seconds between poll cycles.
    pub check_interval_secs: u64,
    /// UIDs per fetch chunk and per flag-update batch.
    pub fetch_count: usize,
    /// Delete and expunge messages after emitting them.
    pub delete: bool,
    /// Flag messages that failed to decode as processed anyway.
    pub mark_undecodable: bool,
}

/// Message decoding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Content type of the part used as the event message.
    pub content_type: String,
    /// Include attachment contents in events.
    pub save_attachments: bool,
    /// Lower-case header names in events.
    pub lowercase_headers: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            secure: true,
            verify_cert: true,
            user: String::new(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
            check_interval_secs: 300,
            fetch_count: 50,
            delete: false,
            mark_undecodable: false,
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            content_type: "text/plain".to_string(),
            save_attachments: false,
            lowercase_headers: true,
        }
    }
}

// ── Derived settings ────────────────────────────────────────────

impl ServerConfig {
    /// The configured port, or the IMAP default for the chosen transport.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.secure { 993 } else { 143 })
    }
}

impl Config {
    /// Check the values the poller cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(MailError::Config("server.host is required".into()));
        }
        if self.server.user.trim().is_empty() {
            return Err(MailError::Config("server.user is required".into()));
        }
        if self.mailbox.fetch_count == 0 {
            return Err(MailError::Config(
                "mailbox.fetch_count must be at least 1".into(),
            ));
        }
        if self.mailbox.check_interval_secs == 0 {
            return Err(MailError::Config(
                "mailbox.check_interval_secs must be at least 1".into(),
            ));
        }
        if !self.decode.content_type.contains('/') {
            return Err(MailError::Config(format!(
                "decode.content_type '{}' is not a MIME type",
                self.decode.content_type
            )));
        }
        Ok(())
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            content_type: self.decode.content_type.clone(),
            save_attachments: self.decode.save_attachments,
            lowercase_headers: self.decode.lowercase_headers,
        }
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            mailbox: self.mailbox.folder.clone(),
            interval: Duration::from_secs(self.mailbox.check_interval_secs),
            batch_size: self.mailbox.fetch_count,
            delete: self.mailbox.delete,
            mark_undecodable: self.mailbox.mark_undecodable,
        }
    }

    pub fn connector(&self) -> ImapConnector {
        ImapConnector {
            host: self.server.host.clone(),
            port: self.server.effective_port(),
            secure: self.server.secure,
            verify_cert: self.server.verify_cert,
            user: self.server.user.clone(),
            password: self.server.password.clone(),
            timeout: Duration::from_secs(self.server.timeout_secs.max(1)),
        }
    }
}

// ── Load ────────────────────────────────────────────────────────

/// The file [`load_config`] reads.
///
/// `explicit` takes precedence over the environment and standard locations.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p.to_path_buf()),
        None => config_file_path()
            .ok_or_else(|| MailError::Config("could not determine config file path".into())),
    }
}

/// Load and validate the configuration.
///
/// Runs before logging is set up, so it reports only through its result.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = resolve_config_path(explicit)?;
    let contents = std::fs::read_to_string(&path).map_err(|e| MailError::io(&path, e))?;
    let mut cfg = parse_config(&contents)?;

    if let Ok(password) = std::env::var("MAILPOLL_PASSWORD") {
        cfg.server.password = password;
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Parse a TOML document into a [`Config`], filling unset fields with defaults.
pub fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str::<Config>(contents).map_err(|e| MailError::Config(e.to_string()))
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILPOLL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailpoll").join("config.toml"))
}
