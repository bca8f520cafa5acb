//! Centralized error types for mailpoll.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailpoll library.
#[derive(Error, Debug)]
pub enum MailError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration is missing a value or holds an invalid one.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Connecting or authenticating to the server failed.
    #[error("Could not connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The mailbox does not exist or could not be selected.
    #[error("Could not select mailbox '{mailbox}': {reason}")]
    Mailbox { mailbox: String, reason: String },

    /// The UNSEEN search failed.
    #[error("Search for unseen messages failed: {0}")]
    Search(String),

    /// A single message could not be fetched.
    #[error("Failed to fetch message UID {uid}: {reason}")]
    Fetch { uid: u32, reason: String },

    /// A MIME decoding error.
    #[error("MIME decoding error: {0}")]
    Decode(String),

    /// A batch flag update (or the expunge after it) failed.
    #[error("Failed to update flags for UIDs {uids}: {reason}")]
    FlagUpdate { uids: String, reason: String },

    /// The event sink rejected an event.
    #[error("Failed to emit event: {0}")]
    Emit(String),

    /// A mailbox operation was attempted without an open session.
    #[error("No open IMAP session")]
    NotConnected,
}

/// Convenience alias for `Result<T, MailError>`.
pub type Result<T> = std::result::Result<T, MailError>;

impl MailError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure reported by the transport underneath a session.
///
/// The session manager wraps it into the matching [`MailError`] variant
/// together with the UID or mailbox it concerned.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ProtocolError(pub String);

impl ProtocolError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<imap::Error> for ProtocolError {
    fn from(e: imap::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<native_tls::Error> for ProtocolError {
    fn from(e: native_tls::Error) -> Self {
        Self(format!("TLS error: {e}"))
    }
}
