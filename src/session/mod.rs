//! Session management: one IMAP connection at a time.
//!
//! [`SessionManager`] is a thin, retry-free state holder. Every failure is
//! returned to the caller, which owns the retry timing. Transport details sit
//! behind two traits so the manager can be driven without a network:
//! [`Connector`] opens authenticated sessions and [`MailboxSession`] exposes
//! the protocol commands the poller needs.

pub mod transport;

use tracing::{debug, warn};

use crate::error::{MailError, ProtocolError, Result};

/// Transport result used by the session traits.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// An authenticated session with the mail server.
pub trait MailboxSession {
    /// `SELECT` a mailbox.
    fn select_mailbox(&mut self, mailbox: &str) -> ProtocolResult<()>;
    /// `UID SEARCH UNSEEN`, in any order.
    fn search_unseen(&mut self) -> ProtocolResult<Vec<u32>>;
    /// `UID FETCH <uid> BODY.PEEK[]`. `None` when the server returned no body.
    fn fetch_raw(&mut self, uid: u32) -> ProtocolResult<Option<Vec<u8>>>;
    /// `UID STORE <uid_set> +FLAGS.SILENT (<flags>)`.
    fn add_flags(&mut self, uid_set: &str, flags: &str) -> ProtocolResult<()>;
    /// `EXPUNGE`.
    fn expunge(&mut self) -> ProtocolResult<()>;
    /// `NOOP`.
    fn noop(&mut self) -> ProtocolResult<()>;
    /// `LOGOUT`.
    fn logout(&mut self) -> ProtocolResult<()>;
}

impl<S: MailboxSession + ?Sized> MailboxSession for Box<S> {
    fn select_mailbox(&mut self, mailbox: &str) -> ProtocolResult<()> {
        (**self).select_mailbox(mailbox)
    }
    fn search_unseen(&mut self) -> ProtocolResult<Vec<u32>> {
        (**self).search_unseen()
    }
    fn fetch_raw(&mut self, uid: u32) -> ProtocolResult<Option<Vec<u8>>> {
        (**self).fetch_raw(uid)
    }
    fn add_flags(&mut self, uid_set: &str, flags: &str) -> ProtocolResult<()> {
        (**self).add_flags(uid_set, flags)
    }
    fn expunge(&mut self) -> ProtocolResult<()> {
        (**self).expunge()
    }
    fn noop(&mut self) -> ProtocolResult<()> {
        (**self).noop()
    }
    fn logout(&mut self) -> ProtocolResult<()> {
        (**self).logout()
    }
}

/// Opens authenticated sessions. Holds the host, credentials and transport
/// options.
pub trait Connector {
    type Session: MailboxSession;

    /// Connect and log in.
    fn connect(&self) -> ProtocolResult<Self::Session>;

    /// Human-readable endpoint for logs and errors, e.g. `imap.example.com:993`.
    fn endpoint(&self) -> String;
}

/// Outcome of [`SessionManager::mark_processed`].
#[derive(Debug, Default)]
pub struct MarkReport {
    /// UIDs whose batch was flagged successfully.
    pub flagged: Vec<u32>,
    /// One entry per failed batch (and for a failed expunge).
    pub failures: Vec<MailError>,
}

/// Owns at most one open session.
pub struct SessionManager<C: Connector> {
    connector: C,
    session: Option<C::Session>,
    mailbox: Option<String>,
    batch_size: usize,
}

impl<C: Connector> SessionManager<C> {
    /// `batch_size` bounds the number of UIDs per flag-update command.
    pub fn new(connector: C, batch_size: usize) -> Self {
        Self {
            connector,
            session: None,
            mailbox: None,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// The currently selected mailbox, if any.
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.mailbox.as_deref()
    }

    /// Open a new authenticated session, dropping any existing one first.
    pub fn connect_and_authenticate(&mut self) -> Result<()> {
        self.disconnect();
        let endpoint = self.connector.endpoint();
        debug!(%endpoint, "Connecting");
        let session = self
            .connector
            .connect()
            .map_err(|e| MailError::Connection {
                endpoint,
                reason: e.to_string(),
            })?;
        self.session = Some(session);
        Ok(())
    }

    /// Health check for a session kept open across cycles.
    ///
    /// Returns `false` (and drops the session) when `NOOP` fails.
    pub fn is_alive(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.noop() {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "NOOP failed, dropping session");
                self.disconnect();
                false
            }
        }
    }

    pub fn select_mailbox(&mut self, name: &str) -> Result<()> {
        let session = self.session.as_mut().ok_or(MailError::NotConnected)?;
        session
            .select_mailbox(name)
            .map_err(|e| MailError::Mailbox {
                mailbox: name.to_string(),
                reason: e.to_string(),
            })?;
        self.mailbox = Some(name.to_string());
        Ok(())
    }

    /// UIDs of messages without `\Seen`, ascending.
    pub fn search_unseen(&mut self) -> Result<Vec<u32>> {
        let session = self.session.as_mut().ok_or(MailError::NotConnected)?;
        let mut uids = session
            .search_unseen()
            .map_err(|e| MailError::Search(e.to_string()))?;
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    /// Raw bytes of one message. Fetching does not set `\Seen`.
    pub fn fetch(&mut self, uid: u32) -> Result<Vec<u8>> {
        let session = self.session.as_mut().ok_or(MailError::NotConnected)?;
        match session.fetch_raw(uid) {
            Ok(Some(raw)) => Ok(raw),
            Ok(None) => Err(MailError::Fetch {
                uid,
                reason: "server returned no message body".into(),
            }),
            Err(e) => Err(MailError::Fetch {
                uid,
                reason: e.to_string(),
            }),
        }
    }

    /// Flag `uids` as seen, and as deleted when `delete` is set.
    ///
    /// Flags are stored in batches of [`batch_size`](Self::batch_size). A
    /// failed batch is reported once and does not stop later batches. When
    /// deleting, one `EXPUNGE` follows the batches if any of them succeeded.
    pub fn mark_processed(&mut self, uids: &[u32], delete: bool) -> MarkReport {
        let mut report = MarkReport::default();
        if uids.is_empty() {
            return report;
        }

        let Some(session) = self.session.as_mut() else {
            report.failures.push(MailError::FlagUpdate {
                uids: uid_set(uids),
                reason: MailError::NotConnected.to_string(),
            });
            return report;
        };

        let flags = if delete { "\\Seen \\Deleted" } else { "\\Seen" };
        for batch in uids.chunks(self.batch_size) {
            let set = uid_set(batch);
            match session.add_flags(&set, flags) {
                Ok(()) => report.flagged.extend_from_slice(batch),
                Err(e) => report.failures.push(MailError::FlagUpdate {
                    uids: set,
                    reason: e.to_string(),
                }),
            }
        }

        if delete && !report.flagged.is_empty() {
            if let Err(e) = session.expunge() {
                report.failures.push(MailError::FlagUpdate {
                    uids: uid_set(&report.flagged),
                    reason: format!("expunge failed: {e}"),
                });
            }
        }

        report
    }

    /// Log out and close the connection. Never fails; errors from an
    /// already broken connection are only logged.
    pub fn disconnect(&mut self) {
        self.mailbox = None;
        if let Some(mut session) = self.session.take() {
            match session.logout() {
                Ok(()) => debug!("Logged out"),
                Err(e) => warn!(error = %e, "Logout failed, closing connection anyway"),
            }
            // dropping the session closes the stream
        }
    }
}

impl<C: Connector> Drop for SessionManager<C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Comma-separated UID set for IMAP commands.
pub fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
