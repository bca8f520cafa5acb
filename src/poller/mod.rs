//! The poll loop: connect, search unseen, fetch, decode, emit, flag, sleep.
//!
//! The loop is a small state machine driven from one thread:
//!
//! ```text
//! Idle → Connecting → Polling → Processing → Sleeping ─┐
//!            ▲                                         │
//!            └─────────────────────────────────────────┘
//! any state → Stopped
//! ```
//!
//! A healthy session is kept open between cycles, so `Connecting` is skipped
//! while `NOOP` succeeds. Failures never end the loop: connection, mailbox and
//! search errors wait out the interval and retry, per-message errors skip that
//! message. Messages are flagged only after their event was emitted, which
//! gives at-least-once delivery.
//!
//! Stopping is cooperative. The [`StopSignal`] is checked before every
//! network call that starts new work and wakes the inter-cycle sleep. A
//! command already in flight runs until it completes or hits the socket
//! timeout. On stop, the message being handled finishes and flags for the
//! messages already emitted in the current chunk are still sent. No further
//! message is fetched and the session is logged out before [`PollLoop::run`]
//! returns.

pub mod sink;
pub mod stop;

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::parser::decoder::MailDecoder;
use crate::session::{Connector, SessionManager};

use self::sink::EventSink;
pub use self::stop::StopSignal;

/// Loop settings derived from the mailbox configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Mailbox to select.
    pub mailbox: String,
    /// Time between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// UIDs handled per chunk; flags are stored once per chunk.
    pub batch_size: usize,
    /// Delete and expunge instead of only marking seen.
    pub delete: bool,
    /// Flag messages that failed to decode instead of leaving them unseen.
    pub mark_undecodable: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            mailbox: "INBOX".to_string(),
            interval: Duration::from_secs(300),
            batch_size: 50,
            delete: false,
            mark_undecodable: false,
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Connecting,
    Polling,
    Processing,
    Sleeping,
    Stopped,
}

/// Counters for one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub unseen: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub flag_failures: usize,
}

/// Counters over the lifetime of a loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: u64,
    pub emitted: u64,
    pub skipped: u64,
    pub flagged: u64,
    pub flag_failures: u64,
    /// Cycles that failed to connect, select or search.
    pub failed_cycles: u64,
}

enum Handled {
    Emitted,
    Undecodable,
    Skipped,
}

/// Polls one mailbox through one session.
pub struct PollLoop<C: Connector, K: EventSink> {
    session: SessionManager<C>,
    decoder: MailDecoder,
    sink: K,
    options: PollOptions,
    stop: StopSignal,
    state: PollState,
    summary: PollSummary,
}

impl<C: Connector, K: EventSink> PollLoop<C, K> {
    pub fn new(
        connector: C,
        decoder: MailDecoder,
        sink: K,
        options: PollOptions,
        stop: StopSignal,
    ) -> Self {
        let session = SessionManager::new(connector, options.batch_size);
        Self {
            session,
            decoder,
            sink,
            options,
            stop,
            state: PollState::Idle,
            summary: PollSummary::default(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn summary(&self) -> PollSummary {
        self.summary
    }

    /// Poll until the stop signal is raised, then disconnect.
    pub fn run(&mut self) -> PollSummary {
        info!(
            mailbox = %self.options.mailbox,
            interval_secs = self.options.interval.as_secs(),
            "Polling started"
        );

        while !self.stop.is_stopped() {
            match self.poll_once() {
                Ok(report) => info!(
                    unseen = report.unseen,
                    emitted = report.emitted,
                    skipped = report.skipped,
                    flag_failures = report.flag_failures,
                    "Poll cycle complete"
                ),
                Err(e) => warn!(error = %e, "Poll cycle failed, retrying after interval"),
            }

            if self.stop.is_stopped() {
                break;
            }
            self.transition(PollState::Sleeping);
            if self.stop.wait_timeout(self.options.interval) {
                break;
            }
        }

        self.session.disconnect();
        self.transition(PollState::Stopped);
        info!(
            cycles = self.summary.cycles,
            emitted = self.summary.emitted,
            "Polling stopped"
        );
        self.summary
    }

    /// Run a single cycle without sleeping afterwards.
    ///
    /// Errors are connection, mailbox or search failures; the session is
    /// dropped so the next cycle reconnects.
    pub fn poll_once(&mut self) -> Result<CycleReport> {
        self.summary.cycles += 1;

        if let Err(e) = self.ensure_session() {
            self.summary.failed_cycles += 1;
            return Err(e);
        }
        if self.stop.is_stopped() {
            return Ok(CycleReport::default());
        }

        self.transition(PollState::Polling);
        let uids = match self.session.search_unseen() {
            Ok(uids) => uids,
            Err(e) => {
                self.session.disconnect();
                self.summary.failed_cycles += 1;
                return Err(e);
            }
        };
        debug!(count = uids.len(), "Unseen messages");

        self.transition(PollState::Processing);
        let report = self.process(&uids);

        self.summary.emitted += report.emitted as u64;
        self.summary.skipped += report.skipped as u64;
        self.summary.flagged += report.flagged as u64;
        self.summary.flag_failures += report.flag_failures as u64;
        Ok(report)
    }

    /// Reuse a live session, or connect and select the mailbox.
    fn ensure_session(&mut self) -> Result<()> {
        if self.session.is_alive() {
            return Ok(());
        }

        self.transition(PollState::Connecting);
        let result = self
            .session
            .connect_and_authenticate()
            .and_then(|()| self.session.select_mailbox(&self.options.mailbox));
        if let Err(e) = result {
            self.session.disconnect();
            return Err(e);
        }
        info!(mailbox = %self.options.mailbox, "Connected and mailbox selected");
        Ok(())
    }

    fn process(&mut self, uids: &[u32]) -> CycleReport {
        let mut report = CycleReport {
            unseen: uids.len(),
            ..CycleReport::default()
        };

        for chunk in uids.chunks(self.options.batch_size.max(1)) {
            let mut processed = Vec::with_capacity(chunk.len());

            for &uid in chunk {
                if self.stop.is_stopped() {
                    debug!(uid, "Stop requested, not fetching further messages");
                    break;
                }
                match self.handle_message(uid) {
                    Handled::Emitted => {
                        report.emitted += 1;
                        processed.push(uid);
                    }
                    Handled::Undecodable => {
                        report.skipped += 1;
                        if self.options.mark_undecodable {
                            processed.push(uid);
                        }
                    }
                    Handled::Skipped => report.skipped += 1,
                }
            }

            let marked = self.session.mark_processed(&processed, self.options.delete);
            for failure in &marked.failures {
                warn!(error = %failure, "Flag update failed, messages stay unseen");
            }
            report.flagged += marked.flagged.len();
            report.flag_failures += marked.failures.len();

            if self.stop.is_stopped() {
                break;
            }
        }

        report
    }

    fn handle_message(&mut self, uid: u32) -> Handled {
        let raw = match self.session.fetch(uid) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(uid, error = %e, "Skipping message, it stays unseen");
                return Handled::Skipped;
            }
        };

        let event = match self.decoder.decode(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(uid, error = %e, "Could not decode message");
                return Handled::Undecodable;
            }
        };

        match self.sink.emit(event) {
            Ok(()) => {
                debug!(uid, "Emitted event");
                Handled::Emitted
            }
            Err(e) => {
                warn!(uid, error = %e, "Skipping message, it stays unseen");
                Handled::Skipped
            }
        }
    }

    fn transition(&mut self, next: PollState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Poll state change");
            self.state = next;
        }
    }
}
