//! `mailpoll` polls an IMAP mailbox and turns each unseen message into a
//! structured event.
//!
//! The library is split along the data flow: [`session`] talks to the
//! server, [`parser`] decodes raw messages into [`model::event::Event`]s and
//! [`poller`] drives the loop that ties them together.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod poller;
pub mod session;
