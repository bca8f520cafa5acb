//! Core data model types: emitted events and the MIME part tree.

pub mod event;
pub mod part;
