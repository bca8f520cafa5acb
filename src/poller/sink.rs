//! Event sinks: where decoded events go.

use std::io::Write;

use crate::error::{MailError, Result};
use crate::model::event::Event;

/// Receives each event exactly once, in fetch order.
///
/// A failed `emit` keeps the message unflagged so it is fetched again on a
/// later cycle.
pub trait EventSink {
    fn emit(&mut self, event: Event) -> Result<()>;
}

/// Collects events in memory.
impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

/// Writes one JSON document per line and flushes after each event.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> EventSink for JsonLinesSink<W> {
    fn emit(&mut self, event: Event) -> Result<()> {
        let line = event.to_json().map_err(|e| MailError::Emit(e.to_string()))?;
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|e| MailError::Emit(e.to_string()))
    }
}
