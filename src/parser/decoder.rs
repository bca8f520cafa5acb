//! Message decoding: raw RFC 5322 bytes → [`Event`].
//!
//! Decoding is pure and deterministic. It never performs I/O, so the same
//! input and options always produce the same event.

use chrono::DateTime;
use mail_parser::MessageParser;

use crate::error::{MailError, Result};
use crate::model::event::{Attachment, Event};
use crate::model::part::LeafPart;
use crate::parser::{header, mime};

/// Options that change how a message becomes an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Content type of the body part in multipart messages.
    pub content_type: String,
    /// Include attachment contents.
    pub save_attachments: bool,
    /// Lower-case header names.
    pub lowercase_headers: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            content_type: "text/plain".to_string(),
            save_attachments: false,
            lowercase_headers: true,
        }
    }
}

/// Turns fetched messages into events.
#[derive(Debug, Clone)]
pub struct MailDecoder {
    options: DecodeOptions,
    /// `options.content_type` without parameters, lower-cased.
    target: String,
}

impl Default for MailDecoder {
    fn default() -> Self {
        Self::new(DecodeOptions::default())
    }
}

impl MailDecoder {
    pub fn new(options: DecodeOptions) -> Self {
        let target = options
            .content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        Self { options, target }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decode one raw message.
    ///
    /// Fails only when the input is empty or is not a parseable message.
    /// A multipart message without a part of the target type yields an
    /// empty body.
    pub fn decode(&self, raw: &[u8]) -> Result<Event> {
        let bytes = mime::skip_envelope(raw);
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(MailError::Decode("empty message".into()));
        }

        let msg = MessageParser::default()
            .parse(bytes)
            .ok_or_else(|| MailError::Decode("not an RFC 5322 message".into()))?;

        let tree = mime::part_tree(&msg);
        let body = tree.select_body(&self.target);
        let message = body.map(LeafPart::text).unwrap_or_default();

        let attachments = tree
            .attachments(body)
            .into_iter()
            .map(|leaf| Attachment {
                filename: leaf.filename.clone().unwrap_or_default(),
                data: self
                    .options
                    .save_attachments
                    .then(|| leaf.attachment_data()),
            })
            .collect();

        let header_end = header::find_header_end(bytes).unwrap_or(bytes.len());
        let headers =
            header::collect_headers(&bytes[..header_end], self.options.lowercase_headers);

        let timestamp = msg
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

        Ok(Event {
            message,
            headers,
            attachments,
            timestamp,
        })
    }
}
