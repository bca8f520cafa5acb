//! The event emitted for each fetched message.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Field names owned by the event itself. Headers with these names are not
/// serialized so they can never shadow the body or the attachment list.
pub const RESERVED_FIELDS: [&str; 3] = ["@timestamp", "message", "attachments"];

/// A header value: one occurrence yields `Single`, two or more yield
/// `Multiple` in source order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// Build a value from every occurrence of a header. Returns `None` for
    /// an empty list.
    pub fn from_occurrences(mut values: Vec<String>) -> Option<Self> {
        match values.len() {
            0 => None,
            1 => values.pop().map(Self::Single),
            _ => Some(Self::Multiple(values)),
        }
    }

    /// The scalar value, if this header occurred exactly once.
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(s) => Some(s),
            Self::Multiple(_) => None,
        }
    }

    /// Every occurrence, in source order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::Multiple(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// An attachment descriptor.
///
/// `data` is only filled in when attachment persistence is enabled.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Attachment {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// One decoded message, flattened for the downstream pipeline.
///
/// Serializes as `{"@timestamp"?, "message", <headers...>, "attachments"?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Selected body text; empty when no part matched.
    pub message: String,
    /// Header name → value(s), names normalized by the decoder.
    pub headers: BTreeMap<String, HeaderValue>,
    /// Attachment descriptors in MIME-tree order.
    pub attachments: Vec<Attachment>,
    /// From the `Date` header, when it parses.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Event {
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    /// Serialize to a single-line JSON document.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ts) = &self.timestamp {
            map.serialize_entry("@timestamp", &ts.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        }
        map.serialize_entry("message", &self.message)?;
        for (name, value) in &self.headers {
            if RESERVED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            map.serialize_entry(name, value)?;
        }
        if !self.attachments.is_empty() {
            map.serialize_entry("attachments", &self.attachments)?;
        }
        map.end()
    }
}
