//! MIME content tree.
//!
//! A message body is either a single leaf or a multipart node holding an
//! ordered list of children. Body selection and attachment collection are two
//! separate depth-first walks over the same tree.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Line length for re-encoded base64 attachment data (45 input bytes per line).
const BASE64_LINE_LEN: usize = 60;

/// The `Content-Transfer-Encoding` declared by a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
}

impl TransferEncoding {
    /// Parse a header value. Missing or unknown values mean `7bit` (RFC 2045 §6.1).
    pub fn from_header(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("8bit") => Self::EightBit,
            Some("binary") => Self::Binary,
            Some("quoted-printable") => Self::QuotedPrintable,
            Some("base64") => Self::Base64,
            _ => Self::SevenBit,
        }
    }

    /// Whether the transport form of this encoding is plain text.
    pub fn is_text_safe(self) -> bool {
        matches!(self, Self::SevenBit | Self::QuotedPrintable)
    }
}

/// A leaf part with its content already transfer-decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafPart {
    /// Lower-case `type/subtype`.
    pub content_type: String,
    pub transfer_encoding: TransferEncoding,
    /// Decoded content (text parts are UTF-8).
    pub content: Vec<u8>,
    /// From `Content-Disposition: filename` or `Content-Type: name`.
    pub filename: Option<String>,
}

impl LeafPart {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Attachment payload for persistence.
    ///
    /// Text-safe parts keep their decoded text; everything else is
    /// re-encoded as base64 with CRLF-terminated lines.
    pub fn attachment_data(&self) -> String {
        if self.transfer_encoding.is_text_safe() {
            self.text()
        } else {
            base64_crlf(&self.content)
        }
    }
}

/// A node of the MIME tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Leaf(LeafPart),
    Multipart(Vec<Part>),
}

impl Part {
    /// Pick the part that provides the event body.
    ///
    /// A single-part message is its own body whatever its content type.
    /// In a multipart tree the first leaf, depth-first, whose content type
    /// equals `content_type` (ASCII case-insensitive) wins.
    pub fn select_body(&self, content_type: &str) -> Option<&LeafPart> {
        match self {
            Part::Leaf(leaf) => Some(leaf),
            Part::Multipart(children) => children
                .iter()
                .find_map(|child| child.find_leaf(content_type)),
        }
    }

    fn find_leaf(&self, content_type: &str) -> Option<&LeafPart> {
        match self {
            Part::Leaf(leaf) if leaf.content_type.eq_ignore_ascii_case(content_type) => {
                Some(leaf)
            }
            Part::Leaf(_) => None,
            Part::Multipart(children) => children
                .iter()
                .find_map(|child| child.find_leaf(content_type)),
        }
    }

    /// Collect every named leaf except `body`, in depth-first order.
    pub fn attachments<'a>(&'a self, body: Option<&LeafPart>) -> Vec<&'a LeafPart> {
        let mut found = Vec::new();
        self.collect_attachments(body, &mut found);
        found
    }

    fn collect_attachments<'a>(&'a self, body: Option<&LeafPart>, out: &mut Vec<&'a LeafPart>) {
        match self {
            Part::Leaf(leaf) => {
                let is_body = body.is_some_and(|b| std::ptr::eq(b, leaf));
                if !is_body && leaf.filename.is_some() {
                    out.push(leaf);
                }
            }
            Part::Multipart(children) => {
                for child in children {
                    child.collect_attachments(body, out);
                }
            }
        }
    }
}

/// Base64 with lines of at most 60 characters, each ending in CRLF.
pub fn base64_crlf(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2 + 2);
    // base64 output is ASCII, so byte chunks are valid str slices
    for line in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(ct: &str, name: Option<&str>, body: &str) -> Part {
        Part::Leaf(LeafPart {
            content_type: ct.to_string(),
            transfer_encoding: TransferEncoding::SevenBit,
            content: body.as_bytes().to_vec(),
            filename: name.map(String::from),
        })
    }

    #[test]
    fn test_single_part_is_body_regardless_of_type() {
        let tree = leaf("application/json", None, "{}");
        assert_eq!(tree.select_body("text/plain").unwrap().text(), "{}");
        assert!(tree.attachments(tree.select_body("text/plain")).is_empty());
    }

    #[test]
    fn test_select_first_matching_depth_first() {
        let tree = Part::Multipart(vec![
            Part::Multipart(vec![
                leaf("text/plain", None, "plain"),
                leaf("text/html", None, "<p>html</p>"),
            ]),
            leaf("text/plain", Some("notes.txt"), "second"),
        ]);
        assert_eq!(tree.select_body("text/plain").unwrap().text(), "plain");
        assert_eq!(tree.select_body("TEXT/HTML").unwrap().text(), "<p>html</p>");
        assert!(tree.select_body("image/png").is_none());
    }

    #[test]
    fn test_attachments_exclude_selected_body() {
        let tree = Part::Multipart(vec![
            leaf("text/plain", None, "plain"),
            leaf("text/html", Some("page.html"), "<p/>"),
            leaf("image/png", Some("image.png"), "x"),
        ]);

        let body = tree.select_body("text/plain");
        let names: Vec<_> = tree
            .attachments(body)
            .iter()
            .map(|a| a.filename.clone().unwrap())
            .collect();
        assert_eq!(names, ["page.html", "image.png"]);

        let body = tree.select_body("text/html");
        let names: Vec<_> = tree
            .attachments(body)
            .iter()
            .map(|a| a.filename.clone().unwrap())
            .collect();
        assert_eq!(names, ["image.png"]);
    }

    #[test]
    fn test_unnamed_unmatched_parts_are_ignored() {
        let tree = Part::Multipart(vec![
            leaf("application/octet-stream", None, "x"),
            leaf("text/html", None, "<p/>"),
        ]);
        let body = tree.select_body("text/plain");
        assert!(body.is_none());
        assert!(tree.attachments(body).is_empty());
    }

    #[test]
    fn test_transfer_encoding_from_header() {
        assert_eq!(TransferEncoding::from_header(None), TransferEncoding::SevenBit);
        assert_eq!(
            TransferEncoding::from_header(Some(" Base64 ")),
            TransferEncoding::Base64
        );
        assert_eq!(
            TransferEncoding::from_header(Some("8BIT")),
            TransferEncoding::EightBit
        );
        assert!(TransferEncoding::QuotedPrintable.is_text_safe());
        assert!(!TransferEncoding::Binary.is_text_safe());
    }

    #[test]
    fn test_base64_crlf_wraps_lines() {
        assert_eq!(base64_crlf(b"BCD"), "QkNE\r\n");
        let long = base64_crlf(&[0u8; 120]);
        let lines: Vec<_> = long.split("\r\n").collect();
        assert_eq!(lines[0].len(), 60);
        assert_eq!(lines[1].len(), 60);
        assert_eq!(lines[2].len(), 40);
        assert_eq!(lines[3], "");
        assert_eq!(base64_crlf(b""), "");
    }

    #[test]
    fn test_base64_crlf_line_boundary() {
        // 45 bytes fill exactly one line
        assert_eq!(base64_crlf(&[0x42; 45]).matches("\r\n").count(), 1);
        let two = base64_crlf(&[0x42; 46]);
        assert_eq!(two.split("\r\n").next().map(str::len), Some(60));
        assert_eq!(two.matches("\r\n").count(), 2);
    }

    #[test]
    fn test_attachment_data_by_encoding() {
        let mut part = LeafPart {
            content_type: "text/plain".into(),
            transfer_encoding: TransferEncoding::SevenBit,
            content: "raw text".as_bytes().to_vec(),
            filename: Some("a.data".into()),
        };
        assert_eq!(part.attachment_data(), "raw text");
        part.transfer_encoding = TransferEncoding::Base64;
        assert_eq!(part.attachment_data(), "cmF3IHRleHQ=\r\n");
    }
}
