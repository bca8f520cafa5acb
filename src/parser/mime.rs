//! MIME structure: converts a `mail-parser` message into a [`Part`] tree.

use mail_parser::{Message, MessagePart, MimeHeaders, PartType};
use tracing::warn;

use crate::model::part::{LeafPart, Part, TransferEncoding};

/// Maximum multipart nesting followed when building the tree (to bound
/// recursion on adversarial input). Deeper levels become empty multiparts.
const MAX_DEPTH: usize = 10;

/// Build the part tree of a parsed message, rooted at its top-level part.
pub fn part_tree(msg: &Message<'_>) -> Part {
    match msg.parts.first() {
        Some(root) => build_part(msg, root, 0),
        None => Part::Multipart(Vec::new()),
    }
}

fn build_part(msg: &Message<'_>, part: &MessagePart<'_>, depth: usize) -> Part {
    match &part.body {
        PartType::Multipart(children) => {
            if depth >= MAX_DEPTH {
                warn!(depth, "Multipart nesting too deep, ignoring nested parts");
                return Part::Multipart(Vec::new());
            }
            Part::Multipart(
                children
                    .iter()
                    .filter_map(|&id| msg.parts.get(id))
                    .map(|child| build_part(msg, child, depth + 1))
                    .collect(),
            )
        }
        _ => Part::Leaf(leaf_part(part)),
    }
}

fn leaf_part(part: &MessagePart<'_>) -> LeafPart {
    LeafPart {
        content_type: content_type_of(part),
        transfer_encoding: TransferEncoding::from_header(part.content_transfer_encoding()),
        content: part.contents().to_vec(),
        filename: part.attachment_name().map(String::from),
    }
}

/// Lower-case `type/subtype`, defaulting to `text/plain` (RFC 2045 §5.2).
fn content_type_of(part: &MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct: &mail_parser::ContentType| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub),
            None => ct.ctype().to_string(),
        })
        .unwrap_or_else(|| "text/plain".to_string())
        .to_ascii_lowercase()
}

/// Skip a BOM and an mbox `From ` separator line, if present.
pub fn skip_envelope(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use mail_parser::MessageParser;

    fn tree_of(raw: &str) -> Part {
        let msg = MessageParser::default().parse(raw.as_bytes()).unwrap();
        part_tree(&msg)
    }

    #[test]
    fn test_single_part_tree() {
        let tree = tree_of("Subject: x\nContent-Type: text/html\n\n<b>hi</b>");
        match tree {
            Part::Leaf(leaf) => {
                assert_eq!(leaf.content_type, "text/html");
                assert_eq!(leaf.text(), "<b>hi</b>");
                assert_eq!(leaf.filename, None);
            }
            other => panic!("expected a leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_default_content_type() {
        match tree_of("Subject: x\n\nplain body") {
            Part::Leaf(leaf) => assert_eq!(leaf.content_type, "text/plain"),
            other => panic!("expected a leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_nested_multipart_tree() {
        let raw = "Subject: nested\n\
Content-Type: multipart/mixed; boundary=\"outer\"\n\
\n\
--outer\n\
Content-Type: multipart/alternative; boundary=\"inner\"\n\
\n\
--inner\n\
Content-Type: text/plain\n\
\n\
plain\n\
--inner\n\
Content-Type: text/html\n\
\n\
<p>html</p>\n\
--inner--\n\
--outer\n\
Content-Type: application/octet-stream; name=\"blob.bin\"\n\
Content-Transfer-Encoding: base64\n\
\n\
QkNE\n\
--outer--\n";
        let tree = tree_of(raw);
        let Part::Multipart(children) = &tree else {
            panic!("expected multipart root");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(&children[0], Part::Multipart(inner) if inner.len() == 2));
        match &children[1] {
            Part::Leaf(leaf) => {
                assert_eq!(leaf.filename.as_deref(), Some("blob.bin"));
                assert_eq!(leaf.transfer_encoding, TransferEncoding::Base64);
                assert_eq!(leaf.content, b"BCD");
            }
            other => panic!("expected a leaf, got {other:?}"),
        }
        assert_eq!(tree.select_body("text/html").unwrap().text(), "<p>html</p>");
    }

    #[test]
    fn test_skip_envelope() {
        let data = b"From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Test\n\nBody\n";
        assert!(skip_envelope(data).starts_with(b"Subject:"));

        let data = b"Subject: Test\n\nBody\n";
        assert_eq!(skip_envelope(data), data);

        let data = b"\xEF\xBB\xBFSubject: Test\n\nBody\n";
        assert!(skip_envelope(data).starts_with(b"Subject:"));
    }
}
