//! RFC 5322 header parsing: folding, encoded-words (RFC 2047), and the
//! header map carried by each event.

use std::collections::BTreeMap;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use tracing::warn;

use crate::model::event::HeaderValue;

/// Build the event header map from the raw top-level header block.
///
/// Every occurrence of a name is kept in source order; names are grouped
/// case-insensitively. With `lowercase` the key is the lower-cased name,
/// otherwise the spelling of the first occurrence. Values are decoded with
/// [`decode_encoded_words`]; empty values are dropped.
pub fn collect_headers(raw_headers: &[u8], lowercase: bool) -> BTreeMap<String, HeaderValue> {
    let text = decode_header_bytes(raw_headers);

    // (lower-case name, key to emit, values)
    let mut grouped: Vec<(String, String, Vec<String>)> = Vec::new();

    for (name, raw_value) in unfold_headers(&text) {
        let value = decode_encoded_words(&raw_value);
        if value.trim().is_empty() {
            continue;
        }

        let lower = name.to_lowercase();
        match grouped.iter_mut().find(|(l, _, _)| *l == lower) {
            Some((_, _, values)) => values.push(value),
            None => {
                let key = if lowercase { lower.clone() } else { name };
                grouped.push((lower, key, vec![value]));
            }
        }
    }

    grouped
        .into_iter()
        .filter_map(|(_, key, values)| HeaderValue::from_occurrences(values).map(|v| (key, v)))
        .collect()
}

/// Find the byte offset where headers end (position of the first blank line).
///
/// A message that opens with a blank line has an empty header section.
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    if data.starts_with(b"\n") || data.starts_with(b"\r\n") {
        return Some(0);
    }
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i);
        }
        if data[i..].starts_with(b"\r\n\r\n") {
            return Some(i);
        }
    }
    None
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Split a header block into `(name, value)` pairs, joining continuation lines.
///
/// Returns `(name, raw_value)` pairs with names as written.
fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = result.last_mut() {
                if !last.1.is_empty() {
                    last.1.push(' ');
                }
                last.1.push_str(line.trim());
            }
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim();
            // Field names are printable ASCII without spaces; this also skips
            // an mbox "From " separator line.
            if name.is_empty() || name.contains(char::is_whitespace) {
                continue;
            }
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name.to_string(), value));
        }
    }

    result
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// `"=?iso-8859-1?Q?foo_:_bar?="` becomes `"foo : bar"`. A token that does
/// not decode is kept as written.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is dropped (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &after_start[decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    /// Bytes consumed after the initial `=?`.
    consumed: usize,
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // charset?encoding?encoded_text?=
    let (charset, rest) = s.split_once('?')?;
    let (encoding, rest) = rest.split_once('?')?;
    let end = rest.find("?=")?;
    let encoded_text = &rest[..end];

    if charset.is_empty() || encoded_text.contains(char::is_whitespace) {
        return None;
    }

    // RFC 2231 language suffix: "utf-8*en"
    let charset = charset.split('*').next().unwrap_or(charset);

    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(encoded_text).ok().or_else(|| {
            STANDARD_NO_PAD
                .decode(encoded_text.trim_end_matches('='))
                .ok()
        })?,
        "Q" | "q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed: charset_len(s) + 1 + encoding.len() + 1 + end + 2,
    })
}

/// Length of the charset token as written (including any `*lang` suffix).
fn charset_len(s: &str) -> usize {
    s.find('?').unwrap_or(s.len())
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => match encoding_rs::Encoding::for_label(charset.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            }
            None => {
                warn!(charset, "Unknown charset, falling back to UTF-8 lossy");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode_encoded_words("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_q_underscores_become_spaces() {
        assert_eq!(decode_encoded_words("=?iso-8859-1?Q?foo_:_bar?="), "foo : bar");
    }

    #[test]
    fn test_adjacent_encoded_words_join() {
        let input = "=?UTF-8?Q?Weekly?= =?UTF-8?Q?_report?=";
        assert_eq!(decode_encoded_words(input), "Weekly report");
    }

    #[test]
    fn test_plain_text_around_encoded_word() {
        let input = "Fwd: =?UTF-8?B?YWxlcnQ=?= from pipeline";
        assert_eq!(decode_encoded_words(input), "Fwd: alert from pipeline");
    }

    #[test]
    fn test_malformed_word_is_preserved() {
        assert_eq!(decode_encoded_words("=?broken"), "=?broken");
        assert_eq!(decode_encoded_words("a =?x?Z?abc?= b"), "a =?x?Z?abc?= b");
    }

    #[test]
    fn test_unknown_charset_falls_back() {
        assert_eq!(decode_encoded_words("=?x-unknown?Q?plain?="), "plain");
    }

    #[test]
    fn test_continuation_lines_are_joined() {
        let text = "Received: from relay.example.net
	by mx1.example.com
To: ops@example.com
";
        let headers = unfold_headers(text);
        assert_eq!(
            headers,
            vec![
                (
                    "Received".to_string(),
                    "from relay.example.net by mx1.example.com".to_string()
                ),
                ("To".to_string(), "ops@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_unfold_skips_mbox_separator() {
        let text = "From user@example.com Thu Jan 01 00:00:00 2024\nSubject: Hi\n";
        let headers = unfold_headers(text);
        assert_eq!(headers, vec![("Subject".to_string(), "Hi".to_string())]);
    }

    #[test]
    fn test_find_header_end() {
        let data = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        assert_eq!(find_header_end(data), Some(25));
        let data = b"From: a@b.com\r\nSubject: Hi\r\n\r\nBody\r\n";
        assert_eq!(find_header_end(data), Some(26));
        assert_eq!(find_header_end(b"Subject: no body"), None);
        assert_eq!(find_header_end(b"\nX-Not-A-Header: body\n\nmore"), Some(0));
        assert_eq!(find_header_end(b"\r\nbody"), Some(0));
    }

    #[test]
    fn test_collect_scalar_and_sequence() {
        let raw = b"Received: test1\nSubject: hi\nReceived: test2\nreceived: test3\n";
        let map = collect_headers(raw, true);
        assert_eq!(map["subject"], HeaderValue::Single("hi".into()));
        assert_eq!(
            map["received"],
            HeaderValue::Multiple(vec!["test1".into(), "test2".into(), "test3".into()])
        );
    }

    #[test]
    fn test_collect_keeps_first_spelling_without_lowercase() {
        let raw = b"X-Thing: a\nx-thing: b\nSubject: s\n";
        let map = collect_headers(raw, false);
        assert_eq!(
            map["X-Thing"],
            HeaderValue::Multiple(vec!["a".into(), "b".into()])
        );
        assert!(map.contains_key("Subject"));
        assert!(!map.contains_key("x-thing"));
    }

    #[test]
    fn test_collect_drops_empty_values() {
        let raw = b"X-Custom-Header:\nX-Other:   \nSubject: kept\n";
        let map = collect_headers(raw, true);
        assert!(!map.contains_key("x-custom-header"));
        assert!(!map.contains_key("x-other"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_collect_empty_occurrence_does_not_count() {
        let raw = b"Received:\nReceived: only\n";
        let map = collect_headers(raw, true);
        assert_eq!(map["received"], HeaderValue::Single("only".into()));
    }

    #[test]
    fn test_latin1_raw_header_bytes() {
        let raw = b"Subject: caf\xe9\n";
        let map = collect_headers(raw, true);
        assert_eq!(map["subject"], HeaderValue::Single("café".into()));
    }
}
