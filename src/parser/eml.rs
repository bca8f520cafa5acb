//! Decoding of individual `.eml` files (RFC 5322 messages on disk).

use std::path::Path;

use crate::error::{MailError, Result};
use crate::model::event::Event;
use crate::parser::decoder::MailDecoder;

/// Read a single `.eml` file and decode it into an [`Event`].
///
/// A leading mbox `From ` separator line is tolerated.
pub fn decode_eml(path: impl AsRef<Path>, decoder: &MailDecoder) -> Result<Event> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| MailError::io(path, e))?;
    decoder.decode(&data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_eml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"From a@b.com Thu Jan 01 00:00:00 2024\nSubject: Hi\n\nBody\n")
            .unwrap();
        let event = decode_eml(file.path(), &MailDecoder::default()).unwrap();
        assert_eq!(event.message.trim_end(), "Body");
        assert!(event.header("subject").is_some());
    }

    #[test]
    fn test_decode_eml_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = decode_eml(dir.path().join("nope.eml"), &MailDecoder::default());
        assert!(matches!(result, Err(MailError::Io { .. })));
    }
}
