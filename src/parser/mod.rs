//! Message decoding: header normalization, MIME tree handling, and the decoder.

pub mod decoder;
pub mod eml;
pub mod header;
pub mod mime;
