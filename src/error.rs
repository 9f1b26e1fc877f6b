//! Error types shared across the crate.

use std::io;

use thiserror::Error;

/// Errors reported by an [`OutputSink`](crate::sink::OutputSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The underlying writer failed.
    #[error("sink write failed: {0}")]
    Io(#[from] io::Error),

    /// An earlier write already failed; the sink refuses further bytes.
    #[error("sink is in a failed state from an earlier write")]
    Poisoned,

    /// The compression layer failed.
    #[error("compression failed: {0}")]
    Compression(#[from] lz4_flex::frame::Error),
}

/// Errors produced while decoding a binary log stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The stream ended in the middle of an entry or value.
    #[error("truncated stream at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    /// An event references a template that was never defined in the stream.
    #[error("event at offset {offset} references undefined template {template_id}")]
    UnknownTemplate { template_id: u32, offset: usize },

    /// An argument carries a type tag this reader does not know.
    #[error("unknown argument tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// The event carries a different number of arguments than its template
    /// has placeholders.
    #[error(
        "template {template_id} takes {} arguments {expected:?}, event carries {} {found:?}",
        .expected.len(),
        .found.len()
    )]
    ArgumentMismatch {
        template_id: u32,
        expected: Vec<u8>,
        found: Vec<u8>,
    },

    /// A severity byte outside the known range.
    #[error("invalid severity byte {value} at offset {offset}")]
    InvalidSeverity { value: u8, offset: usize },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// A field holds a value that cannot be represented (bad char, bad flag).
    #[error("invalid value at offset {offset}: {reason}")]
    InvalidValue { offset: usize, reason: &'static str },
}

/// Errors produced while building a [`SessionConfig`](crate::config::SessionConfig).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("initial channel capacity {initial} exceeds the channel ceiling {max}")]
    CapacityAboveCeiling { initial: usize, max: usize },

    #[error("channel ceiling {0} does not fit the 32-bit entry size field")]
    CeilingTooLarge(usize),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
