//! Error taxonomy for the decoder.
//!
//! A closed enum, a hand-written `Display`, and a `Serialize` derive so an
//! embedder can write decode failures to the same JSON-lines stream as
//! successful packets.

use serde::Serialize;
use std::fmt;

/// All packet-fatal failure kinds. Every variant aborts only the current
/// datagram; none are process-fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DecodeError {
    /// The cursor ran out of bytes before an expected field or record.
    Truncated,
    /// The leading two bytes were not a recognized version tag (1/5/9/10).
    UnsupportedVersion(u16),
    /// A length field was inconsistent with its declared record stride, a
    /// variable-length field overran its set, or a scope length was zero.
    Malformed(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "truncated: buffer ended before expected"),
            DecodeError::UnsupportedVersion(v) => write!(f, "unsupported version tag: {v}"),
            DecodeError::Malformed(reason) => write!(f, "malformed packet: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Per-`ExporterKey` diagnostic side channel (§7). Not returned from
/// `decode`; accumulated counters an embedder can poll or export.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Diagnostics {
    pub truncated: u64,
    pub malformed: u64,
    pub unsupported: u64,
    pub template_timeout: u64,
    pub unknown_fields: u64,
}

impl Diagnostics {
    pub fn record(&mut self, err: &DecodeError) {
        match err {
            DecodeError::Truncated => self.truncated += 1,
            DecodeError::UnsupportedVersion(_) => self.unsupported += 1,
            DecodeError::Malformed(_) => self.malformed += 1,
        }
    }

    pub fn record_template_timeout(&mut self) {
        self.template_timeout += 1;
    }

    pub fn record_catalog_gap(&mut self) {
        self.unknown_fields += 1;
    }
}
