//! Tools for reading WARC (Web ARChive) files and recovering the HTTP responses stored in them.
//!
//! ## WARC structure
//!
//! A WARC file is a concatenation of records, each made of a version line, a block of header
//! fields and `Content-Length` bytes of data followed by two CRLFs. Crawlers store each fetched
//! resource as a `response` record whose block is the complete HTTP response as it was received:
//!
//! ```text
//! WARC/1.0
//! WARC-Type: response
//! WARC-Target-URI: http://example.com/robots.txt
//! Content-Type: application/http; msgtype=response
//! Content-Length: 96
//!
//! HTTP/1.1 200 OK
//! Content-Type: text/plain
//! Content-Encoding: gzip
//! Transfer-Encoding: chunked
//!
//! <chunk-framed, gzip-compressed bytes>
//! ```
//!
//! Files are often compressed with one gzip member per record (`.warc.gz`), which keeps every
//! record reachable from the file offset of its member without decompressing what precedes it.
//!
//! ## Library structure
//!
//! [`Record::read_from`] reads a record header and exposes the record block through `Read` and
//! `BufRead`. [`RecordReader`] walks a whole file forward, reporting the file offset at which
//! each record starts. [`HttpHead`](http::HttpHead) parses the HTTP status line and headers at
//! the start of a response block, and [`payload::read_payload`] undoes chunked transfer coding
//! and content coding to produce the entity body. Finally [`locate::RecordLocator`] reopens a
//! file at a stored offset to repeat that work on demand.

#[macro_use]
extern crate log;

use thiserror::Error;

pub mod chunked;
pub mod compression;
pub mod encoding;
mod header;
pub mod http;
pub mod locate;
pub mod payload;
pub mod reader;
pub mod record;
#[cfg(test)]
mod tests;
mod version;

pub use compression::Compression;
pub use header::{FieldKind, FieldName, Header, RecordKind};
pub use reader::RecordReader;
pub use record::Record;
pub use version::Version;

/// Reasons it may be impossible to parse a WARC header.
#[derive(Debug, Error)]
pub enum HeaderParseError {
    /// The WARC/m.n signature marking the start of a record is not present or invalid.
    ///
    /// The contained value is a UTF-8 interpretation of the data that was attempted to be parsed.
    #[error("WARC signature missing or invalid (near \"{0}\")")]
    InvalidSignature(String),
    /// A header field was malformed.
    #[error("header field is malformed")]
    MalformedField,
    /// The header grew past the allowed size without being terminated.
    #[error("header exceeds {0} bytes without terminating")]
    TooLong(usize),
    /// An I/O error occured while trying to read the input.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// The parser reached the end of the input before the end of the WARC header.
    #[error("input ended before end of header")]
    Truncated,
}

impl std::cmp::PartialEq for HeaderParseError {
    fn eq(&self, other: &Self) -> bool {
        use HeaderParseError::*;

        match (self, other) {
            (MalformedField, MalformedField) | (Truncated, Truncated) => true,
            (InvalidSignature(x), InvalidSignature(y)) => x == y,
            (TooLong(x), TooLong(y)) => x == y,
            (IoError(e1), IoError(e2)) => e1.kind() == e2.kind(),
            (_, _) => false,
        }
    }
}

impl HeaderParseError {
    fn invalid_signature(sig_bytes: &[u8]) -> Self {
        HeaderParseError::InvalidSignature(String::from_utf8_lossy(sig_bytes).into_owned())
    }
}

/// Size limits applied while reading records and materializing payloads.
///
/// These protect against corrupt or hostile length fields: nothing larger than
/// [`max_payload_size`](Self::max_payload_size) is ever allocated for a single payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest payload, in bytes, that will be read into memory.
    pub max_payload_size: u64,
    /// Size of each segment appended while accumulating a payload of unknown length.
    pub segment_size: usize,
    /// Largest HTTP status line plus header block, in bytes.
    pub max_envelope_size: usize,
}

impl Limits {
    /// 128 MiB
    pub const DEFAULT_MAX_PAYLOAD_SIZE: u64 = 128 << 20;
    pub const DEFAULT_SEGMENT_SIZE: usize = 8192;
    pub const DEFAULT_MAX_ENVELOPE_SIZE: usize = 256 << 10;
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_payload_size: Self::DEFAULT_MAX_PAYLOAD_SIZE,
            segment_size: Self::DEFAULT_SEGMENT_SIZE,
            max_envelope_size: Self::DEFAULT_MAX_ENVELOPE_SIZE,
        }
    }
}

/// Whether `b` may appear in a field name: an ASCII byte that is neither a control character
/// nor one of the WARC grammar's separators.
fn is_token_byte(b: u8) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";
    b.is_ascii() && b >= 0x20 && b != 0x7f && !SEPARATORS.contains(&b)
}
