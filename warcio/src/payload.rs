//! Materializing response payloads.
//!
//! [`accumulate`] reads a source of known or unknown length into one contiguous buffer, and
//! [`read_payload`] runs a response body through chunked decoding and content decoding to
//! produce the entity the server meant to send.
use std::io::{self, Read};
use std::mem;

use flate2::bufread::DeflateDecoder;
use thiserror::Error;

use crate::chunked;
use crate::encoding::{ContentEncoding, Decoder};
use crate::http::HttpHead;
use crate::Limits;

/// Errors that abandon a payload entirely.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload is, or was declared to be, larger than the configured maximum.
    #[error("payload of {size} bytes exceeds the limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

/// The bytes read by [`accumulate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulated {
    pub bytes: Vec<u8>,
    /// Reading stopped early because the source reported an error.
    pub interrupted: bool,
}

/// Read `source` to its end and return everything it produced as one buffer.
///
/// With a `declared` length within the limit, exactly that much is allocated up front; if the
/// source then turns out to be shorter or longer, reading continues in `segment_size` pieces
/// that are joined at the end. Without a declared length only the segmented path is used.
///
/// A declared length over `max_payload_size` is rejected before anything is allocated, and so
/// is a source that produces more than that. Read errors other than interruption are logged
/// with `label` and end the read: whatever was read before the error is returned.
pub fn accumulate<R: Read>(
    mut source: R,
    declared: Option<u64>,
    limits: &Limits,
    label: &str,
) -> Result<Accumulated, PayloadError> {
    let mut prefix = Vec::new();
    if let Some(size) = declared {
        if size > limits.max_payload_size {
            return Err(PayloadError::TooLarge {
                size,
                max: limits.max_payload_size,
            });
        }

        prefix = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < prefix.len() {
            match source.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    read_failed(label, &e);
                    prefix.truncate(filled);
                    return Ok(Accumulated {
                        bytes: prefix,
                        interrupted: true,
                    });
                }
            }
        }

        if filled < prefix.len() {
            debug!(
                "{}: declared {} bytes but only {} were present",
                label, size, filled
            );
            prefix.truncate(filled);
        }
    }

    Segments::new(prefix, limits).fill_from(source, label)
}

fn read_failed(label: &str, e: &io::Error) {
    error!("Failed to read content of {}: {}", label, e);
}

/// Fixed-size pieces of a payload being read, appended as each fills up.
struct Segments<'a> {
    prefix: Vec<u8>,
    full: Vec<Box<[u8]>>,
    current: Box<[u8]>,
    used: usize,
    total: u64,
    limits: &'a Limits,
}

impl<'a> Segments<'a> {
    fn new(prefix: Vec<u8>, limits: &'a Limits) -> Self {
        Segments {
            total: prefix.len() as u64,
            prefix,
            full: Vec::new(),
            current: Self::segment(limits),
            used: 0,
            limits,
        }
    }

    fn segment(limits: &Limits) -> Box<[u8]> {
        vec![0u8; limits.segment_size.max(1)].into_boxed_slice()
    }

    fn fill_from<R: Read>(mut self, mut source: R, label: &str) -> Result<Accumulated, PayloadError> {
        let mut interrupted = false;
        loop {
            if self.used == self.current.len() {
                let next = Self::segment(self.limits);
                self.full.push(mem::replace(&mut self.current, next));
                self.used = 0;
            }

            match source.read(&mut self.current[self.used..]) {
                Ok(0) => break,
                Ok(n) => {
                    self.used += n;
                    self.total += n as u64;
                    if self.total > self.limits.max_payload_size {
                        return Err(PayloadError::TooLarge {
                            size: self.total,
                            max: self.limits.max_payload_size,
                        });
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    read_failed(label, &e);
                    interrupted = true;
                    break;
                }
            }
        }

        if !self.full.is_empty() {
            trace!(
                "{}: joining {} segments after {} preallocated bytes",
                label,
                self.full.len() + 1,
                self.prefix.len()
            );
        }
        let mut bytes = self.prefix;
        bytes.reserve_exact((self.total as usize).saturating_sub(bytes.len()));
        for segment in &self.full {
            bytes.extend_from_slice(segment);
        }
        bytes.extend_from_slice(&self.current[..self.used]);
        Ok(Accumulated { bytes, interrupted })
    }
}

/// Ways a payload may differ from what the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// Reading the record body failed part way; the payload is incomplete.
    ReadInterrupted,
    /// The body was declared chunked but was not validly framed, and is returned as stored.
    ChunkedFallback,
    /// The content coding could not be undone; the payload is still encoded.
    UnsupportedEncoding(String),
    /// Decompression failed part way; the payload holds what was decoded before the failure.
    DecodeInterrupted,
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub degradations: Vec<Degradation>,
}

impl Payload {
    /// `true` if every decoding step succeeded.
    pub fn is_intact(&self) -> bool {
        self.degradations.is_empty()
    }
}

/// Read and decode the body of the response described by `head`.
///
/// The raw body is accumulated first (using `declared` as its length when known), then chunk
/// framing is removed if the response says it is chunked, then the content coding is undone.
/// Each step that fails degrades the result instead of failing it; only size limits are
/// errors.
pub fn read_payload<R: Read>(
    head: &HttpHead,
    body: R,
    declared: Option<u64>,
    limits: &Limits,
    label: &str,
) -> Result<Payload, PayloadError> {
    let mut degradations = Vec::new();

    let raw = accumulate(body, declared, limits, label)?;
    if raw.interrupted {
        degradations.push(Degradation::ReadInterrupted);
    }
    let mut bytes = raw.bytes;

    if head.is_chunked() {
        let (dechunked, fell_back) = chunked::decode_or_passthrough(bytes);
        if fell_back {
            degradations.push(Degradation::ChunkedFallback);
        }
        bytes = dechunked;
    }

    match ContentEncoding::select(&head.content_encodings()) {
        ContentEncoding::Unsupported(coding) => {
            degradations.push(Degradation::UnsupportedEncoding(coding));
        }
        ContentEncoding::Supported(coding) => {
            // Reading from memory, so the only errors are from the decoder itself
            let decoder = match Decoder::new(coding, &bytes[..]) {
                Ok(decoder) => decoder,
                Err(e) => {
                    read_failed(label, &e);
                    degradations.push(Degradation::DecodeInterrupted);
                    return Ok(Payload {
                        bytes: Vec::new(),
                        degradations,
                    });
                }
            };
            if !decoder.preserves_length() {
                let zlib = matches!(decoder, Decoder::Zlib(_));
                let mut decoded = accumulate(decoder, None, limits, label)?;
                if zlib && decoded.interrupted && decoded.bytes.is_empty() {
                    // Raw deflate can start with bytes that pass the zlib header check
                    debug!("{}: zlib stream failed at once, retrying as raw deflate", label);
                    let raw = Decoder::RawDeflate(DeflateDecoder::new(&bytes[..]));
                    decoded = accumulate(raw, None, limits, label)?;
                }
                if decoded.interrupted {
                    degradations.push(Degradation::DecodeInterrupted);
                }
                bytes = decoded.bytes;
            }
        }
    }

    Ok(Payload {
        bytes,
        degradations,
    })
}
