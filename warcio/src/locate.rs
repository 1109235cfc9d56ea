//! Offset-addressed retrieval of archived HTTP responses.
//!
//! Every retrieval opens the file afresh and seeks to the offset, so retrievals share no cursor
//! and the same offset always yields the same response.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::compression::Compression;
use crate::http::{EnvelopeError, HttpHead};
use crate::payload::{self, Payload, PayloadError};
use crate::record::{InvalidRecord, Record};
use crate::{Header, Limits, RecordKind};

/// Reasons a response could not be retrieved from an offset.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot seek to offset {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },
    /// There is no readable record at the offset.
    #[error("no record found at offset {offset}: {source}")]
    NotFound {
        offset: u64,
        #[source]
        source: InvalidRecord,
    },
    /// The record at the offset does not contain an HTTP response.
    #[error("record at offset {offset} is not an HTTP response")]
    NotResponse { offset: u64 },
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Returns `true` if `header` describes a record holding an HTTP response.
///
/// This is the loose test applied when a record is fetched by offset; scanners decide which
/// records to remember with their own rules.
pub fn looks_like_response(header: &Header) -> bool {
    if header.record_kind().map_or(false, |kind| kind == RecordKind::Response) {
        return true;
    }
    header
        .content_type()
        .and_then(|ct| ct.trim().get(.."application/http".len()))
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("application/http"))
}

/// Reads responses out of one WARC file by offset.
#[derive(Debug, Clone)]
pub struct RecordLocator {
    path: PathBuf,
    compression: Compression,
    limits: Limits,
}

impl RecordLocator {
    pub fn new<P: Into<PathBuf>>(path: P, compression: Compression, limits: Limits) -> Self {
        RecordLocator {
            path: path.into(),
            compression,
            limits,
        }
    }

    /// Create a locator whose compression is guessed from the file name.
    pub fn for_path<P: Into<PathBuf>>(path: P, limits: Limits) -> Self {
        let path = path.into();
        let compression = Compression::guess_for_filename(&path);
        Self::new(path, compression, limits)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Open the file, seek to `offset` and parse the record and HTTP envelope found there.
    ///
    /// The returned response's body is positioned at the first payload byte.
    pub fn open_at(&self, offset: u64) -> Result<LocatedResponse, LocateError> {
        let mut file = File::open(&self.path).map_err(|source| LocateError::Open {
            path: self.path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| LocateError::Seek { offset, source })?;

        let mut record = Record::read_from(BufReader::new(file), self.compression)
            .map_err(|source| LocateError::NotFound { offset, source })?;
        if !looks_like_response(&record.header) {
            return Err(LocateError::NotResponse { offset });
        }
        let head = HttpHead::read_from(&mut record, self.limits.max_envelope_size)?;

        Ok(LocatedResponse {
            offset,
            head,
            record,
        })
    }

    /// Retrieve and decode the payload of the response at `offset`.
    pub fn read_payload_at(&self, offset: u64) -> Result<(HttpHead, Payload), LocateError> {
        let located = self.open_at(offset)?;
        let label = located.label();
        let LocatedResponse { head, record, .. } = located;
        let declared = record.remaining();
        let payload = payload::read_payload(&head, record, Some(declared), &self.limits, &label)?;
        Ok((head, payload))
    }
}

/// An HTTP response found at an offset, with its body not yet read.
#[derive(Debug)]
pub struct LocatedResponse {
    pub offset: u64,
    pub head: HttpHead,
    record: Record<BufReader<File>>,
}

impl LocatedResponse {
    /// The header of the WARC record holding the response.
    pub fn header(&self) -> &Header {
        &self.record.header
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.record.header.target_uri()
    }

    /// Number of payload bytes declared by the record framing.
    pub fn declared_len(&self) -> u64 {
        self.record.remaining()
    }

    /// The raw (still chunked and encoded) response body.
    pub fn body(&mut self) -> &mut impl BufRead {
        &mut self.record
    }

    /// A name for this response to use in log messages.
    pub fn label(&self) -> String {
        match self.target_uri() {
            Some(uri) => uri.to_owned(),
            None => format!("record at offset {}", self.offset),
        }
    }
}
