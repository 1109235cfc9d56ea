//! Find the HTTP responses in WARC files and hand them to a parser, either straight from a
//! forward scan or later by URL through an index of record offsets.
#[macro_use]
extern crate log;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use mime::Mime;
use thiserror::Error;

use warcio::http::{EnvelopeError, HttpHead};
use warcio::locate::LocateError;
use warcio::payload::PayloadError;
use warcio::record::InvalidRecord;
use warcio::{Compression, Header, Limits, RecordKind, RecordReader};

pub mod index;
pub mod parsers;
pub mod process;
#[cfg(test)]
mod test;

/// Settings for scanning WARC files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub limits: Limits,
    /// Log progress after every this many records; 0 disables progress logging.
    pub progress_interval: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            limits: Limits::default(),
            progress_interval: 1000,
        }
    }
}

/// Failures that end the scan of a file.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The records in the file cannot be followed past `offset`.
    #[error("unreadable record in {name} at offset {offset}: {source}")]
    Record {
        name: String,
        offset: u64,
        #[source]
        source: InvalidRecord,
    },
    #[error("I/O error reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Failures a [`ResponseHandler`] may report for one response.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// An HTTP response found by [`ArchiveScanner`].
pub struct ScannedResponse<'a> {
    /// Offset of the record holding the response, suitable for
    /// [`RecordLocator::open_at`](warcio::locate::RecordLocator::open_at).
    pub offset: u64,
    pub url: &'a str,
    pub head: HttpHead,
    /// Number of body bytes the record declares after the HTTP envelope.
    pub declared_len: u64,
    /// The raw body, still chunked and encoded if the server sent it that way.
    pub body: &'a mut dyn BufRead,
}

/// Receives each HTTP response in a scanned file.
///
/// Errors are logged with the response URL and counted; they never stop the scan.
pub trait ResponseHandler {
    fn handle(&mut self, response: ScannedResponse<'_>) -> Result<(), HandlerError>;

    /// Called instead of [`handle`](Self::handle) for a response whose HTTP envelope could not
    /// be read. The scanner logs the error itself.
    fn unreadable(&mut self, _offset: u64, _url: &str, _error: &EnvelopeError) {}
}

/// Counts of what happened during the scan of one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub compression: Option<Compression>,
    /// All records read.
    pub records: u64,
    /// Records classified as HTTP responses.
    pub responses: u64,
    /// Responses whose envelope could not be read or that the handler failed on.
    pub failures: u64,
}

/// Returns `true` if `header` belongs to a record containing an HTTP response.
///
/// The block content type decides: it must be `application/http` with `msgtype=response`. A
/// `response` record without a usable content type is accepted if its target is an HTTP(S) URL.
/// Records of any other standard type are never responses.
pub fn is_http_response(header: &Header) -> bool {
    match header.record_kind() {
        Some(RecordKind::Response) | None => {}
        Some(_) => return false,
    }

    match header
        .content_type()
        .and_then(|ct| ct.trim().parse::<Mime>().ok())
    {
        Some(media_type) => {
            media_type.type_() == mime::APPLICATION
                && media_type.subtype() == "http"
                && media_type
                    .get_param("msgtype")
                    .map_or(false, |v| v.as_str().eq_ignore_ascii_case("response"))
        }
        None => {
            header.record_kind().is_some()
                && header.target_uri().map_or(false, |uri| {
                    let uri = uri.to_ascii_lowercase();
                    uri.starts_with("http://") || uri.starts_with("https://")
                })
        }
    }
}

/// Reads WARC files from start to end, passing every HTTP response to a handler.
#[derive(Default)]
pub struct ArchiveScanner {
    config: ScanConfig,
    progress: Option<ProgressBar>,
}

impl ArchiveScanner {
    pub fn new(config: ScanConfig) -> Self {
        ArchiveScanner {
            config,
            progress: None,
        }
    }

    /// Report each file's progress through `bar`, whose length is set to the file size.
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Open a file for scanning, detecting whether it is gzip-compressed.
    pub fn open(&self, path: &Path) -> Result<(BufReader<File>, Compression), ScanError> {
        let open_error = |source| ScanError::Open {
            path: path.to_owned(),
            source,
        };
        let file = File::open(path).map_err(open_error)?;
        if let Some(bar) = &self.progress {
            bar.set_length(file.metadata().map_err(open_error)?.len());
            bar.set_position(0);
        }

        let mut reader = BufReader::with_capacity(1 << 16, file);
        let compression = Compression::detect(&mut reader).map_err(open_error)?;
        if compression != Compression::guess_for_filename(path) {
            debug!("{} contents are {:?} despite its name", path.display(), compression);
        }
        Ok((reader, compression))
    }

    /// Scan the file at `path`.
    pub fn scan_file<H: ResponseHandler>(
        &self,
        path: &Path,
        handler: &mut H,
    ) -> Result<ScanSummary, ScanError> {
        let (reader, compression) = self.open(path)?;
        self.scan(reader, compression, &path.display().to_string(), handler)
    }

    /// Scan the records readable from `input`, using `name` to identify it in logs.
    pub fn scan<R: BufRead, H: ResponseHandler>(
        &self,
        input: R,
        compression: Compression,
        name: &str,
        handler: &mut H,
    ) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary {
            compression: Some(compression),
            ..Default::default()
        };
        let mut reader = RecordReader::new(input, compression);

        loop {
            let position = reader.position();
            let (offset, mut record) = match reader.next() {
                None => break,
                Some(Ok(next)) => next,
                Some(Err(source)) => {
                    return Err(ScanError::Record {
                        name: name.to_owned(),
                        offset: position,
                        source,
                    })
                }
            };

            summary.records += 1;
            if self.config.progress_interval > 0
                && summary.records % self.config.progress_interval == 0
            {
                info!("Read {} WARC records from {}", summary.records, name);
            }

            if is_http_response(&record.header) {
                summary.responses += 1;
                if let Err(e) = self.handle_record(offset, &mut record, handler) {
                    summary.failures += 1;
                    error!(
                        "Failed to process {}: {}",
                        record.header.target_uri().unwrap_or("<no WARC-Target-URI>"),
                        e
                    );
                }
            } else {
                trace!(
                    "Skip non-response record {}",
                    record.header.record_id().unwrap_or("<no WARC-Record-ID>")
                );
            }

            record
                .finish_lenient()
                .map_err(|source| ScanError::Io {
                    name: name.to_owned(),
                    source,
                })?;
            if let Some(bar) = &self.progress {
                bar.set_position(reader.position());
            }
        }

        info!(
            "Read {} WARC response records from file {}",
            summary.responses, name
        );
        Ok(summary)
    }

    fn handle_record<R: BufRead, H: ResponseHandler>(
        &self,
        offset: u64,
        record: &mut warcio::Record<R>,
        handler: &mut H,
    ) -> Result<(), HandlerError> {
        let url = record.header.target_uri().unwrap_or("").to_owned();
        let head = match HttpHead::read_from(&mut *record, self.config.limits.max_envelope_size) {
            Ok(head) => head,
            Err(e) => {
                handler.unreadable(offset, &url, &e);
                return Err(e.into());
            }
        };
        let declared_len = record.remaining();

        handler.handle(ScannedResponse {
            offset,
            url: &url,
            head,
            declared_len,
            body: record,
        })
    }
}
