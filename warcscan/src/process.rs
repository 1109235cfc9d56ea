//! Handing archived responses to a parser and counting the outcomes.
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

use warcio::http::{EnvelopeError, HttpHeaders};
use warcio::payload::{self, Payload};
use warcio::Limits;

use crate::index::RecordIndex;
use crate::{ArchiveScanner, HandlerError, ResponseHandler, ScanError, ScanSummary, ScannedResponse};

/// A response as presented to a [`PayloadParser`].
///
/// The payload only lives as long as the call; parsers must copy anything they keep.
#[derive(Debug, Clone, Copy)]
pub struct Response<'a> {
    pub url: &'a str,
    pub status: u16,
    pub content_type: Option<&'a str>,
    pub headers: &'a HttpHeaders,
    pub payload: &'a [u8],
}

/// What a parser made of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A document, with the number of entries (rules, URLs, ...) found in it.
    Document { entries: usize },
    /// A list of further documents to process, such as a sitemap index.
    Index(Vec<String>),
}

/// The parser could not make sense of a payload.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown or unparseable format for {url}: {reason}")]
pub struct UnparseableFormat {
    pub url: String,
    pub reason: String,
}

impl UnparseableFormat {
    pub fn new<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        UnparseableFormat {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Interprets response payloads.
pub trait PayloadParser {
    fn parse(&mut self, response: &Response<'_>) -> Result<Parsed, UnparseableFormat>;
}

impl<P: PayloadParser + ?Sized> PayloadParser for Box<P> {
    fn parse(&mut self, response: &Response<'_>) -> Result<Parsed, UnparseableFormat> {
        (**self).parse(response)
    }
}

/// Settings for processing responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Parses slower than this are logged.
    pub slow_threshold: Duration,
    /// Log a progress line after every this many processed records; 0 disables it.
    pub report_interval: u64,
    /// Only process the response for this exact URL.
    pub url_filter: Option<String>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        ProcessConfig {
            slow_threshold: Duration::from_millis(300),
            report_interval: 50,
            url_filter: None,
        }
    }
}

/// Outcome counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    /// Records handed to processing directly.
    pub processed: u64,
    /// Records reached through an index document.
    pub processed_children: u64,
    /// Records whose payload parsed.
    pub succeeded: u64,
    /// Records with a non-200 status or whose payload could not be retrieved.
    pub failed_fetch: u64,
    /// Records whose payload was only partly decoded but still parsed.
    pub degraded: u64,
    /// Records the parser rejected.
    pub failed_parse: u64,
    /// Parsed records that were index documents.
    pub indexes: u64,
    /// URLs listed by index documents.
    pub children_found: u64,
    /// Time spent in the parser.
    pub parse_time: Duration,
}

impl Counter {
    /// Total number of records processed by any path.
    pub fn total_processed(&self) -> u64 {
        self.processed + self.processed_children
    }

    /// Log the counts, with `elapsed` as the run's wall-clock time.
    pub fn log_summary(&self, elapsed: Duration) {
        for line in self.to_string().lines() {
            info!("{}", line);
        }
        info!("{:<20}{:>10.3}s", "elapsed:", elapsed.as_secs_f64());
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, u64); 8] = [
            ("processed:", self.processed),
            ("processed children:", self.processed_children),
            ("success:", self.succeeded),
            ("failed to fetch:", self.failed_fetch),
            ("degraded payload:", self.degraded),
            ("failed to process:", self.failed_parse),
            ("index documents:", self.indexes),
            ("child URLs found:", self.children_found),
        ];
        for (label, value) in rows.iter() {
            writeln!(f, "{:<20}{:>10}", label, value)?;
        }
        write!(f, "{:<20}{:>10.3}s", "parse time:", self.parse_time.as_secs_f64())
    }
}

/// Feeds archived responses to a [`PayloadParser`] and counts what happens.
///
/// In direct mode ([`process_file`](Self::process_file)) each response is parsed as the file is
/// scanned. In indexed mode ([`process_index`](Self::process_index)) responses are re-read from
/// their files by URL, and index documents are expanded by one level: the URLs they list are
/// looked up and processed, but an index found that way is not expanded further. Either way a
/// record is parsed at most once.
pub struct Processor<P> {
    parser: P,
    config: ProcessConfig,
    limits: Limits,
    counter: Counter,
}

impl<P: PayloadParser> Processor<P> {
    pub fn new(parser: P, config: ProcessConfig, limits: Limits) -> Self {
        Processor {
            parser,
            config,
            limits,
            counter: Counter::default(),
        }
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }

    pub fn into_parser(self) -> P {
        self.parser
    }

    /// Process every response in a file as it is scanned.
    pub fn process_file(
        &mut self,
        scanner: &ArchiveScanner,
        path: &Path,
    ) -> Result<ScanSummary, ScanError> {
        scanner.scan_file(path, &mut Direct { processor: self })
    }

    /// Process the responses in `index`, in index order.
    pub fn process_index(&mut self, index: &RecordIndex) {
        let targets: Vec<&str> = match &self.config.url_filter {
            Some(url) => vec![url.as_str()],
            None => index.iter().map(|(url, _)| url).collect(),
        };
        // The filter borrows from config, so iterate over owned copies
        let targets: Vec<String> = targets.into_iter().map(str::to_owned).collect();
        for url in &targets {
            self.process_indexed(index, url, false);
        }
    }

    fn process_indexed(&mut self, index: &RecordIndex, url: &str, is_child: bool) {
        let record = match index.get(url) {
            Some(record) => record,
            None => {
                debug!("No record found for {}", url);
                return;
            }
        };
        if !record.mark_processed() {
            debug!("{} already processed, skipping", url);
            return;
        }
        self.count_processed(is_child);

        if record.status != 200 {
            warn!("{} has status {}, not parsing", url, record.status);
            self.counter.failed_fetch += 1;
            return;
        }

        let payload = match index.read_payload(record) {
            Some(Ok((_, payload))) => payload,
            Some(Err(e)) => {
                error!("Failed to read content of {}: {}", url, e);
                self.counter.failed_fetch += 1;
                return;
            }
            None => {
                error!("{} refers to unknown file {}", url, record.file_id);
                self.counter.failed_fetch += 1;
                return;
            }
        };

        let response = Response {
            url,
            status: record.status,
            content_type: record.content_type.as_deref(),
            headers: &record.headers,
            payload: &payload.bytes,
        };
        if let Some(children) = self.parse(&response, &payload) {
            if is_child {
                warn!("Recursive index skipped: {} lists {} URLs", url, children.len());
            } else {
                for child in &children {
                    self.process_indexed(index, child, true);
                }
            }
        }
    }

    fn process_scanned(&mut self, response: ScannedResponse<'_>) -> Result<(), HandlerError> {
        if let Some(url) = &self.config.url_filter {
            if url != response.url {
                return Ok(());
            }
        }
        self.count_processed(false);

        let status = response.head.status;
        if status != 200 {
            warn!("{} has status {}, not parsing", response.url, status);
            self.counter.failed_fetch += 1;
            return Ok(());
        }

        let payload = match payload::read_payload(
            &response.head,
            response.body.take(response.declared_len),
            Some(response.declared_len),
            &self.limits,
            response.url,
        ) {
            Ok(payload) => payload,
            Err(e) => {
                self.counter.failed_fetch += 1;
                return Err(e.into());
            }
        };

        let parsed = Response {
            url: response.url,
            status,
            content_type: response.head.content_type(),
            headers: &response.head.headers,
            payload: &payload.bytes,
        };
        if let Some(children) = self.parse(&parsed, &payload) {
            debug!(
                "{} lists {} URLs, not followed without an index",
                response.url,
                children.len()
            );
        }
        Ok(())
    }

    fn process_unreadable(&mut self, url: &str) {
        if let Some(filter) = &self.config.url_filter {
            if filter != url {
                return;
            }
        }
        self.count_processed(false);
        self.counter.failed_fetch += 1;
    }

    fn count_processed(&mut self, is_child: bool) {
        if is_child {
            self.counter.processed_children += 1;
        } else {
            self.counter.processed += 1;
        }

        let total = self.counter.total_processed();
        if self.config.report_interval > 0 && total % self.config.report_interval == 0 {
            info!(
                "Processed {} records ({} succeeded, {} failed to fetch, {} failed to process)",
                total, self.counter.succeeded, self.counter.failed_fetch, self.counter.failed_parse
            );
        }
    }

    /// Run the parser, updating counters. Returns the listed URLs if the payload is an index.
    fn parse(&mut self, response: &Response<'_>, payload: &Payload) -> Option<Vec<String>> {
        if !payload.is_intact() {
            debug!("{} payload degraded: {:?}", response.url, payload.degradations);
            self.counter.degraded += 1;
        }

        let start = Instant::now();
        let result = self.parser.parse(response);
        let elapsed = start.elapsed();
        self.counter.parse_time += elapsed;
        if elapsed > self.config.slow_threshold {
            warn!(
                "Slow parse of {} ({} bytes) took {} ms",
                response.url,
                response.payload.len(),
                elapsed.as_millis()
            );
        }

        match result {
            Ok(Parsed::Document { entries }) => {
                trace!("{}: {} entries", response.url, entries);
                self.counter.succeeded += 1;
                None
            }
            Ok(Parsed::Index(children)) => {
                self.counter.succeeded += 1;
                self.counter.indexes += 1;
                self.counter.children_found += children.len() as u64;
                Some(children)
            }
            Err(e) => {
                warn!("{}", e);
                self.counter.failed_parse += 1;
                None
            }
        }
    }
}

struct Direct<'a, P> {
    processor: &'a mut Processor<P>,
}

impl<P: PayloadParser> ResponseHandler for Direct<'_, P> {
    fn handle(&mut self, response: ScannedResponse<'_>) -> Result<(), HandlerError> {
        self.processor.process_scanned(response)
    }

    fn unreadable(&mut self, _offset: u64, url: &str, _error: &EnvelopeError) {
        self.processor.process_unreadable(url);
    }
}
