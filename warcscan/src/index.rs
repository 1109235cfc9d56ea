//! An index of archived responses by target URL.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;

use warcio::http::{EnvelopeError, HttpHead, HttpHeaders};
use warcio::locate::{LocateError, RecordLocator};
use warcio::payload::Payload;

use crate::{ArchiveScanner, HandlerError, ResponseHandler, ScanError, ScanSummary, ScannedResponse};

/// Where to find one archived response, and what its envelope said.
#[derive(Debug)]
pub struct IndexedRecord {
    /// Index into [`RecordIndex::files`] of the file holding the record.
    pub file_id: usize,
    /// Offset of the record in that file.
    pub offset: u64,
    /// HTTP status, 0 if unknown.
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: HttpHeaders,
    processed: AtomicBool,
}

impl IndexedRecord {
    pub fn new(file_id: usize, offset: u64, head: HttpHead) -> Self {
        IndexedRecord {
            file_id,
            offset,
            status: head.status,
            content_type: head.content_type().map(str::to_owned),
            headers: head.headers,
            processed: AtomicBool::new(false),
        }
    }

    /// A record whose HTTP envelope could not be read, kept with status 0 so that processing
    /// counts it as a failed fetch.
    pub fn unreadable(file_id: usize, offset: u64) -> Self {
        IndexedRecord {
            file_id,
            offset,
            status: 0,
            content_type: None,
            headers: HttpHeaders::new(),
            processed: AtomicBool::new(false),
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed.load(Ordering::Acquire)
    }

    /// Mark this record processed, returning `true` only for the first caller to do so.
    pub fn mark_processed(&self) -> bool {
        !self.processed.swap(true, Ordering::AcqRel)
    }
}

/// Map from target URL to the latest response archived for it, across any number of files.
///
/// Iteration follows the order in which URLs were first seen; a URL seen again keeps its
/// position but points at the newer record.
#[derive(Debug, Default)]
pub struct RecordIndex {
    files: Vec<RecordLocator>,
    records: IndexMap<String, IndexedRecord>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Scan `path` and add every response in it to the index.
    ///
    /// Records already indexed from a file that fails part way through are kept.
    pub fn index_file(
        &mut self,
        scanner: &ArchiveScanner,
        path: &Path,
    ) -> Result<ScanSummary, ScanError> {
        let (reader, compression) = scanner.open(path)?;
        let file_id = self.add_file(RecordLocator::new(
            path,
            compression,
            scanner.config().limits,
        ));

        let mut handler = Indexer {
            records: &mut self.records,
            file_id,
        };
        let summary = scanner.scan(reader, compression, &path.display().to_string(), &mut handler)?;
        info!("Index holds {} URLs after {}", self.records.len(), path.display());
        Ok(summary)
    }

    /// Register a file, returning its id.
    pub fn add_file(&mut self, locator: RecordLocator) -> usize {
        self.files.push(locator);
        self.files.len() - 1
    }

    /// Add or replace the record for `url`.
    pub fn insert(&mut self, url: String, record: IndexedRecord) {
        if let Some(old) = self.records.insert(url, record) {
            trace!("replaced record at offset {} of file {}", old.offset, old.file_id);
        }
    }

    pub fn get(&self, url: &str) -> Option<&IndexedRecord> {
        self.records.get(url)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexedRecord)> {
        self.records.iter().map(|(url, record)| (url.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn files(&self) -> &[RecordLocator] {
        &self.files
    }

    /// Re-read the record from its file and decode its payload.
    ///
    /// Returns `None` if the record's file is not registered with this index.
    pub fn read_payload(
        &self,
        record: &IndexedRecord,
    ) -> Option<Result<(HttpHead, Payload), LocateError>> {
        let locator = self.files.get(record.file_id)?;
        Some(locator.read_payload_at(record.offset))
    }
}

struct Indexer<'a> {
    records: &'a mut IndexMap<String, IndexedRecord>,
    file_id: usize,
}

impl ResponseHandler for Indexer<'_> {
    fn handle(&mut self, response: ScannedResponse<'_>) -> Result<(), HandlerError> {
        if response.url.is_empty() {
            debug!("not indexing response at offset {} without a URL", response.offset);
            return Ok(());
        }
        let record = IndexedRecord::new(self.file_id, response.offset, response.head);
        self.records.insert(response.url.to_owned(), record);
        Ok(())
    }

    fn unreadable(&mut self, offset: u64, url: &str, _error: &EnvelopeError) {
        if !url.is_empty() {
            let record = IndexedRecord::unreadable(self.file_id, offset);
            self.records.insert(url.to_owned(), record);
        }
    }
}
