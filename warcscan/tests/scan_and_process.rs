use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use warcio::Limits;
use warcscan::index::RecordIndex;
use warcscan::process::{Parsed, PayloadParser, ProcessConfig, Processor, Response, UnparseableFormat};
use warcscan::{ArchiveScanner, ScanConfig};

/// Parses payloads of the form `index\n<url>\n...` or `doc...`, remembering what it saw.
#[derive(Default)]
struct RecordingParser {
    seen: Vec<(String, Vec<u8>)>,
}

impl PayloadParser for RecordingParser {
    fn parse(&mut self, response: &Response<'_>) -> Result<Parsed, UnparseableFormat> {
        self.seen
            .push((response.url.to_owned(), response.payload.to_vec()));
        let text = String::from_utf8_lossy(response.payload);
        if let Some(list) = text.strip_prefix("index\n") {
            Ok(Parsed::Index(list.lines().map(str::to_owned).collect()))
        } else if text.starts_with("doc") {
            Ok(Parsed::Document { entries: 1 })
        } else {
            Err(UnparseableFormat::new(response.url, "not a test document"))
        }
    }
}

impl RecordingParser {
    fn urls(&self) -> Vec<&str> {
        self.seen.iter().map(|(url, _)| url.as_str()).collect()
    }
}

fn record(url: &str, status: &str, headers: &str, body: &[u8]) -> Vec<u8> {
    let mut http = format!("HTTP/1.1 {}\r\n{}\r\n", status, headers).into_bytes();
    http.extend_from_slice(body);

    let mut out = format!(
        "WARC/1.1\r\n\
         WARC-Type: response\r\n\
         WARC-Target-URI: {}\r\n\
         Content-Type: application/http;msgtype=response\r\n\
         Content-Length: {}\r\n\
         \r\n",
        url,
        http.len()
    )
    .into_bytes();
    out.extend(http);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

fn ok(url: &str, body: &str) -> Vec<u8> {
    record(url, "200 OK", "Content-Type: text/plain\r\n", body.as_bytes())
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

fn write_warc(dir: &Path, name: &str, records: &[Vec<u8>]) -> std::path::PathBuf {
    let path = dir.join(name);
    let contents: Vec<u8> = if name.ends_with(".gz") {
        records.iter().flat_map(|r| gzip(r)).collect()
    } else {
        records.concat()
    };
    std::fs::write(&path, contents).expect("failed to write WARC file");
    path
}

fn new_processor() -> Processor<RecordingParser> {
    Processor::new(
        RecordingParser::default(),
        ProcessConfig::default(),
        Limits::default(),
    )
}

#[test]
fn direct_mode_counts_outcomes() {
    let dir = TempDir::new().unwrap();
    let path = write_warc(
        dir.path(),
        "direct.warc.gz",
        &[
            record(
                "http://example.com/a",
                "200 OK",
                "Content-Encoding: gzip\r\n",
                &gzip(b"doc a"),
            ),
            record("http://example.com/missing", "404 Not Found", "", b"doc gone"),
            record(
                "http://example.com/b",
                "200 OK",
                "Transfer-Encoding: chunked\r\n",
                b"doc b, not really chunked",
            ),
        ],
    );

    let mut processor = new_processor();
    let summary = processor
        .process_file(&ArchiveScanner::default(), &path)
        .unwrap();
    assert_eq!(summary.responses, 3);
    assert_eq!(summary.failures, 0);

    let counter = processor.counter().clone();
    assert_eq!(counter.processed, 3);
    assert_eq!(counter.succeeded, 2);
    assert_eq!(counter.failed_fetch, 1);
    assert_eq!(counter.degraded, 1);
    assert_eq!(counter.failed_parse, 0);

    let parser = processor.into_parser();
    assert_eq!(
        parser.seen,
        vec![
            ("http://example.com/a".to_owned(), b"doc a".to_vec()),
            (
                "http://example.com/b".to_owned(),
                b"doc b, not really chunked".to_vec()
            ),
        ]
    );
}

#[test]
fn direct_mode_survives_oversized_payload() {
    let dir = TempDir::new().unwrap();
    let big = format!("doc {}", "x".repeat(4000));
    let path = write_warc(
        dir.path(),
        "big.warc",
        &[ok("http://example.com/big", &big), ok("http://example.com/small", "doc")],
    );

    let limits = Limits {
        max_payload_size: 1000,
        ..Default::default()
    };
    let scanner = ArchiveScanner::new(ScanConfig {
        limits,
        ..Default::default()
    });
    let mut processor = Processor::new(RecordingParser::default(), ProcessConfig::default(), limits);
    let summary = processor.process_file(&scanner, &path).unwrap();

    assert_eq!(summary.failures, 1);
    assert_eq!(processor.counter().failed_fetch, 1);
    assert_eq!(processor.counter().succeeded, 1);
    assert_eq!(processor.into_parser().urls(), vec!["http://example.com/small"]);
}

fn oversized_envelope_file(dir: &Path) -> std::path::PathBuf {
    let padding = format!("X-Padding: {}\r\n", "p".repeat(480));
    write_warc(
        dir,
        "envelope.warc",
        &[
            record("http://example.com/huge-head", "200 OK", &padding, b"doc huge"),
            ok("http://example.com/fine", "doc fine"),
        ],
    )
}

fn small_envelope_scanner() -> ArchiveScanner {
    ArchiveScanner::new(ScanConfig {
        limits: Limits {
            max_envelope_size: 256,
            ..Default::default()
        },
        ..Default::default()
    })
}

#[test]
fn unreadable_envelope_counts_as_failed_fetch() {
    let dir = TempDir::new().unwrap();
    let path = oversized_envelope_file(dir.path());
    let scanner = small_envelope_scanner();

    let mut direct = new_processor();
    let summary = direct.process_file(&scanner, &path).unwrap();
    assert_eq!(summary.failures, 1);
    let counter = direct.counter().clone();
    assert_eq!(counter.processed, 2);
    assert_eq!(counter.failed_fetch, 1);
    assert_eq!(counter.succeeded, 1);
    assert_eq!(direct.into_parser().urls(), vec!["http://example.com/fine"]);

    let mut index = RecordIndex::new();
    let summary = index.index_file(&scanner, &path).unwrap();
    assert_eq!(summary.failures, 1);
    assert_eq!(index.len(), 2);
    assert_eq!(index.get("http://example.com/huge-head").unwrap().status, 0);

    let mut indexed = new_processor();
    indexed.process_index(&index);
    let counter = indexed.counter().clone();
    assert_eq!(counter.processed, 2);
    assert_eq!(counter.failed_fetch, 1);
    assert_eq!(counter.succeeded, 1);

    // Filtering to another URL leaves the unreadable record uncounted
    let config = ProcessConfig {
        url_filter: Some("http://example.com/fine".to_owned()),
        ..Default::default()
    };
    let mut filtered = Processor::new(RecordingParser::default(), config, Limits::default());
    filtered.process_file(&scanner, &path).unwrap();
    assert_eq!(filtered.counter().processed, 1);
    assert_eq!(filtered.counter().failed_fetch, 0);
}

#[test]
fn indexed_mode_follows_one_level() {
    let dir = TempDir::new().unwrap();
    let path = write_warc(
        dir.path(),
        "crawl.warc",
        &[
            ok(
                "http://example.com/robots.txt",
                "index\nhttp://example.com/sitemap-index.xml\nhttp://example.com/a\nhttp://example.com/never-crawled\n",
            ),
            ok(
                "http://example.com/sitemap-index.xml",
                "index\nhttp://example.com/deep\n",
            ),
            ok("http://example.com/a", "doc a"),
            ok("http://example.com/deep", "doc deep"),
            ok("http://example.com/z", "doc z"),
        ],
    );

    let scanner = ArchiveScanner::default();
    let mut index = RecordIndex::new();
    let summary = index.index_file(&scanner, &path).unwrap();
    assert_eq!(summary.responses, 5);
    assert_eq!(index.len(), 5);

    let mut processor = new_processor();
    processor.process_index(&index);

    let counter = processor.counter().clone();
    assert_eq!(counter.processed, 3);
    assert_eq!(counter.processed_children, 2);
    assert_eq!(counter.succeeded, 5);
    assert_eq!(counter.indexes, 2);
    assert_eq!(counter.children_found, 4);
    assert_eq!(counter.failed_fetch, 0);

    // Every record is parsed exactly once; the nested index is not expanded from the child
    assert_eq!(
        processor.into_parser().urls(),
        vec![
            "http://example.com/robots.txt",
            "http://example.com/sitemap-index.xml",
            "http://example.com/a",
            "http://example.com/deep",
            "http://example.com/z",
        ]
    );
    assert!(index.iter().all(|(_, record)| record.is_processed()));

    // A second pass finds nothing left to do
    let mut again = new_processor();
    again.process_index(&index);
    assert_eq!(again.counter().total_processed(), 0);
}

#[test]
fn later_records_replace_earlier_ones_in_place() {
    let dir = TempDir::new().unwrap();
    let first = write_warc(
        dir.path(),
        "first.warc",
        &[ok("http://example.com/x", "doc old"), ok("http://example.com/y", "doc y")],
    );
    let second = write_warc(
        dir.path(),
        "second.warc.gz",
        &[ok("http://example.com/x", "doc new")],
    );

    let scanner = ArchiveScanner::default();
    let mut index = RecordIndex::new();
    index.index_file(&scanner, &first).unwrap();
    index.index_file(&scanner, &second).unwrap();

    let urls: Vec<&str> = index.iter().map(|(url, _)| url).collect();
    assert_eq!(urls, vec!["http://example.com/x", "http://example.com/y"]);
    let x = index.get("http://example.com/x").unwrap();
    assert_eq!((x.file_id, x.offset), (1, 0));
    assert_eq!(index.files().len(), 2);

    let mut processor = new_processor();
    processor.process_index(&index);
    assert_eq!(
        processor.into_parser().seen[0],
        ("http://example.com/x".to_owned(), b"doc new".to_vec())
    );
}

#[test]
fn url_filter_selects_one_record() {
    let dir = TempDir::new().unwrap();
    let path = write_warc(
        dir.path(),
        "filter.warc",
        &[
            ok("http://example.com/a", "doc a"),
            ok("http://example.com/b", "doc b"),
        ],
    );

    let scanner = ArchiveScanner::default();
    let config = ProcessConfig {
        url_filter: Some("http://example.com/b".to_owned()),
        ..Default::default()
    };

    let mut index = RecordIndex::new();
    index.index_file(&scanner, &path).unwrap();
    let mut indexed = Processor::new(RecordingParser::default(), config.clone(), Limits::default());
    indexed.process_index(&index);
    assert_eq!(indexed.into_parser().urls(), vec!["http://example.com/b"]);
    assert!(!index.get("http://example.com/a").unwrap().is_processed());

    let mut direct = Processor::new(RecordingParser::default(), config, Limits::default());
    direct.process_file(&scanner, &path).unwrap();
    assert_eq!(direct.counter().processed, 1);
    assert_eq!(direct.into_parser().urls(), vec!["http://example.com/b"]);
}

#[test]
fn compressed_index_rereads_payloads() {
    let dir = TempDir::new().unwrap();
    let path = write_warc(
        dir.path(),
        "crawl.warc.gz",
        &[
            record(
                "http://example.com/1",
                "200 OK",
                "Content-Encoding: gzip\r\n",
                &gzip(b"doc one"),
            ),
            ok("http://example.com/2", "doc two"),
            record("http://example.com/3", "500 Internal Server Error", "", b""),
            ok("http://example.com/4", "not a document"),
        ],
    );

    let mut index = RecordIndex::new();
    index.index_file(&ArchiveScanner::default(), &path).unwrap();
    assert_eq!(index.len(), 4);
    assert_eq!(index.get("http://example.com/3").unwrap().status, 500);

    let first = index.get("http://example.com/1").unwrap();
    let (head, payload) = index.read_payload(first).unwrap().unwrap();
    assert_eq!(head.status, 200);
    assert_eq!(payload.bytes, b"doc one");
    assert_eq!(
        index.read_payload(first).unwrap().unwrap().1,
        payload,
        "rereading gives the same payload"
    );

    let mut processor = new_processor();
    processor.process_index(&index);
    let counter = processor.counter();
    assert_eq!(counter.processed, 4);
    assert_eq!(counter.succeeded, 2);
    assert_eq!(counter.failed_fetch, 1);
    assert_eq!(counter.failed_parse, 1);
}
