use std::io::Read;
use std::time::Duration;

use pretty_assertions::assert_eq;

use warcio::http::HttpHead;
use warcio::{Compression, Header, Version};

use crate::index::IndexedRecord;
use crate::process::Counter;
use crate::{is_http_response, ArchiveScanner, HandlerError, ResponseHandler, ScannedResponse};

const HTTP_RECORD: &str = "\
WARC/1.0\r
WARC-Type: response\r
WARC-Record-ID: <urn:uuid:409aba28-ce26-43ec-ae90-60dd3de9a60a>\r
WARC-Concurrent-To: <urn:uuid:469a06ca-a78c-4962-8c21-b88c35024d34>\r
WARC-Target-URI: <https://example.com/example.txt>\r
WARC-Date: 2018-01-28T13:33:12Z\r
WARC-IP-Address: 2606:2800:220:1:248:1893:25c8:1946\r
Content-Type: application/http;msgtype=response\r
Content-Length: 132\r
\r
HTTP/1.1 404 Not Found\r
Date: Sun, 28 Jan 2018 13:33:12 GMT\r
Content-Type: text/plain\r
Content-Length: 23\r
\r
There is nothing here.
\r
\r
";

const METADATA_RECORD: &str = "\
WARC/1.0\r
WARC-Type: metadata\r
WARC-Target-URI: <https://example.com/example.txt>\r
Content-Type: application/warc-fields\r
Content-Length: 9\r
\r
via: none\r
\r
";

fn header(fields: &[(&str, &str)]) -> Header {
    let mut header = Header::new(Version::WARC1_1);
    for &(name, value) in fields {
        header.set_field(name, value);
    }
    header
}

#[test]
fn classifies_http_responses() {
    let http = "application/http; msgtype=response";
    assert!(is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("Content-Type", http)
    ])));
    assert!(is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("Content-Type", "application/http;msgtype=Response")
    ])));
    // Nonstandard record types are judged by content type alone
    assert!(is_http_response(&header(&[
        ("WARC-Type", "x-crawler-response"),
        ("Content-Type", http)
    ])));
    assert!(is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("WARC-Target-URI", "<HTTPS://example.com/>")
    ])));

    assert!(!is_http_response(&header(&[
        ("WARC-Type", "request"),
        ("Content-Type", "application/http; msgtype=request")
    ])));
    assert!(!is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("Content-Type", "application/http; msgtype=request")
    ])));
    assert!(!is_http_response(&header(&[
        ("WARC-Type", "resource"),
        ("Content-Type", http)
    ])));
    assert!(!is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("Content-Type", "text/dns"),
        ("WARC-Target-URI", "dns:example.com")
    ])));
    assert!(!is_http_response(&header(&[
        ("WARC-Type", "response"),
        ("WARC-Target-URI", "ftp://example.com/")
    ])));
    assert!(!is_http_response(&Header::new(Version::WARC1_0)));
}

#[derive(Default)]
struct Collector {
    seen: Vec<(u64, String, u16, u64, Vec<u8>)>,
    fail_on: Option<String>,
}

impl ResponseHandler for Collector {
    fn handle(&mut self, response: ScannedResponse<'_>) -> Result<(), HandlerError> {
        if self.fail_on.as_deref() == Some(response.url) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "refused").into());
        }
        let mut body = vec![];
        response.body.read_to_end(&mut body)?;
        self.seen.push((
            response.offset,
            response.url.to_owned(),
            response.head.status,
            response.declared_len,
            body,
        ));
        Ok(())
    }
}

#[test]
fn scanner_passes_responses_only() {
    let input = format!("{}{}{}", HTTP_RECORD, METADATA_RECORD, HTTP_RECORD);
    let mut collector = Collector::default();

    let summary = ArchiveScanner::default()
        .scan(input.as_bytes(), Compression::None, "memory", &mut collector)
        .expect("scan should succeed");

    assert_eq!(summary.records, 3);
    assert_eq!(summary.responses, 2);
    assert_eq!(summary.failures, 0);

    let second = (HTTP_RECORD.len() + METADATA_RECORD.len()) as u64;
    let offsets: Vec<u64> = collector.seen.iter().map(|s| s.0).collect();
    assert_eq!(offsets, vec![0, second]);

    let (_, url, status, declared, body) = &collector.seen[0];
    assert_eq!(url, "https://example.com/example.txt");
    assert_eq!(*status, 404);
    assert_eq!(*declared, 23);
    assert_eq!(body, b"There is nothing here.\n");
}

#[test]
fn handler_failure_does_not_stop_scan() {
    let other = HTTP_RECORD.replace("example.txt", "other.txt");
    let input = format!("{}{}", HTTP_RECORD, other);
    let mut collector = Collector {
        fail_on: Some("https://example.com/example.txt".to_owned()),
        ..Default::default()
    };

    let summary = ArchiveScanner::default()
        .scan(input.as_bytes(), Compression::None, "memory", &mut collector)
        .unwrap();
    assert_eq!(summary.responses, 2);
    assert_eq!(summary.failures, 1);
    assert_eq!(collector.seen.len(), 1);
    assert_eq!(collector.seen[0].1, "https://example.com/other.txt");
}

#[test]
fn unreadable_record_ends_scan_with_offset() {
    let input = format!("{}garbage\r\n\r\n", HTTP_RECORD);
    let mut collector = Collector::default();
    let result =
        ArchiveScanner::default().scan(input.as_bytes(), Compression::None, "memory", &mut collector);
    match result {
        Err(crate::ScanError::Record { offset, .. }) => {
            assert_eq!(offset, HTTP_RECORD.len() as u64)
        }
        other => panic!("expected a record error, got {:?}", other),
    }
    assert_eq!(collector.seen.len(), 1);
}

#[test]
fn indexed_record_is_processed_once() {
    let mut envelope = &b"HTTP/1.1 200 OK\r\nContent-Type:  text/plain \r\n\r\n"[..];
    let head = HttpHead::read_from(&mut envelope, 1024).unwrap();
    let record = IndexedRecord::new(0, 42, head);

    assert_eq!(record.content_type.as_deref(), Some("text/plain"));
    assert!(!record.is_processed());
    assert!(record.mark_processed());
    assert!(!record.mark_processed());
    assert!(record.is_processed());
}

#[test]
fn counter_summary_lists_every_count() {
    let counter = Counter {
        processed: 3,
        succeeded: 2,
        failed_fetch: 1,
        parse_time: Duration::from_millis(1500),
        ..Default::default()
    };
    let text = counter.to_string();
    assert_eq!(text.lines().count(), 9);
    assert!(text.contains(&format!("{:<20}{:>10}", "success:", 2)));
    assert!(text.ends_with("1.500s"));
    assert_eq!(counter.total_processed(), 3);
}
