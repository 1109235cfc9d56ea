use std::io::Write;

use flate2::write::GzEncoder;
use pretty_assertions::assert_eq;

use crate::header::get_record_header;
use crate::{FieldKind, FieldName, Header, HeaderParseError, Version};


/// Frame an HTTP response as a WARC/1.0 response record.
pub(crate) fn response_record(uri: &str, http: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "WARC/1.0\r\n\
         WARC-Type: response\r\n\
         WARC-Target-URI: <{}>\r\n\
         Content-Type: application/http; msgtype=response\r\n\
         Content-Length: {}\r\n\
         \r\n",
        uri,
        http.len()
    )
    .into_bytes();
    out.extend_from_slice(http);
    out.extend_from_slice(b"\r\n\r\n");
    out
}

/// Compress `data` as a single gzip member.
pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

#[test]
fn header_parse_consumes_full() {
    let text = b"\
        WARC/1.1\r\n\
        Content-Length: 123\r\n\
        \r\n\
    ";

    let (header, sz) = Header::parse(&text[..]).expect("Parse should succeed");
    assert_eq!(sz, text.len());
    let mut test_header = Header::new(Version::WARC1_1);
    test_header.set_field(FieldKind::ContentLength, "123");
    assert_eq!(header, test_header);
}

#[test]
fn can_read_record_header() {
    let header = b"WARC/1.0\r\n\
                   Warc-Type: testdata\r\n\
                   Content-Length: 6\r\n\
                   X-Multiline-Test:lol \r\n  multiline headers\r\n\
                   \r\n";

    let mut expected = Header::new(Version::WARC1_0);
    expected.set_field("warc-type", b"testdata".to_vec());
    expected.set_field("content-length", b"6".to_vec());
    expected.set_field("x-multiline-test", b"lol multiline headers".to_vec());

    let parsed = get_record_header(&header[..], 1024).expect("Should be valid");
    assert_eq!(parsed, expected);
    assert_eq!(parsed.warc_type(), Some("testdata"));
    assert_eq!(parsed.content_length(), Some(6));
}

#[test]
fn header_strips_bare_uri_brackets() {
    let mut header = Header::new(Version::WARC1_0);
    header.set_field(FieldKind::TargetURI, "<http://example.com/a b>");

    assert_eq!(header.target_uri(), Some("http://example.com/a b"));
    assert_eq!(
        header.get_field_bytes_raw(FieldName::from(FieldKind::TargetURI)),
        Some(&b"<http://example.com/a b>"[..])
    );

    // Only bare-URI fields are affected
    header.set_field("X-Quoted", "<kept>");
    assert_eq!(header.get_field("x-quoted"), Some("<kept>"));
}

#[test]
fn extra_buffering_works() {
    use std::io::{self, Result};
    /// A type to probe the buffering behavior of `get_record_header`.
    ///
    /// On each `fill_buf` call it transitions to the next state, and
    /// after two it is in the terminal state.
    #[derive(Debug, PartialEq)]
    enum DoubleBuffer<'a> {
        /// Nothing read yet.
        Start(&'a [u8], &'a [u8]),
        /// One whole buffer read.
        Second(&'a [u8]),
        /// Both buffers read, with n bytes left unconsumed in the second.
        Done(usize),
    }
    // Only because BufRead: Read
    impl<'a> io::Read for DoubleBuffer<'a> {
        fn read(&mut self, _: &mut [u8]) -> Result<usize> {
            unimplemented!();
        }
    }
    impl<'a> io::BufRead for DoubleBuffer<'a> {
        fn fill_buf(&mut self) -> Result<&[u8]> {
            match *self {
                DoubleBuffer::Start(fst, _) => Ok(fst),
                DoubleBuffer::Second(snd) => Ok(snd),
                DoubleBuffer::Done(_) => panic!("Should not fill after snd"),
            }
        }

        fn consume(&mut self, amt: usize) {
            let next = match *self {
                DoubleBuffer::Start(fst, snd) => {
                    assert_eq!(amt, fst.len());
                    DoubleBuffer::Second(snd)
                }
                DoubleBuffer::Second(snd) => DoubleBuffer::Done(snd.len() - amt),
                DoubleBuffer::Done(_) => panic!("Should not consume after snd"),
            };
            *self = next;
        }
    }

    let mut reader = DoubleBuffer::Start(
        b"WARC/1.0\r\n\
          X-First-Header: yes\r\n\
          X-Second-Header:yes\r\n\
          \r",
        // Header termination spans two buffers
        // to catch potential errors there.
        b"\nIGNORED_DATA",
    );
    get_record_header(&mut reader, 1024).expect("failed to parse valid header");
    assert_eq!(reader, DoubleBuffer::Done(12));
}

#[test]
fn incorrect_signature_is_invalid() {
    assert_eq!(
        Version::parse(b"\x89PNG\r\n\x1a\n"),
        Err(HeaderParseError::InvalidSignature("\u{fffd}PNG\r".into()))
    );
    assert!(matches!(
        Version::parse(b"WARC/1.0a\r\n"),
        Err(HeaderParseError::InvalidSignature(_))
    ));
    assert_eq!(Version::parse(b"WARC/1."), Err(HeaderParseError::Truncated));
}

#[test]
fn truncated_header_is_invalid() {
    const BYTES: &[u8] = b"WARC/1.1\r\n\
                           Warc-Type: testdata\r\n\r";

    assert_eq!(
        get_record_header(BYTES, 1024),
        Err(HeaderParseError::Truncated)
    );
}

#[test]
fn runaway_header_is_rejected() {
    let mut bytes = b"WARC/1.1\r\n".to_vec();
    for i in 0..1000 {
        bytes.extend_from_slice(format!("X-Field-{}: value\r\n", i).as_bytes());
    }
    bytes.extend_from_slice(b"\r\n");

    // A small buffer forces the incremental path
    let reader = std::io::BufReader::with_capacity(64, &bytes[..]);
    assert_eq!(
        get_record_header(reader, 1024),
        Err(HeaderParseError::TooLong(1024))
    );
}

#[test]
fn invalid_fields_are_invalid() {
    assert_eq!(
        Header::parse_field(b"This is not a valid field\r\n\r\n"),
        Err(HeaderParseError::MalformedField)
    );

    assert_eq!(
        Header::parse_field(b"X-Invalid-UTF-8\xFF: yes\r\n\r\n"),
        Err(HeaderParseError::MalformedField)
    );
}
