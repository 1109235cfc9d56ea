//! The HTTP envelope at the start of a response record block.
//!
//! Parsing is permissive: a bad status line is logged and reported as status 0, and header lines
//! that do not satisfy a strict parser are split on their first colon instead. Only I/O failures
//! and envelopes that grow past the configured limit are errors.
use std::io::{self, BufRead, Read};
use std::str;

use indexmap::IndexMap;
use thiserror::Error;
use uncased::{Uncased, UncasedStr};

/// Errors that prevent an envelope from being read at all.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("I/O error reading HTTP envelope: {0}")]
    Io(#[from] io::Error),
    /// The status line and headers together exceed the given number of bytes.
    #[error("HTTP envelope is larger than {0} bytes")]
    TooLarge(usize),
}

/// An ordered multi-map of HTTP header fields with case-insensitive names.
///
/// Every value of a repeated field is kept, in the order it appeared:
///
/// ```
/// # use warcio::http::HttpHeaders;
/// let mut headers = HttpHeaders::new();
/// headers.append("Link", b"<a>; rel=next".to_vec());
/// headers.append("link", b"<b>; rel=prev".to_vec());
/// assert_eq!(headers.get("LINK"), Some(&b"<a>; rel=next"[..]));
/// assert_eq!(headers.get_all("Link").count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    fields: IndexMap<Uncased<'static>, Vec<Vec<u8>>>,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a value for `name`, keeping any values already present.
    pub fn append(&mut self, name: &str, value: Vec<u8>) {
        match self.fields.get_mut(UncasedStr::new(name)) {
            Some(values) => values.push(value),
            None => {
                self.fields
                    .insert(Uncased::new(name.to_owned()), vec![value]);
            }
        }
    }

    /// Get the first value of a field.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .get(UncasedStr::new(name))
            .and_then(|values| values.first())
            .map(Vec::as_slice)
    }

    /// Get the first value of a field as a string, or None if missing or not UTF-8.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        str::from_utf8(self.get(name)?).ok()
    }

    /// Iterate over every value of a field.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.fields
            .get(UncasedStr::new(name))
            .into_iter()
            .flatten()
            .map(Vec::as_slice)
    }

    /// Iterate over all fields in the order their names were first seen.
    ///
    /// Repeated fields yield one item per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.fields
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_slice())))
    }

    /// The number of distinct field names.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Status line and headers of an archived HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead {
    /// Status code, or 0 if the status line could not be understood.
    pub status: u16,
    /// The status line without its line terminator.
    pub status_line: String,
    pub headers: HttpHeaders,
}

impl HttpHead {
    /// Read a status line and header block, leaving `reader` at the first byte of the body.
    ///
    /// The envelope ends at the first empty line or at the end of input, whichever comes first.
    ///
    /// ```
    /// # use warcio::http::HttpHead;
    /// let mut block = &b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\n\r\n<h1>"[..];
    /// let head = HttpHead::read_from(&mut block, 1024).unwrap();
    /// assert_eq!(head.status, 404);
    /// assert_eq!(head.content_type(), Some("text/html"));
    /// assert_eq!(block, b"<h1>");
    /// ```
    pub fn read_from<R: BufRead>(mut reader: R, max_len: usize) -> Result<Self, EnvelopeError> {
        let mut budget = max_len;
        let mut line = Vec::new();

        read_line(&mut reader, &mut line, &mut budget, max_len)?;
        let status_line = String::from_utf8_lossy(trim_eol(&line)).into_owned();
        let status = parse_status_line(&status_line);

        let mut block = Vec::new();
        let mut line_count = 0;
        loop {
            line.clear();
            if read_line(&mut reader, &mut line, &mut budget, max_len)? == 0 {
                break;
            }
            if trim_eol(&line).is_empty() {
                break;
            }
            block.extend_from_slice(trim_eol(&line));
            block.extend_from_slice(b"\r\n");
            line_count += 1;
        }

        Ok(HttpHead {
            status,
            status_line,
            headers: parse_headers(&block, line_count),
        })
    }

    /// The response `Content-Type`, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_str("Content-Type").map(str::trim)
    }

    /// Whether the response declared `Transfer-Encoding: chunked`.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get_all("Transfer-Encoding")
            .any(|v| trim_ascii(v).eq_ignore_ascii_case(b"chunked"))
    }

    /// All declared content codings, in order, as separate tokens.
    ///
    /// Both repeated `Content-Encoding` fields and comma-separated lists are split apart; empty
    /// tokens are dropped.
    pub fn content_encodings(&self) -> Vec<String> {
        self.headers
            .get_all("Content-Encoding")
            .flat_map(|v| v.split(|&b| b == b','))
            .map(trim_ascii)
            .filter(|token| !token.is_empty())
            .map(|token| String::from_utf8_lossy(token).into_owned())
            .collect()
    }
}

/// Read one line into `buf`, charging it against the remaining envelope budget.
fn read_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    budget: &mut usize,
    max_len: usize,
) -> Result<usize, EnvelopeError> {
    let n = reader
        .by_ref()
        .take(*budget as u64 + 1)
        .read_until(b'\n', buf)?;
    if n > *budget {
        return Err(EnvelopeError::TooLarge(max_len));
    }
    *budget -= n;
    Ok(n)
}

fn parse_status_line(line: &str) -> u16 {
    if !line.starts_with("HTTP/") {
        error!("Invalid HTTP status line: {:?}", line);
        return 0;
    }
    match line.split_whitespace().nth(1).map(str::parse::<u16>) {
        Some(Ok(status)) => status,
        _ => {
            error!("No status code in HTTP status line: {:?}", line);
            0
        }
    }
}

fn parse_headers(block: &[u8], line_count: usize) -> HttpHeaders {
    let mut headers = HttpHeaders::new();
    if block.is_empty() {
        return headers;
    }

    // parse_headers wants the terminating empty line
    let mut terminated = Vec::with_capacity(block.len() + 2);
    terminated.extend_from_slice(block);
    terminated.extend_from_slice(b"\r\n");
    let mut parsed = vec![httparse::EMPTY_HEADER; line_count];
    match httparse::parse_headers(&terminated, &mut parsed) {
        Ok(httparse::Status::Complete((_, fields))) => {
            for field in fields {
                headers.append(field.name, field.value.to_vec());
            }
        }
        result => {
            debug!("strict header parse failed ({:?}), splitting lines", result.err());
            parse_headers_lax(block, &mut headers);
        }
    }
    headers
}

/// Split each line at its first colon, joining continuation lines onto the previous value.
fn parse_headers_lax(block: &[u8], headers: &mut HttpHeaders) {
    let mut current: Option<(String, Vec<u8>)> = None;
    for line in block.split(|&b| b == b'\n').map(trim_eol) {
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            if let Some((_, ref mut value)) = current {
                value.push(b' ');
                value.extend_from_slice(trim_ascii(line));
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            headers.append(&name, value);
        }
        match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let name = String::from_utf8_lossy(trim_ascii(&line[..colon])).into_owned();
                if !name.is_empty() {
                    current = Some((name, trim_ascii(&line[colon + 1..]).to_vec()));
                }
            }
            None => debug!(
                "ignoring HTTP header line without colon: {:?}",
                String::from_utf8_lossy(line)
            ),
        }
    }
    if let Some((name, value)) = current {
        headers.append(&name, value);
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let Some((last, rest)) = bytes.split_last() {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn head(bytes: &[u8]) -> HttpHead {
        HttpHead::read_from(bytes, 4096).expect("envelope should parse")
    }

    #[test]
    fn repeated_link_headers_are_all_kept() {
        let head = head(
            b"HTTP/1.1 200 OK\r\n\
              Link: </style.css>; rel=preload\r\n\
              Content-Type: text/html\r\n\
              Link: <https://example.com/>; rel=canonical\r\n\
              \r\n",
        );

        let links: Vec<&[u8]> = head.headers.get_all("link").collect();
        assert_eq!(
            links,
            vec![
                &b"</style.css>; rel=preload"[..],
                &b"<https://example.com/>; rel=canonical"[..]
            ]
        );
        assert_eq!(head.headers.iter().count(), 3);
    }

    #[test]
    fn bad_status_line_degrades_to_zero() {
        let head = head(b"garbage\r\nContent-Type: text/plain\r\n\r\n");
        assert_eq!(head.status, 0);
        assert_eq!(head.content_type(), Some("text/plain"));

        assert_eq!(self::head(b"HTTP/1.0 abc\r\n\r\n").status, 0);
        assert_eq!(self::head(b"").status, 0);
    }

    #[test]
    fn chunked_detection_trims_and_ignores_case() {
        assert!(head(b"HTTP/1.1 200 OK\r\ntransfer-encoding:  Chunked \r\n\r\n").is_chunked());
        assert!(!head(b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\n").is_chunked());
    }

    #[test]
    fn content_encodings_split() {
        let head = head(
            b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip, , br\r\nContent-Encoding: identity\r\n\r\n",
        );
        assert_eq!(head.content_encodings(), vec!["gzip", "br", "identity"]);
    }

    #[test]
    fn malformed_headers_fall_back_to_lax_split() {
        let head = head(
            b"HTTP/1.1 200 OK\r\n\
              X Weird Name: yes\r\n\
              Content-Type: text/html;\r\n \tcharset=utf-8\r\n\
              no colon here\r\n\
              \r\n",
        );
        assert_eq!(head.headers.get_str("x weird name"), Some("yes"));
        assert_eq!(head.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(head.headers.len(), 2);
    }

    #[test]
    fn envelope_stops_at_blank_line() {
        let mut input = &b"HTTP/1.1 200 OK\nA: b\n\nbody\r\n"[..];
        let head = HttpHead::read_from(&mut input, 4096).unwrap();
        assert_eq!(head.headers.get("a"), Some(&b"b"[..]));
        assert_eq!(input, b"body\r\n");
    }

    #[test]
    fn oversized_envelope_is_rejected() {
        let mut envelope = b"HTTP/1.1 200 OK\r\n".to_vec();
        for i in 0..100 {
            envelope.extend_from_slice(format!("X-Filler-{}: abcdefghij\r\n", i).as_bytes());
        }
        envelope.extend_from_slice(b"\r\n");

        match HttpHead::read_from(&envelope[..], 256) {
            Err(EnvelopeError::TooLarge(256)) => {}
            other => panic!("expected TooLarge, got {:?}", other),
        }
        assert!(HttpHead::read_from(&envelope[..], envelope.len()).is_ok());
    }
}
