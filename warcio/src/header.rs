//! WARC record headers.
use std::borrow::Borrow;
use std::convert::TryFrom;
use std::io::BufRead;
use std::str;

use indexmap::IndexMap;

pub use fieldkind::FieldKind;
pub use fieldname::FieldName;
pub use recordkind::RecordKind;

use crate::version::Version;
use crate::{is_token_byte, HeaderParseError};

mod fieldkind;
mod fieldname;
mod recordkind;

/// The version line and fields at the start of a WARC record.
///
/// Fields keep the order they were read in. Values are available raw through
/// [`get_field_bytes`](Self::get_field_bytes) and [`get_field`](Self::get_field), and the fields
/// this crate relies on have typed accessors such as [`content_length`](Self::content_length).
///
/// ```
/// # use warcio::{Header, RecordKind};
/// let raw_header = b"\
/// WARC/1.0\r
/// WARC-Type: response\r
/// WARC-Target-URI: <http://example.com/robots.txt>\r
/// Content-Length: 0\r
/// \r
/// ";
/// let (header, parsed_size) = Header::parse(raw_header).unwrap();
/// assert_eq!(parsed_size, raw_header.len());
/// assert_eq!(header.record_kind(), Some(RecordKind::Response));
/// // Pre-1.1 angle brackets are removed from bare URIs
/// assert_eq!(header.target_uri(), Some("http://example.com/robots.txt"));
/// assert_eq!(header.content_length(), Some(0));
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Header {
    version: Version,
    fields: IndexMap<FieldName, Vec<u8>>,
}

impl Header {
    pub fn new<V: Into<Version>>(version: V) -> Self {
        Header {
            version: version.into(),
            fields: IndexMap::new(),
        }
    }

    /// Parse a complete header from `bytes`, returning it with the number of bytes it occupied
    /// including the terminating blank line.
    ///
    /// [`HeaderParseError::Truncated`] means `bytes` may be the start of a valid header.
    pub fn parse(bytes: &[u8]) -> Result<(Header, usize), HeaderParseError> {
        let (mut pos, version) = Version::parse(bytes)?;
        let mut header = Header::new(version);

        loop {
            let rest = &bytes[pos..];
            if rest.starts_with(b"\r\n") {
                return Ok((header, pos + 2));
            }
            if rest.len() < 2 {
                return Err(HeaderParseError::Truncated);
            }

            let (name, value, len) = Self::parse_field(rest)?;
            header.fields.insert(FieldName::from(name), value);
            pos += len;
        }
    }

    /// Parse one `name: value` line and any continuation lines folded into it.
    ///
    /// Returns the name, the value with folds joined by single spaces, and the number of bytes
    /// consumed through the final CRLF.
    pub(crate) fn parse_field(bytes: &[u8]) -> Result<(&str, Vec<u8>, usize), HeaderParseError> {
        let name_len = bytes.iter().take_while(|&&b| is_token_byte(b)).count();
        match bytes.get(name_len) {
            None => return Err(HeaderParseError::Truncated),
            Some(b':') if name_len > 0 => {}
            Some(_) => return Err(HeaderParseError::MalformedField),
        }
        let name =
            str::from_utf8(&bytes[..name_len]).map_err(|_| HeaderParseError::MalformedField)?;

        let mut value = Vec::new();
        let mut pos = name_len + 1;
        loop {
            let line_len = bytes[pos..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .ok_or(HeaderParseError::Truncated)?;
            let segment = trim_lws(&bytes[pos..pos + line_len]);
            if !segment.is_empty() {
                if !value.is_empty() {
                    value.push(b' ');
                }
                value.extend_from_slice(segment);
            }
            pos += line_len + 2;

            match bytes.get(pos) {
                Some(b' ') | Some(b'\t') => continue,
                Some(_) => return Ok((name, value, pos)),
                None => return Err(HeaderParseError::Truncated),
            }
        }
    }

    /// Get a field value as bytes.
    ///
    /// Angle brackets around [bare URI](FieldName::value_is_bare_uri) values are removed. WARC
    /// 1.0 requires them and 1.1 forbids them, but both versions are found with and without.
    pub fn get_field_bytes<F: Into<FieldName>>(&self, field: F) -> Option<&[u8]> {
        let field = field.into();
        let value = self.get_field_bytes_raw(&field)?;
        match value {
            [b'<', inner @ .., b'>'] if field.value_is_bare_uri() => Some(inner),
            _ => Some(value),
        }
    }

    /// Get a field value exactly as it appeared in the record.
    pub fn get_field_bytes_raw<F: Borrow<FieldName>>(&self, field: F) -> Option<&[u8]> {
        self.fields.get(field.borrow()).map(Vec::as_slice)
    }

    /// Get a field value as text, or None if it is absent or not UTF-8.
    pub fn get_field<F: Into<FieldName>>(&self, field: F) -> Option<&str> {
        str::from_utf8(self.get_field_bytes(field)?).ok()
    }

    /// Set a field, returning its previous value.
    ///
    /// Panics if `name` is not a valid field name.
    pub fn set_field<N: Into<FieldName>, V: Into<Vec<u8>>>(
        &mut self,
        name: N,
        value: V,
    ) -> Option<Vec<u8>> {
        let name = name.into();
        let valid = !name.as_ref().is_empty() && name.as_ref().bytes().all(is_token_byte);
        assert!(valid, "field name {:?} contains illegal characters", name);
        self.fields.insert(name, value.into())
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn record_id(&self) -> Option<&str> {
        self.get_field(FieldKind::RecordId)
    }

    /// `Content-Length`, if present and a valid integer.
    pub fn content_length(&self) -> Option<u64> {
        self.get_field(FieldKind::ContentLength)?.trim().parse().ok()
    }

    /// The raw `WARC-Type` value.
    pub fn warc_type(&self) -> Option<&str> {
        self.get_field(FieldKind::Type)
    }

    /// The record type, or None if missing or not one the standard defines.
    pub fn record_kind(&self) -> Option<RecordKind> {
        RecordKind::try_from(self.warc_type()?.trim()).ok()
    }

    /// `WARC-Target-URI` without angle brackets or surrounding whitespace.
    pub fn target_uri(&self) -> Option<&str> {
        self.get_field(FieldKind::TargetURI).map(str::trim)
    }

    /// The `Content-Type` of the record block.
    pub fn content_type(&self) -> Option<&str> {
        self.get_field(FieldKind::ContentType)
    }
}

fn trim_lws(bytes: &[u8]) -> &[u8] {
    let is_lws = |b: &u8| *b == b' ' || *b == b'\t';
    let start = bytes.iter().position(|b| !is_lws(b)).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !is_lws(b)).map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Read a header from `reader`, leaving it positioned at the start of the record block.
///
/// A header already held in the reader's buffer is parsed in place. Otherwise the buffered bytes
/// are copied out until the header is complete, failing with [`HeaderParseError::TooLong`] once
/// more than `max_len` bytes have been gathered. Only the header's own bytes are consumed on
/// success; on error an unspecified amount of input may have been consumed.
pub(crate) fn get_record_header<R: BufRead>(
    mut reader: R,
    max_len: usize,
) -> Result<Header, HeaderParseError> {
    let available = reader.fill_buf()?;
    if available.is_empty() {
        return Err(HeaderParseError::Truncated);
    }
    match Header::parse(available) {
        Ok((header, len)) => {
            reader.consume(len);
            return Ok(header);
        }
        Err(HeaderParseError::Truncated) => {}
        Err(e) => return Err(e),
    }

    let mut pending: Vec<u8> = Vec::new();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            return Err(HeaderParseError::Truncated);
        }
        let before = pending.len();
        pending.extend_from_slice(available);

        match Header::parse(&pending) {
            Ok((header, len)) => {
                trace!("header spans {} bytes across reader buffers", len);
                reader.consume(len - before);
                return Ok(header);
            }
            Err(HeaderParseError::Truncated) => {
                reader.consume(pending.len() - before);
                if pending.len() > max_len {
                    return Err(HeaderParseError::TooLong(max_len));
                }
            }
            Err(e) => return Err(e),
        }
    }
}
