//! HTTP content codings.
use std::io::{self, BufRead, Read};

use flate2::bufread::{DeflateDecoder, GzDecoder, ZlibDecoder};

/// A content coding this library can undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    /// No transformation.
    Identity,
    /// RFC 1952 gzip, also spelled `x-gzip`.
    Gzip,
    /// RFC 1950 zlib, or raw RFC 1951 deflate as sent by some servers.
    Deflate,
}

include!(concat!(env!("OUT_DIR"), "/content_coding_conversions.rs"));

/// The decoding selected for a response from its `Content-Encoding` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    Supported(ContentCoding),
    /// The body cannot be decoded; contains the offending value(s).
    Unsupported(String),
}

impl ContentEncoding {
    /// Choose how to decode a body given its `Content-Encoding` tokens.
    ///
    /// No tokens (or an empty one) means identity. More than one coding, or one that is not
    /// recognized, is unsupported and logged.
    ///
    /// ```
    /// # use warcio::encoding::{ContentCoding, ContentEncoding};
    /// assert_eq!(
    ///     ContentEncoding::select(&["X-GZIP"]),
    ///     ContentEncoding::Supported(ContentCoding::Gzip)
    /// );
    /// assert_eq!(
    ///     ContentEncoding::select::<&str>(&[]),
    ///     ContentEncoding::Supported(ContentCoding::Identity)
    /// );
    /// assert_eq!(
    ///     ContentEncoding::select(&["br"]),
    ///     ContentEncoding::Unsupported("br".to_owned())
    /// );
    /// ```
    pub fn select<S: AsRef<str>>(values: &[S]) -> Self {
        use std::convert::TryFrom;

        match values {
            [] => ContentEncoding::Supported(ContentCoding::Identity),
            [value] => {
                let value = value.as_ref().trim();
                if value.is_empty() {
                    return ContentEncoding::Supported(ContentCoding::Identity);
                }
                match ContentCoding::try_from(value) {
                    Ok(coding) => ContentEncoding::Supported(coding),
                    Err(unknown) => {
                        warn!("Unsupported Content-Encoding: {}", unknown);
                        ContentEncoding::Unsupported(unknown.to_owned())
                    }
                }
            }
            many => {
                let joined = many
                    .iter()
                    .map(|v| v.as_ref())
                    .collect::<Vec<&str>>()
                    .join(", ");
                warn!("Multiple Content-Encodings not supported: {}", joined);
                ContentEncoding::Unsupported(joined)
            }
        }
    }
}

/// A reader that undoes a content coding.
pub enum Decoder<R: BufRead> {
    Identity(R),
    Gzip(GzDecoder<R>),
    Zlib(ZlibDecoder<R>),
    RawDeflate(DeflateDecoder<R>),
}

impl<R: BufRead> Decoder<R> {
    /// Wrap `reader` in a decoder for `coding`.
    ///
    /// For [`ContentCoding::Deflate`] the first bytes are inspected without being consumed to
    /// tell a zlib stream from a raw deflate stream.
    pub fn new(coding: ContentCoding, mut reader: R) -> io::Result<Self> {
        Ok(match coding {
            ContentCoding::Identity => Decoder::Identity(reader),
            ContentCoding::Gzip => Decoder::Gzip(GzDecoder::new(reader)),
            ContentCoding::Deflate => {
                if is_zlib_header(reader.fill_buf()?) {
                    Decoder::Zlib(ZlibDecoder::new(reader))
                } else {
                    trace!("deflate body has no zlib header, decoding as raw deflate");
                    Decoder::RawDeflate(DeflateDecoder::new(reader))
                }
            }
        })
    }

    /// Whether the decoded length is the same as the encoded length.
    pub fn preserves_length(&self) -> bool {
        matches!(self, Decoder::Identity(_))
    }
}

impl<R: BufRead> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Identity(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
            Decoder::Zlib(r) => r.read(buf),
            Decoder::RawDeflate(r) => r.read(buf),
        }
    }
}

/// RFC 1950: CM must be 8 (deflate) and the two header bytes a multiple of 31.
fn is_zlib_header(bytes: &[u8]) -> bool {
    match bytes {
        [cmf, flg, ..] => cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0,
        _ => false,
    }
}
