//! Reading single WARC records.
use std::convert::TryFrom;
use std::io::{self, prelude::*};

use buf_redux::BufReader;
pub use buf_redux::Buffer;
use flate2::bufread::GzDecoder;
use thiserror::Error;

use super::HeaderParseError;
use crate::compression::Compression;
use crate::header::{get_record_header, Header};
use crate::FieldKind;

/// Largest WARC header that will be buffered while looking for its end.
pub const MAX_HEADER_LEN: usize = 1 << 20;

/// Bytes that must follow every record block.
const RECORD_TAIL: &[u8] = b"\r\n\r\n";

/// Why a record could not be read.
#[derive(Debug, Error)]
pub enum InvalidRecord {
    /// The header was malformed, which usually means the input is not positioned at a record.
    #[error("record header is not valid: {0}")]
    InvalidHeader(#[source] HeaderParseError),
    /// `Content-Length` was missing or not a number; holds its raw value if present.
    #[error("Content-Length is not a valid integer (contained bytes {0:?})")]
    UnknownLength(Option<Vec<u8>>),
    /// The input ended inside the header.
    #[error("unexpected end of input")]
    EndOfStream,
    #[error("I/O error")]
    IoError(#[source] io::Error),
}

impl From<HeaderParseError> for InvalidRecord {
    fn from(e: HeaderParseError) -> Self {
        match e {
            HeaderParseError::IoError(e) => InvalidRecord::IoError(e),
            HeaderParseError::Truncated => InvalidRecord::EndOfStream,
            e => InvalidRecord::InvalidHeader(e),
        }
    }
}

/// Where record bytes come from: the caller's reader, or a gzip member wrapped around it.
#[derive(Debug)]
enum Source<R: BufRead> {
    /// The spare buffer is held so it can be handed back from `finish`.
    Plain(R, Buffer),
    Gzip(BufReader<GzDecoder<R>>),
}

impl<R: BufRead> Source<R> {
    fn open(reader: R, mut buffer: Buffer, compression: Compression) -> Self {
        match compression {
            Compression::None => Source::Plain(reader, buffer),
            Compression::Gzip => {
                buffer.clear();
                Source::Gzip(BufReader::with_buffer(buffer, GzDecoder::new(reader)))
            }
        }
    }

    fn reader(&mut self) -> &mut dyn BufRead {
        match self {
            Source::Plain(r, _) => r,
            Source::Gzip(r) => r,
        }
    }

    /// Discard anything left in a gzip member so the underlying reader sits at the next one.
    fn drain_member(&mut self) -> io::Result<()> {
        if let Source::Gzip(r) = self {
            let extra = io::copy(r, &mut io::sink())?;
            if extra > 0 {
                trace!("discarded {} bytes after record tail in gzip member", extra);
            }
        }
        Ok(())
    }

    fn release(self) -> (R, Buffer) {
        match self {
            Source::Plain(r, buffer) => (r, buffer),
            Source::Gzip(r) => {
                let (decoder, buffer) = r.into_inner_with_buffer();
                (decoder.into_inner(), buffer)
            }
        }
    }
}

/// One WARC record read from a stream.
///
/// `header` is parsed eagerly. The block is read through the [`Read`] and [`BufRead`] impls,
/// which end at `Content-Length` bytes. Call [`finish`](Self::finish) or
/// [`finish_lenient`](Self::finish_lenient) to move the stream past the record and get it back.
#[derive(Debug)]
pub struct Record<R: BufRead> {
    pub header: Header,
    content_length: u64,
    bytes_remaining: u64,
    source: Source<R>,
}

impl<R: BufRead> Read for Record<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(usize::try_from(self.bytes_remaining).unwrap_or(usize::MAX));
        let n = self.source.reader().read(&mut buf[..limit])?;
        self.bytes_remaining -= n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Record<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        let remaining = self.bytes_remaining;
        let available = self.source.reader().fill_buf()?;
        let end = available
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        Ok(&available[..end])
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(n as u64 <= self.bytes_remaining);
        self.source.reader().consume(n);
        self.bytes_remaining -= n as u64;
    }
}

/// Failure to move past the end of a record.
#[derive(Debug, Error)]
pub enum FinishError {
    /// The block was not followed by CRLF CRLF. The stream has still been advanced past the
    /// block and whatever line breaks followed it.
    #[error("error closing WARC record: missing record tail")]
    MissingTail,
    #[error("error closing WARC record: I/O error: {0}")]
    Io(#[from] io::Error),
}

impl<R: BufRead> Record<R> {
    /// Read a record header from `reader`, allocating a fresh decompression buffer.
    pub fn read_from(reader: R, compression: Compression) -> Result<Self, InvalidRecord> {
        Self::read_buffered_from(reader, Buffer::with_capacity(8 << 10), compression)
    }

    /// Read a record header from `reader`, using `buffer` to hold decompressed data.
    ///
    /// The buffer comes back from `finish` for reuse with the next record.
    pub fn read_buffered_from(
        reader: R,
        buffer: Buffer,
        compression: Compression,
    ) -> Result<Self, InvalidRecord> {
        let mut source = Source::open(reader, buffer, compression);
        let header = get_record_header(source.reader(), MAX_HEADER_LEN)?;
        let content_length = header.content_length().ok_or_else(|| {
            InvalidRecord::UnknownLength(
                header
                    .get_field_bytes(FieldKind::ContentLength)
                    .map(<[u8]>::to_vec),
            )
        })?;

        Ok(Record {
            header,
            content_length,
            bytes_remaining: content_length,
            source,
        })
    }

    /// Length of the record block in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.content_length
    }

    /// Block bytes not yet read.
    pub fn remaining(&self) -> u64 {
        self.bytes_remaining
    }

    /// Skip to the end of the record and return the underlying reader.
    ///
    /// Only line-break bytes are consumed while looking for the tail, so a record with a short
    /// or missing tail does not eat into the next one; the stream is advanced either way before
    /// [`FinishError::MissingTail`] is reported.
    pub fn finish(mut self) -> Result<(R, Buffer), FinishError> {
        if self.skip_to_end()? {
            Ok(self.source.release())
        } else {
            Err(FinishError::MissingTail)
        }
    }

    /// Like [`finish`](Self::finish), but a missing tail is only logged.
    pub fn finish_lenient(mut self) -> io::Result<(R, Buffer)> {
        if !self.skip_to_end()? {
            warn!(
                "record {} is missing its CRLF CRLF tail",
                self.header.record_id().unwrap_or("<no WARC-Record-ID>")
            );
        }
        Ok(self.source.release())
    }

    /// Returns whether a complete tail followed the block.
    fn skip_to_end(&mut self) -> io::Result<bool> {
        let unread = self.bytes_remaining;
        let skipped = io::copy(&mut (&mut *self).take(unread), &mut io::sink())?;
        if self.bytes_remaining > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record block ended {} bytes early", self.bytes_remaining),
            ));
        }
        trace!("skipped {} unread block bytes", skipped);

        let input = self.source.reader();
        let mut matched = 0;
        while matched < RECORD_TAIL.len() {
            let available = input.fill_buf()?;
            let n = available
                .iter()
                .take(RECORD_TAIL.len() - matched)
                .take_while(|b| matches!(b, b'\r' | b'\n'))
                .count();
            if n == 0 {
                break;
            }
            input.consume(n);
            matched += n;
        }

        self.source.drain_member()?;
        Ok(matched == RECORD_TAIL.len())
    }
}
