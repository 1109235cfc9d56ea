//! Sequential reading of every record in a WARC file.
use std::io::{BufRead, Read, Result as IoResult};

use crate::compression::Compression;
use crate::record::{InvalidRecord, Record};

/// A `BufRead` that keeps track of how many bytes have been consumed from it.
///
/// Wrapped around the raw (possibly compressed) file, the count is the file offset of the next
/// unread byte, which is exactly the value needed to come back to a record later.
#[derive(Debug)]
pub struct Counted<R> {
    inner: R,
    position: u64,
}

impl<R> Counted<R> {
    /// Wrap a reader positioned at the start of its stream.
    pub fn new(inner: R) -> Self {
        Counted { inner, position: 0 }
    }

    /// Offset of the next byte that will be read.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read> Read for Counted<R> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Counted<R> {
    fn fill_buf(&mut self) -> IoResult<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

/// Reads the records of a WARC file in order, reporting where each one starts.
///
/// ```
/// # use warcio::{Compression, RecordReader};
/// let data = b"WARC/1.1\r\nContent-Length: 2\r\n\r\nhi\r\n\r\n\
///              WARC/1.1\r\nContent-Length: 0\r\n\r\n\r\n\r\n";
/// let mut reader = RecordReader::new(&data[..], Compression::None);
///
/// let (offset, record) = reader.next().unwrap().unwrap();
/// assert_eq!((offset, record.len()), (0, 2));
/// record.finish().unwrap();
///
/// let (offset, record) = reader.next().unwrap().unwrap();
/// assert_eq!((offset, record.len()), (37, 0));
/// record.finish().unwrap();
///
/// assert!(reader.next().is_none());
/// ```
#[derive(Debug)]
pub struct RecordReader<R> {
    input: Counted<R>,
    compression: Compression,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R, compression: Compression) -> Self {
        RecordReader {
            input: Counted::new(input),
            compression,
        }
    }

    /// Offset in the underlying input of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.input.position()
    }

    /// Read the next record, returning the offset at which it starts.
    ///
    /// Returns `None` at a clean end of input. The returned record borrows this reader, so it
    /// must be [finished](Record::finish) (or dropped, if no further records will be read)
    /// before the next call.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<(u64, Record<&mut Counted<R>>), InvalidRecord>> {
        match self.input.fill_buf() {
            Ok(buf) if buf.is_empty() => return None,
            Ok(_) => {}
            Err(e) => return Some(Err(InvalidRecord::IoError(e))),
        }

        let offset = self.input.position();
        trace!("reading record at offset {}", offset);
        Some(Record::read_from(&mut self.input, self.compression).map(|record| (offset, record)))
    }
}
