//! Handling of record compression.
//!
//! Compressed WARC files are almost always written with every record in its own gzip member.
//! Provided the file offset of a member is known, a reader can start decompressing right there
//! and read that one record without touching the rest of the file, which is what makes offsets
//! into a `.warc.gz` useful for later retrieval.

use std::io::{BufRead, Result as IoResult};
use std::path::Path;

/// The first two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The supported methods of compressing a single [`Record`](crate::Record).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Compression {
    /// Uncompressed data
    None,
    /// `gzip` compression, one member per record
    Gzip,
}

impl Compression {
    /// Return the best guess of compression to be used for a file with the given name.
    ///
    /// A file that may be present is not accessed in any way; only the path is used to guess based
    /// on the name.
    ///
    /// ```
    /// # use warcio::Compression;
    /// assert_eq!(Compression::guess_for_filename("test.warc.gz"), Compression::Gzip);
    /// assert_eq!(Compression::guess_for_filename("test.warc"), Compression::None);
    /// ```
    pub fn guess_for_filename<P: AsRef<Path>>(path: P) -> Compression {
        match path.as_ref().extension() {
            Some(ext) if ext == "gz" => Compression::Gzip,
            _ => Compression::None,
        }
    }

    /// Determine the compression of a stream by peeking at its first bytes.
    ///
    /// Nothing is consumed from the reader. A stream too short to tell is reported as
    /// uncompressed.
    pub fn detect<R: BufRead>(mut reader: R) -> IoResult<Compression> {
        let buf = reader.fill_buf()?;
        if buf.starts_with(&GZIP_MAGIC) {
            Ok(Compression::Gzip)
        } else {
            Ok(Compression::None)
        }
    }
}
