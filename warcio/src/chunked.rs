//! Chunked transfer coding.
use std::io::{self, BufRead, Read};

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_LEN: u64 = 4096;
/// Longest decode failure message that will be logged.
const MAX_MESSAGE_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data(u64),
    DataEnd,
    Trailer,
    Done,
}

/// Reads and decodes a stream in chunked transfer coding.
///
/// Chunk extensions are ignored and trailer fields are read and discarded. Malformed framing
/// and streams that end before the last chunk both produce errors; reading stops there.
///
/// ```
/// # use std::io::Read;
/// # use warcio::chunked::ChunkedReader;
/// let mut reader = ChunkedReader::new(&b"3\r\nabc\r\n5;ext=1\r\nhello\r\n0\r\nk1:v2\r\n\r\n"[..]);
/// let mut out = String::new();
/// reader.read_to_string(&mut out).unwrap();
/// assert_eq!(out, "abchello");
/// ```
#[derive(Debug)]
pub struct ChunkedReader<R: BufRead> {
    inner: R,
    state: State,
    line: Vec<u8>,
}

impl<R: BufRead> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        ChunkedReader {
            inner,
            state: State::Size,
            line: Vec::new(),
        }
    }

    fn read_line(&mut self) -> io::Result<&[u8]> {
        self.line.clear();
        let n = (&mut self.inner)
            .take(MAX_LINE_LEN)
            .read_until(b'\n', &mut self.line)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked stream ended before last chunk",
            ));
        }
        if self.line.last() != Some(&b'\n') && n as u64 == MAX_LINE_LEN {
            return Err(invalid("chunk line too long"));
        }
        Ok(trim_eol(&self.line))
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            match self.state {
                State::Size => {
                    let size = parse_chunk_size(self.read_line()?)?;
                    trace!("chunk of {} bytes", size);
                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(0) => self.state = State::DataEnd,
                State::Data(remaining) => {
                    let limit = buf.len().min(remaining.min(usize::MAX as u64) as usize);
                    let n = self.inner.read(&mut buf[..limit])?;
                    if n == 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!("chunk truncated with {} bytes remaining", remaining),
                        ));
                    }
                    self.state = State::Data(remaining - n as u64);
                    return Ok(n);
                }
                State::DataEnd => {
                    if !self.read_line()?.is_empty() {
                        return Err(invalid("chunk data not followed by CRLF"));
                    }
                    self.state = State::Size;
                }
                State::Trailer => {
                    let done = match self.read_line() {
                        Ok(line) => line.is_empty(),
                        // A missing final CRLF loses nothing
                        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => true,
                        Err(e) => return Err(e),
                    };
                    if done {
                        self.state = State::Done;
                    }
                }
                State::Done => return Ok(0),
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let size = match line.iter().position(|&b| b == b';') {
        Some(i) => &line[..i],
        None => line,
    };
    let size = std::str::from_utf8(size)
        .map_err(|_| invalid("chunk size is not ASCII"))?
        .trim();
    u64::from_str_radix(size, 16).map_err(|_| {
        invalid(&format!(
            "invalid chunk size line {:?}",
            String::from_utf8_lossy(line)
        ))
    })
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Remove chunked framing from a complete body.
pub fn dechunk(raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    ChunkedReader::new(raw).read_to_end(&mut out)?;
    Ok(out)
}

/// Remove chunked framing from `raw`, or return `raw` unchanged if it is not validly framed.
///
/// The second value is `true` when decoding failed and the input was returned as-is. Responses
/// in archives sometimes carry a `Transfer-Encoding: chunked` header even though the body was
/// stored after dechunking, so failure is logged rather than treated as an error.
pub fn decode_or_passthrough(raw: Vec<u8>) -> (Vec<u8>, bool) {
    match dechunk(&raw) {
        Ok(decoded) => (decoded, false),
        Err(e) => {
            warn!(
                "Failed to read chunked transfer encoding: {}",
                summarize(&e.to_string())
            );
            (raw, true)
        }
    }
}

/// Shorten a message to its first line and at most [`MAX_MESSAGE_LEN`] characters.
fn summarize(message: &str) -> &str {
    let message = match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((i, _)) => &message[..i],
        None => message,
    };
    message.lines().next().unwrap_or("")
}
