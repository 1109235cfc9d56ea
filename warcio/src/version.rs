use std::str::{self, FromStr};

use crate::HeaderParseError;

/// The version of a WARC record.
///
/// Versions 1.0 and 1.1 (ISO 28500:2009 and ISO 28500:2017) are the ones found in practice and
/// have associated constants; anything of the form `WARC/m.n` is accepted.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Version {
    /// The integer part of the version number.
    pub major: u32,
    /// The fractional part of the version number.
    pub minor: u32,
}

impl Version {
    /// WARC 1.0, as specified by ISO 28500:2009.
    pub const WARC1_0: Self = Version { major: 1, minor: 0 };
    /// WARC 1.1, as specified by ISO 28500:2017.
    pub const WARC1_1: Self = Version { major: 1, minor: 1 };

    /// Parse the version line of a record from a buffer, returning the number of bytes
    /// consumed and the parsed version.
    ///
    /// Returns [`HeaderParseError::Truncated`] if the buffer ends before the line does, so
    /// callers reading incrementally know to fetch more input.
    ///
    /// ```
    /// # use warcio::Version;
    /// let buf = b"WARC/1.0\r\n\
    ///             <more here>";
    /// assert_eq!(
    ///     Version::parse(&buf[..]),
    ///     Ok((10, Version::WARC1_0))
    /// );
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<(usize, Version), HeaderParseError> {
        const SIGNATURE: &[u8] = b"WARC/";

        let prefix_len = bytes.len().min(SIGNATURE.len());
        if bytes[..prefix_len] != SIGNATURE[..prefix_len] {
            return Err(HeaderParseError::invalid_signature(&bytes[..prefix_len]));
        }
        let line_end = match bytes.windows(2).position(|x| x == b"\r\n") {
            Some(i) => i,
            // Give up on runaway lines rather than buffering forever
            None if bytes.len() > 32 => {
                return Err(HeaderParseError::invalid_signature(&bytes[..32]))
            }
            None => return Err(HeaderParseError::Truncated),
        };

        let number = &bytes[SIGNATURE.len().min(line_end)..line_end];
        let mut parts = number.splitn(2, |&b| b == b'.');
        let major = parts.next().and_then(parse_u32);
        let minor = parts.next().and_then(parse_u32);
        match (major, minor) {
            (Some(major), Some(minor)) => Ok((line_end + 2, Version { major, minor })),
            _ => Err(HeaderParseError::invalid_signature(&bytes[..line_end])),
        }
    }
}

fn parse_u32(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    str::from_utf8(bytes).ok().and_then(|s| u32::from_str(s).ok())
}

/// Construct a Version with parts from a tuple of integers.
impl From<(u32, u32)> for Version {
    fn from((major, minor): (u32, u32)) -> Self {
        Version { major, minor }
    }
}
