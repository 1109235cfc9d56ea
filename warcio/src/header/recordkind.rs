use uncased::AsUncased;

/// Standardized values of the [`WARC-Type`](crate::FieldKind::Type) field.
///
/// Only [`Response`](RecordKind::Response) records carry the HTTP responses this library
/// decodes; every other kind is skipped by scanners. Unrecognized types convert to an error
/// through `TryFrom<&str>` so callers can skip them as the WARC standard requires.
///
/// ```
/// # use std::convert::TryFrom;
/// # use warcio::RecordKind;
/// assert_eq!(RecordKind::try_from("Response"), Ok(RecordKind::Response));
/// assert_eq!(RecordKind::try_from("x-custom"), Err("x-custom"));
/// ```
#[derive(Debug, Clone, Copy, PartialOrd, Ord)]
pub enum RecordKind {
    /// `warcinfo`: describes the records that follow it, usually with the crawler's settings.
    Info,
    /// `response`: a complete scheme-specific response, for HTTP the full message as received.
    Response,
    /// `resource`: a resource without protocol framing.
    Resource,
    /// `request`: the complete request that produced a response.
    Request,
    /// `metadata`: content describing another record.
    Metadata,
    /// `revisit`: a capture of content already archived, usually without a payload.
    Revisit,
    /// `conversion`: a transformed version of another record's content.
    Conversion,
    /// `continuation`: a further segment of a segmented record.
    Continuation,
}

include!(concat!(env!("OUT_DIR"), "/record_kind_conversions.rs"));

impl<S: AsRef<str>> PartialEq<S> for RecordKind {
    fn eq(&self, other: &S) -> bool {
        self.as_uncased().eq(other.as_ref())
    }
}

impl Eq for RecordKind {}
