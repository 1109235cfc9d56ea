use crate::FieldName;

/// Standardized values for [field names](FieldName) that this library interprets.
///
/// Any other field is still parsed and retained as [`FieldName::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `WARC-Record-ID`: a globally unique identifier for a record, written as `<uri>`.
    RecordId,
    /// `Content-Length`: the number of octets in a record block.
    ///
    /// Mandatory; a record without a usable length cannot be framed and reading it fails.
    ContentLength,
    /// `WARC-Date`: the instant that capture of the record data began, as a UTC timestamp
    /// like `YYYY-MM-DDThh:mm:ssZ`.
    Date,
    /// `WARC-Type`: the [kind](crate::RecordKind) of the record.
    Type,
    /// `Content-Type`: the MIME type of the record block.
    ///
    /// HTTP responses are stored with `application/http; msgtype=response`, which is how
    /// response records are told apart from requests and other HTTP-bearing records.
    ContentType,
    /// `WARC-Concurrent-To`: the record ID of a record from the same capture event, such as
    /// the request belonging to a response.
    ConcurrentTo,
    /// `WARC-Payload-Digest`: a `labelled-digest` (`algorithm ":" value`) of the payload.
    PayloadDigest,
    /// `WARC-IP-Address`: the address contacted to retrieve the record content.
    IpAddress,
    /// `WARC-Target-URI`: the URI the record content was retrieved from.
    ///
    /// This is the key under which responses are indexed.
    TargetURI,
    /// `WARC-Truncated`: why a record holds only part of the original resource (`length`,
    /// `time`, `disconnect` or `unspecified`).
    Truncated,
    /// `WARC-Warcinfo-ID`: the ID of the `warcinfo` record describing this one.
    InfoID,
    /// `WARC-Filename`: the name of the file holding a `warcinfo` record.
    Filename,
    /// `WARC-Identified-Payload-Type`: a content type found by inspecting the payload.
    IdentifiedPayloadType,
}

impl FieldKind {
    pub fn into_name(self) -> FieldName {
        FieldName::Known(self)
    }
}

include!(concat!(env!("OUT_DIR"), "/field_kind_conversions.rs"));

impl PartialEq<FieldName> for FieldKind {
    fn eq(&self, other: &FieldName) -> bool {
        other == self
    }
}
