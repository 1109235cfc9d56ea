use std::borrow::Borrow;
use std::convert::TryFrom;
use std::hash::{Hash, Hasher};

use uncased::{AsUncased, UncasedStr};

use crate::FieldKind;

impl From<&FieldKind> for FieldName {
    fn from(kind: &FieldKind) -> FieldName {
        kind.into_name()
    }
}

/// The name of a WARC header field.
///
/// Field names are case-insensitive ASCII tokens. Names listed in [`FieldKind`] are parsed to
/// their variant and normalize to the standard spelling; any other name is kept as written in
/// [`Other`](FieldName::Other) but still compares, orders and hashes case-insensitively.
///
/// ```
/// # use warcio::{FieldName, FieldKind};
/// let parsed: FieldName = "warc-target-uri".into();
///
/// assert_eq!(parsed, FieldKind::TargetURI);
/// assert_eq!("WARC-Target-URI", parsed.as_ref());
/// assert_eq!(<FieldName as From<_>>::from("X-Crawler"), <FieldName as From<_>>::from("x-crawler"));
/// ```
#[derive(Debug, Clone)]
pub enum FieldName {
    Known(FieldKind),
    /// Any unrecognized field name.
    ///
    /// Software reading WARC files must ignore fields it does not understand, so these are only
    /// retained for inspection.
    Other(Box<str>),
}

impl AsRef<str> for FieldName {
    fn as_ref(&self) -> &str {
        match self {
            FieldName::Known(x) => x.as_ref(),
            FieldName::Other(s) => s.as_ref(),
        }
    }
}

impl<S: AsRef<str> + Into<Box<str>>> From<S> for FieldName {
    fn from(s: S) -> Self {
        match FieldKind::try_from(s.as_ref()) {
            Ok(x) => FieldName::Known(x),
            Err(_) => FieldName::Other(s.into()),
        }
    }
}

impl From<FieldKind> for FieldName {
    fn from(k: FieldKind) -> Self {
        FieldName::Known(k)
    }
}

impl PartialEq<FieldKind> for FieldName {
    fn eq(&self, other: &FieldKind) -> bool {
        match self {
            FieldName::Known(k) => k == other,
            FieldName::Other(s) => s.as_ref().as_uncased() == other.as_ref(),
        }
    }
}

impl FieldName {
    /// Returns `true` if the field's value is a bare URI, which WARC versions before 1.1
    /// wrap in angle brackets.
    pub fn value_is_bare_uri(&self) -> bool {
        matches!(self, FieldName::Known(FieldKind::TargetURI))
    }
}

impl Borrow<UncasedStr> for FieldName {
    fn borrow(&self) -> &UncasedStr {
        self.as_ref().as_uncased()
    }
}

// Borrow requires the borrowed and owned forms to agree, so equality and hashing both go through
// the case-insensitive name.
impl PartialEq for FieldName {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldName::Known(l), FieldName::Known(r)) => l == r,
            _ => self.as_ref().as_uncased() == other.as_ref().as_uncased(),
        }
    }
}

impl Eq for FieldName {}

impl Hash for FieldName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ref().as_uncased().hash(state)
    }
}
