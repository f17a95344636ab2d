//! Error types for the wire codec.

use lber::common::TagClass;
use thiserror::Error;

/// Result type for decoding.
pub type ProtoResult<T> = Result<T, ProtoError>;

/// Errors that can occur while decoding BER-encoded LDAP messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// The input ended inside an element.
    #[error("truncated element")]
    Truncated,

    /// The BER parser rejected the frame.
    #[error("malformed BER element")]
    Malformed,

    /// A required element is absent.
    #[error("missing {0}")]
    Missing(&'static str),

    /// An element carried a different tag than the grammar requires.
    #[error("unexpected tag for {what}: {class:?} {id}")]
    UnexpectedTag {
        what: &'static str,
        class: TagClass,
        id: u64,
    },

    /// A primitive element where a constructed one is required, or the
    /// other way round.
    #[error("wrong encoding form for {0}")]
    WrongForm(&'static str),

    /// Indefinite or oversized length encoding.
    #[error("invalid length encoding")]
    InvalidLength,

    /// Constructed elements nested past the accepted depth.
    #[error("elements nested deeper than {0} levels")]
    NestingTooDeep(usize),

    /// Integer content is empty or does not fit.
    #[error("invalid integer encoding")]
    InvalidInteger,

    /// Boolean content is not a single octet.
    #[error("invalid boolean encoding")]
    InvalidBoolean,

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// An enumerated value outside the allowed range.
    #[error("invalid {field} value {value}")]
    InvalidEnum { field: &'static str, value: i64 },

    /// A protocol operation the server does not accept.
    #[error("unsupported protocol operation {0}")]
    UnsupportedOperation(u64),

    /// A filter choice this codec does not handle (extensible match).
    #[error("unsupported filter choice {0}")]
    UnsupportedFilter(u64),

    /// Elements left over after a complete structure.
    #[error("trailing data after element")]
    TrailingData,
}
