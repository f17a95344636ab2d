//! LDAP result codes (RFC 4511 section 4.1.9).

use std::fmt;

/// Result codes the server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    AuthMethodNotSupported,
    NoSuchAttribute,
    UndefinedAttributeType,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    InvalidDnSyntax,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    NamingViolation,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    Other,
}

impl ResultCode {
    const TABLE: [(ResultCode, i64, &'static str); 27] = [
        (ResultCode::Success, 0, "success"),
        (ResultCode::OperationsError, 1, "operationsError"),
        (ResultCode::ProtocolError, 2, "protocolError"),
        (ResultCode::TimeLimitExceeded, 3, "timeLimitExceeded"),
        (ResultCode::SizeLimitExceeded, 4, "sizeLimitExceeded"),
        (ResultCode::CompareFalse, 5, "compareFalse"),
        (ResultCode::CompareTrue, 6, "compareTrue"),
        (ResultCode::AuthMethodNotSupported, 7, "authMethodNotSupported"),
        (ResultCode::NoSuchAttribute, 16, "noSuchAttribute"),
        (ResultCode::UndefinedAttributeType, 17, "undefinedAttributeType"),
        (ResultCode::ConstraintViolation, 19, "constraintViolation"),
        (ResultCode::AttributeOrValueExists, 20, "attributeOrValueExists"),
        (ResultCode::InvalidAttributeSyntax, 21, "invalidAttributeSyntax"),
        (ResultCode::NoSuchObject, 32, "noSuchObject"),
        (ResultCode::InvalidDnSyntax, 34, "invalidDNSyntax"),
        (ResultCode::InappropriateAuthentication, 48, "inappropriateAuthentication"),
        (ResultCode::InvalidCredentials, 49, "invalidCredentials"),
        (ResultCode::InsufficientAccessRights, 50, "insufficientAccessRights"),
        (ResultCode::Busy, 51, "busy"),
        (ResultCode::Unavailable, 52, "unavailable"),
        (ResultCode::UnwillingToPerform, 53, "unwillingToPerform"),
        (ResultCode::NamingViolation, 64, "namingViolation"),
        (ResultCode::ObjectClassViolation, 65, "objectClassViolation"),
        (ResultCode::NotAllowedOnNonLeaf, 66, "notAllowedOnNonLeaf"),
        (ResultCode::NotAllowedOnRdn, 67, "notAllowedOnRDN"),
        (ResultCode::EntryAlreadyExists, 68, "entryAlreadyExists"),
        (ResultCode::Other, 80, "other"),
    ];

    /// Numeric value on the wire.
    pub fn code(self) -> i64 {
        Self::TABLE.iter().find(|(c, _, _)| *c == self).map(|(_, n, _)| *n).unwrap_or(80)
    }

    /// Maps a wire value back; unknown values become [`ResultCode::Other`].
    pub fn from_code(code: i64) -> Self {
        Self::TABLE
            .iter()
            .find(|(_, n, _)| *n == code)
            .map(|(c, _, _)| *c)
            .unwrap_or(ResultCode::Other)
    }

    pub fn name(self) -> &'static str {
        Self::TABLE.iter().find(|(c, _, _)| *c == self).map(|(_, _, s)| *s).unwrap_or("other")
    }

    pub fn is_success(self) -> bool {
        matches!(self, ResultCode::Success | ResultCode::CompareTrue | ResultCode::CompareFalse)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// The `LDAPResult` carried by every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
}

impl LdapResult {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
        }
    }

    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }

    #[must_use]
    pub fn with_matched_dn(mut self, dn: impl Into<String>) -> Self {
        self.matched_dn = dn.into();
        self
    }
}
