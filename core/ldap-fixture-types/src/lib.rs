//! Core type definitions for ldap-fixture.
//!
//! This crate defines the schema-agnostic directory types shared by every
//! other crate in the workspace:
//! - Distinguished names ([`Dn`], [`Rdn`], [`Ava`]) with RFC 4514 parsing
//! - Directory entries ([`Entry`], [`Attribute`])
//! - Search filters ([`Filter`]) with RFC 4515 parsing, and [`SearchScope`]
//!
//! Nothing here knows about attribute types or matching rules. Comparing two
//! names or values the way a directory server does requires the schema
//! registry, which lives in `ldap-fixture-schema`.

mod dn;
mod entry;
mod filter;

pub use dn::{Ava, Dn, Rdn};
pub use entry::{Attribute, Entry};
pub use filter::{Filter, SearchScope};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing names and filters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid DN '{input}': {reason}")]
    InvalidDn { input: String, reason: String },

    #[error("invalid filter '{input}': {reason}")]
    InvalidFilter { input: String, reason: String },
}
