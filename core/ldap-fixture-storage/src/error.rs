//! Error types for the storage layer.

use ldap_fixture_schema::{ResolveError, SchemaLoadError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file system).
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A name or value did not resolve against the schema.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Schema files backing the schema partition failed to load.
    #[error(transparent)]
    Schema(#[from] SchemaLoadError),

    /// The partition has not been opened, or was closed.
    #[error("partition '{0}' is not open")]
    NotOpen(String),

    /// The partition does not accept writes.
    #[error("partition '{0}' is read-only")]
    ReadOnly(String),

    /// An entry with this DN already exists.
    #[error("entry already exists: {0}")]
    EntryAlreadyExists(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// The DN is not at or below the partition suffix.
    #[error("{dn} is outside partition '{partition}'")]
    OutsidePartition { partition: String, dn: String },

    /// A partition id is already registered.
    #[error("duplicate partition id '{0}'")]
    DuplicatePartition(String),

    /// Another partition already serves this suffix.
    #[error("suffix '{suffix}' is already served by partition '{existing}'")]
    DuplicateSuffix { suffix: String, existing: String },

    /// The id is reserved for a built-in partition.
    #[error("partition id '{0}' is reserved")]
    ReservedId(String),

    /// The role slot is already occupied.
    #[error("a {0} partition is already registered")]
    SlotTaken(&'static str),
}
