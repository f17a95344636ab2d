//! Error types for the directory service.

use crate::service::ServiceState;
use ldap_fixture_proto::ResultCode;
use ldap_fixture_schema::{ProvisionError, SchemaLoadError};
use ldap_fixture_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for directory service operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A directory operation rejected with an LDAP result code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct OperationError {
    pub code: ResultCode,
    pub message: String,
    /// Deepest existing ancestor, for `noSuchObject`.
    pub matched_dn: Option<String>,
}

impl OperationError {
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            matched_dn: None,
        }
    }

    #[must_use]
    pub fn with_matched_dn(mut self, dn: impl Into<String>) -> Self {
        self.matched_dn = Some(dn.into());
        self
    }
}

/// Errors that can occur while building, running or tearing down a directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The working directory could not be prepared or removed.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The schema set did not load cleanly.
    #[error(transparent)]
    SchemaLoad(#[from] SchemaLoadError),

    /// A partition could not be created or registered.
    #[error("cannot create partition '{id}': {reason}")]
    PartitionCreation { id: String, reason: String },

    /// A seed entry was rejected.
    #[error("cannot seed entry '{dn}': {source}")]
    EntrySeed {
        dn: String,
        #[source]
        source: OperationError,
    },

    /// The listener could not be bound.
    #[error("cannot listen on port {port}: {reason}")]
    Bind { port: u16, reason: String },

    /// The listener was already detached.
    #[error("listener is already detached")]
    AlreadyDetached,

    /// A lifecycle step or session operation was called out of order.
    #[error("cannot {operation} while the service is {state}")]
    InvalidState {
        operation: &'static str,
        state: ServiceState,
    },

    /// A directory operation failed with an LDAP result code.
    #[error(transparent)]
    Operation(#[from] OperationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid fixture configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl DirectoryError {
    /// The LDAP result code this error maps to on the wire.
    pub fn result_code(&self) -> ResultCode {
        match self {
            DirectoryError::Operation(err) | DirectoryError::EntrySeed { source: err, .. } => {
                err.code
            }
            DirectoryError::InvalidState { .. } => ResultCode::Unavailable,
            _ => ResultCode::OperationsError,
        }
    }
}

impl From<ProvisionError> for DirectoryError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Extract { path, source } => DirectoryError::Filesystem { path, source },
            ProvisionError::Load(errors) => DirectoryError::SchemaLoad(errors),
        }
    }
}
