//! Error types for schema loading and provisioning.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem found while loading schema definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A schema file could not be read.
    #[error("cannot read schema file {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    /// A schema file is not a valid schema document.
    #[error("cannot parse schema file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// Two schema files declare the same schema name.
    #[error("schema '{0}' is defined more than once")]
    DuplicateSchema(String),

    /// An enabled schema depends on a schema that is absent.
    #[error("schema '{schema}' depends on missing schema '{dependency}'")]
    MissingDependency { schema: String, dependency: String },

    /// An enabled schema depends on a disabled schema.
    #[error("schema '{schema}' depends on disabled schema '{dependency}'")]
    DisabledDependency { schema: String, dependency: String },

    /// Schema dependencies form a cycle.
    #[error("dependency cycle involving schema '{0}'")]
    DependencyCycle(String),

    /// An OID or name is already registered.
    #[error("schema '{schema}': '{name}' is already registered")]
    DuplicateName { schema: String, name: String },

    /// A definition references an attribute type that does not exist.
    #[error("schema '{schema}': {element} references unknown attribute type '{name}'")]
    UnknownAttributeType {
        schema: String,
        element: String,
        name: String,
    },

    /// A definition references an object class that does not exist.
    #[error("schema '{schema}': {element} references unknown object class '{name}'")]
    UnknownObjectClass {
        schema: String,
        element: String,
        name: String,
    },

    /// A definition is internally inconsistent.
    #[error("schema '{schema}': invalid definition {element}: {reason}")]
    InvalidDefinition {
        schema: String,
        element: String,
        reason: String,
    },
}

/// Every error found while loading a schema directory.
///
/// A registry is only handed out when this list would be empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLoadError {
    pub errors: Vec<SchemaError>,
}

impl SchemaLoadError {
    pub fn new(errors: Vec<SchemaError>) -> Self {
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for SchemaLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema load failed with {} error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaLoadError {}

/// Errors from [`crate::SchemaProvisioner`].
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The schema asset set could not be written to disk.
    #[error("cannot extract schema into {path}: {source}")]
    Extract {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The extracted schema did not load cleanly.
    #[error(transparent)]
    Load(#[from] SchemaLoadError),
}

/// Errors from resolving names and values against a loaded registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("undefined attribute type '{0}'")]
    UndefinedAttributeType(String),

    #[error("undefined object class '{0}'")]
    UndefinedObjectClass(String),

    #[error(transparent)]
    InvalidDn(#[from] ldap_fixture_types::Error),
}
