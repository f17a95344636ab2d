//! Schema handling for ldap-fixture.
//!
//! The bundled schema set (system, core, cosine, inetorgperson and a
//! disabled nis schema) ships inside the crate as JSON documents. On first
//! start the [`SchemaProvisioner`] writes them to `partitions/schema/` in the
//! instance directory, then every enabled document is resolved into a
//! [`SchemaRegistry`]: attribute types and object classes keyed by OID, with
//! aliases, inherited equality rules and effective MUST/MAY sets.
//!
//! The registry is also where values and DNs are normalized, so every layer
//! that compares names or values goes through it.

mod assets;
mod definition;
mod error;
mod loader;
mod provisioner;
mod registry;

pub use assets::{extract_bundled, BUNDLED_SCHEMAS};
pub use definition::{
    AttributeTypeDef, AttributeUsage, MatchingRule, ObjectClassDef, ObjectClassKind, SchemaFile,
    SCHEMA_FILE_EXTENSION,
};
pub use error::{ProvisionError, ResolveError, SchemaError, SchemaLoadError};
pub use loader::SchemaLoader;
pub use provisioner::{SchemaProvisioner, PARTITIONS_DIR, SCHEMA_DIR};
pub use registry::{AttributeType, ObjectClass, SchemaRegistry};
