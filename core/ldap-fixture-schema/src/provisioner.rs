//! First-run extraction of the schema assets.

use crate::assets;
use crate::error::ProvisionError;
use crate::loader::SchemaLoader;
use crate::registry::SchemaRegistry;
use std::path::{Path, PathBuf};
use tracing::info;

/// Directory under the instance root holding every partition.
pub const PARTITIONS_DIR: &str = "partitions";

/// Directory under [`PARTITIONS_DIR`] holding the schema documents.
pub const SCHEMA_DIR: &str = "schema";

/// Extracts the bundled schema into an instance directory and loads it.
///
/// Extraction only happens when the schema directory is absent; an existing
/// directory is loaded as-is so local edits survive restarts.
#[derive(Debug, Clone)]
pub struct SchemaProvisioner {
    schema_dir: PathBuf,
}

impl SchemaProvisioner {
    /// Provisioner for the instance rooted at `root_dir`.
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            schema_dir: root_dir.as_ref().join(PARTITIONS_DIR).join(SCHEMA_DIR),
        }
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    /// Writes the bundled schema if the schema directory does not exist.
    /// Returns whether anything was extracted.
    pub fn extract_if_absent(&self) -> Result<bool, ProvisionError> {
        if self.schema_dir.exists() {
            info!(
                dir = %self.schema_dir.display(),
                "schema partition already exists, skipping schema extraction"
            );
            return Ok(false);
        }
        let written = assets::extract_bundled(&self.schema_dir).map_err(|source| {
            ProvisionError::Extract {
                path: self.schema_dir.clone(),
                source,
            }
        })?;
        info!(dir = %self.schema_dir.display(), files = written, "extracted schema");
        Ok(true)
    }

    /// Extracts if needed, then loads every enabled schema.
    pub fn provision(&self) -> Result<SchemaRegistry, ProvisionError> {
        self.extract_if_absent()?;
        let registry = SchemaLoader::new(&self.schema_dir).load_all_enabled()?;
        info!(
            schemas = ?registry.schema_names(),
            attribute_types = registry.attribute_type_count(),
            object_classes = registry.object_class_count(),
            "schema loaded"
        );
        Ok(registry)
    }
}
