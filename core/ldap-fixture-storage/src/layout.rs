//! On-disk layout of an instance directory.

use ldap_fixture_schema::{PARTITIONS_DIR, SCHEMA_DIR};
use std::path::{Path, PathBuf};

/// Database file extension for store partitions.
pub const DB_EXTENSION: &str = "db";

/// Paths inside an instance working directory.
///
/// ```text
/// <root>/partitions/schema/        extracted schema documents
/// <root>/partitions/<id>/<id>.db   one SQLite file per partition
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partitions_dir(&self) -> PathBuf {
        self.root.join(PARTITIONS_DIR)
    }

    pub fn partition_dir(&self, id: &str) -> PathBuf {
        self.partitions_dir().join(id)
    }

    pub fn partition_db(&self, id: &str) -> PathBuf {
        self.partition_dir(id).join(format!("{id}.{DB_EXTENSION}"))
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.partitions_dir().join(SCHEMA_DIR)
    }
}
