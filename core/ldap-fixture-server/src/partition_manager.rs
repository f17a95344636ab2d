//! Creation and index configuration of application partitions.

use crate::error::{DirectoryError, DirectoryResult};
use crate::service::DirectoryService;
use ldap_fixture_storage::{Partition, StorePartition};
use ldap_fixture_types::Dn;
use std::sync::Arc;
use tracing::debug;

/// Creates SQLite-backed partitions under `<work>/partitions/<id>/` and
/// registers them with a service.
#[derive(Debug, Clone)]
pub struct PartitionManager {
    service: Arc<DirectoryService>,
}

impl PartitionManager {
    pub fn new(service: Arc<DirectoryService>) -> Self {
        Self { service }
    }

    /// Creates and registers a partition serving `suffix`.
    ///
    /// The service must have a schema attached and its system partitions in
    /// place. On failure nothing is registered.
    pub fn create_partition(&self, id: &str, suffix: &str) -> DirectoryResult<Arc<StorePartition>> {
        let creation = |reason: String| DirectoryError::PartitionCreation {
            id: id.to_string(),
            reason,
        };
        let Some(registry) = self.service.registry() else {
            return Err(DirectoryError::InvalidState {
                operation: "create a partition",
                state: self.service.state(),
            });
        };
        if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(creation("id is not a valid directory name".into()));
        }
        let suffix = Dn::parse(suffix).map_err(|e| creation(e.to_string()))?;
        if suffix.is_root() {
            return Err(creation("suffix must not be empty".into()));
        }

        let dir = self.service.layout().partition_dir(id);
        if dir.exists() && !dir.is_dir() {
            return Err(creation(format!("{} exists and is not a directory", dir.display())));
        }

        let store = StorePartition::new(id, suffix, dir, registry)
            .map_err(|e| creation(e.to_string()))?;
        let partition = Arc::new(store);
        self.service.register_partition(partition.clone())?;
        debug!(partition = id, suffix = %partition.suffix(), "partition created");
        Ok(partition)
    }

    /// Marks attributes as indexed. Names are resolved against the schema and
    /// deduplicated; the index is built when the partition next opens.
    pub fn add_indexes(
        &self,
        partition: &dyn Partition,
        attributes: &[&str],
    ) -> DirectoryResult<()> {
        partition
            .add_indexes(attributes)
            .map_err(|e| DirectoryError::PartitionCreation {
                id: partition.id().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            partition = partition.id(),
            indexes = ?partition.indexed_attributes(),
            "indexes configured"
        );
        Ok(())
    }
}
