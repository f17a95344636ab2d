//! The role-tagged collection of partitions served by one instance.

use crate::error::{StorageError, StorageResult};
use crate::partition::{Partition, PartitionRole};
use crate::schema_partition::SCHEMA_PARTITION_ID;
use ldap_fixture_types::Dn;
use std::sync::Arc;

/// Fixed id of the system partition.
pub const SYSTEM_PARTITION_ID: &str = "system";

/// Fixed suffix of the system partition.
pub const SYSTEM_PARTITION_SUFFIX: &str = "ou=system";

/// One system slot, one schema slot and any number of application
/// partitions. Ids and normalized suffixes are unique across the set, and a
/// rejected registration leaves the set unchanged.
#[derive(Default)]
pub struct PartitionSet {
    system: Option<Arc<dyn Partition>>,
    schema: Option<Arc<dyn Partition>>,
    applications: Vec<Arc<dyn Partition>>,
}

impl PartitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_system(&mut self, partition: Arc<dyn Partition>) -> StorageResult<()> {
        if self.system.is_some() {
            return Err(StorageError::SlotTaken(PartitionRole::System.as_str()));
        }
        self.check_unique(partition.as_ref())?;
        self.system = Some(partition);
        Ok(())
    }

    pub fn set_schema(&mut self, partition: Arc<dyn Partition>) -> StorageResult<()> {
        if self.schema.is_some() {
            return Err(StorageError::SlotTaken(PartitionRole::Schema.as_str()));
        }
        self.check_unique(partition.as_ref())?;
        self.schema = Some(partition);
        Ok(())
    }

    /// Registers an application partition.
    pub fn add_application(&mut self, partition: Arc<dyn Partition>) -> StorageResult<()> {
        self.check_unique(partition.as_ref())?;
        let id = partition.id();
        if id.eq_ignore_ascii_case(SYSTEM_PARTITION_ID)
            || id.eq_ignore_ascii_case(SCHEMA_PARTITION_ID)
        {
            return Err(StorageError::ReservedId(id.to_string()));
        }
        self.applications.push(partition);
        Ok(())
    }

    fn check_unique(&self, candidate: &dyn Partition) -> StorageResult<()> {
        for (_, existing) in self.iter() {
            if existing.id().eq_ignore_ascii_case(candidate.id()) {
                return Err(StorageError::DuplicatePartition(candidate.id().to_string()));
            }
            if existing.normalized_suffix() == candidate.normalized_suffix() {
                return Err(StorageError::DuplicateSuffix {
                    suffix: candidate.suffix().to_string(),
                    existing: existing.id().to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn system(&self) -> Option<&Arc<dyn Partition>> {
        self.system.as_ref()
    }

    pub fn schema(&self) -> Option<&Arc<dyn Partition>> {
        self.schema.as_ref()
    }

    pub fn applications(&self) -> &[Arc<dyn Partition>] {
        &self.applications
    }

    /// System, schema, then applications in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionRole, &Arc<dyn Partition>)> {
        self.system
            .iter()
            .map(|p| (PartitionRole::System, p))
            .chain(self.schema.iter().map(|p| (PartitionRole::Schema, p)))
            .chain(self.applications.iter().map(|p| (PartitionRole::Application, p)))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Partition>> {
        self.iter().map(|(_, p)| p).find(|p| p.id().eq_ignore_ascii_case(id))
    }

    pub fn role_of(&self, id: &str) -> Option<PartitionRole> {
        self.iter().find(|(_, p)| p.id().eq_ignore_ascii_case(id)).map(|(role, _)| role)
    }

    pub fn ids(&self) -> Vec<String> {
        self.iter().map(|(_, p)| p.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The partition whose suffix is the longest ancestor-or-self of `ndn`.
    pub fn find_for(&self, ndn: &Dn) -> Option<&Arc<dyn Partition>> {
        self.iter()
            .map(|(_, p)| p)
            .filter(|p| ndn.is_descendant_of(p.normalized_suffix()))
            .max_by_key(|p| p.normalized_suffix().len())
    }

    /// Suffixes of every partition, for the root DSE.
    pub fn naming_contexts(&self) -> Vec<Dn> {
        self.iter().map(|(_, p)| p.suffix().clone()).collect()
    }

    /// Unregisters an application partition. System and schema slots are
    /// only emptied by [`PartitionSet::clear`].
    pub fn remove_application(&mut self, id: &str) -> Option<Arc<dyn Partition>> {
        let idx = self.applications.iter().position(|p| p.id().eq_ignore_ascii_case(id))?;
        Some(self.applications.remove(idx))
    }

    /// Removes every partition. Callers close them first.
    pub fn clear(&mut self) {
        self.system = None;
        self.schema = None;
        self.applications.clear();
    }
}
