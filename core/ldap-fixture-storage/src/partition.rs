//! The partition abstraction shared by every backend.

use crate::error::StorageResult;
use ldap_fixture_types::{Dn, Entry, Filter, SearchScope};
use std::path::Path;

/// Where a partition sits in an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRole {
    /// The `ou=system` partition holding the administrator and system containers.
    System,
    /// The read-only `ou=schema` view over the schema files.
    Schema,
    /// Partitions registered by callers.
    Application,
}

impl PartitionRole {
    pub fn as_str(self) -> &'static str {
        match self {
            PartitionRole::System => "system",
            PartitionRole::Schema => "schema",
            PartitionRole::Application => "application",
        }
    }
}

/// A subtree of the directory rooted at a suffix DN.
///
/// Every DN passed in is already normalized against the schema registry
/// (see [`ldap_fixture_schema::SchemaRegistry::normalize_dn`]); entries keep
/// the DN as the user wrote it. Operations other than `open`, `close` and the
/// accessors fail with [`crate::StorageError::NotOpen`] on a closed partition.
pub trait Partition: Send + Sync {
    fn id(&self) -> &str;

    /// Suffix as configured.
    fn suffix(&self) -> &Dn;

    /// Suffix in normalized form, used for routing.
    fn normalized_suffix(&self) -> &Dn;

    /// Backing directory, if the partition keeps files of its own.
    fn path(&self) -> Option<&Path>;

    fn open(&self) -> StorageResult<()>;

    /// Releases every file handle. Closing a closed partition is a no-op.
    fn close(&self) -> StorageResult<()>;

    fn is_open(&self) -> bool;

    /// Marks attributes as indexed. Takes effect on the next open.
    fn add_indexes(&self, attributes: &[&str]) -> StorageResult<()>;

    /// Indexed attribute OIDs.
    fn indexed_attributes(&self) -> Vec<String>;

    fn add(&self, ndn: &Dn, entry: &Entry) -> StorageResult<()>;

    /// Replaces a stored entry.
    fn update(&self, ndn: &Dn, entry: &Entry) -> StorageResult<()>;

    fn delete(&self, ndn: &Dn) -> StorageResult<()>;

    fn lookup(&self, ndn: &Dn) -> StorageResult<Option<Entry>>;

    fn has_children(&self, ndn: &Dn) -> StorageResult<bool>;

    /// Entries in `scope` under `base` matching `filter`.
    fn search(&self, base: &Dn, scope: SearchScope, filter: &Filter) -> StorageResult<Vec<Entry>>;

    fn is_read_only(&self) -> bool {
        false
    }
}

/// True when `ndn` is inside `scope` relative to `base`.
pub fn in_scope(ndn: &Dn, base: &Dn, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => ndn == base,
        SearchScope::OneLevel => ndn.is_child_of(base),
        SearchScope::Subtree => ndn.is_descendant_of(base),
    }
}
