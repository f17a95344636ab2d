//! Directory storage for ldap-fixture.
//!
//! A directory instance is split into partitions, each serving the subtree
//! under one suffix DN. [`StorePartition`] persists entries in a SQLite file
//! per partition; [`SchemaPartition`] is a read-only view of the schema
//! documents. [`PartitionSet`] routes a DN to the partition with the longest
//! matching suffix, and [`FilterMatcher`] evaluates search filters with the
//! schema's matching rules.
//!
//! DNs handed to a partition are always in normalized form; see
//! [`ldap_fixture_schema::SchemaRegistry::normalize_dn`].

mod error;
mod layout;
mod matcher;
mod partition;
mod schema_partition;
mod set;
mod store;

pub use error::{StorageError, StorageResult};
pub use layout::{InstanceLayout, DB_EXTENSION};
pub use matcher::FilterMatcher;
pub use partition::{in_scope, Partition, PartitionRole};
pub use schema_partition::{SchemaPartition, SCHEMA_PARTITION_ID, SCHEMA_PARTITION_SUFFIX};
pub use set::{PartitionSet, SYSTEM_PARTITION_ID, SYSTEM_PARTITION_SUFFIX};
pub use store::StorePartition;
