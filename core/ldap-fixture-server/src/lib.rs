//! Embedded LDAP directory service for tests.
//!
//! [`EmbeddedDirectory`] provisions a throwaway directory instance, seeds a
//! root entry and a test user, and serves LDAPv3 on a TCP port until it is
//! stopped, at which point the working directory is deleted.
//!
//! # Bootstrap order
//!
//! 1. [`WorkingDirectory::prepare`] wipes and recreates the instance root
//! 2. [`DirectoryService::load_schema`] extracts and loads the schema
//! 3. [`DirectoryService::attach_system_partitions`] registers `ou=schema`
//!    and `ou=system`
//! 4. [`PartitionManager::create_partition`] adds application partitions
//! 5. [`DirectoryService::startup`] opens every partition
//! 6. [`seed::seed_entries`] adds the baseline entries through an admin
//!    [`CoreSession`]
//! 7. [`ListenerBinding::attach`] starts serving connections
//!
//! Teardown runs in reverse. The lower-level pieces are public so tests can
//! drive the lifecycle step by step.

mod changelog;
mod config;
mod connection;
mod error;
mod fixture;
mod listener;
mod partition_manager;
pub mod seed;
mod service;
mod session;
mod workdir;

pub use changelog::{ChangeEvent, ChangeKind, ChangeLog};
pub use config::{FixtureConfig, PartitionConfig, SeedUserConfig, DEFAULT_PORT};
pub use error::{DirectoryError, DirectoryResult, OperationError};
pub use fixture::EmbeddedDirectory;
pub use listener::ListenerBinding;
pub use partition_manager::PartitionManager;
pub use service::{admin_dn, DirectoryService, ServicePolicy, ServiceState, ADMIN_DN};
pub use session::{CoreSession, Principal, SearchOutcome, SearchParams, VENDOR_NAME};
pub use workdir::{WorkDirLease, WorkingDirectory};
