//! The directory service lifecycle.
//!
//! A [`DirectoryService`] moves through a fixed sequence of states:
//!
//! ```text
//! Unconfigured -> SchemaLoaded -> PartitionsAttached -> Running -> Stopped
//! ```
//!
//! Each transition checks the current state under the service mutex and
//! fails with [`DirectoryError::InvalidState`] when called out of order. A
//! failure before `Running` closes whatever was opened and leaves the
//! service `Stopped`.

use crate::changelog::ChangeLog;
use crate::error::{DirectoryError, DirectoryResult};
use crate::session::{CoreSession, Principal};
use ldap_fixture_schema::{SchemaProvisioner, SchemaRegistry};
use ldap_fixture_storage::{
    InstanceLayout, Partition, PartitionSet, SchemaPartition, StorePartition, SCHEMA_PARTITION_ID,
    SYSTEM_PARTITION_ID, SYSTEM_PARTITION_SUFFIX,
};
use ldap_fixture_types::{Dn, Entry, Rdn};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Lifecycle state of a [`DirectoryService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Unconfigured,
    SchemaLoaded,
    PartitionsAttached,
    Running,
    Stopped,
}

impl ServiceState {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Unconfigured => "unconfigured",
            ServiceState::SchemaLoaded => "schema-loaded",
            ServiceState::PartitionsAttached => "partitions-attached",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy flags applied when the system partitions are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    pub changelog_enabled: bool,
    /// Return `creatorsName`/`modifiersName` as written instead of in OID form.
    pub denormalize_op_attrs: bool,
    pub allow_anonymous_access: bool,
    /// Password of `uid=admin,ou=system`.
    pub admin_password: String,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            changelog_enabled: false,
            denormalize_op_attrs: true,
            allow_anonymous_access: true,
            admin_password: "secret".to_string(),
        }
    }
}

/// DN of the built-in administrator.
pub const ADMIN_DN: &str = "uid=admin,ou=system";

/// The administrator DN as a parsed name.
pub fn admin_dn() -> Dn {
    Dn::from_rdns(vec![Rdn::new("uid", "admin"), Rdn::new("ou", "system")])
}

struct ServiceInner {
    state: ServiceState,
    registry: Option<Arc<SchemaRegistry>>,
    partitions: PartitionSet,
}

impl ServiceInner {
    fn expect(&self, expected: ServiceState, operation: &'static str) -> DirectoryResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DirectoryError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn close_all(&mut self) -> Option<DirectoryError> {
        let mut first_error = None;
        for (role, partition) in self.partitions.iter() {
            if let Err(e) = partition.close() {
                warn!(
                    partition = partition.id(),
                    role = role.as_str(),
                    error = %e,
                    "failed to close partition"
                );
                first_error.get_or_insert(DirectoryError::Storage(e));
            }
        }
        self.partitions.clear();
        first_error
    }
}

/// One directory instance: its schema registry, partitions and policy.
///
/// Shared as `Arc<DirectoryService>` between the fixture, sessions and the
/// listener. Nothing is global; two services in one process are independent.
pub struct DirectoryService {
    layout: InstanceLayout,
    policy: ServicePolicy,
    changelog: ChangeLog,
    inner: Mutex<ServiceInner>,
}

impl DirectoryService {
    /// An unconfigured service rooted at `work_dir`. Nothing touches the
    /// filesystem until [`DirectoryService::load_schema`].
    pub fn new(work_dir: impl Into<PathBuf>, policy: ServicePolicy) -> Self {
        Self {
            layout: InstanceLayout::new(work_dir),
            changelog: ChangeLog::new(policy.changelog_enabled),
            policy,
            inner: Mutex::new(ServiceInner {
                state: ServiceState::Unconfigured,
                registry: None,
                partitions: PartitionSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServiceInner> {
        self.inner.lock().unwrap()
    }

    pub fn state(&self) -> ServiceState {
        self.lock().state
    }

    pub fn policy(&self) -> &ServicePolicy {
        &self.policy
    }

    pub fn layout(&self) -> &InstanceLayout {
        &self.layout
    }

    pub fn changelog(&self) -> &ChangeLog {
        &self.changelog
    }

    /// The attached schema registry, once loaded.
    pub fn registry(&self) -> Option<Arc<SchemaRegistry>> {
        self.lock().registry.clone()
    }

    /// Registered partition ids: system, schema, then applications.
    pub fn partition_ids(&self) -> Vec<String> {
        self.lock().partitions.ids()
    }

    pub fn partition(&self, id: &str) -> Option<Arc<dyn Partition>> {
        self.lock().partitions.get(id).cloned()
    }

    /// Suffixes of every registered partition.
    pub fn naming_contexts(&self) -> Vec<Dn> {
        self.lock().partitions.naming_contexts()
    }

    /// Closes everything opened so far and declares the service stopped.
    fn abort(&self, inner: &mut ServiceInner, err: DirectoryError) -> DirectoryError {
        warn!(state = %inner.state, error = %err, "directory service bootstrap failed");
        inner.close_all();
        inner.state = ServiceState::Stopped;
        err
    }

    /// Extracts the schema into the working directory if absent and
    /// attaches the loaded registry.
    pub fn load_schema(&self) -> DirectoryResult<Arc<SchemaRegistry>> {
        let mut inner = self.lock();
        inner.expect(ServiceState::Unconfigured, "load the schema")?;
        let registry = match SchemaProvisioner::new(self.layout.root()).provision() {
            Ok(registry) => Arc::new(registry),
            Err(e) => return Err(self.abort(&mut inner, e.into())),
        };
        inner.registry = Some(registry.clone());
        inner.state = ServiceState::SchemaLoaded;
        info!(schemas = ?registry.schema_names(), "schema attached");
        Ok(registry)
    }

    /// Registers the schema partition and the mandatory system partition.
    pub fn attach_system_partitions(&self) -> DirectoryResult<()> {
        let mut inner = self.lock();
        inner.expect(ServiceState::SchemaLoaded, "attach the system partitions")?;
        if let Err(e) = self.build_system_partitions(&mut inner) {
            return Err(self.abort(&mut inner, e));
        }
        inner.state = ServiceState::PartitionsAttached;
        info!(
            changelog = self.policy.changelog_enabled,
            denormalize_op_attrs = self.policy.denormalize_op_attrs,
            allow_anonymous_access = self.policy.allow_anonymous_access,
            "system partitions attached"
        );
        Ok(())
    }

    fn build_system_partitions(&self, inner: &mut ServiceInner) -> DirectoryResult<()> {
        let Some(registry) = inner.registry.clone() else {
            return Err(DirectoryError::InvalidState {
                operation: "attach the system partitions",
                state: inner.state,
            });
        };
        let creation = |id: &str, reason: String| DirectoryError::PartitionCreation {
            id: id.to_string(),
            reason,
        };

        let schema = SchemaPartition::new(self.layout.schema_dir(), registry.clone())
            .map_err(|e| creation(SCHEMA_PARTITION_ID, e.to_string()))?;
        inner
            .partitions
            .set_schema(Arc::new(schema))
            .map_err(|e| creation(SCHEMA_PARTITION_ID, e.to_string()))?;

        let suffix = Dn::parse(SYSTEM_PARTITION_SUFFIX)
            .map_err(|e| creation(SYSTEM_PARTITION_ID, e.to_string()))?;
        let system = StorePartition::new(
            SYSTEM_PARTITION_ID,
            suffix,
            self.layout.partition_dir(SYSTEM_PARTITION_ID),
            registry,
        )
        .map_err(|e| creation(SYSTEM_PARTITION_ID, e.to_string()))?;
        inner
            .partitions
            .set_system(Arc::new(system))
            .map_err(|e| creation(SYSTEM_PARTITION_ID, e.to_string()))?;
        Ok(())
    }

    /// Adds an application partition. Allowed once the system partitions are
    /// attached; on a running service the partition is opened immediately.
    /// A rejected partition leaves the registered set unchanged.
    pub fn register_partition(&self, partition: Arc<dyn Partition>) -> DirectoryResult<()> {
        let mut inner = self.lock();
        if !matches!(inner.state, ServiceState::PartitionsAttached | ServiceState::Running) {
            return Err(DirectoryError::InvalidState {
                operation: "register a partition",
                state: inner.state,
            });
        }
        let id = partition.id().to_string();
        inner
            .partitions
            .add_application(partition.clone())
            .map_err(|e| DirectoryError::PartitionCreation {
                id: id.clone(),
                reason: e.to_string(),
            })?;
        if inner.state == ServiceState::Running
            && let Err(e) = partition.open()
        {
            inner.partitions.remove_application(&id);
            return Err(DirectoryError::PartitionCreation {
                id,
                reason: e.to_string(),
            });
        }
        info!(partition = %id, suffix = %partition.suffix(), "partition registered");
        Ok(())
    }

    /// Opens every partition and creates the system context entries.
    pub fn startup(self: &Arc<Self>) -> DirectoryResult<()> {
        {
            let mut inner = self.lock();
            inner.expect(ServiceState::PartitionsAttached, "start the service")?;
            let mut failure = None;
            for (role, partition) in inner.partitions.iter() {
                if let Err(e) = partition.open() {
                    failure = Some(DirectoryError::PartitionCreation {
                        id: partition.id().to_string(),
                        reason: e.to_string(),
                    });
                    break;
                }
                debug!(partition = partition.id(), role = role.as_str(), "partition opened");
            }
            if let Some(err) = failure {
                return Err(self.abort(&mut inner, err));
            }
            inner.state = ServiceState::Running;
        }

        if let Err(e) = self.create_context_entries() {
            let mut inner = self.lock();
            return Err(self.abort(&mut inner, e));
        }
        info!(
            root = %self.layout.root().display(),
            partitions = ?self.partition_ids(),
            "directory service started"
        );
        Ok(())
    }

    fn create_context_entries(self: &Arc<Self>) -> DirectoryResult<()> {
        let session = self.admin_session()?;
        for entry in system_context_entries(&self.policy.admin_password) {
            if session.lookup(&entry.dn().to_string())?.is_none() {
                session.add(entry)?;
            }
        }
        Ok(())
    }

    /// Closes every partition and moves to `Stopped`. Calling it again, or
    /// before startup, is fine.
    pub fn shutdown(&self) -> DirectoryResult<()> {
        let mut inner = self.lock();
        if inner.state == ServiceState::Stopped {
            debug!("directory service already stopped");
            return Ok(());
        }
        let first_error = inner.close_all();
        inner.state = ServiceState::Stopped;
        info!("directory service stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// A session acting as `uid=admin,ou=system`.
    pub fn admin_session(self: &Arc<Self>) -> DirectoryResult<CoreSession> {
        self.running_registry("open an admin session")?;
        Ok(CoreSession::new(self.clone(), Principal::User(admin_dn())))
    }

    /// An unauthenticated session.
    pub fn anonymous_session(self: &Arc<Self>) -> DirectoryResult<CoreSession> {
        self.running_registry("open a session")?;
        Ok(CoreSession::new(self.clone(), Principal::Anonymous))
    }

    /// The registry, provided the service is running.
    pub(crate) fn running_registry(
        &self,
        operation: &'static str,
    ) -> DirectoryResult<Arc<SchemaRegistry>> {
        let inner = self.lock();
        inner.expect(ServiceState::Running, operation)?;
        inner.registry.clone().ok_or(DirectoryError::InvalidState {
            operation,
            state: inner.state,
        })
    }

    pub(crate) fn partitions(&self) -> Vec<Arc<dyn Partition>> {
        self.lock().partitions.iter().map(|(_, p)| p.clone()).collect()
    }

    /// The partition serving a normalized DN.
    pub(crate) fn route(&self, ndn: &Dn) -> Option<Arc<dyn Partition>> {
        self.lock().partitions.find_for(ndn).cloned()
    }
}

impl fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryService")
            .field("root", &self.layout.root())
            .field("state", &self.state())
            .field("policy", &self.policy)
            .finish()
    }
}

fn system_context_entries(admin_password: &str) -> Vec<Entry> {
    let system = Dn::from_rdns(vec![Rdn::new("ou", "system")]);
    vec![
        Entry::new(system.clone())
            .with("objectClass", ["top", "organizationalUnit", "extensibleObject"])
            .with("ou", ["system"]),
        Entry::new(admin_dn())
            .with("objectClass", ["top", "person", "organizationalPerson", "inetOrgPerson"])
            .with("uid", ["admin"])
            .with("cn", ["system administrator"])
            .with("sn", ["administrator"])
            .with("displayName", ["Directory Superuser"])
            .with("userPassword", [admin_password]),
        Entry::new(system.child(Rdn::new("ou", "users")))
            .with("objectClass", ["top", "organizationalUnit"])
            .with("ou", ["users"]),
        Entry::new(system.child(Rdn::new("ou", "groups")))
            .with("objectClass", ["top", "organizationalUnit"])
            .with("ou", ["groups"]),
    ]
}
