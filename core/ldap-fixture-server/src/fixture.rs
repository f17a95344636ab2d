//! The embedded directory facade used by tests.

use crate::config::FixtureConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::listener::ListenerBinding;
use crate::partition_manager::PartitionManager;
use crate::seed;
use crate::service::{DirectoryService, ServiceState};
use crate::workdir::{WorkDirLease, WorkingDirectory};
use ldap_fixture_types::Entry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Default)]
struct FixtureState {
    service: Option<Arc<DirectoryService>>,
    listener: Option<ListenerBinding>,
    /// Held from the first `init_server` until `stop_server`, including after
    /// a failed bootstrap.
    lease: Option<WorkDirLease>,
    stopped: bool,
}

/// A disposable LDAP server for one test run.
///
/// ```no_run
/// # async fn run() -> ldap_fixture_server::DirectoryResult<()> {
/// use ldap_fixture_server::EmbeddedDirectory;
///
/// let directory = EmbeddedDirectory::new("dc=liftweb,dc=net");
/// let addr = directory.init_server(0).await?;
/// // ... point an LDAP client at `addr` ...
/// directory.stop_server().await?;
/// # Ok(())
/// # }
/// ```
///
/// `init_server` and `stop_server` are serialized, and may be called from
/// different tasks or threads.
pub struct EmbeddedDirectory {
    config: Arc<FixtureConfig>,
    work_dir: PathBuf,
    state: Mutex<FixtureState>,
}

impl EmbeddedDirectory {
    /// Default configuration serving `root_dn`.
    pub fn new(root_dn: impl Into<String>) -> Self {
        Self::with_config(FixtureConfig::with_root_dn(root_dn))
    }

    /// Without an explicit `work_dir`, each instance gets its own fresh
    /// directory under the system temp dir.
    pub fn with_config(config: FixtureConfig) -> Self {
        let work_dir = config.resolve_work_dir();
        Self {
            config: Arc::new(config),
            work_dir,
            state: Mutex::new(FixtureState::default()),
        }
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn work_dir(&self) -> WorkingDirectory {
        WorkingDirectory::new(&self.work_dir)
    }

    /// Builds a fresh instance in the working directory, seeds the baseline
    /// entries and starts listening on `port` (0 for an ephemeral port).
    ///
    /// Any failure leaves no open partition and no bound port.
    pub async fn init_server(&self, port: u16) -> DirectoryResult<SocketAddr> {
        let mut state = self.state.lock().await;
        if let Some(service) = &state.service {
            return Err(DirectoryError::InvalidState {
                operation: "initialize the server",
                state: service.state(),
            });
        }
        self.config.validate()?;

        let work_dir = self.work_dir();
        if state.lease.is_none() {
            state.lease = Some(work_dir.claim()?);
        }
        let service = Arc::new(DirectoryService::new(work_dir.path(), self.config.policy()));
        let built = {
            let service = service.clone();
            let config = self.config.clone();
            blocking(move || {
                work_dir.prepare()?;
                bootstrap(&config, &service)
            })
            .await
        };
        if let Err(e) = built {
            shutdown_quietly(service).await;
            return Err(e);
        }

        let listener = match ListenerBinding::attach(service.clone(), port).await {
            Ok(listener) => listener,
            Err(e) => {
                shutdown_quietly(service).await;
                return Err(e);
            }
        };
        let addr = listener.local_addr();
        state.service = Some(service);
        state.listener = Some(listener);
        state.stopped = false;
        info!(addr = %addr, root_dn = %self.config.root_dn, "embedded directory ready");
        Ok(addr)
    }

    /// Detaches the listener, shuts the service down and deletes the working
    /// directory. Safe to call repeatedly, or without a prior `init_server`.
    pub async fn stop_server(&self) -> DirectoryResult<()> {
        let mut state = self.state.lock().await;
        if let Some(mut listener) = state.listener.take()
            && let Err(e) = listener.detach().await
        {
            warn!(error = %e, "failed to detach listener");
        }
        let service = state.service.take();
        let lease = state.lease.take();
        state.stopped = true;
        if service.is_none() && lease.is_none() {
            return Ok(());
        }
        let work_dir = self.work_dir();
        let (shutdown, disposed) = blocking(move || {
            let shutdown = match service {
                Some(service) => service.shutdown(),
                None => Ok(()),
            };
            // Only a claimed directory belongs to this instance.
            let disposed = match lease {
                Some(lease) => {
                    let disposed = work_dir.dispose();
                    drop(lease);
                    disposed
                }
                None => Ok(()),
            };
            Ok((shutdown, disposed))
        })
        .await?;
        shutdown?;
        disposed?;
        info!(work_dir = %self.work_dir.display(), "embedded directory stopped");
        Ok(())
    }

    /// Adds entries to the running instance as the administrator. A rejected
    /// entry fails with [`DirectoryError::EntrySeed`] and the server keeps
    /// running.
    pub async fn seed(&self, entries: impl IntoIterator<Item = Entry>) -> DirectoryResult<usize> {
        let service = self.running_service("seed entries").await?;
        let entries: Vec<Entry> = entries.into_iter().collect();
        blocking(move || {
            let session = service.admin_session()?;
            seed::seed_entries(&session, entries)
        })
        .await
    }

    /// Address the listener is bound to, while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().await.listener.as_ref().map(ListenerBinding::local_addr)
    }

    pub async fn service(&self) -> Option<Arc<DirectoryService>> {
        self.state.lock().await.service.clone()
    }

    pub async fn state(&self) -> ServiceState {
        let state = self.state.lock().await;
        match &state.service {
            Some(service) => service.state(),
            None if state.stopped => ServiceState::Stopped,
            None => ServiceState::Unconfigured,
        }
    }

    async fn running_service(
        &self,
        operation: &'static str,
    ) -> DirectoryResult<Arc<DirectoryService>> {
        let state = self.state.lock().await;
        match &state.service {
            Some(service) => Ok(service.clone()),
            None => Err(DirectoryError::InvalidState {
                operation,
                state: if state.stopped {
                    ServiceState::Stopped
                } else {
                    ServiceState::Unconfigured
                },
            }),
        }
    }
}

fn as_strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Schema, partitions, startup and baseline entries. Runs on the blocking
/// pool since every step touches the filesystem.
fn bootstrap(config: &FixtureConfig, service: &Arc<DirectoryService>) -> DirectoryResult<()> {
    service.load_schema()?;
    service.attach_system_partitions()?;

    let manager = PartitionManager::new(service.clone());
    let root = manager.create_partition(&config.root_partition_id, &config.root_dn)?;
    manager.add_indexes(root.as_ref(), &as_strs(&config.root_indexes))?;
    for extra in &config.partitions {
        let partition = manager.create_partition(&extra.id, &extra.suffix)?;
        manager.add_indexes(partition.as_ref(), &as_strs(&extra.indexes))?;
    }

    service.startup()?;

    let root_dn = seed::seed_dn(&config.root_dn)?;
    let session = service.admin_session()?;
    seed::seed_entries(&session, seed::baseline_entries(&root_dn, &config.seed_user))?;
    Ok(())
}

async fn blocking<T, F>(f: F) -> DirectoryResult<T>
where
    F: FnOnce() -> DirectoryResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "spawn_blocking panicked");
            Err(DirectoryError::Task(e.to_string()))
        }
    }
}

async fn shutdown_quietly(service: Arc<DirectoryService>) {
    if let Err(e) = blocking(move || service.shutdown()).await {
        warn!(error = %e, "shutdown after failed initialization also failed");
    }
}
