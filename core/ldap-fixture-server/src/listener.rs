//! TCP listener serving LDAP on a running directory service.

use crate::connection;
use crate::error::{DirectoryError, DirectoryResult};
use crate::service::{DirectoryService, ServiceState};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A listener attached to one service on one port.
///
/// Dropping the binding cancels the accept loop and every connection, but
/// only [`ListenerBinding::detach`] waits until the port is released.
#[derive(Debug)]
pub struct ListenerBinding {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ListenerBinding {
    /// Binds `0.0.0.0:port` and serves `service` with one task per
    /// connection. Port 0 picks an ephemeral port; see
    /// [`ListenerBinding::local_addr`].
    pub async fn attach(service: Arc<DirectoryService>, port: u16) -> DirectoryResult<Self> {
        let state = service.state();
        if state != ServiceState::Running {
            return Err(DirectoryError::Bind {
                port,
                reason: format!("directory service is {state}"),
            });
        }
        let bind_error = |e: std::io::Error| DirectoryError::Bind {
            port,
            reason: e.to_string(),
        };
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(accept_loop(listener, service, shutdown.clone()));
        info!(addr = %local_addr, "LDAP listener attached");

        Ok(Self {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_attached(&self) -> bool {
        self.task.is_some()
    }

    /// Stops accepting, cancels every connection and closes the socket.
    /// Fails with [`DirectoryError::AlreadyDetached`] the second time.
    pub async fn detach(&mut self) -> DirectoryResult<()> {
        let Some(task) = self.task.take() else {
            return Err(DirectoryError::AlreadyDetached);
        };
        self.shutdown.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "listener task ended abnormally");
        }
        info!(addr = %self.local_addr, "LDAP listener detached");
        Ok(())
    }
}

impl Drop for ListenerBinding {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<DirectoryService>,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "connection accepted");
                        let service = Arc::clone(&service);
                        let shutdown = shutdown.clone();
                        connections.spawn(connection::serve(stream, peer, service, shutdown));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                }
            }
        }
        while connections.try_join_next().is_some() {}
    }
    drop(listener);
    connections.shutdown().await;
}
