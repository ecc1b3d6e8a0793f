//! The single backend connection.

use kvlink_client::{Connector, Store};
use kvlink_core::CommandError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    /// A connect attempt is waiting for the store to become ready.
    Connecting,
    Connected,
    /// The last attempt failed. Only an explicit connect leaves this state.
    Failed,
}

/// Snapshot of the connection, as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum Slot {
    Disconnected,
    Connecting {
        host: String,
        port: u16,
    },
    Connected {
        host: String,
        port: u16,
        store: Arc<dyn Store>,
    },
    Failed {
        host: String,
        port: u16,
        reason: String,
    },
}

/// Owns the backend connection.
///
/// Only `connect` and `reconnect` create a store handle; every command reads
/// it through `ensure_connected`.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    slot: RwLock<Slot>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slot: RwLock::new(Slot::Disconnected),
        }
    }

    /// Connect to `host:port`. Rejected while connected or connecting.
    pub async fn connect(self: &Arc<Self>, host: &str, port: u16) -> Result<(), CommandError> {
        self.begin(host, port, false).await?;
        self.establish(host, port).await
    }

    /// Replace the current connection, whatever its state.
    pub async fn reconnect(self: &Arc<Self>, host: &str, port: u16) -> Result<(), CommandError> {
        self.begin(host, port, true).await?;
        self.establish(host, port).await
    }

    /// Drop the store handle. Returns whether a connection was open.
    pub async fn disconnect(&self) -> bool {
        let mut slot = self.slot.write().await;
        let was_connected = matches!(*slot, Slot::Connected { .. });
        if let Slot::Connected { host, port, .. } = &*slot {
            tracing::info!("Disconnected from store at {}:{}", host, port);
        }
        *slot = Slot::Disconnected;
        was_connected
    }

    /// The live store handle, or `NotConnected`.
    ///
    /// A handle whose link has dropped moves the slot to `Failed`, so the
    /// next `connect` goes through.
    pub async fn ensure_connected(&self) -> Result<Arc<dyn Store>, CommandError> {
        match &*self.slot.read().await {
            Slot::Connected { store, .. } if store.closed().is_none() => return Ok(store.clone()),
            Slot::Connected { .. } => {}
            _ => return Err(CommandError::NotConnected),
        }
        settle(&mut *self.slot.write().await);
        Err(CommandError::NotConnected)
    }

    pub async fn state(&self) -> ConnectionState {
        self.info().await.state
    }

    pub async fn info(&self) -> ConnectionInfo {
        let mut slot = self.slot.write().await;
        settle(&mut slot);
        let (state, host, port, error) = match &*slot {
            Slot::Disconnected => (ConnectionState::Disconnected, None, None, None),
            Slot::Connecting { host, port } => (ConnectionState::Connecting, Some(host), Some(*port), None),
            Slot::Connected { host, port, .. } => (ConnectionState::Connected, Some(host), Some(*port), None),
            Slot::Failed { host, port, reason } => {
                (ConnectionState::Failed, Some(host), Some(*port), Some(reason.clone()))
            }
        };
        ConnectionInfo {
            state,
            host: host.cloned(),
            port,
            error,
        }
    }

    async fn begin(&self, host: &str, port: u16, replace: bool) -> Result<(), CommandError> {
        let mut slot = self.slot.write().await;
        settle(&mut slot);
        match &*slot {
            Slot::Connecting { .. } => return Err(CommandError::ConnectInProgress),
            Slot::Connected { .. } if !replace => return Err(CommandError::AlreadyConnected),
            _ => {}
        }
        tracing::info!("Connecting to store at {}:{}", host, port);
        *slot = Slot::Connecting {
            host: host.to_string(),
            port,
        };
        Ok(())
    }

    /// Runs the attempt on its own task so the slot always leaves
    /// `Connecting`, even if the caller stops waiting.
    async fn establish(self: &Arc<Self>, host: &str, port: u16) -> Result<(), CommandError> {
        let manager = Arc::clone(self);
        let host = host.to_string();
        let attempt = tokio::spawn(async move {
            let outcome = manager.connector.connect(&host, port).await;
            let mut slot = manager.slot.write().await;
            match outcome {
                Ok(store) => {
                    tracing::info!("Connected to store at {}:{}", host, port);
                    *slot = Slot::Connected { host, port, store };
                    Ok(())
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!("Connecting to store at {}:{} failed: {}", host, port, reason);
                    *slot = Slot::Failed {
                        host,
                        port,
                        reason: reason.clone(),
                    };
                    Err(CommandError::Connection(reason))
                }
            }
        });

        attempt
            .await
            .map_err(|e| CommandError::Connection(format!("connect task failed: {e}")))?
    }
}

/// Move a connected slot whose store has closed to `Failed`.
fn settle(slot: &mut Slot) {
    let (host, port, reason) = match &*slot {
        Slot::Connected { host, port, store } => match store.closed() {
            Some(reason) => (host.clone(), *port, reason),
            None => return,
        },
        _ => return,
    };
    tracing::warn!("Lost connection to store at {}:{}: {}", host, port, reason);
    *slot = Slot::Failed { host, port, reason };
}
