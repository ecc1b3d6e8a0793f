//! HTTP command adapter for a key-value store.
//!
//! Every store operation is registered as a named command with a descriptor
//! the host uses to invoke it, and mounted as an HTTP route. Handlers share a
//! single backend connection owned by the [`ConnectionManager`]; the
//! [`Dispatcher`] turns every outcome, including handler panics, into an
//! [`Envelope`](kvlink_core::Envelope).
//!
//! Run:
//!   kvlink --redis-host localhost --redis-port 6379
//!
//! Then:
//!   curl localhost:33334/module
//!   curl -X POST localhost:33334/set -d '{"key":"x","value":{"a":1}}'
//!   curl localhost:33334/get/x

pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod http;
pub mod registry;

pub use config::{Args, Config, ConfigError};
pub use connection::{ConnectionInfo, ConnectionManager, ConnectionState};
pub use dispatch::Dispatcher;
pub use registry::{Command, Handler, Invocation, Registry};

use anyhow::Context;
use axum::Router;
use kvlink_client::{Connector, MemoryConnector, MemoryStore, RespConnector};
use kvlink_core::ModuleDescriptor;
use std::sync::Arc;

/// The command table wired to one connection.
pub struct Service {
    dispatcher: Dispatcher,
    module: ModuleDescriptor,
}

impl Service {
    pub fn new(connector: Arc<dyn Connector>, mut module: ModuleDescriptor) -> Self {
        let registry = Arc::new(commands::table());
        registry.publish(&mut module);
        let connection = Arc::new(ConnectionManager::new(connector));
        Self {
            dispatcher: Dispatcher::new(connection, registry),
            module,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        self.dispatcher.connection()
    }

    /// The descriptor published to the host.
    pub fn module(&self) -> &ModuleDescriptor {
        &self.module
    }

    pub fn router(&self) -> Router {
        http::router(self.dispatcher.clone(), self.module.clone())
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let connector: Arc<dyn Connector> = if config.backend.memory {
        tracing::info!("Using in-process store");
        Arc::new(MemoryConnector::new(Arc::new(MemoryStore::new())))
    } else {
        Arc::new(RespConnector::new(config.client_options()))
    };
    let service = Service::new(
        connector,
        ModuleDescriptor::new(&config.module.name, &config.module.title),
    );

    if config.backend.connect {
        let (host, port) = (&config.backend.host, config.backend.port);
        service
            .connection()
            .connect(host, port)
            .await
            .with_context(|| format!("failed to connect to store at {host}:{port}"))?;
    }

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        "Serving {} commands for module '{}' on http://{}",
        service.module().commands.len(),
        service.module().name,
        addr
    );

    axum::serve(listener, service.router())
        .with_graceful_shutdown(http::shutdown_signal())
        .await?;

    service.connection().disconnect().await;
    Ok(())
}
