//! Runs commands and turns every outcome into an [`Envelope`].

use crate::connection::ConnectionManager;
use crate::registry::{Invocation, Registry};
use futures_util::FutureExt;
use kvlink_core::{CommandError, Envelope, Request};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[derive(Clone)]
pub struct Dispatcher {
    connection: Arc<ConnectionManager>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(connection: Arc<ConnectionManager>, registry: Arc<Registry>) -> Self {
        Self { connection, registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Run the command named `name`. Never fails: errors and panics in the
    /// handler come back as failure envelopes.
    pub async fn dispatch(&self, name: &str, request: Request) -> Envelope {
        let Some(command) = self.registry.get(name) else {
            tracing::warn!("Unknown command {}", name);
            return CommandError::UnknownCommand(name.to_string()).into();
        };

        let invocation = Invocation::new(self.connection.clone(), request, command.sources);
        let outcome = AssertUnwindSafe((command.handler)(invocation))
            .catch_unwind()
            .await;

        let envelope = match outcome {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(err)) => err.into(),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!("Command {} panicked: {}", name, message);
                Envelope::failure(message)
            }
        };

        match &envelope {
            Envelope::Success { .. } => tracing::debug!("{} ok", name),
            Envelope::Failure { error, code } => tracing::warn!("{} failed ({}): {}", name, code, error),
        }
        envelope
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown error".to_string()
    }
}
