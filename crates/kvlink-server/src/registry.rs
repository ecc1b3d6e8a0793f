//! Command table.

use crate::connection::ConnectionManager;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use kvlink_client::Store;
use kvlink_core::{CommandDescriptor, CommandError, Envelope, ModuleDescriptor, Params, Request, Route, Source};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Everything a handler gets for one call.
pub struct Invocation {
    connection: Arc<ConnectionManager>,
    request: Request,
    sources: &'static [Source],
}

impl Invocation {
    pub fn new(connection: Arc<ConnectionManager>, request: Request, sources: &'static [Source]) -> Self {
        Self {
            connection,
            request,
            sources,
        }
    }

    /// Parameters, read only from the sources the command declared.
    pub fn params(&self) -> Params<'_> {
        self.request.view(self.sources)
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// The connected store, or `NotConnected`.
    pub async fn store(&self) -> Result<Arc<dyn Store>, CommandError> {
        self.connection.ensure_connected().await
    }
}

pub type Handler = Arc<dyn Fn(Invocation) -> BoxFuture<'static, Result<Envelope, CommandError>> + Send + Sync>;

/// Wrap an async function as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Envelope, CommandError>> + Send + 'static,
{
    Arc::new(move |invocation| f(invocation).boxed())
}

#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub route: Route,
    pub sources: &'static [Source],
    pub descriptor: CommandDescriptor,
    pub handler: Handler,
}

impl Command {
    pub fn new(name: impl Into<String>, route: Route, handler: Handler) -> Self {
        let name = name.into();
        let descriptor = CommandDescriptor::new(name.clone(), "any", &route);
        Self {
            name,
            route,
            sources: &[],
            descriptor,
            handler,
        }
    }

    /// Where the handler looks for its parameters.
    pub fn reads(mut self, sources: &'static [Source]) -> Self {
        self.sources = sources;
        self
    }

    pub fn describe<I, S>(mut self, title: &str, returns: &str, syntax: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor = CommandDescriptor::new(title, returns, &self.route).syntax(syntax);
        self
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

/// Commands by name, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. A later registration under the same name wins.
    pub fn register(&mut self, command: Command) {
        match self.index.get(&command.name) {
            Some(&slot) => {
                tracing::warn!("Command {} registered twice, replacing", command.name);
                self.commands[slot] = command;
            }
            None => {
                self.index.insert(command.name.clone(), self.commands.len());
                self.commands.push(command);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.index.get(name).map(|&slot| &self.commands[slot])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Publish every descriptor into the host module.
    pub fn publish(&self, module: &mut ModuleDescriptor) {
        for command in &self.commands {
            module.insert(command.name.clone(), command.descriptor.clone());
        }
    }
}
