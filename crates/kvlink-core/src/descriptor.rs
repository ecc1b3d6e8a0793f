//! Command metadata published to the host.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP verb of a route or endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the transport mounts a command, e.g. `GET /get/{key}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: Method,
    pub path: String,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// The endpoint as the host addresses it: no leading slash.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            endpoint: self.path.trim_start_matches('/').to_string(),
            method: self.method,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// How the host reaches a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub endpoint: String,
    pub method: Method,
}

/// Static description of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Human-readable title.
    pub title: String,
    /// Return type tag, e.g. `ui.message` or `number[numbers.integer]`.
    pub returns: String,
    /// Natural-language syntax templates, any of which invokes the command.
    pub syntax: Vec<String>,
    pub handler: Endpoint,
}

impl CommandDescriptor {
    pub fn new(title: impl Into<String>, returns: impl Into<String>, route: &Route) -> Self {
        Self {
            title: title.into(),
            returns: returns.into(),
            syntax: Vec::new(),
            handler: route.endpoint(),
        }
    }

    pub fn syntax<I, S>(mut self, templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.syntax.extend(templates.into_iter().map(Into::into));
        self
    }
}

/// The host module a command table is published into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub commands: BTreeMap<String, CommandDescriptor>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            commands: BTreeMap::new(),
        }
    }

    /// Add or replace a command. Returns the replaced descriptor, if any.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        descriptor: CommandDescriptor,
    ) -> Option<CommandDescriptor> {
        self.commands.insert(name.into(), descriptor)
    }
}
