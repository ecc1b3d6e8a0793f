//! Request parameters.
//!
//! A [`Request`] carries everything the transport extracted: path segments,
//! the query string and the JSON body. Handlers never look at those maps
//! directly; they read through a [`Params`] view restricted to the sources
//! they declare, in the order they declare them.

use crate::codec;
use crate::error::CommandError;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Where a parameter may come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Path,
    Query,
    Body,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Path => "path",
            Source::Query => "query",
            Source::Body => "body",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    path: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Map<String, Value>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        path: HashMap<String, String>,
        query: HashMap<String, String>,
        body: Map<String, Value>,
    ) -> Self {
        Self { path, query, body }
    }

    pub fn with_path(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(name.into(), value.into());
        self
    }

    /// A view over the given sources, searched in order.
    pub fn view<'a>(&'a self, sources: &'a [Source]) -> Params<'a> {
        Params {
            request: self,
            sources,
        }
    }

    fn lookup(&self, source: Source, name: &str) -> Option<Lookup<'_>> {
        match source {
            Source::Path => self.path.get(name).map(Lookup::Text),
            Source::Query => self.query.get(name).map(Lookup::Text),
            Source::Body => match self.body.get(name) {
                None | Some(Value::Null) => None,
                Some(value) => Some(Lookup::Json(value)),
            },
        }
    }
}

#[derive(Clone, Copy)]
enum Lookup<'a> {
    Text(&'a String),
    Json(&'a Value),
}

/// Read-only parameter access for one handler.
#[derive(Debug, Clone, Copy)]
pub struct Params<'a> {
    request: &'a Request,
    sources: &'a [Source],
}

impl<'a> Params<'a> {
    pub fn has(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// The parameter as text. Non-string body values are encoded.
    pub fn data(&self, name: &str) -> Option<String> {
        self.find(name).map(|found| match found {
            Lookup::Text(s) => s.clone(),
            Lookup::Json(value) => codec::encode(value),
        })
    }

    /// The parameter as a JSON value. Path and query values are strings.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.find(name).map(|found| match found {
            Lookup::Text(s) => Value::String(s.clone()),
            Lookup::Json(value) => value.clone(),
        })
    }

    pub fn require(&self, name: &str) -> Result<String, CommandError> {
        self.data(name)
            .ok_or_else(|| CommandError::missing(format!("'{name}'"), self.location()))
    }

    pub fn require_value(&self, name: &str) -> Result<Value, CommandError> {
        self.value(name)
            .ok_or_else(|| CommandError::missing(format!("'{name}'"), self.location()))
    }

    /// A list given either as one `singular` value or a comma separated
    /// `plural` value. The singular key wins when both are present.
    pub fn list(&self, singular: &str, plural: &str) -> Result<Vec<String>, CommandError> {
        if let Some(one) = self.data(singular).filter(|s| !s.is_empty()) {
            return Ok(vec![one]);
        }

        match self.find(plural) {
            Some(Lookup::Json(Value::Array(items))) if !items.is_empty() => {
                Ok(items.iter().map(codec::encode).collect())
            }
            Some(Lookup::Json(Value::String(s))) | Some(Lookup::Text(s)) if !s.is_empty() => {
                Ok(s.split(',').map(str::to_string).collect())
            }
            _ => Err(CommandError::missing(
                format!("'{singular}' or '{plural}'"),
                self.location(),
            )),
        }
    }

    /// A required integer parameter. Unparseable input is an error, never zero.
    pub fn integer(&self, name: &str) -> Result<i64, CommandError> {
        let found = self
            .find(name)
            .ok_or_else(|| CommandError::missing(format!("'{name}'"), self.location()))?;

        let parsed = match found {
            Lookup::Json(Value::Number(n)) => n.as_i64(),
            Lookup::Json(Value::String(s)) | Lookup::Text(s) => s.trim().parse().ok(),
            Lookup::Json(_) => None,
        };

        parsed.ok_or_else(|| {
            let shown = match found {
                Lookup::Text(s) => s.clone(),
                Lookup::Json(v) => codec::encode(v),
            };
            CommandError::invalid(name, format!("expected an integer, got '{shown}'"))
        })
    }

    fn find(&self, name: &str) -> Option<Lookup<'a>> {
        self.sources
            .iter()
            .find_map(|source| self.request.lookup(*source, name))
    }

    fn location(&self) -> String {
        let names: Vec<&str> = self.sources.iter().map(|s| s.as_str()).collect();
        names.join(" or ")
    }
}
