//! Core types for kvlink.
//!
//! This crate holds the pieces every command shares: the value codec that
//! lets a string-only store carry JSON, the success/failure envelope, the
//! request parameter view and the descriptors published to the host. It
//! knows nothing about the backend or the transport.

pub mod codec;
mod descriptor;
mod envelope;
mod error;
mod request;

pub use descriptor::{CommandDescriptor, Endpoint, Method, ModuleDescriptor, Route};
pub use envelope::{Envelope, Status, WireEnvelope};
pub use error::{CommandError, DEFAULT_STATUS, PRECONDITION_FAILED};
pub use request::{Params, Request, Source};
