//! Backend access for kvlink.
//!
//! The server only talks to the store through the [`Store`] trait and opens
//! it through a [`Connector`]. Two implementations ship here: a RESP client
//! that pipelines requests over one TCP connection, and an in-process
//! [`MemoryStore`].

mod client;
mod error;
mod memory;
pub mod resp;
mod store;

pub use client::{ClientOptions, RespClient, RespConnector};
pub use error::{ClientError, Result};
pub use memory::{MemoryConnector, MemoryStore};
pub use store::{Connector, Store};
