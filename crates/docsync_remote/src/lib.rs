//! # docsync remote
//!
//! Client side of a remote CouchDB-compatible document database.
//!
//! - [`RemoteStore`] extends the replication trait with the document and
//!   attachment CRUD the server jobs need
//! - [`HttpRemote`] talks to a real server with `reqwest`
//! - [`MemoryRemote`] keeps everything in memory and can inject failures
//!
//! Errors are classified so callers can tell transient failures
//! ([`RemoteError::is_retryable`]) from authorization rejection
//! ([`RemoteError::is_auth`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod memory;
mod store;

pub use config::RemoteConfig;
pub use error::{RemoteError, RemoteResult};
pub use http::HttpRemote;
pub use memory::MemoryRemote;
pub use store::{AttachmentStream, RemoteStore};
