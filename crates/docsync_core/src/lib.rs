//! # docsync core
//!
//! The embedded local document store and the replication surface it shares
//! with remote stores.
//!
//! - [`LocalStore`] keeps per-document revision leaves, a change feed with
//!   long-poll support and replication checkpoints, persisted to a
//!   `docsync_storage` journal
//! - [`DocumentStore`] is the four-call replication trait implemented by both
//!   local and remote stores
//! - [`Submissions`] is the application API for submission documents

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod local;
mod store;
mod submissions;
mod tree;

pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use local::LocalStore;
pub use store::DocumentStore;
pub use submissions::{Blob, Submissions};
