//! # docsync testkit
//!
//! Shared helpers for docsync tests:
//! - Fixtures: paired local and in-memory remote stores, seeded documents,
//!   small image payloads
//! - Property-based generators for field maps and edit scripts
//! - Async helpers for waiting on eventually-true conditions

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::wait::*;
}

pub use fixtures::*;
pub use generators::*;
pub use wait::*;
