//! # docsync protocol
//!
//! Document model and replication wire types shared by every docsync crate.
//!
//! This crate provides:
//! - [`Document`] and its CouchDB JSON representation
//! - [`Revision`] tokens and [`Revisions`] ancestry
//! - Change feed, revision diff and conflict types used by the replicator
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod changes;
mod conflict;
mod document;
mod error;
mod revision;

pub use attachment::Attachment;
pub use changes::{Change, ChangesPage, Feed, RevsDiff, RevsDiffRequest, Sequence};
pub use conflict::{compare_leaves, ApplyOutcome, Conflict};
pub use document::{
    is_image_name_set, is_reserved_key, strip_reserved, Document, DocumentId, RawDocument,
    RevisionedDocument, Status, DEFAULT_CONTENT_TYPE, IMAGE_NAME_FIELD, PHOTO_ATTACHMENT,
    RESERVED_PREFIX, SUBMISSION_KIND,
};
pub use error::{ProtocolError, ProtocolResult};
pub use revision::{Revision, Revisions};
