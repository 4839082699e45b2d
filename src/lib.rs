//! A version-control object engine compatible with git's on-disk format
//!
//! The crate manages a content-addressable object store, the staging index,
//! references, and the history operations built on them: commit creation,
//! branching, checkout, reset, fast rebase, clone, fetch and push.
//!
//! ## Layout
//!
//! - [`areas`]: the stateful parts of a repository (object database, index,
//!   references, working tree, configuration) and the [`Repository`] handle
//! - [`artifacts`]: data types and algorithms (objects, tree diffs, revision
//!   walks, merge bases, checkout planning, transports)
//! - [`commands`]: the operations, as `impl Repository` blocks
//!
//! ## Concurrency
//!
//! Reference updates are compare-and-swap operations backed by lock files,
//! so concurrent writers (threads or processes) never lose an update: the
//! loser gets [`BitError::Conflict`]. Object writes are idempotent. Multi-step
//! operations write every object before moving any reference.
//!
//! ## Logging
//!
//! Operations emit `tracing` events; installing a subscriber is up to the
//! caller.

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod error;

pub use areas::refs::{Expected, RefTarget, Reference, ReferenceKind};
pub use areas::repository::{Repository, RepositoryState};
pub use artifacts::branch::branch_name::{BranchName, RefName};
pub use artifacts::log::rev_walk::{RevWalk, Sort};
pub use artifacts::objects::hash_algorithm::HashAlgorithm;
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::objects::signature::Signature;
pub use artifacts::rebase::{RebaseOutcome, RebaseState};
pub use artifacts::transport::credentials::{CredentialProvider, Credentials};
pub use artifacts::transport::{FetchOptions, Transport};
pub use commands::porcelain::checkout::CheckoutOptions;
pub use commands::porcelain::clone::CloneOptions;
pub use commands::porcelain::init::InitOptions;
pub use commands::porcelain::reset::ResetMode;
pub use error::{BitError, Result};
