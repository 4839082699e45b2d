//! Object model
//!
//! All content is stored as immutable objects addressed by the digest of
//! their canonical serialization:
//!
//! - **Blob**: File content (raw bytes)
//! - **Tree**: Directory listing (names, modes, and object IDs)
//! - **Commit**: Snapshot with metadata (author, message, parent commits, tree)
//!
//! Every object serializes to `<type> <size>\0<content>`.

pub mod blob;
pub mod commit;
pub mod hash_algorithm;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod signature;
pub mod tree;
pub mod tree_builder;

/// Length of an abbreviated object id
pub const SHORT_OID_LENGTH: usize = 7;
