//! Error types for repository operations.

use std::path::PathBuf;
use thiserror::Error;

/// Error type shared by every layer of the engine.
///
/// Variants map one-to-one onto the failure classes a caller has to tell
/// apart: missing data, corrupt data, lost races and refused rewrites.
#[derive(Error, Debug)]
pub enum BitError {
    /// Object, reference, path or configuration key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// On-disk bytes do not hash to the requested digest.
    #[error("corrupt object {oid}: {reason}")]
    Corrupt {
        /// The requested object id
        oid: String,
        /// Description of the mismatch
        reason: String,
    },

    /// Data received from a transport failed verification.
    #[error("object integrity error for {oid}: {reason}")]
    ObjectIntegrity {
        /// The advertised object id
        oid: String,
        /// Description of the mismatch
        reason: String,
    },

    /// A compare-and-swap on a reference lost the race.
    #[error("conflict updating {name}: {reason}")]
    Conflict {
        /// The reference being updated
        name: String,
        /// What the store observed
        reason: String,
    },

    /// A symbolic reference points at a name with no entry.
    #[error("dangling reference {name} -> {target}")]
    DanglingReference {
        /// The reference that was being resolved
        name: String,
        /// The missing target
        target: String,
    },

    /// Following symbolic references came back to an already visited name.
    #[error("reference cycle detected: {}", chain.join(" -> "))]
    ReferenceCycle {
        /// The names visited, ending with the repeated one
        chain: Vec<String>,
    },

    /// Checkout would overwrite or remove local changes.
    #[error("local changes would be overwritten: {}", display_paths(paths))]
    DirtyWorkingTree {
        /// Paths holding uncommitted modifications
        paths: Vec<PathBuf>,
    },

    /// A replayed change touches a path the target branch also changed.
    #[error("rebase conflict on {}", path.display())]
    RebaseConflict {
        /// The first offending path
        path: PathBuf,
    },

    /// A named entry already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Branch, reference or path name rejected by the naming rules.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Operation needs a working tree but the repository is bare.
    #[error("operation not supported in a bare repository: {0}")]
    BareRepository(String),

    /// Object exists but is not of the requested kind.
    #[error("object {oid} is a {found}, expected a {expected}")]
    WrongObjectType {
        /// The object id
        oid: String,
        /// The requested kind
        expected: String,
        /// The kind found on disk
        found: String,
    },

    /// Network or authentication failure reported by a transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// Working tree or repository file access failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed on-disk or in-memory data.
    #[error(transparent)]
    Malformed(#[from] anyhow::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl BitError {
    /// Build a [`BitError::Conflict`] for the given reference.
    pub fn conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BitError::Conflict {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, BitError::Conflict { .. })
    }

    /// Whether the error reports a missing entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BitError::NotFound(_))
    }
}

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, BitError>;
