//! Porcelain operations
//!
//! Workflows composed from the object store, references, index and working
//! tree:
//!
//! - `init`: create a repository
//! - `add`: stage and unstage paths
//! - `branch`: create, delete and list branches
//! - `checkout`: switch branches or detach `HEAD`
//! - `reset`: move a branch, optionally resetting index and working tree
//! - `rebase`: fast rebase onto another branch
//! - `clone`: copy a repository through a transport
//! - `remote`: fetch, push and list remote references

pub mod add;
pub mod branch;
pub mod checkout;
pub mod clone;
pub mod init;
pub mod rebase;
pub mod remote;
pub mod reset;
