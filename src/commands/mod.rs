//! Repository operations
//!
//! Operations are `impl Repository` blocks, split the way git splits its
//! commands:
//!
//! - `plumbing`: object and commit level building blocks (write-tree,
//!   commit creation, object access)
//! - `porcelain`: user-facing workflows (add, checkout, reset, rebase,
//!   clone, fetch, push)

pub mod plumbing;
pub mod porcelain;
