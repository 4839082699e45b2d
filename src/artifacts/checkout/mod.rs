//! Checkout planning
//!
//! Switching the working tree between commits: the tree diff is turned into
//! a plan of file operations, every conflict with local modifications is
//! collected before anything is written, then the workspace and the index
//! are updated together.

pub mod conflict;
pub mod migration;
