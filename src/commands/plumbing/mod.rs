//! Plumbing operations
//!
//! Direct access to objects and commits, the building blocks the porcelain
//! operations compose:
//!
//! - `object`: read and write raw objects, list trees
//! - `write_commit`: write the index as a tree, create commits with a
//!   compare-and-swap on the updated reference

pub mod object;
pub mod write_commit;
