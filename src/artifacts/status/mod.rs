//! Working tree inspection
//!
//! - `file_change`: how a path differs between HEAD, index and working tree
//! - `inspector`: the comparisons themselves

pub mod file_change;
pub mod inspector;
