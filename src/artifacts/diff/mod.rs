//! Tree comparison

pub mod tree_diff;
