//! Commit history traversal
//!
//! - `rev_walk`: walks commit ancestry with time, topological and reversed
//!   orderings, ranges and hidden commits

pub mod rev_walk;
