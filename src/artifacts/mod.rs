//! Git data structures and algorithms
//!
//! - `branch`: reference names and revision expressions
//! - `checkout`: working tree migrations and conflict detection
//! - `database`: tree entry types
//! - `diff`: tree comparison
//! - `index`: index file format
//! - `log`: commit graph traversal
//! - `merge`: best common ancestor search
//! - `objects`: object types (blob, tree, commit) and hashing
//! - `rebase`: fast rebase replay
//! - `status`: working tree inspection
//! - `transport`: moving objects and references between repositories

pub mod branch;
pub mod checkout;
pub mod database;
pub mod diff;
pub mod index;
pub mod log;
pub mod merge;
pub mod objects;
pub mod rebase;
pub mod status;
pub mod transport;
