//! Core repository components
//!
//! - `config`: git-style INI configuration
//! - `database`: object database for storing blobs, trees, and commits
//! - `index`: staging area (index/cache) for tracking file changes
//! - `refs`: reference management (branches, HEAD, tags)
//! - `repository`: the handle tying the other areas together
//! - `workspace`: working directory file system operations

pub mod config;
pub mod database;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
