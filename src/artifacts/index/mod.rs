//! Index file format
//!
//! The index (also called staging area or cache) records what the next
//! commit will contain.
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Each entry padded to 8-byte alignment
//!   - Contains metadata and path
//!
//! Checksum (20 or 32 bytes):
//!   - Digest of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Index file format version
pub const VERSION: u32 = 2;
