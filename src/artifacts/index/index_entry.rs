//! Index entry representation
//!
//! Each entry in the index represents a tracked file with:
//! - File path
//! - Content hash (object ID)
//! - File metadata (mode, size, timestamps, stage)
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment. Metadata
//! includes both file status (mode, size) and timestamps (mtime, ctime)
//! which enable fast change detection without reading file content.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::BufRead;
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

/// Largest name length representable in the flags field
const MAX_PATH_SIZE: usize = 0xfff;

/// Bits of the flags field holding the merge stage
const STAGE_MASK: u32 = 0x3000;
const STAGE_SHIFT: u32 = 12;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Size of the fixed part of an entry: ten stat words, the digest and the flags
pub fn entry_fixed_size(algorithm: HashAlgorithm) -> usize {
    40 + algorithm.digest_len() + 2
}

/// Smallest padded entry: fixed part plus one NUL, rounded up to a block
pub fn entry_min_size(algorithm: HashAlgorithm) -> usize {
    (entry_fixed_size(algorithm) + 1).div_ceil(ENTRY_BLOCK) * ENTRY_BLOCK
}

/// Index entry representing a tracked file
#[derive(Debug, Clone, Default, new)]
pub struct IndexEntry {
    /// File path relative to repository root
    pub name: PathBuf,
    /// Digest of the staged blob
    pub oid: ObjectId,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))
    }

    /// Every proper ancestor directory, outermost first
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = self
            .name
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        dirs.reverse();

        dirs
    }

    /// Merge stage: 0 for normal entries, 1-3 while a conflict is recorded
    pub fn stage(&self) -> u8 {
        ((self.metadata.flags & STAGE_MASK) >> STAGE_SHIFT) as u8
    }

    pub fn to_database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid.clone(), self.metadata.mode)
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// File metadata stored in index entries
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
///
/// Both include nanosecond precision for accurate change detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    /// Name length in the low 12 bits, merge stage in bits 12-13
    pub flags: u32,
}

impl EntryMetadata {
    pub fn with_stage(mut self, stage: u8) -> Self {
        self.flags = (self.flags & !STAGE_MASK) | ((u32::from(stage) << STAGE_SHIFT) & STAGE_MASK);
        self
    }
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let entry_name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid entry name"))?;
        let flags = (self.metadata.flags & STAGE_MASK) | min(entry_name.len(), MAX_PATH_SIZE) as u32;

        let mut entry_bytes = Vec::new();
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size as u32)?;
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(flags as u16)?;
        entry_bytes.extend_from_slice(entry_name.as_bytes());

        // There must be at least one NUL, then pad to the block size
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(mut reader: impl BufRead, algorithm: HashAlgorithm) -> anyhow::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.len() < entry_min_size(algorithm) {
            return Err(anyhow::anyhow!("Invalid index entry size"));
        }

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]) as i64;
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]) as i64;
        let mtime = byteorder::NetworkEndian::read_u32(&bytes[8..12]) as i64;
        let mtime_nsec = byteorder::NetworkEndian::read_u32(&bytes[12..16]) as i64;
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]) as u64;
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]) as u64;
        let mode = EntryMode::try_from(byteorder::NetworkEndian::read_u32(&bytes[24..28]))?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]) as u64;

        let oid_end = 40 + algorithm.digest_len();
        let oid = ObjectId::from_raw(&bytes[40..oid_end]);
        let flags = byteorder::NetworkEndian::read_u16(&bytes[oid_end..oid_end + 2]) as u32;

        let name_start = oid_end + 2;
        let name_end = bytes[name_start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow::anyhow!("Missing null terminator in entry name"))?;
        let name = std::str::from_utf8(&bytes[name_start..name_start + name_end])
            .map_err(|_| anyhow::anyhow!("Invalid UTF-8 in entry name"))?;

        Ok(IndexEntry {
            name: PathBuf::from(name),
            oid,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
                flags,
            },
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.is_dir() {
            EntryMode::Directory
        } else if metadata.file_type().is_symlink() {
            EntryMode::File(FileMode::Symlink)
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };
        let file_path = file_path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid file path"))?;

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
            flags: min(file_path.len(), MAX_PATH_SIZE) as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use std::io::Cursor;

    #[fixture]
    fn oid() -> ObjectId {
        HashAlgorithm::Sha1.digest(b"test data")
    }

    #[fixture]
    fn entry_metadata() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::File(FileMode::Executable),
            size: 9,
            mtime: 1_700_000_000,
            ..Default::default()
        }
    }

    #[rstest]
    fn test_entry_parent_dirs(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), oid, entry_metadata);

        assert_eq!(entry.parent_dirs(), vec![Path::new("a"), Path::new("a/b")]);
    }

    #[rstest]
    fn test_entry_parent_dirs_root(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a"), oid, entry_metadata);

        assert_eq!(entry.parent_dirs(), Vec::<&Path>::new());
    }

    #[rstest]
    fn test_entry_basename(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("a/b/c"), oid, entry_metadata);

        assert_eq!(entry.basename().unwrap(), "c");
    }

    #[rstest]
    #[case("a", 64)]
    #[case("README.md", 72)]
    #[case("a-name-long-enough-to-need-another-block", 104)]
    fn entries_are_padded_to_blocks(
        oid: ObjectId,
        entry_metadata: EntryMetadata,
        #[case] name: &str,
        #[case] expected_len: usize,
    ) {
        let entry = IndexEntry::new(PathBuf::from(name), oid, entry_metadata);
        let bytes = entry.serialize().unwrap();

        assert_eq!(bytes.len(), expected_len);
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);
    }

    #[rstest]
    fn stage_survives_serialization(oid: ObjectId, entry_metadata: EntryMetadata) {
        let entry = IndexEntry::new(PathBuf::from("conflicted"), oid, entry_metadata.with_stage(2));
        let bytes = entry.serialize().unwrap();

        let parsed = IndexEntry::deserialize(Cursor::new(bytes.to_vec()), HashAlgorithm::Sha1).unwrap();
        assert_eq!(parsed.stage(), 2);
        assert_eq!(parsed.oid, entry.oid);
        assert_eq!(parsed.metadata.mode, EntryMode::File(FileMode::Executable));
        assert_eq!(parsed.metadata.flags & 0xfff, "conflicted".len() as u32);
    }

    #[test]
    fn sha256_entries_have_a_larger_minimum() {
        assert_eq!(entry_min_size(HashAlgorithm::Sha1), 64);
        assert_eq!(entry_min_size(HashAlgorithm::Sha256), 80);
    }
}
