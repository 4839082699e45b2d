//! Index (staging area)
//!
//! The index tracks which files go into the next commit, with the stat
//! information needed to notice working-tree changes cheaply.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: Sorted list of tracked files with metadata
//! - Checksum: digest of everything before it
//!
//! ## Data Structures
//!
//! - `entries`: Maps file paths to their index entries
//! - `children`: Maps directory paths to their descendants so a file can
//!   replace a directory (and vice versa) in one step

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{ENTRY_BLOCK, EntryMetadata, IndexEntry, entry_min_size};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::HEADER_SIZE;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::error::BitError;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    algorithm: HashAlgorithm,
    /// Tracked files mapped by path
    entries: BTreeMap<Box<Path>, IndexEntry>,
    /// Directory hierarchy for parent-child lookups
    children: BTreeMap<Box<Path>, BTreeSet<Box<Path>>>,
    header: IndexHeader,
    /// Whether the in-memory state differs from what was loaded
    changed: bool,
}

impl Index {
    pub fn new(path: Box<Path>, algorithm: HashAlgorithm) -> Self {
        Index {
            path,
            algorithm,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = true;
    }

    /// Load the index from disk
    ///
    /// A missing or empty file is an empty index. Takes a shared lock on
    /// the file for the duration of the read and verifies the trailing
    /// checksum.
    pub fn load(&mut self) -> crate::Result<()> {
        self.clear();
        self.changed = false;

        let mut index_file = match std::fs::OpenOptions::new().read(true).open(self.path()) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock, self.algorithm);
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;
        reader.verify()?;

        debug!(path = %self.path.display(), entries = entries_count, "loaded index");
        Ok(())
    }

    /// Check if a path is tracked directly in the index
    ///
    /// True for file entries and for directories containing tracked files.
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }

    fn parse_header(&self, reader: &mut Checksum) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::parse(&header_bytes)?;

        Ok(header.entries_count)
    }

    /// Parse all entries from the index file
    ///
    /// Reads each entry, handling variable-length paths with 8-byte alignment.
    fn parse_entries(&mut self, entries_count: u32, reader: &mut Checksum) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(entry_min_size(self.algorithm))?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(std::io::Cursor::new(entry_bytes), self.algorithm)?;
            self.store_entry(&entry);
        }

        self.header.entries_count = entries_count;

        Ok(())
    }

    /// Remove entries that would clash with `entry`
    ///
    /// A file at one of the entry's parent directories goes away, and so does
    /// everything below the entry if it used to be a directory.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: &IndexEntry) {
        let entry_parents = entry
            .parent_dirs()
            .into_iter()
            .map(|parent| parent.to_owned().into_boxed_path())
            .collect::<BTreeSet<_>>();

        self.entries
            .insert(entry.name.clone().into_boxed_path(), entry.clone());

        for parent in entry_parents {
            self.children
                .entry(parent)
                .or_default()
                .insert(entry.name.clone().into_boxed_path());
        }
    }

    fn remove_children(&mut self, path_name: &Path) {
        if let Some(children) = self.children.remove(path_name) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path_name: &Path) {
        if let Some(entry) = self.entries.remove(path_name) {
            for parent in entry.parent_dirs() {
                if let Some(children) = self.children.get_mut(parent) {
                    children.remove(path_name);
                    if children.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
        }
    }

    /// Insert or replace the entry for its path
    pub fn add(&mut self, entry: IndexEntry) {
        self.discard_conflicts(&entry);
        self.store_entry(&entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    /// Remove a file entry or every entry under a directory
    pub fn remove(&mut self, path: &Path) {
        self.remove_entry(path);
        self.remove_children(path);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    /// Replace the whole content with a flattened tree
    ///
    /// Entries carry no stat data, so the next status check re-hashes them
    /// once unless `stat` can provide it.
    pub fn read_tree<F>(&mut self, entries: &BTreeMap<PathBuf, DatabaseEntry>, mut stat: F)
    where
        F: FnMut(&Path) -> Option<EntryMetadata>,
    {
        self.clear();

        for (path, entry) in entries {
            let metadata = stat(path)
                .filter(|metadata| metadata.mode == entry.mode)
                .unwrap_or_else(|| EntryMetadata {
                    mode: entry.mode,
                    ..Default::default()
                });
            self.store_entry(&IndexEntry::new(path.clone(), entry.oid.clone(), metadata));
        }

        self.header.entries_count = self.entries.len() as u32;
    }

    /// Persist the index
    ///
    /// The new content goes to `index.lock` and is renamed over the index,
    /// so readers see either the old or the new file. An existing lock file
    /// means another writer is active and fails with `Conflict`.
    pub fn save(&mut self) -> crate::Result<()> {
        let lock_path = self.lock_path();
        let mut lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BitError::conflict("index", "index is locked by another writer"));
            }
            Err(err) => return Err(err.into()),
        };

        let written = self
            .write_to(&mut lock_file)
            .and_then(|()| Ok(std::fs::rename(&lock_path, self.path())?));
        if let Err(err) = written {
            let _ = std::fs::remove_file(&lock_path);
            return Err(err);
        }
        self.changed = false;

        debug!(path = %self.path.display(), entries = self.entries.len(), "saved index");
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut lock_path = self.path.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }

    fn write_to(&mut self, file: &mut std::fs::File) -> crate::Result<()> {
        let lock = file_guard::lock(&mut *file, file_guard::Lock::Exclusive, 0, 1)?;
        let mut writer = Checksum::new(lock, self.algorithm);

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..self.header.clone()
        };
        writer.write(&self.header.serialize()?)?;

        // on disk, entries are ordered by the raw bytes of their path
        let mut entries = self.entries().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.name.as_os_str().as_bytes().cmp(b.name.as_os_str().as_bytes()));
        for entry in entries {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        drop(writer);

        Ok(file.sync_all()?)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}
