//! Tree object
//!
//! Trees represent directory snapshots. They map entry names to the
//! blobs and subtrees they contain, along with their modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<octal-mode> <name>\0<raw-digest>`
//!
//! Entries are written in git's canonical order: raw byte order of the
//! names, with subtree names compared as if they ended in `/`.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::BufRead;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    /// Entries keyed by their name (a single path segment)
    entries: BTreeMap<String, DatabaseEntry>,
}

impl Tree {
    pub fn new(entries: BTreeMap<String, DatabaseEntry>) -> Self {
        Tree { entries }
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: DatabaseEntry) -> Option<DatabaseEntry> {
        self.entries.insert(name.into(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.entries.into_iter()
    }

    /// Entries in serialization order
    pub fn canonical_entries(&self) -> Vec<(&String, &DatabaseEntry)> {
        let mut entries = self.entries.iter().collect::<Vec<_>>();
        entries.sort_by(|(a_name, a), (b_name, b)| {
            Self::sort_key(a_name, a).cmp(&Self::sort_key(b_name, b))
        });
        entries
    }

    fn sort_key<'n>(name: &'n str, entry: &DatabaseEntry) -> Cow<'n, [u8]> {
        if entry.is_tree() {
            let mut key = name.as_bytes().to_vec();
            key.push(b'/');
            Cow::Owned(key)
        } else {
            Cow::Borrowed(name.as_bytes())
        }
    }

    fn validate_name(name: &str) -> anyhow::Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            anyhow::bail!("Invalid tree entry name {name:?}");
        }

        Ok(())
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();

        for (name, entry) in self.canonical_entries() {
            Self::validate_name(name)?;

            content.extend_from_slice(format!("{} {}", entry.mode.as_str(), name).as_bytes());
            content.push(0);
            entry.oid.write_raw_to(&mut content)?;
        }

        let mut tree_bytes = self.object_type().header(content.len()).into_bytes();
        tree_bytes.extend_from_slice(&content);

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead, algorithm: HashAlgorithm) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            // Read "mode " (space-delimited)
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                anyhow::bail!("unexpected EOF in mode");
            }

            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            // Read "name\0"
            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                anyhow::bail!("unexpected EOF in name");
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();
            Self::validate_name(&name)?;

            let oid = ObjectId::read_raw_from(&mut reader, algorithm.digest_len())
                .context("unexpected EOF in object id")?;

            if entries.insert(name.clone(), DatabaseEntry::new(oid, mode)).is_some() {
                anyhow::bail!("duplicate tree entry {name:?}");
            }
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}
