//! Tree-level diffing
//!
//! Compares two trees (or commits, peeled to their trees) and records
//! which blob paths were added, deleted or modified. Subtrees with equal ids
//! are skipped without being read.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }
}

pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
pub type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        prefix: &Path,
    ) -> crate::Result<()> {
        if old == new {
            return Ok(());
        }

        let old_tree_entries = self.inflate_oid_to_tree_entries(old)?;
        let new_tree_entries = self.inflate_oid_to_tree_entries(new)?;

        self.detect_deletions(&old_tree_entries, &new_tree_entries, prefix)?;
        self.detect_additions(&old_tree_entries, &new_tree_entries, prefix)?;

        Ok(())
    }

    fn inflate_oid_to_tree_entries(&self, oid: Option<&ObjectId>) -> crate::Result<TreeEntryMap> {
        match oid {
            None => Ok(BTreeMap::new()),
            Some(oid) => Ok(self.database.peel_to_tree(oid)?.into_entries().collect()),
        }
    }

    fn detect_deletions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> crate::Result<()> {
        for (name, entry) in old {
            let path = prefix.join(name);
            let other = new.get(name);

            if other == Some(entry) {
                continue;
            }

            let tree_a_oid = entry.is_tree().then_some(&entry.oid);
            let tree_b_oid = other.filter(|other| other.is_tree()).map(|other| &other.oid);

            self.compare_oids(tree_a_oid, tree_b_oid, &path)?;

            let blob_a = (!entry.is_tree()).then(|| entry.clone());
            let blob_b = other.filter(|other| !other.is_tree()).cloned();

            if let Some(change_type) = TreeChangeType::from_entries(blob_a, blob_b) {
                self.change_set.insert(path, change_type);
            }
        }

        Ok(())
    }

    fn detect_additions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        prefix: &Path,
    ) -> crate::Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            let path = prefix.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &path)?;
            } else {
                self.change_set
                    .insert(path, TreeChangeType::Added(entry.clone()));
            }
        }

        Ok(())
    }
}
