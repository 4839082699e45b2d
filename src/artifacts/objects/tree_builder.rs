//! Nested tree construction from flat path listings
//!
//! The index and the rebase replayer both hold flat `path -> entry` maps.
//! `TreeBuilder` regroups them by directory and writes the resulting trees
//! bottom-up, since a parent tree needs its children's ids.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::Tree;
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Component, Path};

#[derive(Debug, Clone)]
enum TreeNode {
    Leaf(DatabaseEntry),
    Directory(TreeBuilder),
}

#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    children: BTreeMap<String, TreeNode>,
}

impl TreeBuilder {
    /// Group a flat listing into nested directories
    pub fn build<'e, P>(entries: impl IntoIterator<Item = (P, &'e DatabaseEntry)>) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut root = Self::default();

        for (path, entry) in entries {
            let segments = Self::segments(path.as_ref())?;
            root.add_entry(&segments, entry.clone())?;
        }

        Ok(root)
    }

    fn segments(path: &Path) -> anyhow::Result<Vec<String>> {
        path.components()
            .map(|component| match component {
                Component::Normal(segment) => segment
                    .to_str()
                    .map(str::to_string)
                    .with_context(|| format!("Non UTF-8 path {}", path.display())),
                _ => Err(anyhow::anyhow!("Invalid path {}", path.display())),
            })
            .collect()
    }

    fn add_entry(&mut self, segments: &[String], entry: DatabaseEntry) -> anyhow::Result<()> {
        match segments {
            [] => anyhow::bail!("Empty path"),
            [name] => {
                self.children.insert(name.clone(), TreeNode::Leaf(entry));
            }
            [parent, rest @ ..] => {
                let node = self
                    .children
                    .entry(parent.clone())
                    .or_insert_with(|| TreeNode::Directory(Self::default()));

                match node {
                    TreeNode::Directory(tree) => tree.add_entry(rest, entry)?,
                    TreeNode::Leaf(_) => {
                        anyhow::bail!("{parent} is both a file and a directory")
                    }
                }
            }
        }

        Ok(())
    }

    /// Write every tree depth-first, children before parents
    ///
    /// `store` receives each finished tree and returns its id; the id of
    /// the root tree is returned.
    pub fn traverse<F>(&self, store: &mut F) -> crate::Result<ObjectId>
    where
        F: FnMut(&Tree) -> crate::Result<ObjectId>,
    {
        let mut tree = Tree::default();

        for (name, node) in &self.children {
            let entry = match node {
                TreeNode::Leaf(entry) => entry.clone(),
                TreeNode::Directory(subtree) => {
                    DatabaseEntry::new(subtree.traverse(store)?, EntryMode::Directory)
                }
            };
            tree.insert(name.clone(), entry);
        }

        store(&tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
    use crate::artifacts::objects::object::Object;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn entry(oid: &str) -> DatabaseEntry {
        DatabaseEntry::new(
            ObjectId::try_parse(oid).unwrap(),
            EntryMode::File(FileMode::Regular),
        )
    }

    #[test]
    fn writes_subtrees_before_their_parent() {
        let a = entry("3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        let b = entry("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let listing = vec![(PathBuf::from("a.txt"), &a), (PathBuf::from("lib/nested/b.txt"), &b)];

        let builder = TreeBuilder::build(listing).unwrap();
        let mut written = Vec::new();
        let root = builder
            .traverse(&mut |tree: &Tree| -> crate::Result<ObjectId> {
                let oid = tree.object_id(HashAlgorithm::Sha1)?;
                written.push((oid.clone(), tree.clone()));
                Ok(oid)
            })
            .unwrap();

        assert_eq!(written.len(), 3);
        assert_eq!(written.last().unwrap().0, root);

        let root_tree = &written[2].1;
        assert_eq!(root_tree.get("lib").unwrap().oid, written[1].0);
        assert_eq!(written[1].1.get("nested").unwrap().oid, written[0].0);
    }

    #[test]
    fn refuses_a_file_used_as_a_directory() {
        let a = entry("3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        let listing = vec![(PathBuf::from("a"), &a), (PathBuf::from("a/b"), &a)];

        assert!(TreeBuilder::build(listing).is_err());
    }
}
