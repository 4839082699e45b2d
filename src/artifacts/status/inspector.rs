use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::error::Result;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(new)]
pub struct Inspector<'r> {
    workspace: &'r Workspace,
    algorithm: HashAlgorithm,
}

impl<'r> Inspector<'r> {
    /// Whether `path`, or anything below it, holds files the index does not know
    pub fn has_untracked(&self, path: &Path, index: &Index) -> Result<bool> {
        let stat = match self.workspace.stat_file(path) {
            Ok(stat) => stat,
            Err(err) if err.is_not_found() => return Ok(false),
            Err(err) => return Err(err),
        };

        if !stat.mode.is_tree() {
            return Ok(index.entry_by_path(path).is_none());
        }

        for child in self.workspace.list_directory(path)? {
            if self.has_untracked(&child, index)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn is_content_changed(&self, index_entry: &IndexEntry) -> Result<bool> {
        let blob = self.workspace.parse_blob(&index_entry.name)?;
        let oid = blob.object_id(self.algorithm)?;

        Ok(oid != index_entry.oid)
    }

    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) => Ok(WorkspaceChangeType::None),
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }

    /// Tracked paths whose working tree or staged content differs from HEAD
    ///
    /// Untracked files are not reported.
    pub fn dirty_paths(
        &self,
        index: &Index,
        head_tree: &BTreeMap<PathBuf, DatabaseEntry>,
    ) -> Result<Vec<PathBuf>> {
        let mut dirty = BTreeSet::new();

        for entry in index.entries() {
            let stat = match self.workspace.stat_file(&entry.name) {
                Ok(stat) => Some(stat),
                Err(err) if err.is_not_found() => None,
                Err(err) => return Err(err),
            };

            if self.check_index_against_workspace(Some(entry), stat.as_ref())?
                != WorkspaceChangeType::None
                || self.check_index_against_head_tree(Some(entry), head_tree.get(&entry.name))
                    != IndexChangeType::None
            {
                dirty.insert(entry.name.clone());
            }
        }

        for path in head_tree.keys() {
            if index.entry_by_path(path).is_none() {
                dirty.insert(path.clone());
            }
        }

        Ok(dirty.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::blob::Blob;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn track(workspace: &Workspace, index: &mut Index, name: &str) -> DatabaseEntry {
        let path = Path::new(name);
        let oid = workspace
            .parse_blob(path)
            .unwrap()
            .object_id(HashAlgorithm::Sha1)
            .unwrap();
        let stat = workspace.stat_file(path).unwrap();
        index.add(IndexEntry::new(path.to_path_buf(), oid.clone(), stat));

        DatabaseEntry::new(oid, EntryMode::File(FileMode::Regular))
    }

    #[rstest]
    fn detects_untracked_files_in_directories(temp_dir: TempDir) {
        temp_dir.child("dir/tracked.txt").write_str("t").unwrap();
        let workspace = Workspace::new(temp_dir.path().into());
        let inspector = Inspector::new(&workspace, HashAlgorithm::Sha1);
        let mut index = Index::new(temp_dir.path().join("index").into(), HashAlgorithm::Sha1);
        track(&workspace, &mut index, "dir/tracked.txt");

        assert!(!inspector.has_untracked(Path::new("dir"), &index).unwrap());

        temp_dir.child("dir/new.txt").write_str("n").unwrap();
        assert!(inspector.has_untracked(Path::new("dir"), &index).unwrap());
        assert!(!inspector.has_untracked(Path::new("missing"), &index).unwrap());
    }

    #[rstest]
    fn reports_modified_and_deleted_tracked_files(temp_dir: TempDir) {
        temp_dir.child("a.txt").write_str("one").unwrap();
        temp_dir.child("b.txt").write_str("two").unwrap();
        let workspace = Workspace::new(temp_dir.path().into());
        let inspector = Inspector::new(&workspace, HashAlgorithm::Sha1);
        let mut index = Index::new(temp_dir.path().join("index").into(), HashAlgorithm::Sha1);

        let head_tree = BTreeMap::from([
            (PathBuf::from("a.txt"), track(&workspace, &mut index, "a.txt")),
            (PathBuf::from("b.txt"), track(&workspace, &mut index, "b.txt")),
        ]);
        assert!(inspector.dirty_paths(&index, &head_tree).unwrap().is_empty());

        temp_dir.child("a.txt").write_str("changed").unwrap();
        std::fs::remove_file(temp_dir.child("b.txt").path()).unwrap();
        temp_dir.child("untracked.txt").write_str("u").unwrap();

        assert_eq!(
            inspector.dirty_paths(&index, &head_tree).unwrap(),
            vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
        );
    }

    #[rstest]
    fn staged_changes_count_as_dirty(temp_dir: TempDir) {
        temp_dir.child("a.txt").write_str("one").unwrap();
        let workspace = Workspace::new(temp_dir.path().into());
        let inspector = Inspector::new(&workspace, HashAlgorithm::Sha1);
        let mut index = Index::new(temp_dir.path().join("index").into(), HashAlgorithm::Sha1);
        track(&workspace, &mut index, "a.txt");

        let old_oid = Blob::from(&b"zero"[..]).object_id(HashAlgorithm::Sha1).unwrap();
        let head_tree = BTreeMap::from([(
            PathBuf::from("a.txt"),
            DatabaseEntry::new(old_oid, EntryMode::File(FileMode::Regular)),
        )]);

        assert_eq!(
            inspector.dirty_paths(&index, &head_tree).unwrap(),
            vec![PathBuf::from("a.txt")]
        );
    }
}
