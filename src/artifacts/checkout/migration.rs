//! Checkout migration and conflict detection
//!
//! Moving the working tree and index from one tree to another:
//!
//! 1. Compute the diff between current and target trees
//! 2. Detect conflicts with local changes
//! 3. Plan file system operations (create, delete, modify)
//! 4. Apply changes to workspace and index
//!
//! ## Conflict Detection
//!
//! - Stale files: working tree or index differs from both trees
//! - Stale directories: a directory with untracked files is in the way
//! - Untracked overwrites: checkout would overwrite an untracked file
//! - Untracked removals: checkout would remove an untracked file
//!
//! Every conflict is collected before the first file is touched.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::workspace::Workspace;
use crate::artifacts::checkout::conflict::ConflictType;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeChangeType;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use crate::error::{BitError, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Type of file system action required for checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Create new file
    Add,
    /// Delete file
    Delete,
    /// Modify existing file
    Modify,
}

/// Planned actions grouped by type
pub type ActionsSet = HashMap<ActionType, Vec<(PathBuf, Option<DatabaseEntry>)>>;

/// Detected conflicts grouped by type
pub type ConflictsSet = BTreeMap<ConflictType, BTreeSet<PathBuf>>;

/// Checkout migration planner and executor
pub struct Migration<'r> {
    database: &'r Database,
    workspace: &'r Workspace,
    index: &'r mut Index,
    inspector: Inspector<'r>,
    changes: BTreeMap<PathBuf, TreeChangeType>,
    actions: ActionsSet,
    conflicts: ConflictsSet,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(
        database: &'r Database,
        workspace: &'r Workspace,
        index: &'r mut Index,
        changes: BTreeMap<PathBuf, TreeChangeType>,
    ) -> Self {
        let actions = HashMap::from([
            (ActionType::Add, Vec::new()),
            (ActionType::Delete, Vec::new()),
            (ActionType::Modify, Vec::new()),
        ]);

        Self {
            database,
            workspace,
            index,
            inspector: Inspector::new(workspace, database.algorithm()),
            changes,
            actions,
            conflicts: BTreeMap::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    pub fn actions(&self, action_type: ActionType) -> &[(PathBuf, Option<DatabaseEntry>)] {
        self.actions
            .get(&action_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    /// Plan, check and apply the migration
    ///
    /// With `force`, local changes are overwritten instead of reported.
    pub fn apply_changes(&mut self, force: bool) -> Result<()> {
        self.plan_changes(force)?;
        self.workspace.apply_migration(self)?;
        self.update_index()?;

        debug!(
            added = self.actions(ActionType::Add).len(),
            modified = self.actions(ActionType::Modify).len(),
            deleted = self.actions(ActionType::Delete).len(),
            "applied checkout migration"
        );
        Ok(())
    }

    fn plan_changes(&mut self, force: bool) -> Result<()> {
        let changes = std::mem::take(&mut self.changes);

        for (path, change) in &changes {
            if !force {
                self.check_for_conflict(path, change)?;
            }
            self.record_change(path, change);
        }

        self.changes = changes;

        if self.conflicts.is_empty() {
            return Ok(());
        }

        for (conflict_type, paths) in &self.conflicts {
            warn!(
                conflict = conflict_type.description(),
                paths = paths.len(),
                "checkout aborted"
            );
        }

        let paths = self
            .conflicts
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Err(BitError::DirtyWorkingTree { paths })
    }

    fn add_conflict(&mut self, conflict_type: ConflictType, path: &Path) {
        self.conflicts
            .entry(conflict_type)
            .or_default()
            .insert(path.to_path_buf());
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> Result<()> {
        let entry = self.index.entry_by_path(path).cloned();
        let entry = entry.as_ref();
        let old_entry = change.old_entry();
        let new_entry = change.new_entry();

        if self.index_differs_from_trees(entry, old_entry, new_entry) {
            self.add_conflict(ConflictType::StaleFile, path);
            return Ok(());
        }

        let stat = match self.workspace.stat_file(path) {
            Ok(stat) => Some(stat),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err),
        };
        let conflict_type = ConflictType::get_conflict_type(stat.as_ref(), entry, new_entry);

        match stat {
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.has_untracked(path, self.index)? {
                    self.add_conflict(conflict_type, path);
                }
            }
            Some(stat) => {
                if self
                    .inspector
                    .check_index_against_workspace(entry, Some(&stat))?
                    != WorkspaceChangeType::None
                {
                    self.add_conflict(conflict_type, path);
                }
            }
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let conflict_path = if entry.is_some() { path } else { parent.as_path() };
                    self.add_conflict(conflict_type, conflict_path);
                }
            }
        }

        Ok(())
    }

    /// A file standing where one of the path's parent directories should be
    fn untracked_parent(&self, path: &Path) -> Result<Option<PathBuf>> {
        for parent in path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }

            match self.workspace.stat_file(parent) {
                Ok(stat) if stat.mode.is_tree() => continue,
                Ok(_) => {
                    if self.inspector.has_untracked(parent, self.index)? {
                        return Ok(Some(parent.to_path_buf()));
                    }
                }
                Err(err) if err.is_not_found() => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }

    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector
            .check_index_against_head_tree(index_entry, old_entry)
            != IndexChangeType::None
            && self
                .inspector
                .check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .ancestors()
            .skip(1)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let (action_type, entry) = match change {
            TreeChangeType::Added(new_entry) => {
                self.mkdirs.extend(parents);
                (ActionType::Add, Some(new_entry.clone()))
            }
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                (ActionType::Delete, None)
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(parents);
                (ActionType::Modify, Some(new.clone()))
            }
        };

        self.actions
            .entry(action_type)
            .or_default()
            .push((path.to_path_buf(), entry));
    }

    fn update_index(&mut self) -> Result<()> {
        for (file_path, _) in self.actions(ActionType::Delete).to_vec() {
            self.index.remove(&file_path);
        }

        for action_type in [ActionType::Add, ActionType::Modify] {
            for (file_path, entry) in self.actions(action_type).to_vec() {
                let entry = entry.ok_or_else(|| {
                    anyhow::anyhow!("Entry must be provided for {:?} actions", action_type)
                })?;
                let stat = self.workspace.stat_file(&file_path)?;

                self.index.add(IndexEntry::new(file_path, entry.oid, stat));
            }
        }

        Ok(())
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> Result<Bytes> {
        Ok(self.database.parse_object_as_blob(object_id)?.into_content())
    }
}
