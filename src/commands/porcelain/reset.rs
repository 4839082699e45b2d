use crate::areas::refs::Expected;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::diff::tree_diff::TreeChangeType;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::WorkspaceChangeType;
use crate::artifacts::status::inspector::Inspector;
use crate::error::Result;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetMode {
    /// Move the branch only
    Soft,
    /// Move the branch and reset the index
    Mixed,
    /// Move the branch, reset the index and overwrite tracked files
    Hard,
}

impl Repository {
    /// Point the current branch (or detached `HEAD`) at `target`
    #[instrument(skip(self), fields(target = %target))]
    pub async fn reset(&self, target: &str, mode: ResetMode) -> Result<ObjectId> {
        let target_oid = self.rev_parse(target)?;
        let commit = self.find_commit(&target_oid)?;

        if mode != ResetMode::Soft {
            let workspace = self.workspace()?;
            let tree = self.database().flatten_tree(Some(commit.tree_oid()))?;

            let index = self.index();
            let mut index = index.lock().await;

            // Load the index file from the disk
            index.load()?;

            if mode == ResetMode::Hard {
                let inspector = Inspector::new(workspace, self.algorithm());
                let mut changes = BTreeMap::new();

                let paths = index
                    .entries()
                    .map(|entry| entry.name.clone())
                    .chain(tree.keys().cloned())
                    .collect::<BTreeSet<_>>();
                for path in paths {
                    let staged = index.entry_by_path(&path);
                    let wanted = tree.get(&path);

                    let stat = workspace.stat_file(&path).ok();
                    let worktree_changed = staged.is_some()
                        && inspector.check_index_against_workspace(staged, stat.as_ref())?
                            != WorkspaceChangeType::None;

                    let change = match (staged.map(|entry| entry.to_database_entry()), wanted) {
                        (Some(old), Some(new)) if worktree_changed => Some(TreeChangeType::Modified {
                            old,
                            new: new.clone(),
                        }),
                        (old, new) => TreeChangeType::from_entries(old, new.cloned()),
                    };
                    if let Some(change) = change {
                        changes.insert(path, change);
                    }
                }

                Migration::new(self.database(), workspace, &mut index, changes).apply_changes(true)?;
                index.read_tree(&tree, |path| workspace.stat_file(path).ok());
            } else {
                // the working tree may differ from the new index, so no stat data
                index.read_tree(&tree, |_| None);
            }

            index.save()?;
        }

        self.refs()
            .update(&RefName::head(), target_oid.clone(), Expected::Any)?;
        info!(?mode, commit = %target_oid, "reset");

        Ok(target_oid)
    }
}
