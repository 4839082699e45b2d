//! Fast rebase
//!
//! Replays commits onto a new base by re-applying each commit's path-level
//! changes to the evolving tree. There is no content merge: a replayed path
//! that the new base also changed since the common ancestor is a conflict,
//! even when both sides made the same edit.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeChangeType;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::tree_builder::TreeBuilder;
use crate::error::{BitError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebaseState {
    Start,
    Replaying,
    /// The branch only needed to move forward; nothing was rewritten
    Fastforwarded,
    Conflict,
    Done,
}

impl fmt::Display for RebaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebaseState::Start => "start",
            RebaseState::Replaying => "replaying",
            RebaseState::Fastforwarded => "fast-forwarded",
            RebaseState::Conflict => "conflict",
            RebaseState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of a completed fast rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseOutcome {
    /// `Fastforwarded` or `Done`
    pub state: RebaseState,
    /// `(original, rewritten)` pairs, oldest first
    pub replayed: Vec<(ObjectId, ObjectId)>,
    /// The branch tip after the rebase
    pub tip: ObjectId,
}

/// Rewrites commits one at a time on top of a moving tip
pub struct Replayer<'r> {
    database: &'r Database,
    /// Paths the new base changed since the common ancestor
    upstream_changes: BTreeSet<PathBuf>,
    tree: BTreeMap<PathBuf, DatabaseEntry>,
    tip: ObjectId,
    committer: Signature,
}

impl<'r> Replayer<'r> {
    /// Start replaying onto `onto`, whose history diverged from `base`
    ///
    /// `base` is `None` for unrelated histories. `committer` supplies the
    /// identity stamped on rewritten commits; its timestamp is ignored in
    /// favour of the moment each commit is written.
    pub fn new(
        database: &'r Database,
        base: Option<&ObjectId>,
        onto: ObjectId,
        committer: Signature,
    ) -> Result<Self> {
        let upstream_changes = database
            .tree_diff(base, Some(&onto))?
            .into_changes()
            .into_keys()
            .collect();
        let onto_tree = database.parse_object_as_commit(&onto)?.tree_oid().clone();
        let tree = database.flatten_tree(Some(&onto_tree))?;

        Ok(Replayer {
            database,
            upstream_changes,
            tree,
            tip: onto,
            committer,
        })
    }

    pub fn tip(&self) -> &ObjectId {
        &self.tip
    }

    /// Apply `original`'s changes on top of the current tip and write the
    /// rewritten commit
    ///
    /// Changes are taken against the first parent, so a merge commit
    /// contributes what its merged-in side brought.
    pub fn replay(&mut self, original: &ObjectId) -> Result<ObjectId> {
        let commit = self.database.parse_object_as_commit(original)?;
        let changes = self
            .database
            .tree_diff(commit.parent(), Some(original))?
            .into_changes();

        if let Some(path) = changes.keys().find(|path| self.overlaps_upstream(path)) {
            return Err(BitError::RebaseConflict { path: path.clone() });
        }

        let mut tree = self.tree.clone();
        for (path, change) in changes {
            match change {
                TreeChangeType::Deleted(_) => {
                    tree.remove(&path);
                }
                TreeChangeType::Added(entry) | TreeChangeType::Modified { new: entry, .. } => {
                    tree.insert(path, entry);
                }
            }
        }

        let tree_oid = TreeBuilder::build(tree.iter())?
            .traverse(&mut |tree: &Tree| self.database.store(tree))?;
        let committer = self
            .committer
            .with_timestamp(chrono::Local::now().fixed_offset());

        let rewritten = Commit::new(
            tree_oid,
            vec![self.tip.clone()],
            commit.author().clone(),
            committer,
            commit.message_bytes().to_vec(),
        )
        .with_encoding(commit.encoding().map(str::to_string));
        let rewritten_oid = self.database.store(&rewritten)?;

        self.tree = tree;
        self.tip = rewritten_oid.clone();

        Ok(rewritten_oid)
    }

    /// Same path, or one is a directory holding the other
    fn overlaps_upstream(&self, path: &Path) -> bool {
        self.upstream_changes.contains(path)
            || path.ancestors().skip(1).any(|dir| self.upstream_changes.contains(dir))
            || self
                .upstream_changes
                .range(path.to_path_buf()..)
                .take_while(|changed| changed.starts_with(path))
                .next()
                .is_some()
    }
}
