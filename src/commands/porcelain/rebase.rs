use crate::areas::index::Index;
use crate::areas::refs::Expected;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::log::rev_walk::Sort;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::rebase::{RebaseOutcome, RebaseState, Replayer};
use crate::artifacts::status::inspector::Inspector;
use crate::error::{BitError, Result};
use tracing::{debug, info, instrument, warn};

impl Repository {
    /// Replay the commits of the checked-out branch onto `target`
    ///
    /// A branch that is merely behind `target` is fast-forwarded. Otherwise
    /// every commit since the common ancestor is rewritten on top of
    /// `target`, oldest first. The branch moves only once every rewritten
    /// commit is stored, through a compare-and-swap against the tip it had
    /// when the rebase started; a concurrent update fails with `Conflict`.
    /// A replayed path that `target` also changed fails with
    /// `RebaseConflict` and leaves the branch untouched.
    ///
    /// When the branch is checked out, the index and working tree follow
    /// it; tracked local changes must be committed first unless there is
    /// nothing to do.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn fast_rebase(&self, target: &str) -> Result<RebaseOutcome> {
        let head = RefName::head();
        let branch = self.refs().terminal_name(&head)?;
        let current = self.refs().resolve(&head)?;
        let onto = self.rev_parse(target)?;
        debug!(state = %RebaseState::Start, branch = %branch, %current, %onto, "starting rebase");

        let base = self.merge_base(&current, &onto)?;

        if current == onto || base.as_ref() == Some(&onto) {
            info!(state = %RebaseState::Done, branch = %branch, "already up to date");
            return Ok(RebaseOutcome {
                state: RebaseState::Done,
                replayed: Vec::new(),
                tip: current,
            });
        }

        let index = self.index();
        let mut index = index.lock().await;
        if !self.is_bare() {
            // Load the index file from the disk
            index.load()?;
            self.ensure_clean_worktree(&index, &current)?;
        }

        if base.as_ref() == Some(&current) {
            self.publish_rebase(&mut index, &branch, &current, &onto)?;
            info!(state = %RebaseState::Fastforwarded, branch = %branch, tip = %onto, "fast-forwarded");

            return Ok(RebaseOutcome {
                state: RebaseState::Fastforwarded,
                replayed: Vec::new(),
                tip: onto,
            });
        }

        let mut walk = self.revwalk();
        walk.sorting(Sort::TOPOLOGICAL | Sort::REVERSE).push(current.clone())?;
        if let Some(base) = &base {
            walk.hide(base.clone())?;
        }
        let commits = walk.collect::<Result<Vec<_>>>()?;

        let committer = match self.signature() {
            Ok(signature) => signature,
            Err(err) if err.is_not_found() => self.find_commit(&current)?.committer().clone(),
            Err(err) => return Err(err),
        };

        debug!(state = %RebaseState::Replaying, commits = commits.len(), "replaying commits");
        let mut replayer = Replayer::new(self.database(), base.as_ref(), onto, committer)?;
        let mut replayed = Vec::with_capacity(commits.len());

        for original in commits {
            match replayer.replay(&original) {
                Ok(rewritten) => {
                    debug!(%original, %rewritten, "replayed commit");
                    replayed.push((original, rewritten));
                }
                Err(err @ BitError::RebaseConflict { .. }) => {
                    warn!(state = %RebaseState::Conflict, %original, %err, "rebase stopped");
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        let tip = replayer.tip().clone();
        self.publish_rebase(&mut index, &branch, &current, &tip)?;
        info!(state = %RebaseState::Done, branch = %branch, %tip, replayed = replayed.len(), "rebase finished");

        Ok(RebaseOutcome {
            state: RebaseState::Done,
            replayed,
            tip,
        })
    }

    fn ensure_clean_worktree(&self, index: &Index, head: &ObjectId) -> Result<()> {
        let head_tree = self
            .database()
            .flatten_tree(Some(self.find_commit(head)?.tree_oid()))?;
        let dirty = Inspector::new(self.workspace()?, self.algorithm()).dirty_paths(index, &head_tree)?;

        if dirty.is_empty() {
            Ok(())
        } else {
            Err(BitError::DirtyWorkingTree { paths: dirty })
        }
    }

    /// Move the working tree to `tip`, then swing the branch from `current`
    ///
    /// A lost compare-and-swap puts the working tree back.
    fn publish_rebase(&self, index: &mut Index, branch: &RefName, current: &ObjectId, tip: &ObjectId) -> Result<()> {
        if !self.is_bare() {
            self.migrate_worktree(index, Some(current), tip, false)?;
        }

        if let Err(err) = self.refs().update(branch, tip.clone(), Expected::oid(current.clone())) {
            warn!(branch = %branch, %err, "branch moved during rebase");
            if !self.is_bare() {
                self.migrate_worktree(index, Some(tip), current, true)?;
            }
            return Err(err);
        }

        Ok(())
    }
}
