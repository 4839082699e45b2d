use crate::areas::index::Index;
use crate::areas::refs::RefTarget;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Result;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Overwrite local changes instead of failing with `DirtyWorkingTree`
    pub force: bool,
}

impl Repository {
    /// Switch to a branch, or detach `HEAD` at any other revision
    pub async fn checkout(&self, target: &str) -> Result<ObjectId> {
        self.checkout_with(target, CheckoutOptions::default()).await
    }

    #[instrument(skip(self), fields(target = %target))]
    pub async fn checkout_with(&self, target: &str, options: CheckoutOptions) -> Result<ObjectId> {
        self.workspace()?;

        let branch = BranchName::from_ref_or_short(target)
            .ok()
            .filter(|branch| matches!(self.refs().find(&branch.to_ref_name()), Ok(Some(_))));
        let (head_target, target_oid) = match branch {
            Some(branch) => {
                let ref_name = branch.to_ref_name();
                let oid = self.refs().resolve(&ref_name)?;
                (RefTarget::Symbolic(ref_name), oid)
            }
            None => {
                let oid = self.rev_parse(target)?;
                (RefTarget::Direct(oid.clone()), oid)
            }
        };

        let current_oid = self.refs().read_head()?;

        let index = self.index();
        let mut index = index.lock().await;

        // Load the index file from the disk
        index.load()?;

        self.migrate_worktree(&mut index, current_oid.as_ref(), &target_oid, options.force)?;
        self.refs().set_head(head_target.clone())?;

        info!(head = %head_target, commit = %target_oid, "checked out");
        Ok(target_oid)
    }

    /// Move the working tree and index from one commit's tree to another's
    ///
    /// Nothing is written when local changes are in the way, unless `force`.
    pub(crate) fn migrate_worktree(
        &self,
        index: &mut Index,
        from: Option<&ObjectId>,
        to: &ObjectId,
        force: bool,
    ) -> Result<()> {
        let workspace = self.workspace()?;
        let changes = self.database().tree_diff(from, Some(to))?.into_changes();

        Migration::new(self.database(), workspace, index, changes).apply_changes(force)?;
        index.save()
    }
}
