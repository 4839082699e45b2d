use crate::areas::refs::Reference;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::{BitError, Result};
use tracing::info;

impl Repository {
    /// Create `refs/heads/<name>` at a commit
    ///
    /// Fails with `AlreadyExists` when the branch exists, unless `force`.
    pub fn create_branch(&self, name: &str, start: &ObjectId, force: bool) -> Result<Reference> {
        let branch_name = BranchName::try_parse(name)?;
        self.find_commit(start)?;

        let reference = self.refs().create_branch(&branch_name, start.clone(), force)?;
        info!(branch = %branch_name, start = %start, "created branch");

        Ok(reference)
    }

    /// Delete a branch that is not checked out
    pub fn delete_branch(&self, name: &str) -> Result<ObjectId> {
        let branch_name = BranchName::from_ref_or_short(name)?;

        if self.refs().is_current_branch(&branch_name)? {
            return Err(BitError::conflict(
                branch_name.to_ref_name().as_str(),
                "cannot delete the checked-out branch",
            ));
        }

        let oid = self.refs().delete_branch(&branch_name)?;
        info!(branch = %branch_name, was = %oid, "deleted branch");

        Ok(oid)
    }

    pub fn list_branches(&self) -> Result<Vec<BranchName>> {
        self.refs().list_branches()
    }
}
