use crate::areas::refs::Expected;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::tree_builder::TreeBuilder;
use crate::error::Result;
use std::path::PathBuf;
use tracing::{debug, info};

impl Repository {
    /// Write a commit and, when `update_ref` is given, move that reference to it
    ///
    /// The reference update is a compare-and-swap against the reference's
    /// current tip. A reference that does not exist yet is created, whatever
    /// the parents. An existing one must point at the first parent; one that
    /// moved in the meantime fails with `Conflict` and the new commit stays
    /// unreferenced. `HEAD` updates the checked-out branch.
    pub fn create_commit(
        &self,
        update_ref: Option<&str>,
        author: &Signature,
        committer: &Signature,
        message: &str,
        tree: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId> {
        self.database().parse_object_as_tree(tree)?;
        for parent in parents {
            self.database().parse_object_as_commit(parent)?;
        }

        let commit = Commit::new(
            tree.clone(),
            parents.to_vec(),
            author.clone(),
            committer.clone(),
            message.to_string(),
        );
        let commit_id = self.database().store(&commit)?;

        if let Some(update_ref) = update_ref {
            let name = RefName::try_parse(update_ref)?;
            let expected = match self.refs().try_resolve(&name)? {
                Some(_) => Expected::from_current(parents.first().cloned()),
                None => Expected::Absent,
            };

            self.refs().update(&name, commit_id.clone(), expected)?;
            info!(reference = %name, commit = %commit_id, summary = %commit.summary(), "created commit");
        } else {
            debug!(commit = %commit_id, "created unreferenced commit");
        }

        Ok(commit_id)
    }

    /// Write the index as nested trees and return the root tree id
    ///
    /// Two indexes holding the same paths, modes and blobs produce the same
    /// id whatever order the entries were added in.
    pub async fn write_tree(&self) -> Result<ObjectId> {
        let index = self.index();
        let mut index = index.lock().await;

        // Load the index file from the disk
        index.load()?;

        if let Some(entry) = index.entries().find(|entry| entry.stage() != 0) {
            return Err(anyhow::anyhow!(
                "cannot write a tree with unmerged entry {}",
                entry.name.display()
            )
            .into());
        }

        let entries = index
            .entries()
            .map(|entry| (entry.name.clone(), entry.to_database_entry()))
            .collect::<Vec<(PathBuf, DatabaseEntry)>>();

        let tree_id = TreeBuilder::build(entries.iter().map(|(path, entry)| (path, entry)))?
            .traverse(&mut |tree: &Tree| self.database().store(tree))?;
        debug!(tree = %tree_id, entries = entries.len(), "wrote tree");

        Ok(tree_id)
    }
}
