use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

impl Repository {
    /// Store bytes as a blob
    pub fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.database().store(&Blob::from(data))
    }

    /// Read and verify any object
    pub fn find_object(&self, oid: &ObjectId) -> Result<ObjectBox> {
        self.database().parse_object(oid)
    }

    pub fn object_exists(&self, oid: &ObjectId) -> bool {
        self.database().exists(oid)
    }

    /// Every file below a tree (or a commit's tree), keyed by full path
    pub fn list_tree(&self, treeish: &ObjectId) -> Result<BTreeMap<PathBuf, DatabaseEntry>> {
        self.database().flatten_tree(Some(treeish))
    }

    /// The entry at a nested path such as `src/bin/tool.rs`, file or subtree
    pub fn find_entry_by_path(&self, treeish: &ObjectId, path: impl AsRef<Path>) -> Result<DatabaseEntry> {
        self.database().entry_by_path(treeish, path.as_ref())
    }
}
