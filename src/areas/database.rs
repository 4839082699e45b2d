//! Object store
//!
//! Loose objects live at `objects/<2 hex>/<rest>`, zlib-compressed. Every
//! read re-hashes the inflated bytes, so a damaged or substituted file is
//! reported instead of being parsed.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::error::{BitError, Result};
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Database {
    path: Box<Path>,
    algorithm: HashAlgorithm,
}

// TODO: read packfiles so repositories repacked by other tools stay readable
impl Database {
    pub fn new(path: Box<Path>, algorithm: HashAlgorithm) -> Self {
        Database { path, algorithm }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn tree_diff(&self, old_oid: Option<&ObjectId>, new_oid: Option<&ObjectId>) -> Result<TreeDiff<'_>> {
        let mut tree_diff = TreeDiff::new(self);
        tree_diff.compare_oids(old_oid, new_oid, Path::new(""))?;
        Ok(tree_diff)
    }

    /// Non-failing existence probe
    pub fn exists(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    /// Store an object and return its digest
    ///
    /// Writing an object that is already present is a no-op.
    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        let content = object.serialize()?;
        self.store_bytes(content)
    }

    /// Store a payload of the given kind, as received from a transport
    pub fn store_raw(&self, object_type: ObjectType, payload: &[u8]) -> Result<ObjectId> {
        let mut content = object_type.header(payload.len()).into_bytes();
        content.extend_from_slice(payload);

        self.store_bytes(content.into())
    }

    fn store_bytes(&self, content: Bytes) -> Result<ObjectId> {
        let object_id = self.algorithm.digest(&content);
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            return Ok(object_id);
        }

        let object_dir = object_path
            .parent()
            .with_context(|| format!("Invalid object path {}", object_path.display()))?;
        std::fs::create_dir_all(object_dir)?;

        self.write_object(&object_path, content)?;
        debug!(oid = %object_id, "stored object");

        Ok(object_id)
    }

    /// Inflated, verified object bytes, header included
    pub fn load(&self, object_id: &ObjectId) -> Result<Bytes> {
        if object_id.algorithm() != self.algorithm {
            return Err(BitError::NotFound(format!(
                "object {object_id} ({} id in a {} repository)",
                object_id.algorithm().as_str(),
                self.algorithm.as_str()
            )));
        }

        let object_path = self.path.join(object_id.to_path());
        let compressed = match std::fs::read(&object_path) {
            Ok(compressed) => compressed,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(BitError::NotFound(format!("object {object_id}")));
            }
            Err(err) => return Err(err.into()),
        };

        let content = Self::decompress(&compressed).map_err(|err| BitError::Corrupt {
            oid: object_id.to_string(),
            reason: err.to_string(),
        })?;

        let actual = self.algorithm.digest(&content);
        if &actual != object_id {
            warn!(oid = %object_id, actual = %actual, "object digest mismatch");
            return Err(BitError::Corrupt {
                oid: object_id.to_string(),
                reason: format!("content hashes to {actual}"),
            });
        }

        Ok(content)
    }

    /// Object kind and payload, header stripped
    pub fn read_raw(&self, object_id: &ObjectId) -> Result<(ObjectType, Bytes)> {
        let content = self.load(object_id)?;
        let mut reader = Cursor::new(&content[..]);

        let (object_type, size) =
            ObjectType::parse_header(&mut reader).map_err(|err| BitError::Corrupt {
                oid: object_id.to_string(),
                reason: err.to_string(),
            })?;

        let payload = content.slice(reader.position() as usize..);
        if payload.len() != size {
            return Err(BitError::Corrupt {
                oid: object_id.to_string(),
                reason: format!("header declares {size} bytes, found {}", payload.len()),
            });
        }

        Ok((object_type, payload))
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> Result<ObjectBox> {
        let (object_type, payload) = self.read_raw(object_id)?;
        let reader = Cursor::new(payload);

        let object = match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(reader, self.algorithm)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(reader, self.algorithm)?)),
            ObjectType::Commit => {
                ObjectBox::Commit(Box::new(Commit::deserialize(reader, self.algorithm)?))
            }
        };

        Ok(object)
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> Result<Blob> {
        match self.parse_object(object_id)? {
            ObjectBox::Blob(blob) => Ok(*blob),
            other => Err(Self::wrong_type(object_id, ObjectType::Blob, other.object_type())),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> Result<Tree> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(*tree),
            other => Err(Self::wrong_type(object_id, ObjectType::Tree, other.object_type())),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> Result<Commit> {
        match self.parse_object(object_id)? {
            ObjectBox::Commit(commit) => Ok(*commit),
            other => Err(Self::wrong_type(object_id, ObjectType::Commit, other.object_type())),
        }
    }

    /// Read a tree, or the root tree of a commit
    pub fn peel_to_tree(&self, object_id: &ObjectId) -> Result<Tree> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(*tree),
            ObjectBox::Commit(commit) => self.parse_object_as_tree(commit.tree_oid()),
            other => Err(Self::wrong_type(object_id, ObjectType::Tree, other.object_type())),
        }
    }

    /// Walk `path` one segment at a time from a tree (or a commit's tree)
    ///
    /// Intermediate segments must name subtrees. A missing segment is
    /// `NotFound`.
    pub fn entry_by_path(&self, treeish: &ObjectId, path: &Path) -> Result<DatabaseEntry> {
        let not_found = || BitError::NotFound(format!("path {} in tree {treeish}", path.display()));

        let mut tree = self.peel_to_tree(treeish)?;
        let mut components = path.components().peekable();
        while let Some(component) = components.next() {
            let name = match component {
                std::path::Component::Normal(name) => name.to_str().ok_or_else(not_found)?,
                _ => return Err(not_found()),
            };
            let entry = tree.get(name).cloned().ok_or_else(not_found)?;

            if components.peek().is_none() {
                return Ok(entry);
            }
            if !entry.is_tree() {
                return Err(not_found());
            }
            tree = self.parse_object_as_tree(&entry.oid)?;
        }

        Err(not_found())
    }

    fn wrong_type(object_id: &ObjectId, expected: ObjectType, found: ObjectType) -> BitError {
        BitError::WrongObjectType {
            oid: object_id.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Every blob below a tree, keyed by its full path
    ///
    /// `None` stands for the empty tree of an unborn branch.
    pub fn flatten_tree(&self, tree_oid: Option<&ObjectId>) -> Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let mut listing = BTreeMap::new();

        if let Some(tree_oid) = tree_oid {
            let mut pending = vec![(PathBuf::new(), tree_oid.clone())];

            while let Some((prefix, oid)) = pending.pop() {
                for (name, entry) in self.peel_to_tree(&oid)?.into_entries() {
                    let path = prefix.join(name);
                    if entry.is_tree() {
                        pending.push((path, entry.oid));
                    } else {
                        listing.insert(path, entry);
                    }
                }
            }
        }

        Ok(listing)
    }

    /// Ids of every object reachable from `tips`, skipping anything reachable
    /// from `exclude`
    ///
    /// Fails with `NotFound` if the graph references an object that is not
    /// stored, which makes it double as a connectivity check.
    pub fn reachable_objects(&self, tips: &[ObjectId], exclude: &HashSet<ObjectId>) -> Result<Vec<ObjectId>> {
        let mut seen = exclude.clone();
        let mut pending = tips.to_vec();
        let mut found = Vec::new();

        while let Some(oid) = pending.pop() {
            if !seen.insert(oid.clone()) {
                continue;
            }

            match self.parse_object(&oid)? {
                ObjectBox::Commit(commit) => {
                    pending.push(commit.tree_oid().clone());
                    pending.extend(commit.parents().iter().cloned());
                }
                ObjectBox::Tree(tree) => {
                    pending.extend(tree.into_entries().map(|(_, entry)| entry.oid));
                }
                ObjectBox::Blob(_) => {}
            }

            found.push(oid);
        }

        Ok(found)
    }

    fn write_object(&self, object_path: &Path, object_content: Bytes) -> Result<()> {
        let object_dir = object_path
            .parent()
            .with_context(|| format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let object_content = Self::compress(&object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .with_context(|| format!("Unable to open object file {}", temp_object_path.display()))?;

        file.write_all(&object_content)?;
        file.sync_all()?;

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, object_path).with_context(|| {
            format!("Unable to rename object file to {}", object_path.display())
        })?;

        Ok(())
    }

    fn compress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(|compressed_content| compressed_content.into())
            .context("Unable to finish compressing object content")
    }

    fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut decompressed_content = Vec::new();
        decoder
            .read_to_end(&mut decompressed_content)
            .context("Unable to decompress object content")?;

        Ok(decompressed_content.into())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u64>())
    }

    /// Find all objects whose id starts with the given hex prefix
    ///
    /// More than one match means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let mut matches = Vec::new();

        let dir_names = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255).map(|i| format!("{:02x}", i)).collect()
        };

        for dir_name in dir_names {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let full_oid = format!("{}{}", dir_name, file_name.to_string_lossy());

                if full_oid.starts_with(&prefix)
                    && let Ok(oid) = ObjectId::try_parse(full_oid)
                {
                    matches.push(oid);
                }
            }
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::object::Packable;
    use crate::artifacts::objects::signature::Signature;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn temp_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn database(dir: &TempDir, algorithm: HashAlgorithm) -> Database {
        Database::new(dir.path().join("objects").into(), algorithm)
    }

    #[rstest]
    #[case(HashAlgorithm::Sha1)]
    #[case(HashAlgorithm::Sha256)]
    fn stored_objects_read_back_byte_identical(temp_dir: TempDir, #[case] algorithm: HashAlgorithm) {
        let database = database(&temp_dir, algorithm);
        let blob = Blob::from(&b"Example\n"[..]);

        let oid = database.store(&blob).unwrap();
        assert_eq!(oid, blob.object_id(algorithm).unwrap());
        assert_eq!(database.load(&oid).unwrap(), blob.serialize().unwrap());
        assert_eq!(database.parse_object_as_blob(&oid).unwrap(), blob);
    }

    #[rstest]
    fn storing_twice_is_idempotent(temp_dir: TempDir) {
        let database = database(&temp_dir, HashAlgorithm::Sha1);
        let blob = Blob::from(&b"same"[..]);

        let first = database.store(&blob).unwrap();
        let second = database.store(&blob).unwrap();
        assert_eq!(first, second);

        let dir = database.objects_path().join(&first.as_ref()[..2]);
        assert_eq!(std::fs::read_dir(dir).unwrap().count(), 1);
    }

    #[rstest]
    fn missing_objects_are_not_found(temp_dir: TempDir) {
        let database = database(&temp_dir, HashAlgorithm::Sha1);
        let oid = HashAlgorithm::Sha1.digest(b"nothing");

        assert!(!database.exists(&oid));
        assert!(matches!(database.load(&oid), Err(BitError::NotFound(_))));
    }

    #[rstest]
    fn substituted_content_is_corrupt(temp_dir: TempDir) {
        let database = database(&temp_dir, HashAlgorithm::Sha1);
        let original = database.store(&Blob::from(&b"original"[..])).unwrap();
        let other = database.store(&Blob::from(&b"tampered"[..])).unwrap();

        let original_path = database.objects_path().join(original.to_path());
        let other_path = database.objects_path().join(other.to_path());
        std::fs::copy(other_path, &original_path).unwrap();

        assert!(matches!(database.load(&original), Err(BitError::Corrupt { .. })));
    }

    #[rstest]
    fn typed_reads_reject_other_kinds(temp_dir: TempDir) {
        let database = database(&temp_dir, HashAlgorithm::Sha1);
        let oid = database.store(&Blob::from(&b"a blob"[..])).unwrap();

        assert!(matches!(
            database.parse_object_as_commit(&oid),
            Err(BitError::WrongObjectType { .. })
        ));
    }

    #[rstest]
    fn flatten_and_reachability_follow_the_graph(temp_dir: TempDir) {
        let database = database(&temp_dir, HashAlgorithm::Sha1);
        let blob_oid = database.store(&Blob::from(&b"content"[..])).unwrap();

        let mut inner = Tree::default();
        inner.insert(
            "file.txt",
            DatabaseEntry::new(blob_oid.clone(), EntryMode::File(FileMode::Regular)),
        );
        let inner_oid = database.store(&inner).unwrap();

        let mut root = Tree::default();
        root.insert("dir", DatabaseEntry::new(inner_oid.clone(), EntryMode::Directory));
        let root_oid = database.store(&root).unwrap();

        let signature = Signature::try_from("t <t@x> 1 +0000").unwrap();
        let commit = Commit::new(root_oid.clone(), vec![], signature.clone(), signature, "c");
        let commit_oid = database.store(&commit).unwrap();

        let listing = database.flatten_tree(Some(&commit_oid)).unwrap();
        assert_eq!(listing.keys().collect::<Vec<_>>(), vec![&PathBuf::from("dir/file.txt")]);

        let mut reachable = database.reachable_objects(&[commit_oid.clone()], &HashSet::new()).unwrap();
        reachable.sort();
        let mut expected = vec![commit_oid, root_oid, inner_oid, blob_oid];
        expected.sort();
        assert_eq!(reachable, expected);
    }
}
