use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use std::io::BufRead;
use std::path::PathBuf;

/// Canonical serialization, header included
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// Parsing of an object payload whose header has already been consumed
pub trait Unpackable {
    fn deserialize(reader: impl BufRead, algorithm: HashAlgorithm) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn object_id(&self, algorithm: HashAlgorithm) -> Result<ObjectId> {
        let content = self.serialize()?;
        Ok(algorithm.digest(&content))
    }

    fn object_path(&self, algorithm: HashAlgorithm) -> Result<PathBuf> {
        Ok(self.object_id(algorithm)?.to_path())
    }
}

/// Closed set of object kinds read back from the store
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
        }
    }

    pub fn serialize(&self) -> Result<Bytes> {
        match self {
            ObjectBox::Blob(blob) => blob.serialize(),
            ObjectBox::Tree(tree) => tree.serialize(),
            ObjectBox::Commit(commit) => commit.serialize(),
        }
    }
}
