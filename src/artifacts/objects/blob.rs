//! Blob object
//!
//! Blobs store file content. They carry no metadata: names and modes live
//! in the trees that reference them.
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::BufRead;

/// Opaque file content
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Bytes,
}

impl Blob {
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }

    pub fn size(&self) -> usize {
        self.content.len()
    }
}

impl From<&[u8]> for Blob {
    fn from(content: &[u8]) -> Self {
        Blob::new(Bytes::copy_from_slice(content))
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let header = self.object_type().header(self.content.len());

        let mut blob_bytes = Vec::with_capacity(header.len() + self.content.len());
        blob_bytes.extend_from_slice(header.as_bytes());
        blob_bytes.extend_from_slice(&self.content);

        Ok(Bytes::from(blob_bytes))
    }
}

impl Unpackable for Blob {
    fn deserialize(mut reader: impl BufRead, _algorithm: HashAlgorithm) -> anyhow::Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        Ok(Self::new(content.into()))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}
