//! Digest algorithms supported by the object format
//!
//! A repository uses exactly one algorithm for object ids, tree entries,
//! index entries and the index trailer. SHA-1 is the default; SHA-256
//! repositories record `extensions.objectformat = sha256` in their config.

use crate::artifacts::objects::object_id::ObjectId;
use sha1::Sha1;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Length of a raw digest in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn try_parse(name: &str) -> anyhow::Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            other => Err(anyhow::anyhow!("unsupported object format {other}")),
        }
    }

    pub fn hasher(&self) -> ContentHasher {
        match self {
            HashAlgorithm::Sha1 => ContentHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }

    /// Hash a complete byte sequence into an object id
    pub fn digest(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize_oid()
    }

    /// The algorithm whose hex digests have the given length
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(HashAlgorithm::Sha1),
            64 => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }
}

/// Incremental hasher over either supported algorithm
#[derive(Debug, Clone)]
pub enum ContentHasher {
    Sha1(Sha1),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Sha1(hasher) => hasher.update(data),
            ContentHasher::Sha256(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            ContentHasher::Sha1(hasher) => hasher.finalize().to_vec(),
            ContentHasher::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }

    pub fn finalize_oid(self) -> ObjectId {
        ObjectId::from_raw(&self.finalize())
    }
}
