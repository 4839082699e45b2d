use crate::artifacts::objects::hash_algorithm::{ContentHasher, HashAlgorithm};
use anyhow::anyhow;
use bytes::Bytes;
use file_guard::FileGuard;
use std::io::{Read, Write};
use std::ops::DerefMut;

/// Locked index file handle that hashes everything passing through it
///
/// The index trailer is the digest of all preceding bytes.
pub struct Checksum<'f> {
    file: FileGuard<&'f mut std::fs::File>,
    digest: ContentHasher,
    algorithm: HashAlgorithm,
}

impl<'f> Checksum<'f> {
    pub(crate) fn new(file: FileGuard<&'f mut std::fs::File>, algorithm: HashAlgorithm) -> Self {
        Checksum {
            file,
            digest: algorithm.hasher(),
            algorithm,
        }
    }

    pub(crate) fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.file
            .deref_mut()
            .read_exact(&mut buffer)
            .map_err(|_| anyhow!("Unexpected end-of-file while reading index"))?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.file.deref_mut().write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    pub(crate) fn write_checksum(&mut self) -> anyhow::Result<()> {
        let checksum = self.digest.clone().finalize();
        self.file
            .deref_mut()
            .write_all(&checksum)
            .map_err(|_| anyhow!("Failed to write checksum to index file"))?;

        Ok(())
    }

    pub(crate) fn verify(&mut self) -> anyhow::Result<()> {
        let mut expected_checksum = vec![0u8; self.algorithm.digest_len()];
        self.file
            .deref_mut()
            .read_exact(&mut expected_checksum)
            .map_err(|_| anyhow!("Index file is missing its checksum"))?;

        let actual_checksum = self.digest.clone().finalize();

        if expected_checksum != actual_checksum {
            return Err(anyhow!("Checksum does not match value stored on disk"));
        }

        Ok(())
    }
}
