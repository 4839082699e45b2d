//! Object identifier (content digest)
//!
//! Object ids are lowercase hexadecimal renderings of a SHA-1 (40 chars) or
//! SHA-256 (64 chars) digest. They address every object in the store.
//!
//! ## Storage
//!
//! Objects are stored in `objects/<first-2-chars>/<remaining-chars>`

use crate::artifacts::objects::SHORT_OID_LENGTH;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use std::io;
use std::path::PathBuf;

/// Content digest identifying an object
///
/// Equality is digest equality; the hex form is kept normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object id from its hex form
    pub fn try_parse(id: impl Into<String>) -> anyhow::Result<Self> {
        let id = id.into();

        if HashAlgorithm::from_hex_len(id.len()).is_none() {
            return Err(anyhow::anyhow!("Invalid object ID length: {}", id.len()));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Invalid object ID characters: {}", id));
        }

        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Build an object id from a raw digest
    pub fn from_raw(raw: &[u8]) -> Self {
        let hex = raw
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();

        Self(hex)
    }

    /// The algorithm this digest was produced with
    pub fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::from_hex_len(self.0.len()).unwrap_or_default()
    }

    /// Write the digest in binary form
    ///
    /// Used when serializing tree objects and index entries.
    pub fn write_raw_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_raw()?)?;

        Ok(())
    }

    /// Read a binary digest of `len` bytes
    pub fn read_raw_from<R: io::Read + ?Sized>(reader: &mut R, len: usize) -> anyhow::Result<Self> {
        let mut raw = vec![0; len];
        reader.read_exact(&mut raw)?;

        Ok(Self::from_raw(&raw))
    }

    pub fn to_raw(&self) -> anyhow::Result<Vec<u8>> {
        (0..self.0.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&self.0[i..i + 2], 16)
                    .map_err(|_| anyhow::anyhow!("Invalid hex digit in {}", self.0))
            })
            .collect()
    }

    /// Convert to the loose object path
    ///
    /// `abc123...` becomes `ab/c123...`
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Abbreviated form used in messages
    pub fn to_short_oid(&self) -> String {
        self.0.split_at(SHORT_OID_LENGTH).0.to_string()
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::try_parse(s)
    }
}
