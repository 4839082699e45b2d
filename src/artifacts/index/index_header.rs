use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::Packable;
use anyhow::anyhow;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;

#[derive(Debug, Clone, PartialEq, new)]
pub struct IndexHeader {
    pub(crate) marker: String,
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn empty() -> Self {
        IndexHeader {
            marker: String::from(SIGNATURE),
            version: VERSION,
            entries_count: 0,
        }
    }

    pub(crate) fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(anyhow!("Invalid header size"));
        }

        let marker = String::from_utf8(bytes[0..4].to_vec())
            .map_err(|_| anyhow!("Invalid marker in index header"))?;
        let version = byteorder::NetworkEndian::read_u32(&bytes[4..8]);
        let entries_count = byteorder::NetworkEndian::read_u32(&bytes[8..12]);

        if marker != SIGNATURE {
            return Err(anyhow!("Signature: expected '{SIGNATURE}' but found '{marker}'"));
        }
        if version != VERSION {
            return Err(anyhow!("Version: expected '{VERSION}' but found '{version}'"));
        }

        Ok(IndexHeader {
            marker,
            version,
            entries_count,
        })
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.extend_from_slice(self.marker.as_bytes());
        bytes.write_u32::<byteorder::NetworkEndian>(self.version)?;
        bytes.write_u32::<byteorder::NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}
