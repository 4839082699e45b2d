//! Commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-oid>
//! parent <parent-oid>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! encoding <charset>
//!
//! <commit message>
//! ```
//!
//! Headers the engine does not interpret (`gpgsig`, `mergetag`, ...) are kept
//! in order so a parsed commit re-serializes to the same bytes.

use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::signature::Signature;
use anyhow::Context;
use bytes::Bytes;
use std::borrow::Cow;
use std::io::BufRead;

/// Slim representation of a commit
///
/// Carries only what graph traversals need: identity, parents and the
/// committer timestamp used for ordering.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SlimCommit {
    /// The commit's object ID
    pub oid: ObjectId,
    /// The commit's parent object IDs
    pub parents: Vec<ObjectId>,
    /// Committer timestamp
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl PartialOrd for SlimCommit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SlimCommit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    /// Parent commit IDs in declaration order
    parents: Vec<ObjectId>,
    author: Signature,
    committer: Signature,
    /// Charset of the message when it is not UTF-8
    encoding: Option<String>,
    /// Uninterpreted headers, in their original order
    extra_headers: Vec<(String, String)>,
    /// Raw message bytes
    message: Bytes,
}

impl Commit {
    pub fn new(
        tree_oid: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<Bytes>,
    ) -> Self {
        Commit {
            tree_oid,
            parents,
            author,
            committer,
            encoding: None,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_encoding(mut self, encoding: Option<String>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn committer(&self) -> &Signature {
        &self.committer
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Full message, lossily decoded
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    pub fn message_bytes(&self) -> &[u8] {
        &self.message
    }

    /// First line of the message
    pub fn summary(&self) -> String {
        self.message().lines().next().unwrap_or("").to_string()
    }

    /// Committer timestamp, the ordering key of history walks
    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.committer.timestamp()
    }

    pub fn to_slim(&self, oid: ObjectId) -> SlimCommit {
        SlimCommit {
            oid,
            parents: self.parents.clone(),
            timestamp: self.timestamp(),
        }
    }

    fn push_header(headers: &mut Vec<(String, String)>, line: &str) -> anyhow::Result<()> {
        if let Some(continuation) = line.strip_prefix(' ') {
            let (_, value) = headers
                .last_mut()
                .context("Invalid commit object: continuation without header")?;
            value.push('\n');
            value.push_str(continuation);
        } else {
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            headers.push((key.to_string(), value.to_string()));
        }

        Ok(())
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut headers = vec![];

        headers.push(format!("tree {}", self.tree_oid));
        for parent in &self.parents {
            headers.push(format!("parent {}", parent));
        }
        headers.push(format!("author {}", self.author.display()));
        headers.push(format!("committer {}", self.committer.display()));
        if let Some(encoding) = &self.encoding {
            headers.push(format!("encoding {}", encoding));
        }
        for (key, value) in &self.extra_headers {
            headers.push(format!("{} {}", key, value.replace('\n', "\n ")));
        }

        let mut content = headers.join("\n").into_bytes();
        content.extend_from_slice(b"\n\n");
        content.extend_from_slice(&self.message);

        let mut commit_bytes = self.object_type().header(content.len()).into_bytes();
        commit_bytes.extend_from_slice(&content);

        Ok(Bytes::from(commit_bytes))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead, algorithm: HashAlgorithm) -> anyhow::Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        let (header_bytes, message) = match content.windows(2).position(|w| w == b"\n\n") {
            Some(split) => (&content[..split], &content[split + 2..]),
            None => (content.strip_suffix(b"\n").unwrap_or(&content), &b""[..]),
        };
        let header_text =
            std::str::from_utf8(header_bytes).context("Invalid commit object: non UTF-8 header")?;

        let mut headers = Vec::new();
        for line in header_text.split('\n') {
            Self::push_header(&mut headers, line)?;
        }

        let parse_oid = |value: &str| -> anyhow::Result<ObjectId> {
            let oid = ObjectId::try_parse(value)?;
            if oid.algorithm() != algorithm {
                anyhow::bail!("Invalid commit object: {} is not a {} id", value, algorithm.as_str());
            }
            Ok(oid)
        };

        let mut headers = headers.into_iter().peekable();

        let tree_oid = match headers.next() {
            Some((key, value)) if key == "tree" => parse_oid(&value)?,
            _ => anyhow::bail!("Invalid commit object: missing tree line"),
        };

        let mut parents = Vec::new();
        while let Some((_, value)) = headers.next_if(|(key, _)| key == "parent") {
            parents.push(parse_oid(&value)?);
        }

        let author = match headers.next() {
            Some((key, value)) if key == "author" => Signature::try_from(value.as_str())?,
            _ => anyhow::bail!("Invalid commit object: missing author line"),
        };
        let committer = match headers.next() {
            Some((key, value)) if key == "committer" => Signature::try_from(value.as_str())?,
            _ => anyhow::bail!("Invalid commit object: missing committer line"),
        };

        let mut encoding = None;
        let mut extra_headers = Vec::new();
        for (key, value) in headers {
            if key == "encoding" && encoding.is_none() && extra_headers.is_empty() {
                encoding = Some(value);
            } else {
                extra_headers.push((key, value));
            }
        }

        Ok(Commit {
            tree_oid,
            parents,
            author,
            committer,
            encoding,
            extra_headers,
            message: Bytes::copy_from_slice(message),
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}
