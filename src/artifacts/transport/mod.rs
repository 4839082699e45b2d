//! Moving objects and references between repositories
//!
//! - `credentials`: opaque authentication supplied by the caller
//! - `local`: a transport for repositories reachable on the local filesystem
//!
//! A [`Transport`] only ships verified object bytes and reference tips. Deciding
//! which references to publish, and when, stays with the repository.

pub mod credentials;
pub mod local;

use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::error::{BitError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use credentials::CredentialProvider;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// A reference as advertised by a remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRef {
    pub name: RefName,
    pub oid: ObjectId,
    /// Set when the remote reference is symbolic, as `HEAD` usually is
    pub symref_target: Option<RefName>,
}

/// One object received from a remote, not yet trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedObject {
    /// The id the remote claims for `data`
    pub oid: ObjectId,
    pub kind: ObjectType,
    pub data: Bytes,
}

impl FetchedObject {
    /// Re-hash the payload and compare it with the advertised id
    pub fn verify(&self, algorithm: HashAlgorithm) -> Result<()> {
        let mut hasher = algorithm.hasher();
        hasher.update(self.kind.header(self.data.len()).as_bytes());
        hasher.update(&self.data);
        let actual = hasher.finalize_oid();

        if actual == self.oid {
            Ok(())
        } else {
            Err(BitError::ObjectIntegrity {
                oid: self.oid.to_string(),
                reason: format!("received content hashes to {actual}"),
            })
        }
    }
}

/// A reference change requested by a push
///
/// `old` is the tip the pusher last saw, `None` for a new reference; a
/// `new` of `None` deletes the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: RefName,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
}

#[derive(Clone, Default)]
pub struct FetchOptions {
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub skip_certificate_check: bool,
    /// Drop remote-tracking refs the remote no longer advertises
    pub prune: bool,
}

impl FetchOptions {
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOptions")
            .field("credentials", &self.credentials.as_ref().map(|_| "<provider>"))
            .field("skip_certificate_check", &self.skip_certificate_check)
            .field("prune", &self.prune)
            .finish()
    }
}

pub type ObjectStream = BoxStream<'static, Result<FetchedObject>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Every reference the remote advertises, `HEAD` included when it has one
    async fn list_refs(&self, url: &str, options: &FetchOptions) -> Result<Vec<RemoteRef>>;

    /// Objects reachable from `wants` that are not reachable from `haves`
    async fn fetch_objects(
        &self,
        url: &str,
        wants: &[ObjectId],
        haves: &[ObjectId],
        options: &FetchOptions,
    ) -> Result<ObjectStream>;

    /// Store `objects` on the remote, then apply `updates` as compare-and-swap
    /// operations against the advertised tips
    async fn push_objects(
        &self,
        url: &str,
        objects: Vec<FetchedObject>,
        updates: &[RefUpdate],
        options: &FetchOptions,
    ) -> Result<()>;

    /// The branch the remote `HEAD` points at, if it is symbolic
    async fn default_branch(&self, url: &str, options: &FetchOptions) -> Result<Option<RefName>> {
        let refs = self.list_refs(url, options).await?;

        Ok(refs
            .into_iter()
            .find(|remote_ref| remote_ref.name.is_head())
            .and_then(|head| head.symref_target))
    }
}

/// Pick a transport for `url`
///
/// Only local paths and `file://` URLs have a built-in transport; anything
/// else needs one supplied by the caller.
pub fn transport_for(url: &str) -> Result<Box<dyn Transport>> {
    if local::LocalTransport::handles(url) {
        Ok(Box::new(local::LocalTransport))
    } else {
        Err(BitError::Transport(format!("no transport available for {url}")))
    }
}
