//! Transport for repositories on the local filesystem
//!
//! Serves `file://` URLs and plain paths by opening the other repository
//! directly. Filesystem work runs on tokio's blocking pool.

use crate::areas::refs::{Expected, RefTarget};
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::{FetchOptions, FetchedObject, ObjectStream, RefUpdate, RemoteRef, Transport};
use crate::error::{BitError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const FILE_SCHEME: &str = "file://";

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransport;

impl LocalTransport {
    /// `file://` URLs and paths; not other schemes nor `host:path` forms
    pub fn handles(url: &str) -> bool {
        if url.starts_with(FILE_SCHEME) {
            return true;
        }

        let scp_like = url
            .split('/')
            .next()
            .is_some_and(|first| first.contains(':'));
        !url.contains("://") && !scp_like
    }

    fn open(url: &str) -> Result<Repository> {
        let path = Path::new(url.strip_prefix(FILE_SCHEME).unwrap_or(url));

        Repository::open(path).map_err(|err| match err {
            BitError::NotFound(_) => BitError::Transport(format!("{url} does not appear to be a repository")),
            other => other,
        })
    }

    fn advertise(remote: &Repository) -> Result<Vec<RemoteRef>> {
        let mut advertised = Vec::new();

        if let Some(oid) = remote.refs().read_head()? {
            advertised.push(RemoteRef {
                name: RefName::head(),
                oid,
                symref_target: remote.head()?.symbolic_target().cloned(),
            });
        }

        for reference in remote.refs().list(None)? {
            match remote.refs().try_resolve(reference.name()) {
                Ok(Some(oid)) => advertised.push(RemoteRef {
                    name: reference.name().clone(),
                    oid,
                    symref_target: reference.symbolic_target().cloned(),
                }),
                Ok(None) | Err(_) => debug!(name = %reference.name(), "not advertising unresolvable ref"),
            }
        }

        Ok(advertised)
    }

    /// Data the remote fails to read is data the receiver cannot trust
    fn integrity_error(err: BitError) -> BitError {
        match err {
            BitError::Corrupt { oid, reason } => BitError::ObjectIntegrity { oid, reason },
            other => other,
        }
    }

    fn receive(remote: &Repository, objects: Vec<FetchedObject>, updates: Vec<RefUpdate>) -> Result<()> {
        for object in &objects {
            object.verify(remote.algorithm())?;
            remote.database().store_raw(object.kind, &object.data)?;
        }

        let checked_out = if remote.is_bare() {
            None
        } else {
            remote.current_branch()?.map(|branch| branch.to_ref_name())
        };

        for update in updates {
            if checked_out.as_ref() == Some(&update.name) {
                return Err(BitError::Transport(format!(
                    "refusing to update checked out branch {}",
                    update.name
                )));
            }

            let expected = Expected::from_current(update.old.clone());
            match update.new {
                Some(new) => {
                    remote
                        .database()
                        .reachable_objects(std::slice::from_ref(&new), &HashSet::new())
                        .map_err(|err| BitError::ObjectIntegrity {
                            oid: new.to_string(),
                            reason: format!("incomplete history: {err}"),
                        })?;
                    remote.refs().set(&update.name, RefTarget::Direct(new), expected)?;
                }
                None => remote.refs().delete(&update.name, expected)?,
            }
            debug!(name = %update.name, "applied pushed ref update");
        }

        Ok(())
    }
}

async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| BitError::Transport(format!("transport task failed: {err}")))?
}

#[async_trait]
impl Transport for LocalTransport {
    async fn list_refs(&self, url: &str, _options: &FetchOptions) -> Result<Vec<RemoteRef>> {
        let url = url.to_string();
        blocking(move || Self::advertise(&Self::open(&url)?)).await
    }

    async fn fetch_objects(
        &self,
        url: &str,
        wants: &[ObjectId],
        haves: &[ObjectId],
        _options: &FetchOptions,
    ) -> Result<ObjectStream> {
        let url = url.to_string();
        let wants = wants.to_vec();
        let haves = haves.to_vec();

        let (remote, oids) = blocking(move || {
            let remote = Self::open(&url)?;
            let database = remote.database();

            let known = haves
                .into_iter()
                .filter(|oid| database.exists(oid))
                .collect::<Vec<_>>();
            let exclude = database
                .reachable_objects(&known, &HashSet::new())?
                .into_iter()
                .collect::<HashSet<_>>();
            let oids = database
                .reachable_objects(&wants, &exclude)
                .map_err(Self::integrity_error)?;

            debug!(url = %url, objects = oids.len(), "prepared objects to send");
            Ok((remote, oids))
        })
        .await?;

        let database = remote.database().clone();
        let objects = stream::iter(oids).then(move |oid| {
            let database = database.clone();
            blocking(move || {
                let (kind, data) = database.read_raw(&oid).map_err(Self::integrity_error)?;
                Ok(FetchedObject { oid, kind, data })
            })
        });

        Ok(objects.boxed())
    }

    async fn push_objects(
        &self,
        url: &str,
        objects: Vec<FetchedObject>,
        updates: &[RefUpdate],
        _options: &FetchOptions,
    ) -> Result<()> {
        let url = url.to_string();
        let updates = updates.to_vec();

        blocking(move || Self::receive(&Self::open(&url)?, objects, updates)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("file:///srv/repo.git", true)]
    #[case("/srv/repo.git", true)]
    #[case("../relative/repo", true)]
    #[case("https://example.com/repo.git", false)]
    #[case("ssh://git@example.com/repo.git", false)]
    #[case("git@example.com:repo.git", false)]
    fn recognizes_local_urls(#[case] url: &str, #[case] local: bool) {
        assert_eq!(LocalTransport::handles(url), local);
    }
}
