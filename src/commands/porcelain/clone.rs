use crate::areas::refs::{Expected, RefTarget};
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::{FetchOptions, RemoteRef, Transport, transport_for};
use crate::commands::porcelain::init::InitOptions;
use crate::error::{BitError, Result};
use futures::StreamExt;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

pub(crate) const DEFAULT_REMOTE: &str = "origin";

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub bare: bool,
    /// Branch to check out instead of the one the remote `HEAD` names
    pub branch: Option<String>,
    pub fetch: FetchOptions,
}

impl Repository {
    /// Clone `url` into `destination` using the built-in transport for it
    pub async fn clone(url: &str, destination: impl AsRef<Path>, options: CloneOptions) -> Result<Repository> {
        let transport = transport_for(url)?;
        Self::clone_with(transport.as_ref(), url, destination, options).await
    }

    /// Clone through a caller-supplied transport
    ///
    /// Every received object is re-hashed and the received history must be
    /// complete from every advertised tip before a single reference is
    /// written. On failure the destination is removed again (or emptied, if
    /// it existed before).
    #[instrument(skip_all, fields(url = %url))]
    pub async fn clone_with(
        transport: &dyn Transport,
        url: &str,
        destination: impl AsRef<Path>,
        options: CloneOptions,
    ) -> Result<Repository> {
        let destination = destination.as_ref();
        let existed = destination.exists();
        if existed && std::fs::read_dir(destination)?.next().is_some() {
            return Err(BitError::AlreadyExists(format!(
                "destination {} is not an empty directory",
                destination.display()
            )));
        }

        match Self::clone_into(transport, url, destination, &options).await {
            Ok(repository) => Ok(repository),
            Err(err) => {
                warn!(%err, destination = %destination.display(), "clone failed, cleaning up");
                Self::discard_clone(destination, existed)?;
                Err(err)
            }
        }
    }

    fn discard_clone(destination: &Path, existed: bool) -> Result<()> {
        if !existed {
            if destination.exists() {
                std::fs::remove_dir_all(destination)?;
            }
            return Ok(());
        }

        for entry in std::fs::read_dir(destination)? {
            let path = entry?.path();
            if path.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }

        Ok(())
    }

    async fn clone_into(
        transport: &dyn Transport,
        url: &str,
        destination: &Path,
        options: &CloneOptions,
    ) -> Result<Repository> {
        let advertised = transport.list_refs(url, &options.fetch).await?;
        let algorithm = advertised
            .first()
            .map(|remote_ref| remote_ref.oid.algorithm())
            .unwrap_or(HashAlgorithm::Sha1);

        let remote_head = advertised.iter().find(|remote_ref| remote_ref.name.is_head());
        let branch = match &options.branch {
            Some(branch) => Some(BranchName::from_ref_or_short(branch)?),
            None => remote_head
                .and_then(|head| head.symref_target.as_ref())
                .and_then(RefName::branch_name),
        };

        let repository = Repository::init(
            destination,
            InitOptions {
                bare: options.bare,
                initial_head: branch
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| InitOptions::default().initial_head),
                object_format: algorithm,
            },
        )?;

        let wants = advertised
            .iter()
            .map(|remote_ref| remote_ref.oid.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let received = repository
            .receive_objects(transport, url, &wants, &[], &options.fetch)
            .await?;

        let mut config = repository.config()?;
        config.set_str(&format!("remote.{DEFAULT_REMOTE}.url"), url)?;
        config.set_str(
            &format!("remote.{DEFAULT_REMOTE}.fetch"),
            &format!("+refs/heads/*:refs/remotes/{DEFAULT_REMOTE}/*"),
        )?;

        // every object is stored and verified: references can be published
        let published = repository.publish_remote_refs(DEFAULT_REMOTE, &advertised)?;

        let tip = match &branch {
            Some(branch) => {
                let local_ref = branch.to_ref_name();
                let tip = advertised
                    .iter()
                    .find(|advertised| advertised.name == local_ref)
                    .map(|advertised| advertised.oid.clone());

                match (tip, &options.branch) {
                    (Some(tip), _) => {
                        repository
                            .refs()
                            .set(&local_ref, RefTarget::Direct(tip.clone()), Expected::Absent)?;
                        config.set_str(&format!("branch.{branch}.remote"), DEFAULT_REMOTE)?;
                        config.set_str(&format!("branch.{branch}.merge"), local_ref.as_str())?;
                        Some(tip)
                    }
                    (None, Some(_)) => {
                        return Err(BitError::NotFound(format!("remote branch {branch}")));
                    }
                    (None, None) => None,
                }
            }
            None => {
                // detached remote HEAD
                let tip = remote_head.map(|head| head.oid.clone());
                if let Some(tip) = &tip {
                    repository.refs().set_head(RefTarget::Direct(tip.clone()))?;
                }
                tip
            }
        };

        if let Some(tip) = &tip
            && !repository.is_bare()
        {
            let index = repository.index();
            let mut index = index.lock().await;

            // Load the index file from the disk
            index.load()?;
            repository.migrate_worktree(&mut index, None, tip, false)?;
        }

        info!(
            objects = received,
            refs = published,
            branch = ?branch.map(|branch| branch.to_string()),
            "cloned repository"
        );
        Ok(repository)
    }

    /// Fetch, verify and store objects, then check the history is complete
    pub(crate) async fn receive_objects(
        &self,
        transport: &dyn Transport,
        url: &str,
        wants: &[ObjectId],
        haves: &[ObjectId],
        options: &FetchOptions,
    ) -> Result<usize> {
        if wants.is_empty() {
            return Ok(0);
        }

        let mut objects = transport.fetch_objects(url, wants, haves, options).await?;
        let mut received = 0;

        while let Some(object) = objects.next().await {
            let object = object?;
            object.verify(self.algorithm())?;
            self.database().store_raw(object.kind, &object.data)?;
            received += 1;
        }
        debug!(received, "stored received objects");

        self.database()
            .reachable_objects(wants, &HashSet::new())
            .map_err(|err| match err {
                BitError::NotFound(missing) => BitError::ObjectIntegrity {
                    oid: missing,
                    reason: "received history is incomplete".into(),
                },
                other => other,
            })?;

        Ok(received)
    }

    /// Mirror advertised branches under `refs/remotes/<remote>/` and copy tags
    ///
    /// Returns the number of references written.
    pub(crate) fn publish_remote_refs(&self, remote: &str, advertised: &[RemoteRef]) -> Result<usize> {
        let mut published = 0;

        for remote_ref in advertised {
            if remote_ref.name.is_head() {
                if let Some(branch) = remote_ref.symref_target.as_ref().and_then(RefName::branch_name) {
                    let tracking = remote_tracking_ref(remote, &branch)?;
                    self.refs().set(
                        &RefName::try_parse(format!("refs/remotes/{remote}/HEAD"))?,
                        RefTarget::Symbolic(tracking),
                        Expected::Any,
                    )?;
                }
                continue;
            }

            if remote_ref.symref_target.is_some() {
                continue;
            }

            if let Some(branch) = remote_ref.name.branch_name() {
                let tracking = remote_tracking_ref(remote, &branch)?;
                self.refs()
                    .set(&tracking, RefTarget::Direct(remote_ref.oid.clone()), Expected::Any)?;
                published += 1;
            } else if remote_ref.name.as_str().starts_with("refs/tags/")
                && self.refs().find(&remote_ref.name)?.is_none()
            {
                self.refs()
                    .set(&remote_ref.name, RefTarget::Direct(remote_ref.oid.clone()), Expected::Absent)?;
                published += 1;
            }
        }

        Ok(published)
    }
}

pub(crate) fn remote_tracking_ref(remote: &str, branch: &BranchName) -> Result<RefName> {
    RefName::try_parse(format!("refs/remotes/{remote}/{branch}"))
}
