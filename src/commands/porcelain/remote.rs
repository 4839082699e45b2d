use crate::areas::refs::{Expected, ReferenceKind};
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::log::rev_walk::is_ancestor;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::transport::{FetchOptions, FetchedObject, RefUpdate, RemoteRef, Transport, transport_for};
use crate::commands::porcelain::clone::remote_tracking_ref;
use crate::error::{BitError, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// What a fetch changed locally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Remote-tracking refs that were created or moved, with their new tips
    pub updated: Vec<(RefName, ObjectId)>,
    /// Remote-tracking refs removed because the remote dropped the branch
    pub pruned: Vec<RefName>,
    pub objects: usize,
}

impl Repository {
    /// References advertised by the repository at `url`
    pub async fn ls_remote(&self, url: &str, options: &FetchOptions) -> Result<Vec<RemoteRef>> {
        transport_for(url)?.list_refs(url, options).await
    }

    pub async fn fetch(&self, remote: &str, options: &FetchOptions) -> Result<FetchSummary> {
        let url = self.remote_url(remote)?;
        let transport = transport_for(&url)?;
        self.fetch_with(transport.as_ref(), remote, options).await
    }

    /// Update `refs/remotes/<remote>/*` from the remote's branches
    ///
    /// Objects are verified and stored before any reference moves.
    #[instrument(skip(self, transport, options))]
    pub async fn fetch_with(
        &self,
        transport: &dyn Transport,
        remote: &str,
        options: &FetchOptions,
    ) -> Result<FetchSummary> {
        let url = self.remote_url(remote)?;
        let advertised = transport.list_refs(&url, options).await?;

        let wants = advertised
            .iter()
            .filter(|remote_ref| !self.database().exists(&remote_ref.oid))
            .map(|remote_ref| remote_ref.oid.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();
        let haves = self.local_tips()?;
        let objects = self
            .receive_objects(transport, &url, &wants, &haves, options)
            .await?;

        let previous = self.tracking_refs(remote)?;
        self.publish_remote_refs(remote, &advertised)?;
        let current = self.tracking_refs(remote)?;

        let mut updated = current
            .iter()
            .filter(|(name, oid)| previous.get(*name) != Some(*oid))
            .map(|(name, oid)| (name.clone(), oid.clone()))
            .collect::<Vec<_>>();
        updated.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pruned = Vec::new();
        if options.prune {
            let advertised_tracking = advertised
                .iter()
                .filter_map(|remote_ref| remote_ref.name.branch_name())
                .map(|branch| remote_tracking_ref(remote, &branch))
                .collect::<Result<HashSet<_>>>()?;

            for name in current.keys().filter(|name| !advertised_tracking.contains(*name)) {
                self.refs().delete(name, Expected::Any)?;
                debug!(name = %name, "pruned remote-tracking ref");
                pruned.push(name.clone());
            }
            pruned.sort();
        }

        info!(updated = updated.len(), pruned = pruned.len(), objects, "fetched");
        Ok(FetchSummary {
            updated,
            pruned,
            objects,
        })
    }

    pub async fn push(&self, remote: &str, refspecs: &[&str], options: &FetchOptions) -> Result<Vec<RefUpdate>> {
        let url = self.remote_url(remote)?;
        let transport = transport_for(&url)?;
        self.push_with(transport.as_ref(), remote, refspecs, options).await
    }

    /// Send commits and update remote references
    ///
    /// Refspecs take the form `[+]<src>[:<dst>]`; an empty `<src>` deletes
    /// `<dst>`. Without `+`, a remote branch may only move forward.
    #[instrument(skip(self, transport, options))]
    pub async fn push_with(
        &self,
        transport: &dyn Transport,
        remote: &str,
        refspecs: &[&str],
        options: &FetchOptions,
    ) -> Result<Vec<RefUpdate>> {
        let url = self.remote_url(remote)?;
        let advertised = transport
            .list_refs(&url, options)
            .await?
            .into_iter()
            .map(|remote_ref| (remote_ref.name, remote_ref.oid))
            .collect::<HashMap<_, _>>();

        let mut updates = Vec::with_capacity(refspecs.len());
        for refspec in refspecs {
            let (force, refspec) = match refspec.strip_prefix('+') {
                Some(refspec) => (true, refspec),
                None => (false, *refspec),
            };
            let (source, destination) = refspec.split_once(':').unwrap_or((refspec, refspec));

            let name = qualify_branch(destination)?;
            let old = advertised.get(&name).cloned();
            let new = match source {
                "" => None,
                source => Some(self.rev_parse(source)?),
            };

            if let (Some(old), Some(new), false) = (&old, &new, force)
                && old != new
                && !(self.database().exists(old) && is_ancestor(self.database(), self.refs(), old, new)?)
            {
                return Err(BitError::conflict(name.as_str(), "non-fast-forward update"));
            }

            updates.push(RefUpdate { name, old, new });
        }

        let known = advertised
            .values()
            .filter(|oid| self.database().exists(oid))
            .cloned()
            .collect::<Vec<_>>();
        let exclude = self
            .database()
            .reachable_objects(&known, &HashSet::new())?
            .into_iter()
            .collect::<HashSet<_>>();
        let tips = updates
            .iter()
            .filter_map(|update| update.new.clone())
            .collect::<Vec<_>>();

        let objects = self
            .database()
            .reachable_objects(&tips, &exclude)?
            .into_iter()
            .map(|oid| {
                let (kind, data) = self.database().read_raw(&oid)?;
                Ok(FetchedObject { oid, kind, data })
            })
            .collect::<Result<Vec<_>>>()?;
        let sent = objects.len();

        transport.push_objects(&url, objects, &updates, options).await?;

        for update in &updates {
            let Some(branch) = update.name.branch_name() else {
                continue;
            };
            let tracking = remote_tracking_ref(remote, &branch)?;
            match &update.new {
                Some(new) => self.refs().update(&tracking, new.clone(), Expected::Any)?,
                None => {
                    if self.refs().find(&tracking)?.is_some() {
                        self.refs().delete(&tracking, Expected::Any)?;
                    }
                }
            }
        }

        info!(updates = updates.len(), objects = sent, "pushed");
        Ok(updates)
    }

    fn remote_url(&self, remote: &str) -> Result<String> {
        self.config()?
            .get_str(&format!("remote.{remote}.url"))?
            .ok_or_else(|| BitError::NotFound(format!("remote {remote}")))
    }

    fn local_tips(&self) -> Result<Vec<ObjectId>> {
        let mut tips = self
            .refs()
            .list(Some(ReferenceKind::Direct))?
            .into_iter()
            .filter_map(|reference| reference.oid().cloned())
            .collect::<HashSet<_>>();
        tips.extend(self.refs().read_head()?);

        Ok(tips.into_iter().collect())
    }

    fn tracking_refs(&self, remote: &str) -> Result<HashMap<RefName, ObjectId>> {
        let prefix = format!("refs/remotes/{remote}/");

        Ok(self
            .refs()
            .list(Some(ReferenceKind::Direct))?
            .into_iter()
            .filter(|reference| reference.name().as_str().starts_with(&prefix))
            .filter_map(|reference| Some((reference.name().clone(), reference.oid()?.clone())))
            .collect())
    }
}

/// `main` and `refs/heads/main` both name the branch
fn qualify_branch(name: &str) -> Result<RefName> {
    if name.starts_with("refs/") {
        RefName::try_parse(name)
    } else {
        RefName::try_parse(format!("refs/heads/{name}"))
    }
}
