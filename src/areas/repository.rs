//! Repository handle
//!
//! Ties the object database, references, index and working tree of one
//! repository together. Every operation goes through an explicit handle;
//! there is no process-wide "current repository".
//!
//! The handle is `Send + Sync`. References and objects are shared state
//! guarded on disk (lock files, atomic renames); the index is exclusive to
//! the handle and mutated only under its mutex.

use crate::areas::config::Config;
use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::refs::{Reference, ReferenceKind, Refs};
use crate::areas::workspace::Workspace;
use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::log::rev_walk::RevWalk;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::signature::Signature;
use crate::artifacts::objects::tree::Tree;
use crate::error::{BitError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub(crate) const GIT_DIR: &str = ".git";
const CONFIG_FILE: &str = "config";
const HEAD_FILE: &str = "HEAD";
const INDEX_FILE: &str = "index";
const OBJECTS_DIR: &str = "objects";
const REFS_DIR: &str = "refs";

/// In-progress operation recorded in the git directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryState {
    Clean,
    Merge,
    Revert,
    CherryPick,
    Bisect,
    Rebase,
    RebaseInteractive,
    RebaseMerge,
    ApplyMailbox,
}

#[derive(Debug)]
pub struct Repository {
    git_dir: Box<Path>,
    workdir: Option<Box<Path>>,
    algorithm: HashAlgorithm,
    index: Arc<Mutex<Index>>,
    database: Database,
    workspace: Option<Workspace>,
    refs: Refs,
}

impl Repository {
    /// Open the repository at `path`
    ///
    /// `path` may be a working tree (or any directory below one), a `.git`
    /// directory, or a bare repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = path
            .canonicalize()
            .map_err(|_| BitError::NotFound(format!("repository at {}", path.display())))?;

        for candidate in path.ancestors() {
            let dot_git = candidate.join(GIT_DIR);
            if Self::is_git_dir(&dot_git) {
                return Self::load(dot_git, Some(candidate.to_path_buf()));
            }

            if Self::is_git_dir(candidate) {
                let config = Config::load(candidate.join(CONFIG_FILE).into_boxed_path())?;
                let bare = config.get_bool("core.bare")?.unwrap_or(false);
                let workdir = match candidate.parent() {
                    Some(parent) if !bare && candidate.file_name() == Some(GIT_DIR.as_ref()) => {
                        Some(parent.to_path_buf())
                    }
                    _ => None,
                };
                return Self::load(candidate.to_path_buf(), workdir);
            }
        }

        Err(BitError::NotFound(format!(
            "repository at {} (or any parent directory)",
            path.display()
        )))
    }

    pub(crate) fn is_git_dir(path: &Path) -> bool {
        path.join(HEAD_FILE).is_file() && path.join(OBJECTS_DIR).is_dir() && path.join(REFS_DIR).is_dir()
    }

    fn load(git_dir: PathBuf, workdir: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(git_dir.join(CONFIG_FILE).into_boxed_path())?;
        let algorithm = match config.get_str("extensions.objectformat")? {
            Some(format) => HashAlgorithm::try_parse(&format)?,
            None => HashAlgorithm::Sha1,
        };

        debug!(git_dir = %git_dir.display(), algorithm = algorithm.as_str(), "opened repository");

        Ok(Repository {
            index: Arc::new(Mutex::new(Index::new(
                git_dir.join(INDEX_FILE).into_boxed_path(),
                algorithm,
            ))),
            database: Database::new(git_dir.join(OBJECTS_DIR).into_boxed_path(), algorithm),
            workspace: workdir
                .as_ref()
                .map(|workdir| Workspace::new(workdir.clone().into_boxed_path())),
            refs: Refs::new(git_dir.clone().into_boxed_path()),
            workdir: workdir.map(PathBuf::into_boxed_path),
            git_dir: git_dir.into_boxed_path(),
            algorithm,
        })
    }

    /// The git directory (`.git`, or the repository itself when bare)
    pub fn path(&self) -> &Path {
        &self.git_dir
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn is_bare(&self) -> bool {
        self.workdir.is_none()
    }

    /// True until the first reference is written
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.refs.read_head()?.is_none() && !self.refs.has_any()?)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn state(&self) -> RepositoryState {
        let git_dir = &self.git_dir;
        let rebase_merge = git_dir.join("rebase-merge");
        let rebase_apply = git_dir.join("rebase-apply");

        if rebase_merge.join("interactive").is_file() {
            RepositoryState::RebaseInteractive
        } else if rebase_merge.is_dir() {
            RepositoryState::RebaseMerge
        } else if rebase_apply.join("applying").is_file() {
            RepositoryState::ApplyMailbox
        } else if rebase_apply.is_dir() {
            RepositoryState::Rebase
        } else if git_dir.join("MERGE_HEAD").is_file() {
            RepositoryState::Merge
        } else if git_dir.join("REVERT_HEAD").is_file() {
            RepositoryState::Revert
        } else if git_dir.join("CHERRY_PICK_HEAD").is_file() {
            RepositoryState::CherryPick
        } else if git_dir.join("BISECT_LOG").is_file() {
            RepositoryState::Bisect
        } else {
            RepositoryState::Clean
        }
    }

    /// The ref namespace from `GIT_NAMESPACE`, if set
    pub fn namespace(&self) -> Option<String> {
        std::env::var("GIT_NAMESPACE")
            .ok()
            .filter(|namespace| !namespace.is_empty())
    }

    /// The repository configuration, read fresh from disk
    pub fn config(&self) -> Result<Config> {
        Config::load(self.git_dir.join(CONFIG_FILE).into_boxed_path())
    }

    /// Default identity from `user.name` / `user.email`, stamped now
    ///
    /// The `GIT_AUTHOR_*` environment variables take precedence.
    pub fn signature(&self) -> Result<Signature> {
        let config = self.config()?;
        let name = std::env::var("GIT_AUTHOR_NAME")
            .ok()
            .or(config.get_str("user.name")?)
            .ok_or_else(|| BitError::NotFound("config value user.name".into()))?;
        let email = std::env::var("GIT_AUTHOR_EMAIL")
            .ok()
            .or(config.get_str("user.email")?)
            .ok_or_else(|| BitError::NotFound("config value user.email".into()))?;

        Ok(Signature::now(name, email).overlay_env())
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// The working tree, or `BareRepository` for bare repositories
    pub fn workspace(&self) -> Result<&Workspace> {
        self.workspace
            .as_ref()
            .ok_or_else(|| BitError::BareRepository(self.git_dir.display().to_string()))
    }

    pub fn find_commit(&self, oid: &ObjectId) -> Result<Commit> {
        self.database.parse_object_as_commit(oid)
    }

    pub fn find_tree(&self, oid: &ObjectId) -> Result<Tree> {
        self.database.parse_object_as_tree(oid)
    }

    pub fn find_blob(&self, oid: &ObjectId) -> Result<Blob> {
        self.database.parse_object_as_blob(oid)
    }

    /// Tip commit of a branch, given as `refs/heads/x` or plain `x`
    pub fn get_branch_commit(&self, name: &str) -> Result<(ObjectId, Commit)> {
        let branch = BranchName::from_ref_or_short(name)?;
        let oid = self.refs.resolve(&branch.to_ref_name())?;
        let commit = self.find_commit(&oid)?;

        Ok((oid, commit))
    }

    pub fn head(&self) -> Result<Reference> {
        self.refs.head()
    }

    /// The checked-out branch, `None` when `HEAD` is detached
    pub fn current_branch(&self) -> Result<Option<BranchName>> {
        self.refs.current_branch()
    }

    pub fn get_reference(&self, name: &str) -> Result<Reference> {
        self.refs.get(&RefName::try_parse(name)?)
    }

    /// Names of every reference, optionally only of one kind
    pub fn get_reference_names(&self, kind: Option<ReferenceKind>) -> Result<Vec<String>> {
        Ok(self
            .refs
            .list(kind)?
            .into_iter()
            .map(|reference| reference.name().to_string())
            .collect())
    }

    /// Resolve a revision expression (`main`, `HEAD~2`, an id prefix) to a commit
    pub fn rev_parse(&self, revision: &str) -> Result<ObjectId> {
        Revision::try_parse(revision)?.resolve(&self.refs, &self.database)
    }

    pub fn revwalk(&self) -> RevWalk<'_> {
        RevWalk::new(&self.database, &self.refs)
    }

    /// Best common ancestor of two commits, `None` for unrelated histories
    pub fn merge_base(&self, one: &ObjectId, two: &ObjectId) -> Result<Option<ObjectId>> {
        let finder = BCAFinder::new(|oid: &ObjectId| -> Result<SlimCommit> {
            Ok(self.find_commit(oid)?.to_slim(oid.clone()))
        });
        finder.find_best_common_ancestor(one, two)
    }
}
