use crate::areas::config::Config;
use crate::areas::refs::{RefTarget, Refs};
use crate::areas::repository::{GIT_DIR, Repository};
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
use crate::error::{BitError, Result};
use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::info;

const DEFAULT_BRANCH: &str = "master";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    pub bare: bool,
    /// Branch the unborn `HEAD` points at
    pub initial_head: String,
    pub object_format: HashAlgorithm,
}

impl Default for InitOptions {
    fn default() -> Self {
        InitOptions {
            bare: false,
            initial_head: DEFAULT_BRANCH.to_string(),
            object_format: HashAlgorithm::Sha1,
        }
    }
}

impl Repository {
    /// Create an empty repository at `path`
    ///
    /// A non-bare repository keeps its git directory in `<path>/.git`; a bare
    /// one uses `path` itself. Fails with `AlreadyExists` if a repository is
    /// already there.
    pub fn init(path: impl AsRef<Path>, options: InitOptions) -> Result<Repository> {
        let path = path.as_ref();
        let initial_head = BranchName::try_parse(options.initial_head.as_str())?;

        let git_dir = if options.bare {
            path.to_path_buf()
        } else {
            path.join(GIT_DIR)
        };
        if Repository::is_git_dir(&git_dir) {
            return Err(BitError::AlreadyExists(format!("repository at {}", git_dir.display())));
        }

        for dir in ["objects", "refs/heads", "refs/tags"] {
            fs::create_dir_all(git_dir.join(dir))
                .with_context(|| format!("Failed to create {}", git_dir.join(dir).display()))?;
        }

        let mut config = Config::load(git_dir.join("config").into_boxed_path())?;
        let format_version = match options.object_format {
            HashAlgorithm::Sha1 => 0,
            HashAlgorithm::Sha256 => 1,
        };
        config.set_i64("core.repositoryformatversion", format_version)?;
        config.set_bool("core.filemode", true)?;
        config.set_bool("core.bare", options.bare)?;
        if options.object_format == HashAlgorithm::Sha256 {
            config.set_str("extensions.objectformat", options.object_format.as_str())?;
        }

        Refs::new(git_dir.clone().into_boxed_path())
            .set_head(RefTarget::Symbolic(initial_head.to_ref_name()))
            .context("Failed to create initial HEAD reference")?;

        info!(
            path = %git_dir.display(),
            bare = options.bare,
            head = %initial_head,
            "initialized empty repository"
        );

        Repository::open(&git_dir)
    }
}
