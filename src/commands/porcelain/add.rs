use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::error::{BitError, Result};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

impl Repository {
    /// Stage a file, or every file below a directory
    ///
    /// `path` is relative to the working tree root, or absolute below it.
    /// Paths that leave the working tree are `InvalidName`. The content is
    /// written to the object store before the index entry is updated.
    pub async fn add_path(&self, path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let workspace = self.workspace()?;
        let path = &worktree_relative(workspace.path(), path.as_ref())?;

        let stat = workspace.stat_file(path)?;
        let paths = if stat.mode.is_tree() {
            workspace
                .list_files()?
                .into_iter()
                .filter(|file| is_root(path) || file.starts_with(path))
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        let index = self.index();
        let mut index = index.lock().await;

        // Load the index file from the disk
        index.load()?;

        for path in &paths {
            let data = workspace.read_file(path)?;
            let stat = workspace.stat_file(path)?;

            let blob_id = self.write_blob(&data)?;
            debug!(path = %path.display(), blob = %blob_id, "staged file");
            index.add(IndexEntry::new(path.clone(), blob_id, stat));
        }

        index.save()?;

        Ok(paths)
    }

    /// Unstage a file or every tracked file below a directory
    ///
    /// The working tree is left alone. Untracked paths are `NotFound`.
    pub async fn remove_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let workspace = self.workspace()?;
        let path = &worktree_relative(workspace.path(), path.as_ref())?;

        let index = self.index();
        let mut index = index.lock().await;

        // Load the index file from the disk
        index.load()?;

        if !index.is_directly_tracked(path) {
            return Err(BitError::NotFound(format!("index entry {}", path.display())));
        }

        index.remove(path);
        index.save()?;

        Ok(())
    }
}

/// Lexically normalise `path` to a worktree-relative path
///
/// Only plain names survive; `.` is dropped and anything climbing out of
/// the root is rejected.
fn worktree_relative(root: &Path, path: &Path) -> Result<PathBuf> {
    let outside = || BitError::InvalidName(format!("{} is outside the working tree", path.display()));

    let relative = if path.is_absolute() {
        path.strip_prefix(root).map_err(|_| outside())?
    } else {
        path
    };

    let mut normalised = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => normalised.push(name),
            Component::CurDir => {}
            _ => return Err(outside()),
        }
    }

    Ok(normalised)
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new(".")
}
