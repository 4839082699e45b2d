//! Working tree access
//!
//! All paths taken and returned are relative to the working tree root.

use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use crate::error::{BitError, Result};
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 1] = [".git"];

#[derive(Debug, Clone)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_blob(&self, path: &Path) -> Result<Blob> {
        Ok(Blob::new(self.read_file(path)?))
    }

    /// Direct children of a directory, `.git` excluded
    pub fn list_directory(&self, dir_path: &Path) -> Result<Vec<PathBuf>> {
        let absolute = self.path.join(dir_path);

        let mut children = std::fs::read_dir(&absolute)
            .with_context(|| format!("Unable to list {}", absolute.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| self.relative_unless_ignored(&entry.path()))
            .collect::<Vec<_>>();
        children.sort();

        Ok(children)
    }

    /// Every file below the root, `.git` excluded
    pub fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = WalkDir::new(&self.path)
            .into_iter()
            .filter_entry(|entry| !Self::is_ignored(entry.path()))
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_type().is_dir())
            .filter_map(|entry| self.relative_unless_ignored(entry.path()))
            .collect::<Vec<_>>();
        files.sort();

        Ok(files)
    }

    fn is_ignored(path: &Path) -> bool {
        path.file_name()
            .map(|name| IGNORED_PATHS.contains(&name.to_string_lossy().as_ref()))
            .unwrap_or(false)
    }

    fn relative_unless_ignored(&self, path: &Path) -> Option<PathBuf> {
        if Self::is_ignored(path) {
            return None;
        }

        Some(path.strip_prefix(self.path.as_ref()).ok()?.to_path_buf())
    }

    /// File content, or the link target for symbolic links
    pub fn read_file(&self, file_path: &Path) -> Result<Bytes> {
        let path = self.path.join(file_path);

        let metadata = std::fs::symlink_metadata(&path).map_err(|err| Self::not_found(err, file_path))?;
        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&path)?;
            return Ok(Bytes::copy_from_slice(target.as_os_str().as_bytes()));
        }

        Ok(std::fs::read(&path).map_err(|err| Self::not_found(err, file_path))?.into())
    }

    fn not_found(err: std::io::Error, file_path: &Path) -> BitError {
        if err.kind() == std::io::ErrorKind::NotFound {
            BitError::NotFound(format!("path {}", file_path.display()))
        } else {
            err.into()
        }
    }

    pub fn stat_file(&self, file_path: &Path) -> Result<EntryMetadata> {
        let metadata = std::fs::symlink_metadata(self.path.join(file_path))
            .map_err(|err| Self::not_found(err, file_path))?;

        Ok((self.path.join(file_path).as_path(), metadata).try_into()?)
    }

    /// Write content at a path, creating parent directories as needed
    pub fn write_file(&self, file_path: &Path, data: &[u8], mode: EntryMode) -> Result<()> {
        let path = self.path.join(file_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if std::fs::symlink_metadata(&path).is_ok() {
            self.remove_file(file_path)?;
        }

        if mode.is_symlink() {
            let target = std::ffi::OsStr::from_bytes(data);
            std::os::unix::fs::symlink(target, &path)
                .with_context(|| format!("Failed to create link: {:?}", file_path))?;
            return Ok(());
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("Failed to open file: {:?}", file_path))?;
        file.write_all(data)
            .with_context(|| format!("Failed to write to file: {:?}", file_path))?;

        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(if mode.is_executable() { 0o755 } else { 0o644 });
        std::fs::set_permissions(&path, permissions)
            .with_context(|| format!("Failed to set permissions for file: {:?}", file_path))?;

        Ok(())
    }

    /// Remove a file, or a whole directory standing where a file should go
    pub fn remove_file(&self, file_path: &Path) -> Result<()> {
        let path = self.path.join(file_path);

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(&path)?,
            Ok(_) => std::fs::remove_file(&path)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    // The order of applying migrations is important:
    // deletions first, then emptied directories deepest first, then new
    // directories shallowest first, then file writes.
    pub fn apply_migration(&self, migration: &Migration) -> Result<()> {
        for (file_path, _) in migration.actions(ActionType::Delete) {
            self.remove_file(file_path)?;
        }

        for dir_path in migration.rmdirs().iter().rev() {
            self.remove_directory_if_empty(dir_path)?;
        }

        for dir_path in migration.mkdirs() {
            self.make_directory(dir_path)?;
        }

        for action in [ActionType::Modify, ActionType::Add] {
            for (file_path, entry) in migration.actions(action) {
                let entry = entry
                    .as_ref()
                    .with_context(|| format!("Missing target entry for {}", file_path.display()))?;
                let data = migration.load_blob_data(&entry.oid)?;

                self.write_file(file_path, &data, entry.mode)?;
            }
        }

        Ok(())
    }

    fn remove_directory_if_empty(&self, dir_path: &Path) -> Result<()> {
        let dir_path = self.path.join(dir_path);

        match std::fs::read_dir(&dir_path) {
            Ok(mut entries) => {
                if entries.next().is_none() {
                    std::fs::remove_dir(&dir_path)?
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn make_directory(&self, dir_path: &Path) -> Result<()> {
        let dir_path = self.path.join(dir_path);

        match std::fs::symlink_metadata(&dir_path) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                std::fs::remove_file(&dir_path)?;
                std::fs::create_dir(&dir_path)?;
            }
            Err(_) => std::fs::create_dir_all(&dir_path)?,
        }

        Ok(())
    }
}
