//! References (branches, HEAD, tags, remote-tracking refs)
//!
//! A reference is either direct (an object id) or symbolic (the name of
//! another reference). Loose references are files under the git directory
//! holding `<oid>` or `ref: <name>`; `packed-refs` holds one `<oid> <name>`
//! line per reference and is consulted when no loose file exists.
//!
//! ## Updates
//!
//! Every write goes through `<name>.lock`, created exclusively. Holding the
//! lock, the store compares the current value with the caller's expectation,
//! writes the new value into the lock file and renames it over the
//! reference. A writer that cannot create the lock, or finds an unexpected
//! value, fails with [`BitError::Conflict`].

use crate::artifacts::branch::branch_name::{BranchName, RefName};
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::{BitError, Result};
use anyhow::Context;
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const SYMREF_PREFIX: &str = "ref: ";
const PACKED_REFS: &str = "packed-refs";
const PACKED_REFS_HEADER: &str = "# pack-refs with: peeled fully-peeled sorted";
const LOCK_SUFFIX: &str = ".lock";

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefTarget {
    Direct(ObjectId),
    Symbolic(RefName),
}

impl RefTarget {
    fn serialize(&self) -> String {
        match self {
            RefTarget::Direct(oid) => format!("{oid}\n"),
            RefTarget::Symbolic(name) => format!("{SYMREF_PREFIX}{name}\n"),
        }
    }

    fn parse(content: &str) -> Result<Option<Self>> {
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        match content.strip_prefix(SYMREF_PREFIX) {
            Some(target) => Ok(Some(RefTarget::Symbolic(RefName::try_parse(target.trim())?))),
            None => Ok(Some(RefTarget::Direct(ObjectId::try_parse(content)?))),
        }
    }
}

impl std::fmt::Display for RefTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefTarget::Direct(oid) => write!(f, "{oid}"),
            RefTarget::Symbolic(name) => write!(f, "{SYMREF_PREFIX}{name}"),
        }
    }
}

/// Kind filter for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Direct,
    Symbolic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: RefName,
    target: RefTarget,
}

impl Reference {
    pub fn new(name: RefName, target: RefTarget) -> Self {
        Reference { name, target }
    }

    pub fn name(&self) -> &RefName {
        &self.name
    }

    pub fn target(&self) -> &RefTarget {
        &self.target
    }

    pub fn kind(&self) -> ReferenceKind {
        match self.target {
            RefTarget::Direct(_) => ReferenceKind::Direct,
            RefTarget::Symbolic(_) => ReferenceKind::Symbolic,
        }
    }

    /// The object id of a direct reference
    pub fn oid(&self) -> Option<&ObjectId> {
        match &self.target {
            RefTarget::Direct(oid) => Some(oid),
            RefTarget::Symbolic(_) => None,
        }
    }

    /// The target name of a symbolic reference
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match &self.target {
            RefTarget::Symbolic(name) => Some(name),
            RefTarget::Direct(_) => None,
        }
    }
}

/// Expected current value for a compare-and-swap update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// Overwrite whatever is there
    Any,
    /// The reference must not exist yet
    Absent,
    /// The reference must currently hold exactly this value
    Value(RefTarget),
}

impl Expected {
    pub fn oid(oid: ObjectId) -> Self {
        Expected::Value(RefTarget::Direct(oid))
    }

    /// `Value` for `Some`, `Absent` for `None`
    pub fn from_current(current: Option<ObjectId>) -> Self {
        current.map(Self::oid).unwrap_or(Expected::Absent)
    }

    fn check(&self, name: &RefName, current: Option<&RefTarget>) -> Result<()> {
        match (self, current) {
            (Expected::Any, _) | (Expected::Absent, None) => Ok(()),
            (Expected::Value(expected), Some(current)) if expected == current => Ok(()),
            (Expected::Absent, Some(current)) => Err(BitError::conflict(
                name.as_str(),
                format!("expected no value, found {current}"),
            )),
            (Expected::Value(expected), current) => Err(BitError::conflict(
                name.as_str(),
                format!(
                    "expected {expected}, found {}",
                    current.map(ToString::to_string).unwrap_or_else(|| "nothing".into())
                ),
            )),
        }
    }
}

/// Exclusive `<name>.lock` file, removed on drop unless committed
struct RefLock {
    lock_path: PathBuf,
    target_path: PathBuf,
    file: Option<std::fs::File>,
}

impl RefLock {
    fn acquire(name: &str, target_path: PathBuf) -> Result<Self> {
        let mut lock_path = target_path.clone().into_os_string();
        lock_path.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_path);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory for {name}"))?;
        }

        let file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(BitError::conflict(name, "reference is locked by another writer"));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(RefLock {
            lock_path,
            target_path,
            file: Some(file),
        })
    }

    fn commit(mut self, content: &[u8]) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.write_all(content)?;
            file.sync_all()?;
        }

        if let Err(err) = std::fs::rename(&self.lock_path, &self.target_path) {
            let _ = std::fs::remove_file(&self.lock_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if self.file.is_some() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Refs {
    /// The git directory; ref names are paths relative to it
    path: Box<Path>,
}

impl Refs {
    pub fn new(path: Box<Path>) -> Self {
        Refs { path }
    }

    fn ref_path(&self, name: &RefName) -> PathBuf {
        self.path.join(name.as_str())
    }

    fn packed_refs_path(&self) -> PathBuf {
        self.path.join(PACKED_REFS)
    }

    fn read_loose(&self, name: &RefName) -> Result<Option<RefTarget>> {
        let path = self.ref_path(name);

        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read ref file at {:?}", path))?;
        RefTarget::parse(&content)
    }

    fn read_packed(&self) -> Result<BTreeMap<RefName, ObjectId>> {
        let content = match std::fs::read_to_string(self.packed_refs_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };

        let mut packed = BTreeMap::new();
        for line in content.lines() {
            // header and peeled tag lines
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }

            let (oid, name) = line
                .split_once(' ')
                .with_context(|| format!("malformed packed-refs line: {line}"))?;
            packed.insert(RefName::try_parse(name)?, ObjectId::try_parse(oid)?);
        }

        Ok(packed)
    }

    fn read_target(&self, name: &RefName) -> Result<Option<RefTarget>> {
        if let Some(target) = self.read_loose(name)? {
            return Ok(Some(target));
        }

        Ok(self.read_packed()?.remove(name).map(RefTarget::Direct))
    }

    /// Look up a reference without following it
    pub fn find(&self, name: &RefName) -> Result<Option<Reference>> {
        Ok(self
            .read_target(name)?
            .map(|target| Reference::new(name.clone(), target)))
    }

    pub fn get(&self, name: &RefName) -> Result<Reference> {
        self.find(name)?
            .ok_or_else(|| BitError::NotFound(format!("reference {name}")))
    }

    /// Follow symbolic references from `name`
    ///
    /// Returns the last name in the chain and its value, `None` when that
    /// name has no entry (an unborn branch).
    fn follow(&self, name: &RefName) -> Result<(RefName, Option<ObjectId>)> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = name.clone();

        loop {
            if !visited.insert(current.clone()) {
                chain.push(current.to_string());
                warn!(chain = ?chain, "reference cycle");
                return Err(BitError::ReferenceCycle { chain });
            }
            chain.push(current.to_string());

            match self.read_target(&current)? {
                Some(RefTarget::Symbolic(next)) => current = next,
                Some(RefTarget::Direct(oid)) => return Ok((current, Some(oid))),
                None => return Ok((current, None)),
            }
        }
    }

    /// Resolve a reference to an object id through any symbolic chain
    pub fn resolve(&self, name: &RefName) -> Result<ObjectId> {
        let (terminal, oid) = self.follow(name)?;

        match oid {
            Some(oid) => Ok(oid),
            None if &terminal == name => Err(BitError::NotFound(format!("reference {name}"))),
            None => Err(BitError::DanglingReference {
                name: name.to_string(),
                target: terminal.to_string(),
            }),
        }
    }

    /// Like [`Refs::resolve`], but missing and unborn references give `None`
    pub fn try_resolve(&self, name: &RefName) -> Result<Option<ObjectId>> {
        Ok(self.follow(name)?.1)
    }

    /// The name a write to `name` would land on after following symrefs
    pub fn terminal_name(&self, name: &RefName) -> Result<RefName> {
        Ok(self.follow(name)?.0)
    }

    /// Atomically set `name` to `target` if its current value matches `expected`
    pub fn set(&self, name: &RefName, target: RefTarget, expected: Expected) -> Result<()> {
        let lock = RefLock::acquire(name.as_str(), self.ref_path(name))?;

        let current = self.read_target(name)?;
        if let Err(err) = expected.check(name, current.as_ref()) {
            debug!(name = %name, %err, "ref update rejected");
            return Err(err);
        }

        lock.commit(target.serialize().as_bytes())?;
        debug!(name = %name, target = %target, "updated ref");

        Ok(())
    }

    /// Point the reference `name` resolves to at `oid`
    ///
    /// `HEAD` on a branch updates the branch; an unborn branch is created.
    pub fn update(&self, name: &RefName, oid: ObjectId, expected: Expected) -> Result<()> {
        let terminal = self.terminal_name(name)?;
        self.set(&terminal, RefTarget::Direct(oid), expected)
    }

    /// Point `HEAD` at a branch, or detach it at a commit
    pub fn set_head(&self, target: RefTarget) -> Result<()> {
        self.set(&RefName::head(), target, Expected::Any)
    }

    pub fn head(&self) -> Result<Reference> {
        self.get(&RefName::head())
    }

    /// The commit `HEAD` resolves to, `None` while the branch is unborn
    pub fn read_head(&self) -> Result<Option<ObjectId>> {
        self.try_resolve(&RefName::head())
    }

    /// The checked-out branch, `None` when `HEAD` is detached
    pub fn current_branch(&self) -> Result<Option<BranchName>> {
        Ok(self
            .head()?
            .symbolic_target()
            .and_then(RefName::branch_name))
    }

    pub fn is_current_branch(&self, branch_name: &BranchName) -> Result<bool> {
        Ok(self.current_branch()?.as_ref() == Some(branch_name))
    }

    /// Remove a reference, loose and packed
    pub fn delete(&self, name: &RefName, expected: Expected) -> Result<()> {
        let lock = RefLock::acquire(name.as_str(), self.ref_path(name))?;

        let current = self.read_target(name)?;
        expected.check(name, current.as_ref())?;
        if current.is_none() {
            return Err(BitError::NotFound(format!("reference {name}")));
        }

        let path = self.ref_path(name);
        if path.is_file() {
            std::fs::remove_file(&path)
                .with_context(|| format!("failed to delete ref file at {:?}", path))?;
        }
        self.remove_packed(name)?;
        drop(lock);

        self.prune_empty_parent_dirs(&path)?;
        debug!(name = %name, "deleted ref");

        Ok(())
    }

    /// Drop `name` and its peeled line from packed-refs, keeping every other
    /// line as it was
    fn remove_packed(&self, name: &RefName) -> Result<()> {
        let lock = RefLock::acquire(PACKED_REFS, self.packed_refs_path())?;
        let content = match std::fs::read_to_string(self.packed_refs_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut kept = String::with_capacity(content.len());
        let mut removed = false;
        let mut skipping = false;
        for line in content.lines() {
            if line.starts_with('^') {
                if !skipping {
                    kept.push_str(line);
                    kept.push('\n');
                }
                continue;
            }

            skipping = !line.starts_with('#')
                && line
                    .split_once(' ')
                    .is_some_and(|(_, packed)| packed == name.as_str());
            if skipping {
                removed = true;
            } else {
                kept.push_str(line);
                kept.push('\n');
            }
        }

        if !removed {
            return Ok(());
        }
        lock.commit(kept.as_bytes())
    }

    pub fn create_branch(&self, name: &BranchName, start: ObjectId, force: bool) -> Result<Reference> {
        let ref_name = name.to_ref_name();
        let expected = if force { Expected::Any } else { Expected::Absent };

        match self.set(&ref_name, RefTarget::Direct(start.clone()), expected) {
            Err(BitError::Conflict { .. }) if !force && self.find(&ref_name)?.is_some() => {
                Err(BitError::AlreadyExists(format!("branch {name}")))
            }
            result => result.map(|_| Reference::new(ref_name, RefTarget::Direct(start))),
        }
    }

    pub fn delete_branch(&self, name: &BranchName) -> Result<ObjectId> {
        let ref_name = name.to_ref_name();
        let oid = self.resolve(&ref_name)?;

        self.delete(&ref_name, Expected::oid(oid.clone()))?;
        Ok(oid)
    }

    /// Every reference except `HEAD`, loose entries shadowing packed ones
    ///
    /// Sorted by name; `kind` restricts the listing to one kind.
    pub fn list(&self, kind: Option<ReferenceKind>) -> Result<Vec<Reference>> {
        let mut refs = self
            .read_packed()?
            .into_iter()
            .map(|(name, oid)| (name, RefTarget::Direct(oid)))
            .collect::<BTreeMap<_, _>>();

        for name in self.list_loose()? {
            if let Some(target) = self.read_loose(&name)? {
                refs.insert(name, target);
            }
        }

        Ok(refs
            .into_iter()
            .map(|(name, target)| Reference::new(name, target))
            .filter(|reference| kind.is_none_or(|kind| reference.kind() == kind))
            .collect())
    }

    pub fn list_branches(&self) -> Result<Vec<BranchName>> {
        Ok(self
            .list(None)?
            .iter()
            .filter_map(|reference| reference.name().branch_name())
            .collect())
    }

    /// Whether any reference other than `HEAD` exists
    pub fn has_any(&self) -> Result<bool> {
        Ok(!self.list(None)?.is_empty())
    }

    fn list_loose(&self) -> Result<Vec<RefName>> {
        let refs_path = self.path.join("refs");

        Ok(WalkDir::new(&refs_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| !entry.path().to_string_lossy().ends_with(LOCK_SUFFIX))
            .filter_map(|entry| {
                let relative_path = entry.path().strip_prefix(self.path.as_ref()).ok()?;
                RefName::try_parse(relative_path.to_string_lossy().to_string()).ok()
            })
            .collect())
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> Result<()> {
        let refs_path = self.path.join("refs");

        // refs/ and its immediate children (heads, tags, remotes) stay
        if let Some(parent) = path.parent()
            && let Ok(relative) = parent.strip_prefix(&refs_path)
            && relative.components().count() > 1
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent).with_context(|| {
                format!("failed to remove empty ref directory at {:?}", parent)
            })?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
    use assert_fs::TempDir;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn refs() -> (TempDir, Refs) {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("refs/heads")).unwrap();
        let refs = Refs::new(temp_dir.path().into());
        refs.set_head(RefTarget::Symbolic(RefName::try_parse("refs/heads/master").unwrap()))
            .unwrap();

        (temp_dir, refs)
    }

    fn oid(seed: &str) -> ObjectId {
        HashAlgorithm::Sha1.digest(seed.as_bytes())
    }

    fn name(name: &str) -> RefName {
        RefName::try_parse(name).unwrap()
    }

    #[rstest]
    fn unborn_head_resolves_to_nothing(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;

        assert_eq!(refs.read_head().unwrap(), None);
        assert!(matches!(
            refs.resolve(&RefName::head()),
            Err(BitError::DanglingReference { .. })
        ));
        assert!(matches!(refs.get(&name("refs/heads/nope")), Err(BitError::NotFound(_))));
    }

    #[rstest]
    fn update_through_head_moves_the_branch(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;

        refs.update(&RefName::head(), oid("one"), Expected::Absent).unwrap();

        assert_eq!(refs.resolve(&name("refs/heads/master")).unwrap(), oid("one"));
        assert_eq!(refs.head().unwrap().kind(), ReferenceKind::Symbolic);
        assert_eq!(
            refs.current_branch().unwrap(),
            Some(BranchName::try_parse("master").unwrap())
        );
    }

    #[rstest]
    fn compare_and_swap_rejects_stale_expectations(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        let master = name("refs/heads/master");
        refs.update(&master, oid("one"), Expected::Absent).unwrap();

        refs.update(&master, oid("two"), Expected::oid(oid("one"))).unwrap();
        let stale = refs.update(&master, oid("three"), Expected::oid(oid("one")));

        assert!(stale.unwrap_err().is_conflict());
        assert_eq!(refs.resolve(&master).unwrap(), oid("two"));
        assert!(refs.update(&master, oid("three"), Expected::Absent).is_err());
    }

    #[rstest]
    fn held_lock_is_a_conflict(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        std::fs::write(dir.path().join("refs/heads/master.lock"), "").unwrap();

        let result = refs.update(&name("refs/heads/master"), oid("one"), Expected::Any);

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(refs.list(None).unwrap(), vec![]);
    }

    #[rstest]
    fn symbolic_cycles_are_detected(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        refs.set(
            &name("refs/heads/a"),
            RefTarget::Symbolic(name("refs/heads/b")),
            Expected::Any,
        )
        .unwrap();
        refs.set(
            &name("refs/heads/b"),
            RefTarget::Symbolic(name("refs/heads/a")),
            Expected::Any,
        )
        .unwrap();

        match refs.resolve(&name("refs/heads/a")) {
            Err(BitError::ReferenceCycle { chain }) => {
                assert_eq!(chain, vec!["refs/heads/a", "refs/heads/b", "refs/heads/a"])
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[rstest]
    fn packed_refs_are_read_and_shadowed(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        std::fs::write(
            dir.path().join(PACKED_REFS),
            format!(
                "{PACKED_REFS_HEADER}\n{} refs/heads/master\n{} refs/tags/v1\n^{}\n",
                oid("packed"),
                oid("tag"),
                oid("peeled")
            ),
        )
        .unwrap();

        assert_eq!(refs.read_head().unwrap(), Some(oid("packed")));

        refs.update(&RefName::head(), oid("loose"), Expected::oid(oid("packed")))
            .unwrap();
        let listed = refs
            .list(Some(ReferenceKind::Direct))
            .unwrap()
            .into_iter()
            .map(|reference| (reference.name().to_string(), reference.oid().cloned()))
            .collect::<Vec<_>>();

        assert_eq!(
            listed,
            vec![
                ("refs/heads/master".to_string(), Some(oid("loose"))),
                ("refs/tags/v1".to_string(), Some(oid("tag"))),
            ]
        );
    }

    #[rstest]
    fn deleting_a_packed_ref_keeps_other_peeled_lines(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        let packed_path = dir.path().join(PACKED_REFS);
        std::fs::write(
            &packed_path,
            format!(
                "{PACKED_REFS_HEADER}\n{} refs/tags/v0\n^{}\n{} refs/tags/v1\n^{}\n",
                oid("old tag"),
                oid("old peeled"),
                oid("tag"),
                oid("peeled")
            ),
        )
        .unwrap();

        refs.delete(&name("refs/tags/v0"), Expected::oid(oid("old tag")))
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&packed_path).unwrap(),
            format!(
                "{PACKED_REFS_HEADER}\n{} refs/tags/v1\n^{}\n",
                oid("tag"),
                oid("peeled")
            )
        );
        assert!(!dir.path().join("packed-refs.lock").exists());
    }

    #[rstest]
    fn branches_are_created_once_unless_forced(refs: (TempDir, Refs)) {
        let (_dir, refs) = refs;
        let feature = BranchName::try_parse("feature/x").unwrap();

        refs.create_branch(&feature, oid("one"), false).unwrap();
        assert!(matches!(
            refs.create_branch(&feature, oid("two"), false),
            Err(BitError::AlreadyExists(_))
        ));
        refs.create_branch(&feature, oid("two"), true).unwrap();

        assert_eq!(refs.list_branches().unwrap(), vec![feature.clone()]);
        assert_eq!(refs.delete_branch(&feature).unwrap(), oid("two"));
        assert!(refs.list_branches().unwrap().is_empty());
    }

    #[rstest]
    fn deleting_a_packed_branch_rewrites_packed_refs(refs: (TempDir, Refs)) {
        let (dir, refs) = refs;
        std::fs::write(
            dir.path().join(PACKED_REFS),
            format!("{} refs/heads/old\n{} refs/heads/keep\n", oid("old"), oid("keep")),
        )
        .unwrap();

        refs.delete_branch(&BranchName::try_parse("old").unwrap()).unwrap();

        assert_eq!(
            refs.list_branches().unwrap(),
            vec![BranchName::try_parse("keep").unwrap()]
        );
    }
}
