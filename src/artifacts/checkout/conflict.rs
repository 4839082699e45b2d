use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConflictType {
    StaleFile,
    StaleDirectory,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictType {
    pub fn get_conflict_type(
        stat: Option<&EntryMetadata>,
        entry: Option<&IndexEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> ConflictType {
        if entry.is_some() {
            ConflictType::StaleFile
        } else if let Some(stat) = stat
            && stat.mode.is_tree()
        {
            ConflictType::StaleDirectory
        } else if new_entry.is_some() {
            ConflictType::UntrackedOverwritten
        } else {
            ConflictType::UntrackedRemoved
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConflictType::StaleFile => "local changes would be overwritten",
            ConflictType::StaleDirectory => "directory holds untracked files",
            ConflictType::UntrackedOverwritten => "untracked file would be overwritten",
            ConflictType::UntrackedRemoved => "untracked file would be removed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
    use rstest::rstest;

    fn dir_stat() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::Directory,
            ..Default::default()
        }
    }

    fn file_stat() -> EntryMetadata {
        EntryMetadata {
            mode: EntryMode::File(FileMode::Regular),
            ..Default::default()
        }
    }

    #[rstest]
    fn tracked_entries_are_stale_files() {
        let entry = IndexEntry::default();
        assert_eq!(
            ConflictType::get_conflict_type(Some(&file_stat()), Some(&entry), None),
            ConflictType::StaleFile
        );
    }

    #[rstest]
    fn untracked_paths_are_classified_by_what_happens_to_them() {
        let target = DatabaseEntry::new(
            HashAlgorithm::Sha1.digest(b"x"),
            EntryMode::File(FileMode::Regular),
        );

        assert_eq!(
            ConflictType::get_conflict_type(Some(&dir_stat()), None, Some(&target)),
            ConflictType::StaleDirectory
        );
        assert_eq!(
            ConflictType::get_conflict_type(Some(&file_stat()), None, Some(&target)),
            ConflictType::UntrackedOverwritten
        );
        assert_eq!(
            ConflictType::get_conflict_type(Some(&file_stat()), None, None),
            ConflictType::UntrackedRemoved
        );
    }
}
