//! Best common ancestor search
//!
//! ## Phase 1: find all common ancestors
//!
//! A bidirectional walk explores the history of both commits, newest first:
//! - commits are marked as visited from the source side, the target side or both
//! - a commit visited from both sides is a common ancestor (`RESULT`)
//! - parents of a common ancestor are marked `STALE`, pruning the search
//!
//! ## Phase 2: keep only the best ones
//!
//! > A best common ancestor of X and Y is a common ancestor of X and Y that is
//! > not an ancestor of any other common ancestor.
//!
//! Each candidate is walked against the others; candidates reachable from
//! another candidate are redundant.
//!
//! Enabling the `debug_merge` feature logs visit states and candidates at
//! debug level.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Result;
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;

macro_rules! debug_log {
    ($($arg:tt)*) => {
        #[cfg(feature = "debug_merge")]
        {
            tracing::debug!($($arg)*);
        }
    };
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b00;
        const VISITED_FROM_SOURCE = 0b01;
        const VISITED_FROM_TARGET = 0b10;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (VisitState::VISITED_FROM_SOURCE, "SOURCE"),
            (VisitState::VISITED_FROM_TARGET, "TARGET"),
            (VisitState::STALE, "STALE"),
            (VisitState::RESULT, "RESULT"),
        ];
        let flags = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();

        if flags.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", flags.join("|"))
        }
    }
}

struct CommonAncestorsFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
}

impl<CommitLoaderFn> CommonAncestorsFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    fn find_common_ancestors(
        &self,
        source_commit_id: &ObjectId,
        target_commit_ids: HashSet<&ObjectId>,
    ) -> Result<HashMap<ObjectId, VisitState>> {
        if target_commit_ids.contains(source_commit_id) {
            return Ok(HashMap::from([(source_commit_id.clone(), VisitState::RESULT)]));
        }

        let mut ancestors_states = HashMap::<ObjectId, VisitState>::new();
        // max-heap on timestamp: newest commits first
        let mut priority_queue = BinaryHeap::new();

        let source_commit = (self.commit_loader)(source_commit_id)?;
        ancestors_states.insert(source_commit.oid.clone(), VisitState::VISITED_FROM_SOURCE);
        priority_queue.push((source_commit.timestamp, source_commit.oid));

        for &target_commit_id in target_commit_ids.iter() {
            ancestors_states.insert(target_commit_id.clone(), VisitState::VISITED_FROM_TARGET);

            let target_commit = (self.commit_loader)(target_commit_id)?;
            priority_queue.push((target_commit.timestamp, target_commit.oid));
        }

        while let Some((_, commit_id)) = priority_queue.pop() {
            let current_state = ancestors_states
                .get(&commit_id)
                .copied()
                .unwrap_or(VisitState::NONE);

            debug_log!(commit = %commit_id, state = ?current_state, "processing commit");

            if current_state.contains(VisitState::STALE) {
                continue;
            }

            let is_common_ancestor = current_state.contains(VisitState::VISITED_FROM_BOTH);
            if is_common_ancestor {
                ancestors_states
                    .entry(commit_id.clone())
                    .and_modify(|state| *state |= VisitState::RESULT);
            }

            let current_commit = (self.commit_loader)(&commit_id)?;

            for parent_id in &current_commit.parents {
                let parent_state = ancestors_states
                    .get(parent_id)
                    .copied()
                    .unwrap_or(VisitState::NONE);

                let mut new_state = parent_state | current_state;
                if is_common_ancestor {
                    new_state |= VisitState::STALE;
                }

                if !parent_state.contains(current_state) {
                    let parent_commit = (self.commit_loader)(parent_id)?;
                    ancestors_states.insert(parent_id.clone(), new_state);
                    priority_queue.push((parent_commit.timestamp, parent_id.clone()));
                }
            }
        }

        Ok(ancestors_states
            .into_iter()
            .filter(|(_, state)| {
                !state.contains(VisitState::STALE) && state.contains(VisitState::RESULT)
            })
            .collect())
    }
}

/// Best common ancestor finder over a fallible commit loader
pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    inner: CommonAncestorsFinder<CommitLoaderFn>,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> Result<SlimCommit>,
{
    /// `commit_loader` returns the parents and timestamp of a commit
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self {
            inner: CommonAncestorsFinder { commit_loader },
        }
    }

    /// One best common ancestor of the two commits, `None` for unrelated histories
    ///
    /// With several best common ancestors (criss-cross merges) the one with
    /// the newest timestamp is returned, ties broken by id.
    pub fn find_best_common_ancestor(
        &self,
        source_commit_id: &ObjectId,
        target_commit_id: &ObjectId,
    ) -> Result<Option<ObjectId>> {
        let common_ancestors = self
            .inner
            .find_common_ancestors(source_commit_id, HashSet::from([target_commit_id]))?
            .into_keys()
            .collect::<HashSet<_>>();

        if common_ancestors.is_empty() {
            return Ok(None);
        }

        debug_log!(candidates = ?common_ancestors, "found common ancestors");

        let mut redundant_ancestors = HashSet::<ObjectId>::new();
        for commit in &common_ancestors {
            if redundant_ancestors.contains(commit) {
                continue;
            }

            let others = common_ancestors
                .iter()
                .filter(|other| *other != commit && !redundant_ancestors.contains(*other))
                .collect::<HashSet<_>>();
            let common_states = self.inner.find_common_ancestors(commit, others.clone())?;

            if common_states
                .get(commit)
                .unwrap_or(&VisitState::NONE)
                .contains(VisitState::VISITED_FROM_TARGET)
            {
                redundant_ancestors.insert(commit.clone());
            }

            for other in others {
                if common_states
                    .get(other)
                    .unwrap_or(&VisitState::NONE)
                    .contains(VisitState::VISITED_FROM_SOURCE)
                {
                    redundant_ancestors.insert(other.clone());
                }
            }
        }

        debug_log!(redundant = ?redundant_ancestors, "filtered redundant ancestors");

        let mut best = Vec::new();
        for commit in common_ancestors {
            if !redundant_ancestors.contains(&commit) {
                best.push((self.inner.commit_loader)(&commit)?);
            }
        }

        Ok(best
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| b.oid.cmp(&a.oid)))
            .map(|commit| commit.oid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::hash_algorithm::HashAlgorithm;
    use crate::error::BitError;
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    /// In-memory commit graph with one-hour spaced timestamps
    #[derive(Debug, Default)]
    struct InMemoryCommitStore {
        commits: HashMap<ObjectId, SlimCommit>,
    }

    impl InMemoryCommitStore {
        fn add(&mut self, name: &str, parents: &[&str]) -> &mut Self {
            let timestamp = FixedOffset::east_opt(0)
                .unwrap()
                .timestamp_opt(1_640_995_200 + self.commits.len() as i64 * 3600, 0)
                .unwrap();
            let commit = SlimCommit {
                oid: oid(name),
                parents: parents.iter().map(|parent| oid(parent)).collect(),
                timestamp,
            };
            self.commits.insert(commit.oid.clone(), commit);
            self
        }

        fn load(&self, commit_id: &ObjectId) -> Result<SlimCommit> {
            self.commits
                .get(commit_id)
                .cloned()
                .ok_or_else(|| BitError::NotFound(format!("commit {commit_id}")))
        }

        fn bca(&self, source: &str, target: &str) -> Option<ObjectId> {
            BCAFinder::new(|commit_id| self.load(commit_id))
                .find_best_common_ancestor(&oid(source), &oid(target))
                .unwrap()
        }
    }

    fn oid(name: &str) -> ObjectId {
        HashAlgorithm::Sha1.digest(name.as_bytes())
    }

    /// A <- B <- C <- D
    #[fixture]
    fn linear_history() -> InMemoryCommitStore {
        let mut store = InMemoryCommitStore::default();
        store.add("A", &[]).add("B", &["A"]).add("C", &["B"]).add("D", &["C"]);
        store
    }

    ///     A
    ///    / \
    ///   B   C
    ///   |\ /|
    ///   | X |
    ///   |/ \|
    ///   D   E
    #[fixture]
    fn criss_cross() -> InMemoryCommitStore {
        let mut store = InMemoryCommitStore::default();
        store
            .add("A", &[])
            .add("B", &["A"])
            .add("C", &["A"])
            .add("D", &["B", "C"])
            .add("E", &["C", "B"])
            .add("F", &["D"])
            .add("G", &["E"]);
        store
    }

    #[rstest]
    #[case("B", "D", "B")]
    #[case("D", "B", "B")]
    #[case("C", "C", "C")]
    #[case("A", "D", "A")]
    fn linear_history_base_is_the_older_commit(
        linear_history: InMemoryCommitStore,
        #[case] source: &str,
        #[case] target: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(linear_history.bca(source, target), Some(oid(expected)));
    }

    #[rstest]
    fn diverged_branches_meet_at_the_fork() {
        let mut store = InMemoryCommitStore::default();
        store
            .add("A", &[])
            .add("B", &["A"])
            .add("C", &["B"])
            .add("D", &["B"])
            .add("E", &["C"])
            .add("F", &["D"]);

        assert_eq!(store.bca("E", "F"), Some(oid("B")));
    }

    #[rstest]
    fn merge_commit_can_be_the_base() {
        let mut store = InMemoryCommitStore::default();
        store
            .add("A", &[])
            .add("B", &["A"])
            .add("C", &["A"])
            .add("M", &["B", "C"])
            .add("X", &["M"])
            .add("Y", &["M"]);

        assert_eq!(store.bca("X", "Y"), Some(oid("M")));
    }

    #[rstest]
    fn criss_cross_picks_one_of_the_best(criss_cross: InMemoryCommitStore) {
        let base = criss_cross.bca("F", "G").unwrap();

        assert!(base == oid("B") || base == oid("C"));
        assert_ne!(base, oid("A"));
        assert_eq!(criss_cross.bca("F", "G"), Some(base));
    }

    #[rstest]
    fn unrelated_roots_have_no_base() {
        let mut store = InMemoryCommitStore::default();
        store.add("A", &[]).add("B", &["A"]).add("X", &[]).add("Y", &["X"]);

        assert_eq!(store.bca("B", "Y"), None);
    }

    #[rstest]
    fn loader_errors_propagate(linear_history: InMemoryCommitStore) {
        let result = BCAFinder::new(|commit_id| linear_history.load(commit_id))
            .find_best_common_ancestor(&oid("D"), &oid("missing"));

        assert!(matches!(result, Err(BitError::NotFound(_))));
    }
}
