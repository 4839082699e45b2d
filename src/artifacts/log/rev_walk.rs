//! Commit graph traversal
//!
//! Time-ordered (and unsorted) walks are lazy: a max-heap on committer
//! timestamp holds the frontier and one commit is loaded per step.
//! Topological and reversed walks collect the reachable set first.
//! A visited set guards every walk, so forged histories with repeated
//! parents or cycles still terminate.

use crate::areas::database::Database;
use crate::areas::refs::Refs;
use crate::artifacts::branch::branch_name::RefName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::error::Result;
use bitflags::bitflags;
use chrono::{DateTime, FixedOffset};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

bitflags! {
    /// Output order of a [`RevWalk`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sort: u8 {
        const NONE = 0;
        /// Children before parents
        const TOPOLOGICAL = 0b001;
        /// Newest committer timestamp first
        const TIME = 0b010;
        /// Flip the final order
        const REVERSE = 0b100;
    }
}

type QueueItem = (DateTime<FixedOffset>, Reverse<u64>, ObjectId);

#[derive(Debug)]
enum WalkState {
    Pending,
    Lazy {
        queue: BinaryHeap<QueueItem>,
        seen: HashSet<ObjectId>,
        hidden: HashSet<ObjectId>,
        sequence: u64,
    },
    Materialized(VecDeque<ObjectId>),
    Done,
}

/// Walk over the commits reachable from pushed tips, minus hidden ones
pub struct RevWalk<'r> {
    database: &'r Database,
    refs: &'r Refs,
    sorting: Sort,
    pushed: Vec<ObjectId>,
    hidden: Vec<ObjectId>,
    state: WalkState,
}

impl<'r> RevWalk<'r> {
    pub fn new(database: &'r Database, refs: &'r Refs) -> Self {
        RevWalk {
            database,
            refs,
            sorting: Sort::NONE,
            pushed: Vec::new(),
            hidden: Vec::new(),
            state: WalkState::Pending,
        }
    }

    pub fn sorting(&mut self, sorting: Sort) -> &mut Self {
        self.sorting = sorting;
        self.state = WalkState::Pending;
        self
    }

    /// Start the walk at a commit
    pub fn push(&mut self, oid: ObjectId) -> Result<&mut Self> {
        self.database.parse_object_as_commit(&oid)?;
        self.pushed.push(oid);
        self.state = WalkState::Pending;

        Ok(self)
    }

    pub fn push_ref(&mut self, name: &RefName) -> Result<&mut Self> {
        let oid = self.refs.resolve(name)?;
        self.push(oid)
    }

    pub fn push_head(&mut self) -> Result<&mut Self> {
        self.push_ref(&RefName::head())
    }

    /// Exclude a commit and all of its ancestors
    pub fn hide(&mut self, oid: ObjectId) -> Result<&mut Self> {
        self.database.parse_object_as_commit(&oid)?;
        self.hidden.push(oid);
        self.state = WalkState::Pending;

        Ok(self)
    }

    /// `A..B`: commits reachable from B but not from A
    pub fn push_range(&mut self, range: &str) -> Result<&mut Self> {
        let (from, to) = range
            .split_once("..")
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .ok_or_else(|| anyhow::anyhow!("invalid revision range: {range}"))?;

        let from = Revision::try_parse(from)?.resolve(self.refs, self.database)?;
        let to = Revision::try_parse(to)?.resolve(self.refs, self.database)?;

        self.hide(from)?;
        self.push(to)
    }

    /// Forget pushed and hidden commits so the walk can be set up again
    pub fn reset(&mut self) {
        self.pushed.clear();
        self.hidden.clear();
        self.sorting = Sort::NONE;
        self.state = WalkState::Pending;
    }

    fn load(&self, oid: &ObjectId) -> Result<SlimCommit> {
        Ok(self.database.parse_object_as_commit(oid)?.to_slim(oid.clone()))
    }

    fn hidden_closure(&self) -> Result<HashSet<ObjectId>> {
        let mut hidden = HashSet::new();
        let mut stack = self.hidden.clone();

        while let Some(oid) = stack.pop() {
            if hidden.insert(oid.clone()) {
                stack.extend(self.load(&oid)?.parents);
            }
        }

        Ok(hidden)
    }

    fn start(&mut self) -> Result<()> {
        let hidden = self.hidden_closure()?;
        let mut state = WalkState::Lazy {
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            hidden,
            sequence: 0,
        };

        for oid in self.pushed.clone() {
            self.enqueue(&mut state, oid)?;
        }

        if self.sorting.intersects(Sort::TOPOLOGICAL | Sort::REVERSE) {
            let mut ordered = self.materialize(state)?;
            if self.sorting.contains(Sort::REVERSE) {
                ordered.make_contiguous().reverse();
            }
            self.state = WalkState::Materialized(ordered);
        } else {
            self.state = state;
        }

        Ok(())
    }

    fn enqueue(&self, state: &mut WalkState, oid: ObjectId) -> Result<()> {
        if let WalkState::Lazy {
            queue,
            seen,
            hidden,
            sequence,
        } = state
            && !hidden.contains(&oid)
            && seen.insert(oid.clone())
        {
            let commit = self.load(&oid)?;
            *sequence += 1;
            queue.push((commit.timestamp, Reverse(*sequence), oid));
        }

        Ok(())
    }

    fn next_lazy(&self, state: &mut WalkState) -> Result<Option<ObjectId>> {
        let next = match state {
            WalkState::Lazy { queue, .. } => queue.pop(),
            _ => None,
        };

        let Some((_, _, oid)) = next else {
            return Ok(None);
        };

        for parent in self.load(&oid)?.parents {
            self.enqueue(state, parent)?;
        }

        Ok(Some(oid))
    }

    /// Drain the lazy walk, then order it topologically if asked to
    fn materialize(&self, mut state: WalkState) -> Result<VecDeque<ObjectId>> {
        let mut commits = Vec::new();
        while let Some(oid) = self.next_lazy(&mut state)? {
            commits.push(self.load(&oid)?);
        }

        if !self.sorting.contains(Sort::TOPOLOGICAL) {
            return Ok(commits.into_iter().map(|commit| commit.oid).collect());
        }

        let included = commits
            .iter()
            .map(|commit| commit.oid.clone())
            .collect::<HashSet<_>>();
        let mut pending_children = HashMap::<ObjectId, usize>::new();
        for commit in &commits {
            for parent in commit.parents.iter().filter(|parent| included.contains(*parent)) {
                *pending_children.entry(parent.clone()).or_default() += 1;
            }
        }

        let by_oid = commits
            .into_iter()
            .enumerate()
            .map(|(position, commit)| (commit.oid.clone(), (position, commit)))
            .collect::<HashMap<_, _>>();

        // ready commits, newest first, ties in discovery order
        let mut ready = by_oid
            .values()
            .filter(|(_, commit)| !pending_children.contains_key(&commit.oid))
            .map(|(position, commit)| (commit.timestamp, Reverse(*position), commit.oid.clone()))
            .collect::<BinaryHeap<_>>();

        let mut ordered = VecDeque::with_capacity(by_oid.len());
        while let Some((_, _, oid)) = ready.pop() {
            if let Some((_, commit)) = by_oid.get(&oid) {
                for parent in &commit.parents {
                    if let Some(count) = pending_children.get_mut(parent) {
                        *count -= 1;
                        if *count == 0
                            && let Some((position, parent_commit)) = by_oid.get(parent)
                        {
                            ready.push((parent_commit.timestamp, Reverse(*position), parent.clone()));
                        }
                    }
                }
            }
            ordered.push_back(oid);
        }

        Ok(ordered)
    }

    fn step(&mut self) -> Result<Option<ObjectId>> {
        if matches!(self.state, WalkState::Pending) {
            self.start()?;
        }

        let mut state = std::mem::replace(&mut self.state, WalkState::Done);
        let next = match state {
            WalkState::Materialized(ref mut ordered) => Ok(ordered.pop_front()),
            WalkState::Lazy { .. } => self.next_lazy(&mut state),
            WalkState::Pending | WalkState::Done => Ok(None),
        };

        if matches!(next, Ok(Some(_))) {
            self.state = state;
        }
        next
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

impl std::fmt::Debug for RevWalk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevWalk")
            .field("sorting", &self.sorting)
            .field("pushed", &self.pushed)
            .field("hidden", &self.hidden)
            .finish()
    }
}

/// Whether `ancestor` is reachable from `descendant` (or equal to it)
pub fn is_ancestor(
    database: &Database,
    refs: &Refs,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool> {
    let mut walk = RevWalk::new(database, refs);
    walk.push(descendant.clone())?;

    for oid in walk {
        if &oid? == ancestor {
            return Ok(true);
        }
    }

    Ok(false)
}
