//! The commit graph and its traversal algorithms.
//!
//! [`CommitGraph`] is an append-only arena of commits keyed by id, with a
//! forward-edge index (`children`) and a generation number per commit
//! (one more than the highest parent generation, roots are 1). Generations
//! order every traversal: a commit is always visited before its ancestors.
//!
//! # Invariants
//!
//! - Commits are immutable once inserted.
//! - Every parent reference resolves to a commit already in the graph, so
//!   the graph is acyclic by construction.
//! - Commit ids match their content hash.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use chrono::Utc;
use tracing::debug;

use strata_store::EntitySet;
use strata_types::{CommitId, RepositoryId};

use crate::commit::{Commit, CommitDraft, Snapshot};
use crate::error::{GraphError, GraphResult};

/// Default number of delta commits between full checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 32;

const PARENT1: u8 = 1;
const PARENT2: u8 = 2;
const STALE: u8 = 4;
const RESULT: u8 = 8;

#[derive(Clone, Debug)]
struct Node {
    commit: Commit,
    generation: u64,
    /// Delta commits since the nearest full snapshot on the first-parent chain.
    since_checkpoint: u32,
}

/// The commit graph of one repository.
#[derive(Clone, Debug)]
pub struct CommitGraph {
    repository: RepositoryId,
    nodes: HashMap<CommitId, Node>,
    /// Forward-edge index: parent -> children.
    children: HashMap<CommitId, Vec<CommitId>>,
    roots: Vec<CommitId>,
    checkpoint_interval: u32,
}

impl CommitGraph {
    /// Create an empty graph for a repository.
    pub fn new(repository: RepositoryId) -> Self {
        Self {
            repository,
            nodes: HashMap::new(),
            children: HashMap::new(),
            roots: Vec::new(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// Store a full snapshot every `interval` commits along a first-parent
    /// chain. Values of 0 or 1 make every commit a full snapshot.
    pub fn with_checkpoint_interval(mut self, interval: u32) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn repository(&self) -> RepositoryId {
        self.repository
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &CommitId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All commits, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Commit> {
        self.nodes.values().map(|n| &n.commit)
    }

    /// Commits with no parents.
    pub fn roots(&self) -> &[CommitId] {
        &self.roots
    }

    /// Direct children of a commit.
    pub fn children(&self, id: &CommitId) -> &[CommitId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn generation(&self, id: &CommitId) -> Option<u64> {
        self.nodes.get(id).map(|n| n.generation)
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Create and insert a commit. Returns its id.
    pub fn commit(&mut self, draft: CommitDraft) -> GraphResult<CommitId> {
        let commit = self.prepare(draft)?;
        self.insert(commit)
    }

    /// Build the commit a draft would produce, without inserting it.
    ///
    /// Validates the parents, checks that a delta applies cleanly to the
    /// first parent's state, and promotes the snapshot to a full one for
    /// roots and checkpoints.
    pub fn prepare(&self, draft: CommitDraft) -> GraphResult<Commit> {
        let CommitDraft {
            parents,
            author,
            message,
            kind,
            snapshot,
            timestamp,
        } = draft;

        let mut seen = HashSet::new();
        for parent in &parents {
            if !seen.insert(*parent) {
                return Err(GraphError::DuplicateParent(*parent));
            }
            if !self.nodes.contains_key(parent) {
                return Err(GraphError::UnknownParent(*parent));
            }
        }

        let snapshot = match (parents.first(), snapshot) {
            (None, Snapshot::Full(set)) => Snapshot::Full(set),
            (None, Snapshot::Delta(changes)) => {
                let mut set = EntitySet::new();
                set.apply(&changes)?;
                Snapshot::Full(set)
            }
            (Some(_), Snapshot::Full(set)) => Snapshot::Full(set),
            (Some(first), Snapshot::Delta(changes)) => {
                let mut state = self.materialize(first)?;
                state.apply(&changes)?;
                let depth = self.nodes[first].since_checkpoint + 1;
                if depth >= self.checkpoint_interval {
                    Snapshot::Full(state)
                } else {
                    Snapshot::Delta(changes)
                }
            }
        };

        let mut commit = Commit {
            id: CommitId::from_hash([0; 32]),
            repository: self.repository,
            parents,
            author,
            timestamp: timestamp.unwrap_or_else(Utc::now),
            message,
            kind,
            snapshot,
        };
        commit.id = commit.compute_id()?;
        if self.nodes.contains_key(&commit.id) {
            return Err(GraphError::DuplicateCommit(commit.id));
        }
        Ok(commit)
    }

    /// Insert a fully formed commit, e.g. one prepared earlier or replayed
    /// from the journal.
    pub fn insert(&mut self, commit: Commit) -> GraphResult<CommitId> {
        if commit.repository != self.repository {
            return Err(GraphError::ForeignRepository {
                expected: self.repository,
                found: commit.repository,
            });
        }
        let computed = commit.compute_id()?;
        if computed != commit.id {
            return Err(GraphError::IdMismatch {
                claimed: commit.id,
                computed,
            });
        }
        if self.nodes.contains_key(&commit.id) {
            return Err(GraphError::DuplicateCommit(commit.id));
        }

        let mut generation = 0;
        for parent in &commit.parents {
            let node = self
                .nodes
                .get(parent)
                .ok_or(GraphError::UnknownParent(*parent))?;
            generation = generation.max(node.generation);
        }
        let since_checkpoint = match (&commit.snapshot, commit.first_parent()) {
            (Snapshot::Delta(_), Some(first)) => self.nodes[first].since_checkpoint + 1,
            _ => 0,
        };

        for parent in &commit.parents {
            self.children.entry(*parent).or_default().push(commit.id);
        }
        if commit.is_root() {
            self.roots.push(commit.id);
        }

        let id = commit.id;
        debug!(
            commit = %id.short_hex(),
            parents = commit.parents.len(),
            full = commit.snapshot.is_full(),
            "added commit"
        );
        self.nodes.insert(
            id,
            Node {
                commit,
                generation: generation + 1,
                since_checkpoint,
            },
        );
        Ok(id)
    }

    // ---------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------

    /// Retrieve a commit by id.
    pub fn resolve(&self, id: &CommitId) -> GraphResult<&Commit> {
        self.nodes
            .get(id)
            .map(|n| &n.commit)
            .ok_or(GraphError::NotFound(*id))
    }

    /// Resolve a full or abbreviated (at least 4 characters) hex id.
    pub fn resolve_prefix(&self, prefix: &str) -> GraphResult<CommitId> {
        let prefix = prefix.trim().to_ascii_lowercase();
        let invalid = |reason: &str| GraphError::InvalidRevision {
            revision: prefix.clone(),
            reason: reason.to_string(),
        };
        if prefix.len() < 4 {
            return Err(invalid("abbreviated ids need at least 4 hex characters"));
        }
        if !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid("not a hex commit id"));
        }
        let mut matches = self
            .nodes
            .keys()
            .filter(|id| id.to_hex().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(*id),
            (None, _) => Err(invalid("no commit matches")),
            (Some(_), Some(_)) => Err(invalid("ambiguous commit prefix")),
        }
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    /// Lazily iterate a commit and all its ancestors, newest generation
    /// first. Every commit is yielded before any of its ancestors.
    ///
    /// This is a frontier walk ordered by generation rather than by hop
    /// count: after an uneven merge, plain breadth-first order would reach
    /// the shared root through the short side before the long side's
    /// commits, yielding a parent ahead of its child.
    pub fn ancestors(&self, id: &CommitId) -> GraphResult<Ancestors<'_>> {
        let generation = self.generation(id).ok_or(GraphError::NotFound(*id))?;
        let mut heap = BinaryHeap::new();
        heap.push((generation, Reverse(*id)));
        let mut seen = HashSet::new();
        seen.insert(*id);
        Ok(Ancestors {
            graph: self,
            heap,
            seen,
        })
    }

    /// Returns `true` if `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> GraphResult<bool> {
        let floor = self
            .generation(ancestor)
            .ok_or(GraphError::NotFound(*ancestor))?;
        if self.generation(descendant).is_none() {
            return Err(GraphError::NotFound(*descendant));
        }
        for commit in self.ancestors(descendant)? {
            if commit.id == *ancestor {
                return Ok(true);
            }
            // Ancestors come out in descending generation order.
            if self.nodes[&commit.id].generation < floor {
                break;
            }
        }
        Ok(false)
    }

    /// The best common ancestor of two commits.
    ///
    /// Both histories are walked together in generation order, painting
    /// each commit with the side(s) that reach it. Commits reached from both
    /// sides are candidates; candidates that are ancestors of other
    /// candidates are discarded. If several remain (criss-cross history) the
    /// one with the highest generation wins, ties broken by the smallest id.
    /// The result does not depend on argument order.
    pub fn merge_base(&self, a: &CommitId, b: &CommitId) -> GraphResult<CommitId> {
        self.merge_bases(a, b)?
            .into_iter()
            .next()
            .ok_or(GraphError::NoCommonAncestor { a: *a, b: *b })
    }

    /// All best common ancestors, best first.
    pub fn merge_bases(&self, a: &CommitId, b: &CommitId) -> GraphResult<Vec<CommitId>> {
        let gen_a = self.generation(a).ok_or(GraphError::NotFound(*a))?;
        let gen_b = self.generation(b).ok_or(GraphError::NotFound(*b))?;
        if a == b {
            return Ok(vec![*a]);
        }

        let mut flags: HashMap<CommitId, u8> = HashMap::new();
        let mut processed: HashMap<CommitId, u8> = HashMap::new();
        let mut heap = BinaryHeap::new();
        flags.insert(*a, PARENT1);
        flags.insert(*b, PARENT2);
        heap.push((gen_a, Reverse(*a)));
        heap.push((gen_b, Reverse(*b)));
        let mut candidates = Vec::new();

        while let Some((_, Reverse(id))) = heap.pop() {
            let mut current = flags[&id];
            if processed.get(&id) == Some(&current) {
                continue;
            }
            if current & (PARENT1 | PARENT2 | STALE) == PARENT1 | PARENT2 {
                current |= RESULT | STALE;
                flags.insert(id, current);
                candidates.push(id);
            }
            processed.insert(id, current);

            let propagate = current & (PARENT1 | PARENT2 | STALE);
            for parent in &self.nodes[&id].commit.parents {
                let entry = flags.entry(*parent).or_insert(0);
                if *entry & propagate != propagate {
                    *entry |= propagate;
                    heap.push((self.nodes[parent].generation, Reverse(*parent)));
                }
            }

            let live = heap
                .iter()
                .any(|(_, Reverse(pending))| flags[pending] & STALE == 0);
            if !live {
                break;
            }
        }

        let mut best: Vec<CommitId> = Vec::new();
        for candidate in &candidates {
            let mut redundant = false;
            for other in &candidates {
                if other != candidate && self.is_ancestor(candidate, other)? {
                    redundant = true;
                    break;
                }
            }
            if !redundant {
                best.push(*candidate);
            }
        }
        best.sort_by_key(|id| (Reverse(self.nodes[id].generation), *id));
        Ok(best)
    }

    /// Commits reachable from `tip` but not from `exclude`, newest first.
    pub fn only_in(&self, tip: &CommitId, exclude: &CommitId) -> GraphResult<Vec<CommitId>> {
        let excluded: HashSet<CommitId> = self.ancestors(exclude)?.map(|c| c.id).collect();
        Ok(self
            .ancestors(tip)?
            .map(|c| c.id)
            .filter(|id| !excluded.contains(id))
            .collect())
    }

    /// How many commits `a` has that `b` lacks, and vice versa.
    pub fn ahead_behind(&self, a: &CommitId, b: &CommitId) -> GraphResult<(usize, usize)> {
        Ok((self.only_in(a, b)?.len(), self.only_in(b, a)?.len()))
    }

    // ---------------------------------------------------------------
    // State replay
    // ---------------------------------------------------------------

    /// Reconstruct the full entity state at a commit.
    ///
    /// Walks first parents back to the nearest full snapshot, then applies
    /// the deltas forward.
    pub fn materialize(&self, id: &CommitId) -> GraphResult<EntitySet> {
        let mut pending = Vec::new();
        let mut cursor = *id;
        let mut state = loop {
            let commit = self.resolve(&cursor)?;
            match &commit.snapshot {
                Snapshot::Full(set) => break set.clone(),
                Snapshot::Delta(changes) => {
                    pending.push(changes);
                    cursor = *commit
                        .first_parent()
                        .ok_or(GraphError::NotFound(cursor))?;
                }
            }
        };
        for changes in pending.into_iter().rev() {
            state.apply(changes)?;
        }
        Ok(state)
    }

    // ---------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------

    /// Validate the graph's structural integrity.
    ///
    /// Checks that every id matches its content hash, every parent
    /// resolves, and the children index agrees with the parent edges.
    pub fn validate(&self) -> GraphResult<()> {
        for (id, node) in &self.nodes {
            let computed = node.commit.compute_id()?;
            if computed != *id {
                return Err(GraphError::IdMismatch {
                    claimed: *id,
                    computed,
                });
            }
            for parent in &node.commit.parents {
                if !self.nodes.contains_key(parent) || !self.children(parent).contains(id) {
                    return Err(GraphError::DanglingParent {
                        commit: *id,
                        parent: *parent,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Lazy iterator over a commit and its ancestors in reverse topological
/// order. Created by [`CommitGraph::ancestors`].
pub struct Ancestors<'a> {
    graph: &'a CommitGraph,
    heap: BinaryHeap<(u64, Reverse<CommitId>)>,
    seen: HashSet<CommitId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Commit;

    fn next(&mut self) -> Option<Self::Item> {
        let (_, Reverse(id)) = self.heap.pop()?;
        let node = self.graph.nodes.get(&id)?;
        for parent in &node.commit.parents {
            if self.seen.insert(*parent) {
                if let Some(p) = self.graph.nodes.get(parent) {
                    self.heap.push((p.generation, Reverse(*parent)));
                }
            }
        }
        Some(&node.commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::CommitKind;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use strata_types::{
        ActorId, BranchId, ChangeSet, Entity, EntityChange, EntityPayload, FieldDelta, FieldValue,
        Room,
    };

    fn repo() -> RepositoryId {
        RepositoryId::from_uuid(Default::default())
    }

    fn at(minutes: i64) -> strata_types::Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn room(name: &str) -> Entity {
        Entity::new(EntityPayload::Room(Room {
            name: name.into(),
            ..Room::default()
        }))
    }

    /// A root commit plus a helper that appends empty commits.
    struct Fixture {
        graph: CommitGraph,
        clock: i64,
    }

    impl Fixture {
        fn new() -> (Self, CommitId) {
            let mut graph = CommitGraph::new(repo());
            let root = graph
                .commit(
                    CommitDraft::root(ActorId::system(), "root", EntitySet::new())
                        .with_timestamp(at(0)),
                )
                .unwrap();
            (Self { graph, clock: 0 }, root)
        }

        fn child(&mut self, parents: &[CommitId]) -> CommitId {
            self.clock += 1;
            let draft = CommitDraft::new(ActorId::system(), format!("c{}", self.clock), ChangeSet::new())
                .with_parents(parents.to_vec())
                .with_timestamp(at(self.clock));
            self.graph.commit(draft).unwrap()
        }
    }

    // ----------------------------------------------------------
    // Construction
    // ----------------------------------------------------------

    #[test]
    fn empty_graph() {
        let graph = CommitGraph::new(repo());
        assert!(graph.is_empty());
        assert!(graph.roots().is_empty());
    }

    #[test]
    fn root_commit_is_recorded() {
        let (fx, root) = Fixture::new();
        assert_eq!(fx.graph.len(), 1);
        assert_eq!(fx.graph.roots(), &[root]);
        assert_eq!(fx.graph.generation(&root), Some(1));
        assert!(fx.graph.resolve(&root).unwrap().snapshot.is_full());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let (mut fx, _) = Fixture::new();
        let ghost = CommitId::from_content(b"ghost");
        let draft = CommitDraft::new(ActorId::system(), "x", ChangeSet::new()).with_parent(ghost);
        assert!(matches!(
            fx.graph.commit(draft),
            Err(GraphError::UnknownParent(parent)) if parent == ghost
        ));
    }

    #[test]
    fn duplicate_parent_is_rejected() {
        let (mut fx, root) = Fixture::new();
        let draft = CommitDraft::new(ActorId::system(), "x", ChangeSet::new())
            .with_parents(vec![root, root]);
        assert!(matches!(
            fx.graph.commit(draft),
            Err(GraphError::DuplicateParent(_))
        ));
    }

    #[test]
    fn foreign_commit_is_rejected() {
        let (fx, root) = Fixture::new();
        let mut other = CommitGraph::new(RepositoryId::new());
        let commit = fx.graph.resolve(&root).unwrap().clone();
        assert!(matches!(
            other.insert(commit),
            Err(GraphError::ForeignRepository { .. })
        ));
    }

    #[test]
    fn tampered_commit_is_rejected_on_insert() {
        let (fx, root) = Fixture::new();
        let mut commit = fx.graph.resolve(&root).unwrap().clone();
        commit.message = "rewritten".into();
        let mut fresh = CommitGraph::new(repo());
        assert!(matches!(
            fresh.insert(commit),
            Err(GraphError::IdMismatch { .. })
        ));
    }

    #[test]
    fn resolve_missing_is_not_found() {
        let (fx, _) = Fixture::new();
        let missing = CommitId::from_content(b"nope");
        assert!(matches!(
            fx.graph.resolve(&missing),
            Err(GraphError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn resolve_prefix() {
        let (fx, root) = Fixture::new();
        let hex = root.to_hex();
        assert_eq!(fx.graph.resolve_prefix(&hex[..8]).unwrap(), root);
        assert_eq!(fx.graph.resolve_prefix(&hex.to_uppercase()).unwrap(), root);
        assert!(fx.graph.resolve_prefix("ab").is_err());
        assert!(fx.graph.resolve_prefix("main").is_err());
    }

    // ----------------------------------------------------------
    // Ancestry
    // ----------------------------------------------------------

    #[test]
    fn ancestors_are_reverse_topological() {
        //   root
        //   /  \
        //  a    b
        //   \  /
        //    m
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        let b = fx.child(&[root]);
        let m = fx.child(&[a, b]);
        let order: Vec<CommitId> = fx.graph.ancestors(&m).unwrap().map(|c| c.id).collect();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], m);
        assert_eq!(order[3], root);
        for (i, id) in order.iter().enumerate() {
            for parent in &fx.graph.resolve(id).unwrap().parents {
                let pos = order.iter().position(|x| x == parent).unwrap();
                assert!(pos > i, "parent yielded before child");
            }
        }
    }

    #[test]
    fn uneven_merge_yields_long_side_before_root() {
        //   root
        //   /  \
        //  a1   b1
        //  |    |
        //  a2   |
        //  |    |
        //  a3   |
        //   \  /
        //    m
        let (mut fx, root) = Fixture::new();
        let a1 = fx.child(&[root]);
        let a2 = fx.child(&[a1]);
        let a3 = fx.child(&[a2]);
        let b1 = fx.child(&[root]);
        let m = fx.child(&[a3, b1]);

        let order: Vec<CommitId> = fx.graph.ancestors(&m).unwrap().map(|c| c.id).collect();
        assert_eq!(order.len(), 6);
        assert_eq!(order[..3], [m, a3, a2]);
        assert_eq!(order[5], root);
        let pos = |id: &CommitId| order.iter().position(|x| x == id).unwrap();
        assert!(pos(&a1) < pos(&root));
        assert!(pos(&b1) < pos(&root));
    }

    #[test]
    fn ancestors_is_lazy() {
        let (mut fx, root) = Fixture::new();
        let mut tip = root;
        for _ in 0..50 {
            tip = fx.child(&[tip]);
        }
        let first_three: Vec<&Commit> = fx.graph.ancestors(&tip).unwrap().take(3).collect();
        assert_eq!(first_three.len(), 3);
        assert_eq!(first_three[0].id, tip);
    }

    #[test]
    fn is_ancestor_checks() {
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        let b = fx.child(&[root]);
        assert!(fx.graph.is_ancestor(&root, &a).unwrap());
        assert!(fx.graph.is_ancestor(&a, &a).unwrap());
        assert!(!fx.graph.is_ancestor(&a, &root).unwrap());
        assert!(!fx.graph.is_ancestor(&a, &b).unwrap());
    }

    #[test]
    fn merge_base_of_fork() {
        let (mut fx, root) = Fixture::new();
        let base = fx.child(&[root]);
        let left = fx.child(&[base]);
        let left2 = fx.child(&[left]);
        let right = fx.child(&[base]);
        assert_eq!(fx.graph.merge_base(&left2, &right).unwrap(), base);
        assert_eq!(fx.graph.merge_base(&right, &left2).unwrap(), base);
    }

    #[test]
    fn merge_base_of_ancestor_is_the_ancestor() {
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        let b = fx.child(&[a]);
        assert_eq!(fx.graph.merge_base(&a, &b).unwrap(), a);
        assert_eq!(fx.graph.merge_base(&b, &b).unwrap(), b);
    }

    #[test]
    fn merge_base_after_merge_uses_latest_shared_commit() {
        // After merging `feature` into `main`, further work on both sides
        // shares the feature tip, not the original fork point.
        let (mut fx, root) = Fixture::new();
        let f1 = fx.child(&[root]);
        let m1 = fx.child(&[root]);
        let merged = fx.child(&[m1, f1]);
        let f2 = fx.child(&[f1]);
        let m2 = fx.child(&[merged]);
        assert_eq!(fx.graph.merge_base(&m2, &f2).unwrap(), f1);
    }

    #[test]
    fn criss_cross_merge_base_is_deterministic() {
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        let b = fx.child(&[root]);
        let x = fx.child(&[a, b]);
        let y = fx.child(&[b, a]);
        let bases = fx.graph.merge_bases(&x, &y).unwrap();
        assert_eq!(bases.len(), 2);
        assert_eq!(
            fx.graph.merge_base(&x, &y).unwrap(),
            fx.graph.merge_base(&y, &x).unwrap()
        );
    }

    #[test]
    fn disjoint_roots_have_no_common_ancestor() {
        let (mut fx, root) = Fixture::new();
        let other_root = fx
            .graph
            .commit(
                CommitDraft::root(ActorId::system(), "second root", EntitySet::new())
                    .with_timestamp(at(99)),
            )
            .unwrap();
        assert!(matches!(
            fx.graph.merge_base(&root, &other_root),
            Err(GraphError::NoCommonAncestor { .. })
        ));
    }

    #[test]
    fn ahead_behind_counts() {
        let (mut fx, root) = Fixture::new();
        let a1 = fx.child(&[root]);
        let a2 = fx.child(&[a1]);
        let b1 = fx.child(&[root]);
        assert_eq!(fx.graph.ahead_behind(&a2, &b1).unwrap(), (2, 1));
        assert_eq!(fx.graph.only_in(&a2, &root).unwrap(), vec![a2, a1]);
    }

    // ----------------------------------------------------------
    // Materialization
    // ----------------------------------------------------------

    #[test]
    fn materialize_replays_deltas() {
        let mut graph = CommitGraph::new(repo());
        let r = room("101");
        let root = graph
            .commit(CommitDraft::root(
                ActorId::system(),
                "root",
                [r.clone()].into_iter().collect(),
            ))
            .unwrap();
        let delta = ChangeSet::from_changes(vec![EntityChange::Modified {
            id: r.id,
            kind: r.kind(),
            fields: vec![FieldDelta::new(
                "status",
                FieldValue::Text("available".into()),
                FieldValue::Text("occupied".into()),
            )],
        }]);
        let c1 = graph
            .commit(CommitDraft::new(ActorId::system(), "occupy", delta).with_parent(root))
            .unwrap();
        let state = graph.materialize(&c1).unwrap();
        assert_eq!(
            state.get(&r.id).unwrap().field("status"),
            Some(FieldValue::Text("occupied".into()))
        );
        assert_eq!(graph.materialize(&root).unwrap().get(&r.id).unwrap(), &r);
    }

    #[test]
    fn delta_that_does_not_apply_is_rejected() {
        let (mut fx, root) = Fixture::new();
        let delta = ChangeSet::from_changes(vec![EntityChange::Removed(room("ghost"))]);
        let draft = CommitDraft::new(ActorId::system(), "bad", delta).with_parent(root);
        assert!(matches!(
            fx.graph.commit(draft),
            Err(GraphError::Snapshot(_))
        ));
    }

    #[test]
    fn checkpoints_are_written_periodically() {
        let mut graph = CommitGraph::new(repo()).with_checkpoint_interval(3);
        let mut tip = graph
            .commit(CommitDraft::root(ActorId::system(), "root", EntitySet::new()))
            .unwrap();
        let mut fulls = 0;
        for i in 0..6 {
            let r = room(&format!("r{i}"));
            let delta = ChangeSet::from_changes(vec![EntityChange::Added(r)]);
            tip = graph
                .commit(
                    CommitDraft::new(ActorId::system(), format!("add {i}"), delta)
                        .with_parent(tip)
                        .with_timestamp(at(i)),
                )
                .unwrap();
            if graph.resolve(&tip).unwrap().snapshot.is_full() {
                fulls += 1;
            }
        }
        assert_eq!(fulls, 2);
        assert_eq!(graph.materialize(&tip).unwrap().len(), 6);
    }

    #[test]
    fn merge_commit_kind_is_kept() {
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        let b = fx.child(&[root]);
        let source = BranchId::new();
        let id = fx
            .graph
            .commit(
                CommitDraft::new(ActorId::system(), "merge", ChangeSet::new())
                    .with_parents(vec![a, b])
                    .with_kind(CommitKind::Merge { source }),
            )
            .unwrap();
        let commit = fx.graph.resolve(&id).unwrap();
        assert!(commit.is_merge());
        assert_eq!(commit.first_parent(), Some(&a));
        assert_eq!(fx.graph.children(&a), &[id]);
    }

    #[test]
    fn validate_passes_for_built_graph() {
        let (mut fx, root) = Fixture::new();
        let a = fx.child(&[root]);
        fx.child(&[a]);
        assert!(fx.graph.validate().is_ok());
    }

    // ----------------------------------------------------------
    // Properties
    // ----------------------------------------------------------

    /// Build a random DAG: commit `i` picks one or two parents among the
    /// earlier commits.
    fn random_graph(choices: &[(usize, usize, bool)]) -> (CommitGraph, Vec<CommitId>) {
        let (mut fx, root) = Fixture::new();
        let mut ids = vec![root];
        for &(p1, p2, merge) in choices {
            let first = ids[p1 % ids.len()];
            let second = ids[p2 % ids.len()];
            let parents = if merge && first != second {
                vec![first, second]
            } else {
                vec![first]
            };
            ids.push(fx.child(&parents));
        }
        (fx.graph, ids)
    }

    proptest! {
        #[test]
        fn merge_base_is_symmetric(
            choices in prop::collection::vec((0usize..64, 0usize..64, any::<bool>()), 1..24),
            x in 0usize..64,
            y in 0usize..64,
        ) {
            let (graph, ids) = random_graph(&choices);
            let a = ids[x % ids.len()];
            let b = ids[y % ids.len()];
            let ab = graph.merge_base(&a, &b).unwrap();
            let ba = graph.merge_base(&b, &a).unwrap();
            prop_assert_eq!(ab, ba);
            prop_assert!(graph.is_ancestor(&ab, &a).unwrap());
            prop_assert!(graph.is_ancestor(&ab, &b).unwrap());
        }
    }
}
