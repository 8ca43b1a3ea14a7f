//! Dependency resolution.
//!
//! Computes which candidate tasks are *effectively blocked*: directly
//! waiting on an unfinished blocker, or ancestors (via `subtask` edges) of
//! a blocked descendant. The walk is batched — one indexed query per BFS
//! level, never one query per task — so resolution cost scales with edges
//! touched, not candidate count.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::Connection;

use foreman_core::types::{RelationshipType, TaskStatus};
use foreman_core::EngineError;
use foreman_store::repository::{RelationshipRepo, TaskRepo};

/// Batch dependency evaluation and the cycle guard.
pub struct DependencyResolver;

impl DependencyResolver {
    /// The subset of `ids` that must not be offered as available.
    ///
    /// A task is blocked when:
    /// - it has a direct blocker (via `blocked_by`/`blocking` edges) whose
    ///   status is not `complete`, or
    /// - some `subtask` descendant has status `blocked` or is itself
    ///   directly blocked.
    pub fn blocked_set(conn: &Connection, ids: &[i64]) -> Result<HashSet<i64>, EngineError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        // Descend the subtask hierarchy in breadth-first batches, recording
        // child -> parents for the upward propagation afterwards.
        let mut parents_of: HashMap<i64, Vec<i64>> = HashMap::new();
        let mut universe: HashSet<i64> = ids.iter().copied().collect();
        let mut frontier: Vec<i64> = ids.to_vec();
        while !frontier.is_empty() {
            let edges = RelationshipRepo::subtask_children(conn, &frontier)?;
            let mut next = Vec::new();
            for (parent, child) in edges {
                parents_of.entry(child).or_default().push(parent);
                if universe.insert(child) {
                    next.push(child);
                }
            }
            frontier = next;
        }

        let all: Vec<i64> = universe.iter().copied().collect();

        // Direct blockers across the whole universe, one batched query.
        let mut blocked: HashSet<i64> = HashSet::new();
        for edge in RelationshipRepo::direct_blockers(conn, &all)? {
            if edge.blocker_status != TaskStatus::Complete {
                let _ = blocked.insert(edge.blocked_id);
            }
        }

        // Descendants explicitly parked in `blocked` status count too.
        let descendants: Vec<i64> = all
            .iter()
            .copied()
            .filter(|id| parents_of.contains_key(id))
            .collect();
        for (id, status) in TaskRepo::statuses(conn, &descendants)? {
            if status == TaskStatus::Blocked {
                let _ = blocked.insert(id);
            }
        }

        // Propagate blockedness up the subtask hierarchy to a fixpoint.
        let mut queue: VecDeque<i64> = blocked.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if let Some(parents) = parents_of.get(&id) {
                for parent in parents {
                    if blocked.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }

        blocked.retain(|id| ids.contains(id));
        Ok(blocked)
    }

    /// Whether a single task is effectively blocked.
    pub fn is_blocked(conn: &Connection, id: i64) -> Result<bool, EngineError> {
        Ok(Self::blocked_set(conn, &[id])?.contains(&id))
    }

    /// Reject a new edge that would close a directed cycle in the
    /// `{subtask, blocking, blocked_by}` subgraph. Edges outside that
    /// subgraph are always admissible.
    pub fn assert_no_cycle(
        conn: &Connection,
        parent_id: i64,
        child_id: i64,
        edge_type: RelationshipType,
    ) -> Result<(), EngineError> {
        if !edge_type.is_dependency() {
            return Ok(());
        }
        if parent_id == child_id {
            return Err(EngineError::CycleDetected {
                parent_id,
                child_id,
            });
        }

        // Adding parent -> child closes a cycle iff parent is already
        // reachable from child.
        let mut visited: HashSet<i64> = HashSet::new();
        let mut frontier = vec![child_id];
        while !frontier.is_empty() {
            let children = RelationshipRepo::dependency_children(conn, &frontier)?;
            let mut next = Vec::new();
            for id in children {
                if id == parent_id {
                    return Err(EngineError::CycleDetected {
                        parent_id,
                        child_id,
                    });
                }
                if visited.insert(id) {
                    next.push(id);
                }
            }
            frontier = next;
        }
        Ok(())
    }
}
