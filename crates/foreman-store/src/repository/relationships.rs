//! Relationship rows: directed, typed edges between tasks.
//!
//! Batched accessors keep the dependency resolver at one query per BFS
//! level regardless of candidate-set size.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::{Relationship, RelationshipType, TaskStatus};
use foreman_core::EngineError;

use crate::rows::relationship_from_row;

use super::{map_constraint, placeholders, IN_CHUNK};

/// One dependency edge with the blocker's current status, as consumed by
/// the resolver.
#[derive(Clone, Debug)]
pub struct BlockerEdge {
    /// The task whose availability is in question.
    pub blocked_id: i64,
    /// The task that must complete first.
    pub blocker_id: i64,
    pub blocker_status: TaskStatus,
}

/// Relationship repository.
pub struct RelationshipRepo;

impl RelationshipRepo {
    /// Insert an edge. Duplicate `(parent, child, type)` triples surface as
    /// `Conflict`; the schema also rejects self-loops.
    pub fn insert(
        conn: &Connection,
        parent_task_id: i64,
        child_task_id: i64,
        relationship_type: RelationshipType,
        created_by: &str,
    ) -> Result<Relationship, EngineError> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type,
             created_at, created_by) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                parent_task_id,
                child_task_id,
                relationship_type.as_sql(),
                now,
                created_by,
            ],
        )
        .map_err(|e| {
            map_constraint(
                e,
                format!(
                    "relationship {parent_task_id} -> {child_task_id} ({}) already exists or is invalid",
                    relationship_type.as_sql()
                ),
            )
        })?;
        let id = conn.last_insert_rowid();
        Ok(Relationship {
            id,
            parent_task_id,
            child_task_id,
            relationship_type,
            created_at: now,
            created_by: created_by.to_string(),
        })
    }

    /// Fetch an edge by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<Relationship>, EngineError> {
        let rel = conn
            .query_row(
                "SELECT * FROM relationships WHERE id = ?1",
                params![id],
                relationship_from_row,
            )
            .optional()?;
        Ok(rel)
    }

    /// All edges touching a task, in either direction.
    pub fn for_task(
        conn: &Connection,
        task_id: i64,
        relationship_type: Option<RelationshipType>,
    ) -> Result<Vec<Relationship>, EngineError> {
        let mut sql = "SELECT * FROM relationships \
                       WHERE (parent_task_id = ?1 OR child_task_id = ?1)"
            .to_string();
        if relationship_type.is_some() {
            sql.push_str(" AND relationship_type = ?2");
        }
        sql.push_str(" ORDER BY id");

        let mut stmt = conn.prepare(&sql)?;
        let mut rels = Vec::new();
        if let Some(kind) = relationship_type {
            let rows = stmt.query_map(params![task_id, kind.as_sql()], relationship_from_row)?;
            for row in rows {
                rels.push(row?);
            }
        } else {
            let rows = stmt.query_map(params![task_id], relationship_from_row)?;
            for row in rows {
                rels.push(row?);
            }
        }
        Ok(rels)
    }

    /// Direct blockers for a batch of tasks, following both encodings:
    /// `(blocker, blocked, blocked_by)` and `(blocked, blocker, blocking)`.
    pub fn direct_blockers(
        conn: &Connection,
        ids: &[i64],
    ) -> Result<Vec<BlockerEdge>, EngineError> {
        let mut edges = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let marks = placeholders(chunk.len());
            let sql = format!(
                "SELECT r.child_task_id, r.parent_task_id, t.task_status
                 FROM relationships r JOIN tasks t ON t.id = r.parent_task_id
                 WHERE r.relationship_type = 'blocked_by' AND r.child_task_id IN ({marks})
                 UNION ALL
                 SELECT r.parent_task_id, r.child_task_id, t.task_status
                 FROM relationships r JOIN tasks t ON t.id = r.child_task_id
                 WHERE r.relationship_type = 'blocking' AND r.parent_task_id IN ({marks})"
            );
            let mut stmt = conn.prepare(&sql)?;
            let bound: Vec<i64> = chunk.iter().chain(chunk.iter()).copied().collect();
            let rows = stmt.query_map(rusqlite::params_from_iter(bound.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (blocked_id, blocker_id, status) = row?;
                let blocker_status = TaskStatus::parse(&status)
                    .ok_or_else(|| EngineError::Fatal(format!("invalid task_status '{status}'")))?;
                edges.push(BlockerEdge {
                    blocked_id,
                    blocker_id,
                    blocker_status,
                });
            }
        }
        Ok(edges)
    }

    /// Subtask edges `(parent, child)` where the parent is in `ids`. One
    /// indexed query per chunk; drives the level-by-level descent.
    pub fn subtask_children(
        conn: &Connection,
        ids: &[i64],
    ) -> Result<Vec<(i64, i64)>, EngineError> {
        let mut edges = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT parent_task_id, child_task_id FROM relationships
                 WHERE relationship_type = 'subtask' AND parent_task_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                edges.push(row?);
            }
        }
        Ok(edges)
    }

    /// Outgoing dependency edges `parent -> child` for the cycle guard,
    /// restricted to `{subtask, blocking, blocked_by}`.
    pub fn dependency_children(conn: &Connection, ids: &[i64]) -> Result<Vec<i64>, EngineError> {
        let mut children = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT child_task_id FROM relationships
                 WHERE relationship_type IN ('subtask', 'blocking', 'blocked_by')
                   AND parent_task_id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows =
                stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| row.get(0))?;
            for row in rows {
                children.push(row?);
            }
        }
        Ok(children)
    }

    /// Subtask parents of a task (edges where the task is the child).
    pub fn subtask_parents(conn: &Connection, task_id: i64) -> Result<Vec<i64>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT parent_task_id FROM relationships
             WHERE relationship_type = 'subtask' AND child_task_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| row.get(0))?;
        let mut parents = Vec::new();
        for row in rows {
            parents.push(row?);
        }
        Ok(parents)
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::repository::tasks::{NewTask, TaskRepo};
    use crate::repository::test_support::setup_db;

    fn insert_task(conn: &Connection, title: &str) -> i64 {
        TaskRepo::insert(
            conn,
            &NewTask {
                title: title.to_string(),
                task_instruction: "Do something useful here".into(),
                verification_instruction: "Check something useful here".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn insert_and_fetch_edge() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let b = insert_task(&conn, "B");
        let rel = RelationshipRepo::insert(&conn, a, b, RelationshipType::Subtask, "a1").unwrap();
        assert_eq!(rel.parent_task_id, a);
        assert_eq!(rel.child_task_id, b);

        let fetched = RelationshipRepo::get(&conn, rel.id).unwrap().unwrap();
        assert_eq!(fetched.relationship_type, RelationshipType::Subtask);
    }

    #[test]
    fn duplicate_edge_is_conflict() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let b = insert_task(&conn, "B");
        RelationshipRepo::insert(&conn, a, b, RelationshipType::Blocking, "a1").unwrap();
        let err =
            RelationshipRepo::insert(&conn, a, b, RelationshipType::Blocking, "a1").unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn self_loop_is_conflict() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let err =
            RelationshipRepo::insert(&conn, a, a, RelationshipType::Subtask, "a1").unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn direct_blockers_both_encodings() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let b = insert_task(&conn, "B");
        let c = insert_task(&conn, "C");

        // A waits for B, encoded as (B, A, blocked_by).
        RelationshipRepo::insert(&conn, b, a, RelationshipType::BlockedBy, "a1").unwrap();
        // C waits for B, encoded as (C, B, blocking).
        RelationshipRepo::insert(&conn, c, b, RelationshipType::Blocking, "a1").unwrap();

        let edges = RelationshipRepo::direct_blockers(&conn, &[a, c]).unwrap();
        assert_eq!(edges.len(), 2);
        let blocked: Vec<i64> = edges.iter().map(|e| e.blocked_id).collect();
        assert!(blocked.contains(&a));
        assert!(blocked.contains(&c));
        for edge in &edges {
            assert_eq!(edge.blocker_id, b);
            assert_eq!(edge.blocker_status, TaskStatus::Available);
        }
    }

    #[test]
    fn subtask_children_level_query() {
        let conn = setup_db();
        let root = insert_task(&conn, "root");
        let kid1 = insert_task(&conn, "kid1");
        let kid2 = insert_task(&conn, "kid2");
        let grandkid = insert_task(&conn, "grandkid");
        RelationshipRepo::insert(&conn, root, kid1, RelationshipType::Subtask, "a1").unwrap();
        RelationshipRepo::insert(&conn, root, kid2, RelationshipType::Subtask, "a1").unwrap();
        RelationshipRepo::insert(&conn, kid1, grandkid, RelationshipType::Subtask, "a1").unwrap();

        let level1 = RelationshipRepo::subtask_children(&conn, &[root]).unwrap();
        assert_eq!(level1.len(), 2);

        let level2 = RelationshipRepo::subtask_children(&conn, &[kid1, kid2]).unwrap();
        assert_eq!(level2, vec![(kid1, grandkid)]);
    }

    #[test]
    fn followup_edges_ignored_by_dependency_walk() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let b = insert_task(&conn, "B");
        RelationshipRepo::insert(&conn, a, b, RelationshipType::Followup, "a1").unwrap();
        assert!(RelationshipRepo::dependency_children(&conn, &[a])
            .unwrap()
            .is_empty());
        assert!(RelationshipRepo::direct_blockers(&conn, &[a, b])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn for_task_returns_both_directions() {
        let conn = setup_db();
        let a = insert_task(&conn, "A");
        let b = insert_task(&conn, "B");
        let c = insert_task(&conn, "C");
        RelationshipRepo::insert(&conn, a, b, RelationshipType::Subtask, "a1").unwrap();
        RelationshipRepo::insert(&conn, c, a, RelationshipType::Related, "a1").unwrap();

        let rels = RelationshipRepo::for_task(&conn, a, None).unwrap();
        assert_eq!(rels.len(), 2);

        let subtasks =
            RelationshipRepo::for_task(&conn, a, Some(RelationshipType::Subtask)).unwrap();
        assert_eq!(subtasks.len(), 1);
    }

    #[test]
    fn subtask_parents_walks_upward() {
        let conn = setup_db();
        let root = insert_task(&conn, "root");
        let mid = insert_task(&conn, "mid");
        let leaf = insert_task(&conn, "leaf");
        RelationshipRepo::insert(&conn, root, mid, RelationshipType::Subtask, "a1").unwrap();
        RelationshipRepo::insert(&conn, mid, leaf, RelationshipType::Subtask, "a1").unwrap();

        assert_eq!(
            RelationshipRepo::subtask_parents(&conn, leaf).unwrap(),
            vec![mid]
        );
        assert_eq!(
            RelationshipRepo::subtask_parents(&conn, mid).unwrap(),
            vec![root]
        );
        assert!(RelationshipRepo::subtask_parents(&conn, root)
            .unwrap()
            .is_empty());
    }
}
