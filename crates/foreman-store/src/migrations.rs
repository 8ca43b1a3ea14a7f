//! SQL DDL for the coordinator's tables.
//!
//! `task_updates`, `change_history`, and `task_versions` deliberately carry
//! no foreign key to `tasks`: the audit trail survives task deletion.

use rusqlite::Connection;

use foreman_core::EngineError;

/// Run all migrations.
///
/// Idempotent — safe to call multiple times (uses `IF NOT EXISTS`).
pub fn run_migrations(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Combined DDL for all coordinator tables.
const SCHEMA: &str = r"
-- Projects
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    local_path TEXT,
    origin_url TEXT,
    description TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Tasks
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
    task_type TEXT NOT NULL
        CHECK(task_type IN ('concrete', 'abstract', 'epic')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK(priority IN ('low', 'medium', 'high', 'critical')),
    title TEXT NOT NULL,
    task_instruction TEXT NOT NULL,
    verification_instruction TEXT NOT NULL,
    notes TEXT,
    assigned_agent TEXT,
    assigned_at TEXT,
    task_status TEXT NOT NULL DEFAULT 'available'
        CHECK(task_status IN ('available', 'in_progress', 'complete', 'blocked', 'cancelled')),
    verification_status TEXT NOT NULL DEFAULT 'unverified'
        CHECK(verification_status IN ('unverified', 'verified')),
    estimated_hours REAL,
    actual_hours REAL,
    due_date TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    github_issue_url TEXT,
    github_pr_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_status_type
    ON tasks(task_status, task_type);
CREATE INDEX IF NOT EXISTS idx_tasks_project_status
    ON tasks(project_id, task_status);
CREATE INDEX IF NOT EXISTS idx_tasks_project_status_type
    ON tasks(project_id, task_status, task_type);
CREATE INDEX IF NOT EXISTS idx_tasks_status_priority
    ON tasks(task_status, priority);
CREATE INDEX IF NOT EXISTS idx_tasks_created_status
    ON tasks(created_at DESC, task_status);
CREATE INDEX IF NOT EXISTS idx_tasks_assigned
    ON tasks(assigned_agent, task_status);
CREATE INDEX IF NOT EXISTS idx_tasks_due_date
    ON tasks(due_date) WHERE due_date IS NOT NULL;

-- Relationships (directed edges between tasks)
CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    child_task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    relationship_type TEXT NOT NULL
        CHECK(relationship_type IN ('subtask', 'blocking', 'blocked_by', 'followup', 'related')),
    created_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    UNIQUE(parent_task_id, child_task_id, relationship_type),
    CHECK(parent_task_id != child_task_id)
);

CREATE INDEX IF NOT EXISTS idx_relationships_parent
    ON relationships(parent_task_id, relationship_type);
CREATE INDEX IF NOT EXISTS idx_relationships_child
    ON relationships(child_task_id, relationship_type);

-- Tags
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_tags (
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (task_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_task_tags_tag
    ON task_tags(tag_id, task_id);

-- Agent-authored narrative updates (immutable; survives task deletion)
CREATE TABLE IF NOT EXISTS task_updates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    agent_id TEXT NOT NULL,
    update_type TEXT NOT NULL
        CHECK(update_type IN ('progress', 'note', 'blocker', 'question', 'finding')),
    content TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_updates_task
    ON task_updates(task_id, id);
CREATE INDEX IF NOT EXISTS idx_task_updates_agent
    ON task_updates(agent_id, created_at);

-- Audit trail (append-only; survives task deletion)
CREATE TABLE IF NOT EXISTS change_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    agent_id TEXT NOT NULL,
    change_type TEXT NOT NULL
        CHECK(change_type IN ('create', 'update', 'delete')),
    field_name TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_change_history_task
    ON change_history(task_id, id);
CREATE INDEX IF NOT EXISTS idx_change_history_agent
    ON change_history(agent_id, created_at);

-- Version snapshots (append-only; survives task deletion)
CREATE TABLE IF NOT EXISTS task_versions (
    task_id INTEGER NOT NULL,
    version_number INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (task_id, version_number)
);

-- Comments (threaded; delete cascades to replies)
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL,
    content TEXT NOT NULL,
    parent_comment_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
    mentions TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_comments_task
    ON comments(task_id, id);
CREATE INDEX IF NOT EXISTS idx_comments_parent
    ON comments(parent_comment_id);

-- Task templates
CREATE TABLE IF NOT EXISTS task_templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    task_type TEXT NOT NULL
        CHECK(task_type IN ('concrete', 'abstract', 'epic')),
    task_instruction TEXT NOT NULL,
    verification_instruction TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK(priority IN ('low', 'medium', 'high', 'critical')),
    notes TEXT,
    created_at TEXT NOT NULL
);

-- Recurring task schedules
CREATE TABLE IF NOT EXISTS recurring_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    task_type TEXT NOT NULL
        CHECK(task_type IN ('concrete', 'abstract', 'epic')),
    task_instruction TEXT NOT NULL,
    verification_instruction TEXT NOT NULL,
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK(priority IN ('low', 'medium', 'high', 'critical')),
    project_id INTEGER,
    interval_hours REAL NOT NULL,
    next_run_at TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = setup_db();
        let tables: Vec<String> = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        for table in [
            "projects",
            "tasks",
            "relationships",
            "tags",
            "task_tags",
            "task_updates",
            "change_history",
            "task_versions",
            "comments",
            "task_templates",
            "recurring_tasks",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn migrations_idempotent() {
        let conn = setup_db();
        run_migrations(&conn).unwrap();
    }

    #[test]
    fn composite_indexes_exist() {
        let conn = setup_db();
        let indexes: Vec<String> = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type='index' \
                 AND name LIKE 'idx_%' ORDER BY name",
            )
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        for index in [
            "idx_tasks_status_type",
            "idx_tasks_project_status",
            "idx_tasks_project_status_type",
            "idx_tasks_status_priority",
            "idx_tasks_created_status",
            "idx_relationships_parent",
            "idx_relationships_child",
            "idx_task_tags_tag",
        ] {
            assert!(indexes.contains(&index.to_string()), "missing {index}");
        }
    }

    #[test]
    fn self_loop_relationship_rejected() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO tasks (task_type, title, task_instruction, verification_instruction,
             created_at, updated_at) VALUES ('concrete', 'T', 'i', 'v', '2026-01-01T00:00:00.000000Z',
             '2026-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type,
             created_at, created_by) VALUES (1, 1, 'subtask', '2026-01-01T00:00:00.000000Z', 'a1')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_edge_rejected() {
        let conn = setup_db();
        for _ in 0..2 {
            conn.execute(
                "INSERT INTO tasks (task_type, title, task_instruction, verification_instruction,
                 created_at, updated_at) VALUES ('concrete', 'T', 'i', 'v',
                 '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
                [],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type,
             created_at, created_by) VALUES (1, 2, 'subtask', '2026-01-01T00:00:00.000000Z', 'a1')",
            [],
        )
        .unwrap();
        let dup = conn.execute(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type,
             created_at, created_by) VALUES (1, 2, 'subtask', '2026-01-01T00:00:00.000000Z', 'a1')",
            [],
        );
        assert!(dup.is_err());

        // Same pair with a different type is fine.
        conn.execute(
            "INSERT INTO relationships (parent_task_id, child_task_id, relationship_type,
             created_at, created_by) VALUES (1, 2, 'related', '2026-01-01T00:00:00.000000Z', 'a1')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn invalid_status_rejected_by_check() {
        let conn = setup_db();
        let result = conn.execute(
            "INSERT INTO tasks (task_type, title, task_instruction, verification_instruction,
             task_status, created_at, updated_at) VALUES ('concrete', 'T', 'i', 'v', 'paused',
             '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn comment_delete_cascades_to_replies() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO tasks (task_type, title, task_instruction, verification_instruction,
             created_at, updated_at) VALUES ('concrete', 'T', 'i', 'v',
             '2026-01-01T00:00:00.000000Z', '2026-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO comments (task_id, agent_id, content, created_at)
             VALUES (1, 'a1', 'root', '2026-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO comments (task_id, agent_id, content, parent_comment_id, created_at)
             VALUES (1, 'a2', 'reply', 1, '2026-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM comments WHERE id = 1", [])
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
