//! Task rows: CRUD, filtered scans, search, and aggregates.

use std::collections::BTreeMap;

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::{
    Task, TaskFilter, TaskOrder, TaskPriority, TaskStatus, TaskSummary, TaskType,
};
use foreman_core::EngineError;

use crate::rows::{summary_from_row, task_from_row};

use super::{placeholders, IN_CHUNK};

/// Insert parameters for a new task.
#[derive(Clone, Debug, Default)]
pub struct NewTask {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub priority: Option<TaskPriority>,
    pub title: String,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub notes: Option<String>,
    pub estimated_hours: Option<f64>,
    pub due_date: Option<String>,
}

/// Aggregate counts returned by `statistics`.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct TaskStatistics {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_project: BTreeMap<String, i64>,
    pub completion_rate: f64,
}

/// Filter for `statistics`.
#[derive(Clone, Debug, Default)]
pub struct StatisticsFilter {
    pub project_id: Option<i64>,
    pub task_type: Option<TaskType>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Aggregates over an agent's completed tasks.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AgentPerformance {
    pub agent_id: String,
    pub completed_total: i64,
    pub completed_verified: i64,
    pub mean_actual_hours: Option<f64>,
    pub success_rate: f64,
    pub by_type: BTreeMap<String, i64>,
}

const PRIORITY_DESC_CASE: &str = "CASE priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1 \
     WHEN 'medium' THEN 2 WHEN 'low' THEN 3 END";
const PRIORITY_ASC_CASE: &str = "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 \
     WHEN 'high' THEN 2 WHEN 'critical' THEN 3 END";

fn order_clause(order: TaskOrder) -> String {
    match order {
        TaskOrder::Priority => format!("{PRIORITY_DESC_CASE}, created_at ASC, id ASC"),
        TaskOrder::PriorityAsc => format!("{PRIORITY_ASC_CASE}, created_at ASC, id ASC"),
        TaskOrder::CreatedAt => "created_at ASC, id ASC".to_string(),
    }
}

/// Task repository.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a new task and return the stored row.
    pub fn insert(conn: &Connection, new: &NewTask) -> Result<Task, EngineError> {
        let now = now_iso();
        let task_type = new.task_type.unwrap_or(TaskType::Concrete);
        let priority = new.priority.unwrap_or(TaskPriority::Medium);
        conn.execute(
            "INSERT INTO tasks (project_id, task_type, priority, title, task_instruction,
             verification_instruction, notes, estimated_hours, due_date, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                new.project_id,
                task_type.as_sql(),
                priority.as_sql(),
                new.title,
                new.task_instruction,
                new.verification_instruction,
                new.notes,
                new.estimated_hours,
                new.due_date,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)?.ok_or_else(|| EngineError::task_not_found(id))
    }

    /// Fetch a task by id.
    pub fn get(conn: &Connection, id: i64) -> Result<Option<Task>, EngineError> {
        let task = conn
            .query_row(
                "SELECT * FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()?;
        Ok(task)
    }

    /// Fetch several tasks by id. Missing ids are silently absent.
    pub fn get_many(conn: &Connection, ids: &[i64]) -> Result<Vec<Task>, EngineError> {
        let mut tasks = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT * FROM tasks WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), task_from_row)?;
            for row in rows {
                tasks.push(row?);
            }
        }
        Ok(tasks)
    }

    /// Persist the post-image of a task. The caller owns change-log and
    /// version bookkeeping; `updated_at` is stamped here.
    pub fn update_row(conn: &Connection, task: &Task) -> Result<Task, EngineError> {
        let now = now_iso();
        let changed = conn.execute(
            "UPDATE tasks SET project_id = ?1, task_type = ?2, priority = ?3, title = ?4,
             task_instruction = ?5, verification_instruction = ?6, notes = ?7,
             assigned_agent = ?8, assigned_at = ?9, task_status = ?10,
             verification_status = ?11, estimated_hours = ?12, actual_hours = ?13,
             due_date = ?14, completed_at = ?15, github_issue_url = ?16,
             github_pr_url = ?17, updated_at = ?18
             WHERE id = ?19",
            params![
                task.project_id,
                task.task_type.as_sql(),
                task.priority.as_sql(),
                task.title,
                task.task_instruction,
                task.verification_instruction,
                task.notes,
                task.assigned_agent,
                task.assigned_at,
                task.task_status.as_sql(),
                task.verification_status.as_sql(),
                task.estimated_hours,
                task.actual_hours,
                task.due_date,
                task.completed_at,
                task.github_issue_url,
                task.github_pr_url,
                now,
                task.id,
            ],
        )?;
        if changed == 0 {
            return Err(EngineError::task_not_found(task.id));
        }
        Self::get(conn, task.id)?.ok_or_else(|| EngineError::task_not_found(task.id))
    }

    /// Delete a task row. Returns true if a row was removed.
    pub fn delete(conn: &Connection, id: i64) -> Result<bool, EngineError> {
        let changed = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn filter_conditions(
        filter: &TaskFilter,
    ) -> (Vec<String>, Vec<Box<dyn rusqlite::types::ToSql>>) {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(pid) = filter.project_id {
            conditions.push("project_id = ?".to_string());
            values.push(Box::new(pid));
        }
        if let Some(task_type) = filter.task_type {
            conditions.push("task_type = ?".to_string());
            values.push(Box::new(task_type.as_sql().to_string()));
        }
        if let Some(status) = filter.task_status {
            conditions.push("task_status = ?".to_string());
            values.push(Box::new(status.as_sql().to_string()));
        }
        if let Some(ref agent) = filter.assigned_agent {
            conditions.push("assigned_agent = ?".to_string());
            values.push(Box::new(agent.clone()));
        }
        if let Some(priority) = filter.priority {
            conditions.push("priority = ?".to_string());
            values.push(Box::new(priority.as_sql().to_string()));
        }

        let mut tag_ids: Vec<i64> = Vec::new();
        if let Some(tag_id) = filter.tag_id {
            tag_ids.push(tag_id);
        }
        if let Some(ref ids) = filter.tag_ids {
            tag_ids.extend(ids.iter().copied());
        }
        // Every listed tag must be present.
        for tag_id in tag_ids {
            conditions.push(
                "EXISTS (SELECT 1 FROM task_tags tt WHERE tt.task_id = tasks.id \
                 AND tt.tag_id = ?)"
                    .to_string(),
            );
            values.push(Box::new(tag_id));
        }

        (conditions, values)
    }

    fn where_clause(conditions: &[String]) -> String {
        if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        }
    }

    /// Structured filtered query.
    pub fn query(
        conn: &Connection,
        filter: &TaskFilter,
        limit: u32,
    ) -> Result<Vec<Task>, EngineError> {
        let (conditions, mut values) = Self::filter_conditions(filter);
        let sql = format!(
            "SELECT * FROM tasks {} ORDER BY {} LIMIT ?",
            Self::where_clause(&conditions),
            order_clause(filter.order_by),
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Same filters as `query`, but only the summary projection.
    pub fn summaries(
        conn: &Connection,
        filter: &TaskFilter,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, EngineError> {
        let (conditions, mut values) = Self::filter_conditions(filter);
        let sql = format!(
            "SELECT id, title, task_type, task_status, assigned_agent, project_id, priority,
             created_at, updated_at, completed_at
             FROM tasks {} ORDER BY {} LIMIT ?",
            Self::where_clause(&conditions),
            order_clause(filter.order_by),
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), summary_from_row)?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Candidate tasks for availability queries: status `available`, one of
    /// the given types, ordered priority-desc then created_at. The caller
    /// still removes effectively-blocked tasks.
    pub fn available_candidates(
        conn: &Connection,
        task_types: &[TaskType],
        project_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Task>, EngineError> {
        let mut conditions = vec!["task_status = 'available'".to_string()];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        conditions.push(format!("task_type IN ({})", placeholders(task_types.len())));
        for t in task_types {
            values.push(Box::new(t.as_sql().to_string()));
        }
        if let Some(pid) = project_id {
            conditions.push("project_id = ?".to_string());
            values.push(Box::new(pid));
        }

        let sql = format!(
            "SELECT * FROM tasks WHERE {} ORDER BY {PRIORITY_DESC_CASE}, created_at ASC, id ASC \
             LIMIT ?",
            conditions.join(" AND "),
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Case-insensitive substring search over title, instructions, and
    /// notes. Exact title matches rank first, then title substring matches.
    pub fn search(conn: &Connection, query: &str, limit: u32) -> Result<Vec<Task>, EngineError> {
        let needle = query.trim().to_lowercase();
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE lower(title) LIKE '%' || ?1 || '%'
                OR lower(task_instruction) LIKE '%' || ?1 || '%'
                OR lower(verification_instruction) LIKE '%' || ?1 || '%'
                OR lower(COALESCE(notes, '')) LIKE '%' || ?1 || '%'
             ORDER BY CASE
                 WHEN lower(title) = ?1 THEN 0
                 WHEN lower(title) LIKE '%' || ?1 || '%' THEN 1
                 ELSE 2
               END,
               created_at ASC, id ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![needle, limit], task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// In-progress tasks whose reservation began before `cutoff`.
    pub fn stale(conn: &Connection, cutoff: &str, limit: u32) -> Result<Vec<Task>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE task_status = 'in_progress' AND assigned_at IS NOT NULL AND assigned_at < ?1
             ORDER BY assigned_at ASC, id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cutoff, limit], task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Open tasks with `due_date` in `(after, until]`.
    pub fn approaching_deadline(
        conn: &Connection,
        after: &str,
        until: &str,
        limit: u32,
    ) -> Result<Vec<Task>, EngineError> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tasks
             WHERE due_date IS NOT NULL AND due_date > ?1 AND due_date <= ?2
               AND task_status NOT IN ('complete', 'cancelled')
             ORDER BY due_date ASC, id ASC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![after, until, limit], task_from_row)?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row?);
        }
        Ok(tasks)
    }

    /// Completed-task summaries, newest completion first.
    pub fn recent_completions(
        conn: &Connection,
        project_id: Option<i64>,
        since: Option<&str>,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, EngineError> {
        let mut conditions = vec![
            "task_status = 'complete'".to_string(),
            "completed_at IS NOT NULL".to_string(),
        ];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(pid) = project_id {
            conditions.push("project_id = ?".to_string());
            values.push(Box::new(pid));
        }
        if let Some(since) = since {
            conditions.push("completed_at >= ?".to_string());
            values.push(Box::new(since.to_string()));
        }

        let sql = format!(
            "SELECT id, title, task_type, task_status, assigned_agent, project_id, priority,
             created_at, updated_at, completed_at
             FROM tasks WHERE {} ORDER BY completed_at DESC, id DESC LIMIT ?",
            conditions.join(" AND "),
        );
        values.push(Box::new(limit));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), summary_from_row)?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Aggregate counts by status, type, and project, plus the completion
    /// rate. An empty population yields zeros.
    pub fn statistics(
        conn: &Connection,
        filter: &StatisticsFilter,
    ) -> Result<TaskStatistics, EngineError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(pid) = filter.project_id {
            conditions.push("project_id = ?".to_string());
            values.push(Box::new(pid));
        }
        if let Some(task_type) = filter.task_type {
            conditions.push("task_type = ?".to_string());
            values.push(Box::new(task_type.as_sql().to_string()));
        }
        if let Some(ref start) = filter.start_date {
            conditions.push("created_at >= ?".to_string());
            values.push(Box::new(start.clone()));
        }
        if let Some(ref end) = filter.end_date {
            conditions.push("created_at <= ?".to_string());
            values.push(Box::new(end.clone()));
        }
        let where_clause = Self::where_clause(&conditions);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM tasks {where_clause}"),
            param_refs.as_slice(),
            |row| row.get(0),
        )?;

        let group_counts = |column: &str| -> Result<BTreeMap<String, i64>, EngineError> {
            let sql =
                format!("SELECT {column}, COUNT(*) FROM tasks {where_clause} GROUP BY {column}");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                let key: Option<String> = row
                    .get::<_, Option<i64>>(0)
                    .map(|v| v.map(|n| n.to_string()))
                    .or_else(|_| row.get::<_, Option<String>>(0))?;
                Ok((
                    key.unwrap_or_else(|| "none".to_string()),
                    row.get::<_, i64>(1)?,
                ))
            })?;
            let mut map = BTreeMap::new();
            for row in rows {
                let (key, count) = row?;
                map.insert(key, count);
            }
            Ok(map)
        };

        let by_status = group_counts("task_status")?;
        let by_type = group_counts("task_type")?;
        let by_project = group_counts("project_id")?;

        let complete = by_status.get("complete").copied().unwrap_or(0);
        let completion_rate = if total > 0 {
            complete as f64 / total as f64
        } else {
            0.0
        };

        Ok(TaskStatistics {
            total,
            by_status,
            by_type,
            by_project,
            completion_rate,
        })
    }

    /// Aggregates over tasks an agent drove to completion. Attribution comes
    /// from the audit trail: the agent that recorded the `task_status`
    /// transition to `complete`.
    pub fn agent_performance(
        conn: &Connection,
        agent_id: &str,
        task_type: Option<TaskType>,
    ) -> Result<AgentPerformance, EngineError> {
        let mut conditions = vec![
            "t.task_status = 'complete'".to_string(),
            "EXISTS (SELECT 1 FROM change_history ch WHERE ch.task_id = t.id \
             AND ch.agent_id = ?1 AND ch.field_name = 'task_status' \
             AND ch.new_value = 'complete')"
                .to_string(),
        ];
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(agent_id.to_string())];
        if let Some(tt) = task_type {
            conditions.push("t.task_type = ?".to_string());
            values.push(Box::new(tt.as_sql().to_string()));
        }
        let where_clause = conditions.join(" AND ");
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let (completed_total, completed_verified, mean_actual_hours): (i64, i64, Option<f64>) =
            conn.query_row(
                &format!(
                    "SELECT COUNT(*),
                     COALESCE(SUM(CASE WHEN t.verification_status = 'verified' THEN 1 ELSE 0 END), 0),
                     AVG(t.actual_hours)
                     FROM tasks t WHERE {where_clause}"
                ),
                param_refs.as_slice(),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let mut by_type = BTreeMap::new();
        let mut stmt = conn.prepare(&format!(
            "SELECT t.task_type, COUNT(*) FROM tasks t WHERE {where_clause} GROUP BY t.task_type"
        ))?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (key, count) = row?;
            by_type.insert(key, count);
        }

        let success_rate = if completed_total > 0 {
            completed_verified as f64 / completed_total as f64
        } else {
            0.0
        };

        Ok(AgentPerformance {
            agent_id: agent_id.to_string(),
            completed_total,
            completed_verified,
            mean_actual_hours,
            success_rate,
            by_type,
        })
    }

    /// Statuses for a batch of task ids.
    pub fn statuses(
        conn: &Connection,
        ids: &[i64],
    ) -> Result<std::collections::HashMap<i64, TaskStatus>, EngineError> {
        let mut map = std::collections::HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT id, task_status FROM tasks WHERE id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (id, status) = row?;
                let status = TaskStatus::parse(&status)
                    .ok_or_else(|| EngineError::Fatal(format!("invalid task_status '{status}'")))?;
                map.insert(id, status);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::repository::test_support::setup_db;

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            task_instruction: "Implement the feature end to end".into(),
            verification_instruction: "Run the suite and inspect output".into(),
            ..Default::default()
        }
    }

    #[test]
    fn insert_and_get() {
        let conn = setup_db();
        let task = TaskRepo::insert(&conn, &new_task("First")).unwrap();
        assert_eq!(task.id, 1);
        assert_eq!(task.task_status, TaskStatus::Available);
        assert_eq!(task.priority, TaskPriority::Medium);
        assert!(task.assigned_agent.is_none());

        let fetched = TaskRepo::get(&conn, task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
    }

    #[test]
    fn ids_are_monotonic() {
        let conn = setup_db();
        let a = TaskRepo::insert(&conn, &new_task("A")).unwrap();
        let b = TaskRepo::insert(&conn, &new_task("B")).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = setup_db();
        assert!(TaskRepo::get(&conn, 99).unwrap().is_none());
    }

    #[test]
    fn update_row_persists_post_image() {
        let conn = setup_db();
        let mut task = TaskRepo::insert(&conn, &new_task("T")).unwrap();
        task.task_status = TaskStatus::InProgress;
        task.assigned_agent = Some("a1".into());
        task.assigned_at = Some("2026-01-01T00:00:00.000000Z".into());

        let updated = TaskRepo::update_row(&conn, &task).unwrap();
        assert_eq!(updated.task_status, TaskStatus::InProgress);
        assert_eq!(updated.assigned_agent.as_deref(), Some("a1"));
        assert!(updated.updated_at >= task.updated_at);
    }

    #[test]
    fn update_row_missing_task_errors() {
        let conn = setup_db();
        let mut task = TaskRepo::insert(&conn, &new_task("T")).unwrap();
        TaskRepo::delete(&conn, task.id).unwrap();
        task.title = "gone".into();
        let err = TaskRepo::update_row(&conn, &task).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn query_filters_by_status_and_type() {
        let conn = setup_db();
        let mut a = TaskRepo::insert(&conn, &new_task("A")).unwrap();
        TaskRepo::insert(
            &conn,
            &NewTask {
                task_type: Some(TaskType::Epic),
                ..new_task("B")
            },
        )
        .unwrap();
        a.task_status = TaskStatus::Complete;
        TaskRepo::update_row(&conn, &a).unwrap();

        let complete = TaskRepo::query(
            &conn,
            &TaskFilter {
                task_status: Some(TaskStatus::Complete),
                ..Default::default()
            },
            100,
        )
        .unwrap();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].title, "A");

        let epics = TaskRepo::query(
            &conn,
            &TaskFilter {
                task_type: Some(TaskType::Epic),
                ..Default::default()
            },
            100,
        )
        .unwrap();
        assert_eq!(epics.len(), 1);
        assert_eq!(epics[0].title, "B");
    }

    #[test]
    fn query_orders_by_priority_desc() {
        let conn = setup_db();
        TaskRepo::insert(
            &conn,
            &NewTask {
                priority: Some(TaskPriority::Low),
                ..new_task("low")
            },
        )
        .unwrap();
        TaskRepo::insert(
            &conn,
            &NewTask {
                priority: Some(TaskPriority::Critical),
                ..new_task("critical")
            },
        )
        .unwrap();
        TaskRepo::insert(
            &conn,
            &NewTask {
                priority: Some(TaskPriority::High),
                ..new_task("high")
            },
        )
        .unwrap();

        let tasks = TaskRepo::query(
            &conn,
            &TaskFilter {
                order_by: TaskOrder::Priority,
                ..Default::default()
            },
            100,
        )
        .unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["critical", "high", "low"]);

        let tasks = TaskRepo::query(
            &conn,
            &TaskFilter {
                order_by: TaskOrder::PriorityAsc,
                ..Default::default()
            },
            100,
        )
        .unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["low", "high", "critical"]);
    }

    #[test]
    fn query_respects_limit() {
        let conn = setup_db();
        for i in 0..5 {
            TaskRepo::insert(&conn, &new_task(&format!("t{i}"))).unwrap();
        }
        let tasks = TaskRepo::query(&conn, &TaskFilter::default(), 3).unwrap();
        assert_eq!(tasks.len(), 3);
    }

    #[test]
    fn search_ranks_exact_title_first() {
        let conn = setup_db();
        TaskRepo::insert(&conn, &new_task("payment retries")).unwrap();
        TaskRepo::insert(&conn, &new_task("payment")).unwrap();
        TaskRepo::insert(
            &conn,
            &NewTask {
                task_instruction: "Wire the payment provider".into(),
                ..new_task("unrelated title")
            },
        )
        .unwrap();

        let results = TaskRepo::search(&conn, "Payment", 10).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "payment");
        assert_eq!(results[1].title, "payment retries");
        assert_eq!(results[2].title, "unrelated title");
    }

    #[test]
    fn search_no_match_is_empty() {
        let conn = setup_db();
        TaskRepo::insert(&conn, &new_task("alpha")).unwrap();
        assert!(TaskRepo::search(&conn, "zzz", 10).unwrap().is_empty());
    }

    #[test]
    fn stale_selects_old_reservations() {
        let conn = setup_db();
        let mut task = TaskRepo::insert(&conn, &new_task("old")).unwrap();
        task.task_status = TaskStatus::InProgress;
        task.assigned_agent = Some("a1".into());
        task.assigned_at = Some("2026-01-01T00:00:00.000000Z".into());
        TaskRepo::update_row(&conn, &task).unwrap();

        let mut fresh = TaskRepo::insert(&conn, &new_task("fresh")).unwrap();
        fresh.task_status = TaskStatus::InProgress;
        fresh.assigned_agent = Some("a2".into());
        fresh.assigned_at = Some("2026-06-01T00:00:00.000000Z".into());
        TaskRepo::update_row(&conn, &fresh).unwrap();

        let stale = TaskRepo::stale(&conn, "2026-03-01T00:00:00.000000Z", 100).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].title, "old");
    }

    #[test]
    fn approaching_deadline_window_is_half_open() {
        let conn = setup_db();
        for (title, due) in [
            ("past", "2026-01-01T00:00:00.000000Z"),
            ("soon", "2026-02-02T00:00:00.000000Z"),
            ("later", "2026-03-01T00:00:00.000000Z"),
        ] {
            TaskRepo::insert(
                &conn,
                &NewTask {
                    due_date: Some(due.to_string()),
                    ..new_task(title)
                },
            )
            .unwrap();
        }

        let tasks = TaskRepo::approaching_deadline(
            &conn,
            "2026-02-01T00:00:00.000000Z",
            "2026-02-04T00:00:00.000000Z",
            100,
        )
        .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "soon");
    }

    #[test]
    fn statistics_counts_and_rate() {
        let conn = setup_db();
        let mut a = TaskRepo::insert(&conn, &new_task("A")).unwrap();
        TaskRepo::insert(&conn, &new_task("B")).unwrap();
        let mut c = TaskRepo::insert(
            &conn,
            &NewTask {
                task_type: Some(TaskType::Epic),
                ..new_task("C")
            },
        )
        .unwrap();

        a.task_status = TaskStatus::Complete;
        a.completed_at = Some("2026-01-02T00:00:00.000000Z".into());
        TaskRepo::update_row(&conn, &a).unwrap();
        c.task_status = TaskStatus::Cancelled;
        TaskRepo::update_row(&conn, &c).unwrap();

        let stats = TaskRepo::statistics(&conn, &StatisticsFilter::default()).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("complete"), Some(&1));
        assert_eq!(stats.by_status.get("available"), Some(&1));
        assert_eq!(stats.by_status.get("cancelled"), Some(&1));
        assert_eq!(stats.by_type.get("concrete"), Some(&2));
        assert_eq!(stats.by_type.get("epic"), Some(&1));
        assert!((stats.completion_rate - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn statistics_empty_population_is_zero() {
        let conn = setup_db();
        let stats = TaskRepo::statistics(&conn, &StatisticsFilter::default()).unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.by_status.is_empty());
        assert!((stats.completion_rate - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn statuses_batch_lookup() {
        let conn = setup_db();
        let a = TaskRepo::insert(&conn, &new_task("A")).unwrap();
        let b = TaskRepo::insert(&conn, &new_task("B")).unwrap();
        let map = TaskRepo::statuses(&conn, &[a.id, b.id, 999]).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&a.id], TaskStatus::Available);
        assert_eq!(map[&b.id], TaskStatus::Available);
    }
}
