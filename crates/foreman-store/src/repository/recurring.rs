//! Recurring-task schedules.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::{RecurringTask, TaskPriority, TaskType};
use foreman_core::EngineError;

use crate::rows::recurring_from_row;

use super::map_constraint;

/// Insert/update parameters for a schedule.
#[derive(Clone, Debug)]
pub struct NewRecurring {
    pub name: String,
    pub title: String,
    pub task_type: TaskType,
    pub task_instruction: String,
    pub verification_instruction: String,
    pub priority: TaskPriority,
    pub project_id: Option<i64>,
    pub interval_hours: f64,
    pub next_run_at: String,
}

/// Recurring-schedule repository.
pub struct RecurringRepo;

impl RecurringRepo {
    pub fn create(conn: &Connection, new: &NewRecurring) -> Result<RecurringTask, EngineError> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO recurring_tasks (name, title, task_type, task_instruction,
             verification_instruction, priority, project_id, interval_hours, next_run_at,
             active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1, ?10, ?10)",
            params![
                new.name,
                new.title,
                new.task_type.as_sql(),
                new.task_instruction,
                new.verification_instruction,
                new.priority.as_sql(),
                new.project_id,
                new.interval_hours,
                new.next_run_at,
                now,
            ],
        )
        .map_err(|e| map_constraint(e, format!("recurring task '{}' already exists", new.name)))?;
        let id = conn.last_insert_rowid();
        Self::get(conn, id)?.ok_or(EngineError::NotFound {
            entity: "RecurringTask",
            id: id.to_string(),
        })
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<RecurringTask>, EngineError> {
        let schedule = conn
            .query_row(
                "SELECT * FROM recurring_tasks WHERE id = ?1",
                params![id],
                recurring_from_row,
            )
            .optional()?;
        Ok(schedule)
    }

    pub fn list(conn: &Connection, active_only: bool) -> Result<Vec<RecurringTask>, EngineError> {
        let sql = if active_only {
            "SELECT * FROM recurring_tasks WHERE active = 1 ORDER BY name"
        } else {
            "SELECT * FROM recurring_tasks ORDER BY name"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], recurring_from_row)?;
        let mut schedules = Vec::new();
        for row in rows {
            schedules.push(row?);
        }
        Ok(schedules)
    }

    /// Update mutable schedule fields.
    pub fn update(
        conn: &Connection,
        id: i64,
        title: Option<&str>,
        task_instruction: Option<&str>,
        verification_instruction: Option<&str>,
        priority: Option<TaskPriority>,
        interval_hours: Option<f64>,
    ) -> Result<RecurringTask, EngineError> {
        let mut sets: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(title) = title {
            sets.push("title = ?".to_string());
            values.push(Box::new(title.to_string()));
        }
        if let Some(instruction) = task_instruction {
            sets.push("task_instruction = ?".to_string());
            values.push(Box::new(instruction.to_string()));
        }
        if let Some(verification) = verification_instruction {
            sets.push("verification_instruction = ?".to_string());
            values.push(Box::new(verification.to_string()));
        }
        if let Some(priority) = priority {
            sets.push("priority = ?".to_string());
            values.push(Box::new(priority.as_sql().to_string()));
        }
        if let Some(interval) = interval_hours {
            sets.push("interval_hours = ?".to_string());
            values.push(Box::new(interval));
        }
        if sets.is_empty() {
            return Self::get(conn, id)?.ok_or(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            });
        }
        sets.push("updated_at = ?".to_string());
        values.push(Box::new(now_iso()));
        values.push(Box::new(id));

        let sql = format!(
            "UPDATE recurring_tasks SET {} WHERE id = ?",
            sets.join(", ")
        );
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            });
        }
        Self::get(conn, id)?.ok_or(EngineError::NotFound {
            entity: "RecurringTask",
            id: id.to_string(),
        })
    }

    /// Deactivate a schedule. Returns false if it was already inactive.
    pub fn deactivate(conn: &Connection, id: i64) -> Result<bool, EngineError> {
        let changed = conn.execute(
            "UPDATE recurring_tasks SET active = 0, updated_at = ?1 WHERE id = ?2 AND active = 1",
            params![now_iso(), id],
        )?;
        Ok(changed > 0)
    }

    /// Advance the next-run pointer after an instantiation.
    pub fn advance(conn: &Connection, id: i64, next_run_at: &str) -> Result<(), EngineError> {
        let changed = conn.execute(
            "UPDATE recurring_tasks SET next_run_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![next_run_at, now_iso(), id],
        )?;
        if changed == 0 {
            return Err(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
