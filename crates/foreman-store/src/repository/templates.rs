//! Task templates.

use rusqlite::{params, Connection, OptionalExtension};

use foreman_core::time::now_iso;
use foreman_core::types::{TaskPriority, TaskTemplate, TaskType};
use foreman_core::EngineError;

use crate::rows::template_from_row;

use super::map_constraint;

/// Template repository.
pub struct TemplateRepo;

impl TemplateRepo {
    pub fn create(
        conn: &Connection,
        name: &str,
        title: &str,
        task_type: TaskType,
        task_instruction: &str,
        verification_instruction: &str,
        priority: TaskPriority,
        notes: Option<&str>,
    ) -> Result<TaskTemplate, EngineError> {
        let now = now_iso();
        conn.execute(
            "INSERT INTO task_templates (name, title, task_type, task_instruction,
             verification_instruction, priority, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                name,
                title,
                task_type.as_sql(),
                task_instruction,
                verification_instruction,
                priority.as_sql(),
                notes,
                now
            ],
        )
        .map_err(|e| map_constraint(e, format!("template '{name}' already exists")))?;
        Ok(TaskTemplate {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
            title: title.to_string(),
            task_type,
            task_instruction: task_instruction.to_string(),
            verification_instruction: verification_instruction.to_string(),
            priority,
            notes: notes.map(String::from),
            created_at: now,
        })
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<TaskTemplate>, EngineError> {
        let template = conn
            .query_row(
                "SELECT * FROM task_templates WHERE id = ?1",
                params![id],
                template_from_row,
            )
            .optional()?;
        Ok(template)
    }

    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<TaskTemplate>, EngineError> {
        let template = conn
            .query_row(
                "SELECT * FROM task_templates WHERE name = ?1",
                params![name],
                template_from_row,
            )
            .optional()?;
        Ok(template)
    }

    pub fn list(conn: &Connection) -> Result<Vec<TaskTemplate>, EngineError> {
        let mut stmt = conn.prepare("SELECT * FROM task_templates ORDER BY name")?;
        let rows = stmt.query_map([], template_from_row)?;
        let mut templates = Vec::new();
        for row in rows {
            templates.push(row?);
        }
        Ok(templates)
    }
}
