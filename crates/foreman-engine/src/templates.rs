//! Task templates and recurring schedules. Instantiation routes through
//! the normal `create_task` path, so validation, audit, and events apply
//! unchanged.

use std::collections::BTreeMap;

use foreman_core::time::hours_from_now;
use foreman_core::types::{RecurringTask, TaskPriority, TaskTemplate, TaskType};
use foreman_core::EngineError;
use foreman_store::repository::{NewRecurring, RecurringRepo, TemplateRepo};

use crate::lifecycle::{CreateTaskParams, CreateTaskResult, LifecycleEngine};
use crate::queries::QueryEngine;

/// Replace `{name}` placeholders with their variable values.
fn substitute(text: &str, variables: &BTreeMap<String, String>) -> String {
    let mut result = text.to_string();
    for (key, value) in variables {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

impl LifecycleEngine {
    /// Create a reusable task template with a unique name.
    #[allow(clippy::too_many_arguments)]
    pub fn create_template(
        &self,
        name: &str,
        title: &str,
        task_type: TaskType,
        task_instruction: &str,
        verification_instruction: &str,
        priority: Option<TaskPriority>,
        notes: Option<&str>,
    ) -> Result<TaskTemplate, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "template name must be non-empty".into(),
            ));
        }
        self.store().with_write(|txn| {
            TemplateRepo::create(
                txn,
                name,
                title,
                task_type,
                task_instruction,
                verification_instruction,
                priority.unwrap_or(TaskPriority::Medium),
                notes,
            )
        })
    }

    /// Instantiate a template: substitute `{placeholder}` variables into
    /// the text fields, then create the task normally.
    pub fn create_task_from_template(
        &self,
        template_id: i64,
        agent_id: &str,
        variables: &BTreeMap<String, String>,
        project_id: Option<i64>,
        due_date: Option<String>,
    ) -> Result<CreateTaskResult, EngineError> {
        let template = {
            let conn = self.store().reader()?;
            TemplateRepo::get(&conn, template_id)?.ok_or(EngineError::NotFound {
                entity: "TaskTemplate",
                id: template_id.to_string(),
            })?
        };
        self.create_task(&CreateTaskParams {
            title: substitute(&template.title, variables),
            task_type: template.task_type,
            task_instruction: substitute(&template.task_instruction, variables),
            verification_instruction: substitute(&template.verification_instruction, variables),
            agent_id: agent_id.to_string(),
            project_id,
            parent_task_id: None,
            relationship_type: None,
            priority: Some(template.priority),
            notes: template.notes.as_deref().map(|n| substitute(n, variables)),
            estimated_hours: None,
            due_date,
        })
    }

    /// Create a recurring schedule. The first instantiation is due
    /// `interval_hours` from now.
    #[allow(clippy::too_many_arguments)]
    pub fn create_recurring(
        &self,
        name: &str,
        title: &str,
        task_type: TaskType,
        task_instruction: &str,
        verification_instruction: &str,
        priority: Option<TaskPriority>,
        project_id: Option<i64>,
        interval_hours: f64,
    ) -> Result<RecurringTask, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation(
                "schedule name must be non-empty".into(),
            ));
        }
        if !interval_hours.is_finite() || interval_hours < 1.0 {
            return Err(EngineError::Validation(format!(
                "interval_hours must be at least 1, got {interval_hours}"
            )));
        }
        let new = NewRecurring {
            name: name.to_string(),
            title: title.to_string(),
            task_type,
            task_instruction: task_instruction.to_string(),
            verification_instruction: verification_instruction.to_string(),
            priority: priority.unwrap_or(TaskPriority::Medium),
            project_id,
            interval_hours,
            next_run_at: hours_from_now(interval_hours),
        };
        self.store()
            .with_write(|txn| RecurringRepo::create(txn, &new))
    }

    /// Update the mutable fields of a schedule.
    pub fn update_recurring(
        &self,
        id: i64,
        title: Option<&str>,
        task_instruction: Option<&str>,
        verification_instruction: Option<&str>,
        priority: Option<TaskPriority>,
        interval_hours: Option<f64>,
    ) -> Result<RecurringTask, EngineError> {
        if let Some(interval) = interval_hours {
            if !interval.is_finite() || interval < 1.0 {
                return Err(EngineError::Validation(format!(
                    "interval_hours must be at least 1, got {interval}"
                )));
            }
        }
        self.store().with_write(|txn| {
            RecurringRepo::update(
                txn,
                id,
                title,
                task_instruction,
                verification_instruction,
                priority,
                interval_hours,
            )
        })
    }

    /// Deactivate a schedule; instantiation refuses afterwards.
    pub fn deactivate_recurring(&self, id: i64) -> Result<RecurringTask, EngineError> {
        self.store().with_write(|txn| {
            let schedule = RecurringRepo::get(txn, id)?.ok_or(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            })?;
            if !schedule.active {
                return Err(EngineError::InvalidTransition {
                    task_id: id,
                    detail: "schedule is already inactive".into(),
                });
            }
            let _ = RecurringRepo::deactivate(txn, id)?;
            RecurringRepo::get(txn, id)?.ok_or(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            })
        })
    }

    /// Instantiate a schedule now and advance its next-run pointer by one
    /// interval.
    pub fn instantiate_recurring(
        &self,
        id: i64,
        agent_id: &str,
    ) -> Result<CreateTaskResult, EngineError> {
        let schedule = {
            let conn = self.store().reader()?;
            RecurringRepo::get(&conn, id)?.ok_or(EngineError::NotFound {
                entity: "RecurringTask",
                id: id.to_string(),
            })?
        };
        if !schedule.active {
            return Err(EngineError::InvalidTransition {
                task_id: id,
                detail: "cannot instantiate an inactive schedule".into(),
            });
        }
        let result = self.create_task(&CreateTaskParams {
            title: schedule.title.clone(),
            task_type: schedule.task_type,
            task_instruction: schedule.task_instruction.clone(),
            verification_instruction: schedule.verification_instruction.clone(),
            agent_id: agent_id.to_string(),
            project_id: schedule.project_id,
            parent_task_id: None,
            relationship_type: None,
            priority: Some(schedule.priority),
            notes: None,
            estimated_hours: None,
            due_date: None,
        })?;
        let next = hours_from_now(schedule.interval_hours);
        self.store()
            .with_write(|txn| RecurringRepo::advance(txn, id, &next))?;
        Ok(result)
    }
}

impl QueryEngine {
    /// All templates, by name.
    pub fn list_templates(&self) -> Result<Vec<TaskTemplate>, EngineError> {
        let conn = self.store().reader()?;
        TemplateRepo::list(&conn)
    }

    /// Fetch a template.
    pub fn get_template(&self, template_id: i64) -> Result<TaskTemplate, EngineError> {
        let conn = self.store().reader()?;
        TemplateRepo::get(&conn, template_id)?.ok_or(EngineError::NotFound {
            entity: "TaskTemplate",
            id: template_id.to_string(),
        })
    }

    /// Schedules, optionally restricted to active ones.
    pub fn list_recurring(&self, active_only: bool) -> Result<Vec<RecurringTask>, EngineError> {
        let conn = self.store().reader()?;
        RecurringRepo::list(&conn, active_only)
    }

    /// Fetch a schedule.
    pub fn get_recurring(&self, id: i64) -> Result<RecurringTask, EngineError> {
        let conn = self.store().reader()?;
        RecurringRepo::get(&conn, id)?.ok_or(EngineError::NotFound {
            entity: "RecurringTask",
            id: id.to_string(),
        })
    }
}
