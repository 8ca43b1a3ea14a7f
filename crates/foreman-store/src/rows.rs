//! Row-to-entity converters.
//!
//! Enum columns that fail to parse surface as conversion failures rather
//! than silently defaulting; an unknown value in a CHECK-constrained column
//! means the file is corrupt.

use rusqlite::types::Type;
use rusqlite::Row;

use foreman_core::types::{
    ChangeEntry, ChangeType, Comment, Project, RecurringTask, Relationship, RelationshipType, Tag,
    Task, TaskPriority, TaskStatus, TaskSummary, TaskTemplate, TaskType, TaskUpdate, TaskVersion,
    UpdateType, VerificationStatus,
};

fn decode_err(field: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        Type::Text,
        format!("invalid {field} value '{value}'").into(),
    )
}

fn parse_json(field: &str, raw: &str) -> rusqlite::Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|_| decode_err(field, raw))
}

pub fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get("task_status")?;
    let task_type: String = row.get("task_type")?;
    let priority: String = row.get("priority")?;
    let verification: String = row.get("verification_status")?;

    Ok(Task {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        task_type: TaskType::parse(&task_type)
            .ok_or_else(|| decode_err("task_type", &task_type))?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| decode_err("priority", &priority))?,
        title: row.get("title")?,
        task_instruction: row.get("task_instruction")?,
        verification_instruction: row.get("verification_instruction")?,
        notes: row.get("notes")?,
        assigned_agent: row.get("assigned_agent")?,
        assigned_at: row.get("assigned_at")?,
        task_status: TaskStatus::parse(&status)
            .ok_or_else(|| decode_err("task_status", &status))?,
        verification_status: VerificationStatus::parse(&verification)
            .ok_or_else(|| decode_err("verification_status", &verification))?,
        estimated_hours: row.get("estimated_hours")?,
        actual_hours: row.get("actual_hours")?,
        due_date: row.get("due_date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
        github_issue_url: row.get("github_issue_url")?,
        github_pr_url: row.get("github_pr_url")?,
    })
}

pub fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<TaskSummary> {
    let status: String = row.get("task_status")?;
    let task_type: String = row.get("task_type")?;
    let priority: String = row.get("priority")?;

    Ok(TaskSummary {
        id: row.get("id")?,
        title: row.get("title")?,
        task_type: TaskType::parse(&task_type)
            .ok_or_else(|| decode_err("task_type", &task_type))?,
        task_status: TaskStatus::parse(&status)
            .ok_or_else(|| decode_err("task_status", &status))?,
        assigned_agent: row.get("assigned_agent")?,
        project_id: row.get("project_id")?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| decode_err("priority", &priority))?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

pub fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        local_path: row.get("local_path")?,
        origin_url: row.get("origin_url")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let kind: String = row.get("relationship_type")?;
    Ok(Relationship {
        id: row.get("id")?,
        parent_task_id: row.get("parent_task_id")?,
        child_task_id: row.get("child_task_id")?,
        relationship_type: RelationshipType::parse(&kind)
            .ok_or_else(|| decode_err("relationship_type", &kind))?,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by")?,
    })
}

pub fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}

pub fn update_from_row(row: &Row<'_>) -> rusqlite::Result<TaskUpdate> {
    let kind: String = row.get("update_type")?;
    let metadata: Option<String> = row.get("metadata")?;
    Ok(TaskUpdate {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        agent_id: row.get("agent_id")?,
        update_type: UpdateType::parse(&kind).ok_or_else(|| decode_err("update_type", &kind))?,
        content: row.get("content")?,
        metadata: match metadata {
            Some(raw) => Some(parse_json("metadata", &raw)?),
            None => None,
        },
        created_at: row.get("created_at")?,
    })
}

pub fn change_from_row(row: &Row<'_>) -> rusqlite::Result<ChangeEntry> {
    let kind: String = row.get("change_type")?;
    Ok(ChangeEntry {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        agent_id: row.get("agent_id")?,
        change_type: ChangeType::parse(&kind).ok_or_else(|| decode_err("change_type", &kind))?,
        field_name: row.get("field_name")?,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        created_at: row.get("created_at")?,
    })
}

pub fn version_from_row(row: &Row<'_>) -> rusqlite::Result<TaskVersion> {
    let payload: String = row.get("payload")?;
    Ok(TaskVersion {
        task_id: row.get("task_id")?,
        version_number: row.get("version_number")?,
        payload: parse_json("payload", &payload)?,
        created_at: row.get("created_at")?,
    })
}

pub fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let mentions: String = row.get("mentions")?;
    Ok(Comment {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        agent_id: row.get("agent_id")?,
        content: row.get("content")?,
        parent_comment_id: row.get("parent_comment_id")?,
        mentions: serde_json::from_str(&mentions).map_err(|_| decode_err("mentions", &mentions))?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn template_from_row(row: &Row<'_>) -> rusqlite::Result<TaskTemplate> {
    let task_type: String = row.get("task_type")?;
    let priority: String = row.get("priority")?;
    Ok(TaskTemplate {
        id: row.get("id")?,
        name: row.get("name")?,
        title: row.get("title")?,
        task_type: TaskType::parse(&task_type)
            .ok_or_else(|| decode_err("task_type", &task_type))?,
        task_instruction: row.get("task_instruction")?,
        verification_instruction: row.get("verification_instruction")?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| decode_err("priority", &priority))?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}

pub fn recurring_from_row(row: &Row<'_>) -> rusqlite::Result<RecurringTask> {
    let task_type: String = row.get("task_type")?;
    let priority: String = row.get("priority")?;
    let active: i64 = row.get("active")?;
    Ok(RecurringTask {
        id: row.get("id")?,
        name: row.get("name")?,
        title: row.get("title")?,
        task_type: TaskType::parse(&task_type)
            .ok_or_else(|| decode_err("task_type", &task_type))?,
        task_instruction: row.get("task_instruction")?,
        verification_instruction: row.get("verification_instruction")?,
        priority: TaskPriority::parse(&priority)
            .ok_or_else(|| decode_err("priority", &priority))?,
        project_id: row.get("project_id")?,
        interval_hours: row.get("interval_hours")?,
        next_run_at: row.get("next_run_at")?,
        active: active != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
