//! Tool handlers, one module per tool family.

pub mod analytics;
pub mod comments;
pub mod github;
pub mod projects;
pub mod queries;
pub mod tags;
pub mod tasks;
pub mod templates;
pub mod versions;

use serde_json::Value;

use crate::errors::RpcError;
use crate::registry::MethodRegistry;

/// Enum vocabularies shared by the schemas.
pub(crate) const TASK_TYPES: &[&str] = &["concrete", "abstract", "epic"];
pub(crate) const TASK_STATUSES: &[&str] = &[
    "available",
    "in_progress",
    "complete",
    "blocked",
    "cancelled",
];
pub(crate) const PRIORITIES: &[&str] = &["low", "medium", "high", "critical"];
pub(crate) const RELATIONSHIP_TYPES: &[&str] =
    &["subtask", "blocking", "blocked_by", "followup", "related"];
pub(crate) const UPDATE_TYPES: &[&str] = &["progress", "note", "blocker", "question", "finding"];
pub(crate) const AGENT_TYPES: &[&str] = &["implementation", "breakdown"];
pub(crate) const ORDERINGS: &[&str] = &["priority", "priority_asc", "created_at"];

/// Serialize a payload, mapping failures to an internal error.
pub(crate) fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal {
        message: format!("response serialization failed: {e}"),
    })
}

/// Register every tool on the registry.
pub fn register_all(registry: &mut MethodRegistry) {
    tasks::register(registry);
    queries::register(registry);
    analytics::register(registry);
    tags::register(registry);
    versions::register(registry);
    projects::register(registry);
    comments::register(registry);
    github::register(registry);
    templates::register(registry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_registry_has_core_tools() {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        for tool in [
            "list_available_tasks",
            "reserve_task",
            "complete_task",
            "create_task",
            "get_agent_performance",
            "unlock_task",
            "verify_task",
            "query_tasks",
            "query_stale_tasks",
            "get_task_statistics",
            "get_recent_completions",
            "get_task_summary",
            "bulk_unlock_tasks",
            "add_task_update",
            "get_task_context",
            "search_tasks",
            "get_tasks_approaching_deadline",
            "create_tag",
            "list_tags",
            "assign_tag_to_task",
            "remove_tag_from_task",
            "get_task_tags",
            "create_template",
            "list_templates",
            "get_template",
            "create_task_from_template",
            "get_activity_feed",
            "create_comment",
            "get_comment",
            "update_comment",
            "delete_comment",
            "get_comment_thread",
            "create_recurring_task",
            "list_recurring_tasks",
            "get_recurring_task",
            "update_recurring_task",
            "deactivate_recurring_task",
            "instantiate_recurring_task",
            "get_task_versions",
            "get_task_version",
            "get_latest_task_version",
            "diff_task_versions",
            "link_github_issue",
            "link_github_pr",
            "get_github_links",
            "list_projects",
            "get_project",
            "create_project",
        ] {
            assert!(registry.has_method(tool), "missing tool {tool}");
        }
    }
}
