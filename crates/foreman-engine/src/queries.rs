//! Filtered, ordered, and searched reads; aggregates; the activity feed;
//! and task context assembly.
//!
//! Availability queries overfetch candidates and strip effectively-blocked
//! tasks through one batched resolver pass. Reads slower than the
//! configured threshold log a warning.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::warn;

use foreman_core::time::{hours_from_now, now_iso};
use foreman_core::types::{
    AgentType, ChangeEntry, Project, Tag, Task, TaskFilter, TaskSummary, TaskType, TaskUpdate,
    TaskVersion, VersionDiffEntry,
};
use foreman_core::{EngineError, ForemanConfig};
use foreman_store::repository::{
    AgentPerformance, ChangeRepo, ProjectRepo, RelationshipRepo, StatisticsFilter, TagRepo,
    TaskRepo, TaskStatistics, UpdateRepo, VersionRepo,
};
use foreman_store::Store;

use crate::deps::DependencyResolver;
use crate::lifecycle::{stale_warning_for, StaleWarning};

/// Hard cap on result-set size; requests above it are rejected.
pub const MAX_LIMIT: u32 = 1_000;

/// One row of the merged activity feed.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "entry_type", rename_all = "snake_case")]
pub enum ActivityEntry {
    Change(ChangeEntry),
    Update(TaskUpdate),
}

impl ActivityEntry {
    fn sort_key(&self) -> (&str, i64) {
        match self {
            Self::Change(entry) => (&entry.created_at, entry.id),
            Self::Update(update) => (&update.created_at, update.id),
        }
    }
}

/// Everything an agent needs to pick up a task.
#[derive(Clone, Debug, Serialize)]
pub struct TaskContext {
    pub task: Task,
    pub project: Option<Project>,
    /// Ancestors along `subtask` edges, root first.
    pub ancestry: Vec<Task>,
    /// All narrative updates, chronological.
    pub updates: Vec<TaskUpdate>,
    /// The most recent change entries, newest first.
    pub recent_changes: Vec<ChangeEntry>,
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_info: Option<StaleWarning>,
}

/// Read-side engine.
#[derive(Clone)]
pub struct QueryEngine {
    store: Store,
    config: Arc<ForemanConfig>,
}

fn check_limit(limit: u32) -> Result<u32, EngineError> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(EngineError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

impl QueryEngine {
    pub fn new(store: Store, config: Arc<ForemanConfig>) -> Self {
        Self { store, config }
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    fn timed<T>(
        &self,
        name: &str,
        f: impl FnOnce() -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        if elapsed.as_millis() as u64 >= self.config.slow_query_threshold_ms {
            warn!(
                query = name,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow query"
            );
        }
        result
    }

    /// Fetch a task, erroring when absent.
    pub fn get_task(&self, task_id: i64) -> Result<Task, EngineError> {
        let conn = self.store.reader()?;
        TaskRepo::get(&conn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))
    }

    /// Available tasks for an agent type, excluding effectively-blocked
    /// ones, ordered priority-desc then created_at.
    pub fn list_available(
        &self,
        agent_type: AgentType,
        project_id: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Task>, EngineError> {
        let limit = check_limit(limit)?;
        self.timed("list_available", || {
            let conn = self.store.reader()?;
            let candidates = TaskRepo::available_candidates(
                &conn,
                agent_type.task_types(),
                project_id,
                MAX_LIMIT,
            )?;
            let ids: Vec<i64> = candidates.iter().map(|t| t.id).collect();
            let blocked = DependencyResolver::blocked_set(&conn, &ids)?;
            Ok(candidates
                .into_iter()
                .filter(|t| !blocked.contains(&t.id))
                .take(limit as usize)
                .collect())
        })
    }

    /// Structured filtered query.
    pub fn query(&self, filter: &TaskFilter, limit: u32) -> Result<Vec<Task>, EngineError> {
        let limit = check_limit(limit)?;
        self.timed("query", || {
            let conn = self.store.reader()?;
            TaskRepo::query(&conn, filter, limit)
        })
    }

    /// Lightweight summaries with the same filters as `query`.
    pub fn summary(
        &self,
        filter: &TaskFilter,
        limit: u32,
    ) -> Result<Vec<TaskSummary>, EngineError> {
        let limit = check_limit(limit)?;
        self.timed("summary", || {
            let conn = self.store.reader()?;
            TaskRepo::summaries(&conn, filter, limit)
        })
    }

    /// Case-insensitive substring search.
    pub fn search(&self, query: &str, limit: u32) -> Result<Vec<Task>, EngineError> {
        let limit = check_limit(limit)?;
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(EngineError::Validation(
                "search query cannot be empty".into(),
            ));
        }
        self.timed("search", || {
            let conn = self.store.reader()?;
            TaskRepo::search(&conn, trimmed, limit)
        })
    }

    /// Aggregate statistics.
    pub fn statistics(&self, filter: &StatisticsFilter) -> Result<TaskStatistics, EngineError> {
        self.timed("statistics", || {
            let conn = self.store.reader()?;
            TaskRepo::statistics(&conn, filter)
        })
    }

    /// Recently completed tasks, newest completion first. `hours` restricts
    /// to completions within the window.
    pub fn recent_completions(
        &self,
        limit: u32,
        project_id: Option<i64>,
        hours: Option<f64>,
    ) -> Result<Vec<TaskSummary>, EngineError> {
        let limit = check_limit(limit)?;
        let since = hours.map(|h| hours_from_now(-h));
        self.timed("recent_completions", || {
            let conn = self.store.reader()?;
            TaskRepo::recent_completions(&conn, project_id, since.as_deref(), limit)
        })
    }

    /// Open tasks with a due date within the next `days_ahead` days.
    pub fn approaching_deadline(
        &self,
        days_ahead: f64,
        limit: u32,
    ) -> Result<Vec<Task>, EngineError> {
        let limit = check_limit(limit)?;
        if days_ahead <= 0.0 {
            return Err(EngineError::Validation(
                "days_ahead must be positive".into(),
            ));
        }
        let after = now_iso();
        let until = hours_from_now(days_ahead * 24.0);
        self.timed("approaching_deadline", || {
            let conn = self.store.reader()?;
            TaskRepo::approaching_deadline(&conn, &after, &until, limit)
        })
    }

    /// In-progress tasks held longer than the effective timeout:
    /// `max(hours, configured stale timeout)`.
    pub fn stale(&self, hours: Option<f64>) -> Result<(Vec<Task>, f64), EngineError> {
        let effective = match hours {
            Some(h) if h > self.config.stale_timeout_hours => h,
            _ => self.config.stale_timeout_hours,
        };
        let cutoff = hours_from_now(-effective);
        let tasks = self.timed("stale", || {
            let conn = self.store.reader()?;
            TaskRepo::stale(&conn, &cutoff, MAX_LIMIT)
        })?;
        Ok((tasks, effective))
    }

    /// Merge of change entries and updates, ordered `(timestamp, id)`
    /// ascending.
    pub fn activity_feed(
        &self,
        task_id: Option<i64>,
        agent_id: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ActivityEntry>, EngineError> {
        let limit = check_limit(limit)?;
        self.timed("activity_feed", || {
            let conn = self.store.reader()?;
            let mut entries: Vec<ActivityEntry> =
                ChangeRepo::query(&conn, task_id, agent_id, start, end, limit)?
                    .into_iter()
                    .map(ActivityEntry::Change)
                    .collect();
            entries.extend(
                UpdateRepo::query(&conn, task_id, agent_id, start, end, limit)?
                    .into_iter()
                    .map(ActivityEntry::Update),
            );
            entries.sort_by(|a, b| {
                let (a_ts, a_id) = a.sort_key();
                let (b_ts, b_id) = b.sort_key();
                a_ts.cmp(b_ts).then(a_id.cmp(&b_id))
            });
            entries.truncate(limit as usize);
            Ok(entries)
        })
    }

    /// Aggregates over an agent's completed tasks.
    pub fn agent_performance(
        &self,
        agent_id: &str,
        task_type: Option<TaskType>,
    ) -> Result<AgentPerformance, EngineError> {
        self.timed("agent_performance", || {
            let conn = self.store.reader()?;
            TaskRepo::agent_performance(&conn, agent_id, task_type)
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Versions
    // ─────────────────────────────────────────────────────────────────────

    /// All versions of a task, newest first.
    pub fn task_versions(&self, task_id: i64) -> Result<Vec<TaskVersion>, EngineError> {
        let conn = self.store.reader()?;
        if TaskRepo::get(&conn, task_id)?.is_none() {
            return Err(EngineError::task_not_found(task_id));
        }
        VersionRepo::list(&conn, task_id)
    }

    /// A specific version.
    pub fn task_version(
        &self,
        task_id: i64,
        version_number: i64,
    ) -> Result<TaskVersion, EngineError> {
        let conn = self.store.reader()?;
        VersionRepo::get(&conn, task_id, version_number)?.ok_or(EngineError::NotFound {
            entity: "TaskVersion",
            id: format!("{task_id}/v{version_number}"),
        })
    }

    /// The most recent version.
    pub fn latest_task_version(&self, task_id: i64) -> Result<TaskVersion, EngineError> {
        let conn = self.store.reader()?;
        VersionRepo::latest(&conn, task_id)?.ok_or(EngineError::NotFound {
            entity: "TaskVersion",
            id: format!("{task_id}/latest"),
        })
    }

    /// Field diff between two versions (`v2 > v1`).
    pub fn diff_task_versions(
        &self,
        task_id: i64,
        v1: i64,
        v2: i64,
    ) -> Result<Vec<VersionDiffEntry>, EngineError> {
        let conn = self.store.reader()?;
        VersionRepo::diff(&conn, task_id, v1, v2)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Context
    // ─────────────────────────────────────────────────────────────────────

    /// Assemble the full working context for a task.
    pub fn task_context(&self, task_id: i64) -> Result<TaskContext, EngineError> {
        self.timed("task_context", || {
            let conn = self.store.reader()?;
            let task = TaskRepo::get(&conn, task_id)?
                .ok_or_else(|| EngineError::task_not_found(task_id))?;
            let project = match task.project_id {
                Some(pid) => ProjectRepo::get(&conn, pid)?,
                None => None,
            };

            // Walk subtask parents upward, then flip to root-first order.
            let mut ancestry = Vec::new();
            let mut visited = std::collections::HashSet::from([task_id]);
            let mut current = task_id;
            while let Some(parent_id) = RelationshipRepo::subtask_parents(&conn, current)?
                .into_iter()
                .find(|id| !visited.contains(id))
            {
                let _ = visited.insert(parent_id);
                match TaskRepo::get(&conn, parent_id)? {
                    Some(parent) => {
                        ancestry.push(parent);
                        current = parent_id;
                    }
                    None => break,
                }
            }
            ancestry.reverse();

            let updates = UpdateRepo::for_task(&conn, task_id, MAX_LIMIT)?;
            let recent_changes = ChangeRepo::recent_for_task(&conn, task_id, 10)?;
            let tags = TagRepo::for_task(&conn, task_id)?;
            let stale_info = stale_warning_for(&conn, task_id)?;

            Ok(TaskContext {
                task,
                project,
                ancestry,
                updates,
                recent_changes,
                tags,
                stale_info,
            })
        })
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::lifecycle::{CompleteParams, CreateTaskParams};
    use crate::Foreman;
    use foreman_core::types::{RelationshipType, TaskPriority, UpdateType};

    fn params(title: &str) -> CreateTaskParams {
        CreateTaskParams {
            title: title.to_string(),
            task_type: TaskType::Concrete,
            task_instruction: "Implement something meaningful".into(),
            verification_instruction: "Verify something meaningful".into(),
            agent_id: "a1".into(),
            project_id: None,
            parent_task_id: None,
            relationship_type: None,
            priority: None,
            notes: None,
            estimated_hours: None,
            due_date: None,
        }
    }

    #[test]
    fn limit_bounds() {
        let foreman = Foreman::open_in_memory().unwrap();
        assert!(foreman.queries.query(&TaskFilter::default(), 1000).is_ok());
        let err = foreman
            .queries
            .query(&TaskFilter::default(), 1001)
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
        let err = foreman
            .queries
            .query(&TaskFilter::default(), 0)
            .unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn list_available_projects_agent_types() {
        let foreman = Foreman::open_in_memory().unwrap();
        foreman
            .lifecycle
            .create_task(&params("Concrete work"))
            .unwrap();
        let mut epic = params("Epic work");
        epic.task_type = TaskType::Epic;
        foreman.lifecycle.create_task(&epic).unwrap();

        let implementation = foreman
            .queries
            .list_available(AgentType::Implementation, None, 10)
            .unwrap();
        assert_eq!(implementation.len(), 1);
        assert_eq!(implementation[0].title, "Concrete work");

        let breakdown = foreman
            .queries
            .list_available(AgentType::Breakdown, None, 10)
            .unwrap();
        assert_eq!(breakdown.len(), 1);
        assert_eq!(breakdown[0].title, "Epic work");
    }

    #[test]
    fn list_available_excludes_blocked() {
        let foreman = Foreman::open_in_memory().unwrap();
        let a = foreman.lifecycle.create_task(&params("A")).unwrap().task;
        let b = foreman.lifecycle.create_task(&params("B")).unwrap().task;
        foreman
            .lifecycle
            .add_relationship(b.id, a.id, RelationshipType::BlockedBy, "a1")
            .unwrap();

        let available = foreman
            .queries
            .list_available(AgentType::Implementation, None, 10)
            .unwrap();
        let titles: Vec<&str> = available.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["B"]);

        // Completing the blocker releases A.
        foreman.lifecycle.reserve(b.id, "a1").unwrap();
        foreman
            .lifecycle
            .complete(b.id, "a1", &CompleteParams::default())
            .unwrap();
        let available = foreman
            .queries
            .list_available(AgentType::Implementation, None, 10)
            .unwrap();
        let titles: Vec<&str> = available.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["A"]);
    }

    #[test]
    fn list_available_orders_by_priority() {
        let foreman = Foreman::open_in_memory().unwrap();
        let mut low = params("low");
        low.priority = Some(TaskPriority::Low);
        foreman.lifecycle.create_task(&low).unwrap();
        let mut critical = params("critical");
        critical.priority = Some(TaskPriority::Critical);
        foreman.lifecycle.create_task(&critical).unwrap();

        let available = foreman
            .queries
            .list_available(AgentType::Implementation, None, 10)
            .unwrap();
        assert_eq!(available[0].title, "critical");
        assert_eq!(available[1].title, "low");
    }

    #[test]
    fn statistics_totals_match_query() {
        let foreman = Foreman::open_in_memory().unwrap();
        for i in 0..4 {
            foreman
                .lifecycle
                .create_task(&params(&format!("t{i}")))
                .unwrap();
        }
        let stats = foreman
            .queries
            .statistics(&StatisticsFilter::default())
            .unwrap();
        let queried = foreman.queries.query(&TaskFilter::default(), 1000).unwrap();
        assert_eq!(stats.total as usize, queried.len());
    }

    #[test]
    fn activity_feed_merges_changes_and_updates() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman.lifecycle.create_task(&params("Feed")).unwrap().task;
        foreman
            .lifecycle
            .add_update(task.id, "a1", UpdateType::Progress, "working on it", None)
            .unwrap();
        foreman.lifecycle.reserve(task.id, "a1").unwrap();

        let feed = foreman
            .queries
            .activity_feed(Some(task.id), None, None, None, 1000)
            .unwrap();
        assert!(feed.iter().any(|e| matches!(e, ActivityEntry::Change(_))));
        assert!(feed.iter().any(|e| matches!(e, ActivityEntry::Update(_))));

        // Ascending (timestamp, id).
        let keys: Vec<(String, i64)> = feed
            .iter()
            .map(|e| {
                let (ts, id) = e.sort_key();
                (ts.to_string(), id)
            })
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn task_context_includes_ancestry_root_first() {
        let foreman = Foreman::open_in_memory().unwrap();
        let root = foreman.lifecycle.create_task(&params("root")).unwrap().task;
        let mut mid = params("mid");
        mid.parent_task_id = Some(root.id);
        mid.relationship_type = Some(RelationshipType::Subtask);
        let mid = foreman.lifecycle.create_task(&mid).unwrap().task;
        let mut leaf = params("leaf");
        leaf.parent_task_id = Some(mid.id);
        leaf.relationship_type = Some(RelationshipType::Subtask);
        let leaf = foreman.lifecycle.create_task(&leaf).unwrap().task;

        let context = foreman.queries.task_context(leaf.id).unwrap();
        let titles: Vec<&str> = context.ancestry.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["root", "mid"]);
        assert!(context.stale_info.is_none());
    }

    #[test]
    fn search_empty_query_rejected() {
        let foreman = Foreman::open_in_memory().unwrap();
        let err = foreman.queries.search("  ", 10).unwrap_err();
        assert_eq!(err.kind(), "VALIDATION_ERROR");
    }

    #[test]
    fn stale_uses_max_of_hours_and_config() {
        let foreman = Foreman::open_in_memory().unwrap();
        // Below the configured 24h the configured value wins.
        let (_, effective) = foreman.queries.stale(Some(1.0)).unwrap();
        assert!((effective - 24.0).abs() < f64::EPSILON);
        let (_, effective) = foreman.queries.stale(Some(48.0)).unwrap();
        assert!((effective - 48.0).abs() < f64::EPSILON);
        let (_, effective) = foreman.queries.stale(None).unwrap();
        assert!((effective - 24.0).abs() < f64::EPSILON);
    }

    #[test]
    fn versions_surface_through_queries() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Versioned"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();

        let versions = foreman.queries.task_versions(task.id).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_number, 2);

        let latest = foreman.queries.latest_task_version(task.id).unwrap();
        assert_eq!(latest.version_number, 2);

        let diff = foreman.queries.diff_task_versions(task.id, 1, 2).unwrap();
        assert!(diff.iter().any(|d| d.field == "task_status"));

        let err = foreman.queries.task_versions(404).unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }
}
