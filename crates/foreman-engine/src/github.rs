//! GitHub issue/PR links. At most one of each per task; linking is a
//! normal field mutation with audit trail and version bump.

use serde_json::json;

use foreman_core::types::Task;
use foreman_core::{ChangeEvent, EngineError, EventKind};
use foreman_store::repository::TaskRepo;

use crate::lifecycle::LifecycleEngine;
use crate::mutation::persist_mutation;
use crate::queries::QueryEngine;

/// Which link slot an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GithubLinkKind {
    Issue,
    PullRequest,
}

impl GithubLinkKind {
    fn field(self) -> &'static str {
        match self {
            Self::Issue => "github_issue_url",
            Self::PullRequest => "github_pr_url",
        }
    }

    fn path_marker(self) -> &'static str {
        match self {
            Self::Issue => "/issues/",
            Self::PullRequest => "/pull/",
        }
    }
}

/// The pair of links on a task.
#[derive(Clone, Debug, serde::Serialize)]
pub struct GithubLinks {
    pub task_id: i64,
    pub github_issue_url: Option<String>,
    pub github_pr_url: Option<String>,
}

fn validate_url(url: &str, kind: GithubLinkKind) -> Result<String, EngineError> {
    let trimmed = url.trim();
    if !trimmed.starts_with("https://github.com/") || !trimmed.contains(kind.path_marker()) {
        return Err(EngineError::Validation(format!(
            "expected a GitHub {} URL (https://github.com/<owner>/<repo>{}<number>), got '{trimmed}'",
            match kind {
                GithubLinkKind::Issue => "issue",
                GithubLinkKind::PullRequest => "pull request",
            },
            kind.path_marker(),
        )));
    }
    Ok(trimmed.to_string())
}

impl LifecycleEngine {
    /// Link a GitHub issue to a task.
    pub fn link_github_issue(
        &self,
        task_id: i64,
        agent_id: &str,
        url: &str,
    ) -> Result<Task, EngineError> {
        self.link_github(task_id, agent_id, url, GithubLinkKind::Issue)
    }

    /// Link a GitHub pull request to a task.
    pub fn link_github_pr(
        &self,
        task_id: i64,
        agent_id: &str,
        url: &str,
    ) -> Result<Task, EngineError> {
        self.link_github(task_id, agent_id, url, GithubLinkKind::PullRequest)
    }

    fn link_github(
        &self,
        task_id: i64,
        agent_id: &str,
        url: &str,
        kind: GithubLinkKind,
    ) -> Result<Task, EngineError> {
        let url = validate_url(url, kind)?;
        let (task, event) = self.store().with_write(|txn| {
            let task =
                TaskRepo::get(txn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))?;
            let current = match kind {
                GithubLinkKind::Issue => &task.github_issue_url,
                GithubLinkKind::PullRequest => &task.github_pr_url,
            };
            match current.as_deref() {
                Some(existing) if existing == url => return Ok((task, None)),
                Some(existing) => {
                    return Err(EngineError::Conflict(format!(
                        "task {task_id} already links {} '{existing}'",
                        kind.field()
                    )))
                }
                None => {}
            }

            let mut next = task.clone();
            match kind {
                GithubLinkKind::Issue => next.github_issue_url = Some(url.clone()),
                GithubLinkKind::PullRequest => next.github_pr_url = Some(url.clone()),
            }
            let stored = persist_mutation(txn, &task, &next, agent_id)?;
            let event = ChangeEvent::new(EventKind::TaskUpdated, task_id, agent_id)
                .with_summary(json!({ kind.field(): { "old": null, "new": &url } }));
            Ok((stored, Some(event)))
        })?;
        if let Some(event) = event {
            self.publisher().publish(event);
        }
        Ok(task)
    }
}

impl QueryEngine {
    /// Both GitHub links for a task.
    pub fn github_links(&self, task_id: i64) -> Result<GithubLinks, EngineError> {
        let task = self.get_task(task_id)?;
        Ok(GithubLinks {
            task_id,
            github_issue_url: task.github_issue_url,
            github_pr_url: task.github_pr_url,
        })
    }
}
