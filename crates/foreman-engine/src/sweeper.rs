//! Background scanner that releases reservations exceeding the lease
//! timeout.
//!
//! A cooperative loop: wakes on a timer, reads the stale set on a pooled
//! reader, then releases each task through the normal unlock write path —
//! the writer lock is never held across the work set. Per-task failures are
//! logged and never abort a run.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use foreman_core::time::hours_from_now;
use foreman_core::{EngineError, ForemanConfig};
use foreman_store::repository::TaskRepo;
use foreman_store::Store;

use crate::lifecycle::LifecycleEngine;

/// Batch size per sweep pass.
const SWEEP_BATCH: u32 = 100;

/// Outcome of one sweep pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale candidates seen.
    pub scanned: usize,
    /// Reservations released.
    pub unlocked: usize,
    /// Candidates skipped because their state changed under us.
    pub skipped: usize,
    /// Per-task failures (logged, not fatal).
    pub failed: usize,
}

/// The stale sweeper.
#[derive(Clone)]
pub struct StaleSweeper {
    lifecycle: LifecycleEngine,
    store: Store,
    config: Arc<ForemanConfig>,
}

impl StaleSweeper {
    pub fn new(lifecycle: LifecycleEngine, store: Store, config: Arc<ForemanConfig>) -> Self {
        Self {
            lifecycle,
            store,
            config,
        }
    }

    /// One full pass over the stale set, in batches.
    pub fn sweep_once(&self) -> Result<SweepReport, EngineError> {
        let cutoff = hours_from_now(-self.config.stale_timeout_hours);
        let mut report = SweepReport::default();

        loop {
            let batch = {
                let conn = self.store.reader()?;
                TaskRepo::stale(&conn, &cutoff, SWEEP_BATCH)?
            };
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            report.scanned += batch_len;

            let unlocked_before = report.unlocked;
            for task in batch {
                match self.lifecycle.auto_unlock(task.id) {
                    Ok(Some(_)) => report.unlocked += 1,
                    Ok(None) => report.skipped += 1,
                    Err(err) => {
                        report.failed += 1;
                        warn!(task_id = task.id, error = %err, "stale sweep failed for task");
                    }
                }
            }

            // A short batch means the stale set is drained; a batch where
            // nothing was released means the remainder is unprocessable —
            // stop rather than spin.
            if batch_len < SWEEP_BATCH as usize || report.unlocked == unlocked_before {
                break;
            }
        }

        if report.scanned > 0 {
            debug!(
                scanned = report.scanned,
                unlocked = report.unlocked,
                failed = report.failed,
                "stale sweep complete"
            );
        }
        Ok(report)
    }

    /// Run the sweep loop until cancelled. The period is a quarter of the
    /// lease timeout (optionally capped by configuration).
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sweeper = self.clone();
                    // The sweep does blocking SQLite work; keep it off the
                    // async executor threads.
                    let result = tokio::task::spawn_blocking(move || sweeper.sweep_once()).await;
                    match result {
                        Ok(Ok(_)) => {}
                        Ok(Err(err)) => warn!(error = %err, "stale sweep pass failed"),
                        Err(err) => warn!(error = %err, "stale sweep task panicked"),
                    }
                }
                () = cancel.cancelled() => {
                    debug!("stale sweeper cancelled");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::lifecycle::{CreateTaskParams, SWEEPER_ACTOR};
    use crate::Foreman;
    use foreman_core::types::{TaskStatus, TaskType, UpdateType};
    use foreman_store::repository::UpdateRepo;

    fn params(title: &str) -> CreateTaskParams {
        CreateTaskParams {
            title: title.to_string(),
            task_type: TaskType::Concrete,
            task_instruction: "Long-running piece of work".into(),
            verification_instruction: "Confirm the work completed".into(),
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

    /// Backdate a reservation so it exceeds the lease.
    fn backdate_assignment(foreman: &Foreman, task_id: i64, hours: f64) {
        let stamp = hours_from_now(-hours);
        foreman
            .store
            .with_write(|txn| {
                txn.execute(
                    "UPDATE tasks SET assigned_at = ?1 WHERE id = ?2",
                    rusqlite::params![stamp, task_id],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn sweep_releases_expired_reservation() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Stale"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();
        backdate_assignment(&foreman, task.id, 25.0);

        let report = foreman.sweeper().sweep_once().unwrap();
        assert_eq!(report.unlocked, 1);
        assert_eq!(report.failed, 0);

        let conn = foreman.store.reader().unwrap();
        let task = foreman_store::repository::TaskRepo::get(&conn, task.id)
            .unwrap()
            .unwrap();
        assert_eq!(task.task_status, TaskStatus::Available);
        assert!(task.assigned_agent.is_none());

        // The finding update records previous agent and duration.
        let findings = UpdateRepo::recent_findings(&conn, task.id, 10).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].update_type, UpdateType::Finding);
        assert_eq!(findings[0].agent_id, SWEEPER_ACTOR);
        assert!(findings[0].content.contains("auto-unlock"));
        assert!(findings[0].content.contains("previous=a1"));
        let metadata = findings[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["auto_unlock"], true);
        assert_eq!(metadata["previous_agent"], "a1");
    }

    #[test]
    fn sweep_ignores_fresh_reservations() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Fresh"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();

        let report = foreman.sweeper().sweep_once().unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.unlocked, 0);

        let conn = foreman.store.reader().unwrap();
        let task = foreman_store::repository::TaskRepo::get(&conn, task.id)
            .unwrap()
            .unwrap();
        assert_eq!(task.task_status, TaskStatus::InProgress);
    }

    #[test]
    fn next_reserve_carries_stale_warning() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Recovered"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();
        backdate_assignment(&foreman, task.id, 25.0);
        foreman.sweeper().sweep_once().unwrap();

        let result = foreman.lifecycle.reserve(task.id, "a2").unwrap();
        let warning = result.stale_warning.expect("stale warning expected");
        assert_eq!(warning.previous_agent, "a1");
        assert!(warning.reason.contains("auto-unlock"));
    }

    #[test]
    fn manual_unlock_then_reserve_has_no_warning() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Clean"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();
        foreman.lifecycle.unlock(task.id, "a1").unwrap();

        let result = foreman.lifecycle.reserve(task.id, "a2").unwrap();
        assert!(result.stale_warning.is_none());
    }

    #[test]
    fn sweep_emits_unlocked_stale_event() {
        let foreman = Foreman::open_in_memory().unwrap();
        let task = foreman
            .lifecycle
            .create_task(&params("Evented"))
            .unwrap()
            .task;
        foreman.lifecycle.reserve(task.id, "a1").unwrap();
        backdate_assignment(&foreman, task.id, 30.0);

        let mut events = foreman.events.subscribe();
        foreman.sweeper().sweep_once().unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.kind, foreman_core::EventKind::TaskUnlockedStale);
        assert_eq!(event.task_id, task.id);
        assert_eq!(event.actor, SWEEPER_ACTOR);
    }

    #[tokio::test]
    async fn run_loop_cancels_promptly() {
        let foreman = Foreman::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(foreman.sweeper().run(cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();
    }
}
