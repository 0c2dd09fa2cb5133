//! Machinery shared by both autopilot variants.

use std::fmt::Display;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use autoblog_config::AutopilotConfig;
use autoblog_genai::ContentGenerator;
use autoblog_types::{GenerationSettings, JobState, LogEntry, RunState};

use crate::clock::Clock;
use crate::job::{GenerationJob, JobError, JobOutcome};
use crate::plan::{Plan, plan_next, slot_interval, to_delta};
use crate::state::JobStateCell;
use crate::store::ContentRepository;
use crate::{AutopilotDeps, AutopilotError};

pub(crate) struct Engine {
    pub(crate) cell: JobStateCell,
    pub(crate) config: AutopilotConfig,
    generator: Arc<dyn ContentGenerator>,
    content: Arc<dyn ContentRepository>,
    clock: Arc<dyn Clock>,
    /// Held for the whole of a job; two jobs never overlap.
    job_lock: Mutex<()>,
}

impl Engine {
    pub(crate) fn new(deps: AutopilotDeps, config: AutopilotConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            cell: JobStateCell::new(deps.store, config.max_log_entries),
            config,
            generator: deps.generator,
            content: deps.content,
            clock,
            job_lock: Mutex::new(()),
        }
    }

    pub(crate) fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    /// Begin a fresh run unless one is already going.
    ///
    /// Returns the resulting state and whether a new run was started.
    pub(crate) async fn begin(
        &self,
        settings: GenerationSettings,
    ) -> Result<(JobState, bool), AutopilotError> {
        if settings.articles_per_day == 0 {
            return Err(AutopilotError::InvalidSettings(
                "articles_per_day must be at least 1".into(),
            ));
        }

        let now = self.now_utc();
        let next_run_at = now + to_delta(self.config.initial_delay());
        self.cell
            .update(move |s| {
                if s.running {
                    s.push_log(LogEntry::info("Autopilot is already running").at(now));
                    return false;
                }
                let run_id = s.run_id.wrapping_add(1);
                *s = JobState::started(settings, next_run_at);
                s.run_id = run_id;
                true
            })
            .await
            .map_err(AutopilotError::Store)
    }

    /// Mark the run stopped. A job in flight is left to finish.
    pub(crate) async fn finish(&self) -> Result<JobState, AutopilotError> {
        let now = self.now_utc();
        let (state, _) = self
            .cell
            .update(|s| {
                let was_running = s.running;
                s.running = false;
                s.next_run_at = None;
                if !matches!(s.run_state, RunState::Working(_)) {
                    s.run_state = RunState::Idle;
                }
                if was_running {
                    s.push_log(LogEntry::system("Autopilot stopped").at(now));
                }
            })
            .await
            .map_err(AutopilotError::Store)?;
        Ok(state)
    }

    pub(crate) async fn status(&self) -> Result<JobState, AutopilotError> {
        self.cell.current().await.map_err(AutopilotError::Store)
    }

    /// Run one job exclusively. The job records its own failures in the
    /// state log; a storage failure also halts the run.
    pub(crate) async fn run_job(&self) -> Result<JobOutcome, JobError> {
        let _exclusive = self.job_lock.lock().await;
        let job = GenerationJob {
            generator: self.generator.as_ref(),
            content: self.content.as_ref(),
            cell: &self.cell,
            clock: self.clock.as_ref(),
            config: &self.config,
        };

        let result = job.run().await;
        match &result {
            Ok(JobOutcome::Published(_)) => {}
            Ok(JobOutcome::Skipped(reason)) => debug!(?reason, "Generation job skipped"),
            Err(e) if e.is_persistence() => self.halt(e).await,
            Err(e) => error!("Generation job failed: {e}"),
        }
        result
    }

    /// Decide and persist the next timer action of a durable run.
    ///
    /// Also returns the run the plan was made for.
    pub(crate) async fn plan(&self) -> anyhow::Result<(Plan, u64)> {
        let current = self.cell.current().await?;
        if !current.running {
            return Ok((Plan::Disarmed, current.run_id));
        }

        let now = self.clock.now();
        let now_utc = now.with_timezone(&Utc);
        let fire_soon = self.config.fire_soon_delay();
        let (_, planned) = self
            .cell
            .update(move |s| {
                let plan = plan_next(s, now, fire_soon);
                match plan {
                    Plan::Disarmed => {}
                    Plan::Fire { .. } => s.run_state = RunState::Waiting,
                    Plan::AwaitRollover { .. } => {
                        if s.run_state != RunState::Complete {
                            s.push_log(
                                LogEntry::success("Daily quota reached. Resuming after midnight.")
                                    .at(now_utc),
                            );
                        }
                        s.run_state = RunState::Complete;
                    }
                }
                (plan, s.run_id)
            })
            .await?;
        Ok(planned)
    }

    /// After a job of `run_id`: the next slot is one interval after
    /// completion. A run replaced in the meantime keeps its own schedule.
    pub(crate) async fn schedule_next_slot(&self, run_id: u64) -> anyhow::Result<()> {
        let completed_at = self.now_utc();
        self.cell
            .update(move |s| {
                if s.run_id != run_id {
                    return;
                }
                if s.running {
                    s.next_run_at =
                        Some(completed_at + to_delta(slot_interval(s.articles_per_day)));
                } else if matches!(s.run_state, RunState::Working(_)) {
                    s.run_state = RunState::Idle;
                }
            })
            .await?;
        Ok(())
    }

    /// Settle a job that finished after its run was stopped.
    pub(crate) async fn settle_stopped(&self) {
        let settled = self
            .cell
            .update(|s| {
                if !s.running && matches!(s.run_state, RunState::Working(_)) {
                    s.run_state = RunState::Idle;
                }
            })
            .await;
        if let Err(e) = settled {
            warn!("Failed to settle stopped autopilot: {e}");
        }
    }

    /// Stop on an unrecoverable storage failure, recording why if possible.
    pub(crate) async fn halt(&self, reason: &(dyn Display + Sync)) {
        error!("Autopilot halted: {reason}");
        let entry = LogEntry::error(format!("Autopilot halted: {reason}")).at(self.now_utc());
        let result = self
            .cell
            .update(move |s| {
                s.running = false;
                s.next_run_at = None;
                s.run_state = RunState::Error;
                s.push_log(entry);
            })
            .await;
        if let Err(e) = result {
            error!("Failed to record autopilot halt: {e}");
        } else {
            info!("Autopilot marked as stopped after failure");
        }
    }
}
