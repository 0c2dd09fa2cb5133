//! Single-session autopilot: one batch of articles, back to back.
//!
//! Nothing survives the process; a reload starts from idle. Any failed
//! article ends the whole batch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use autoblog_config::AutopilotConfig;
use autoblog_genai::ContentGenerator;
use autoblog_types::{GenerationSettings, JobState, LogEntry, RunState};

use crate::clock::{Clock, SystemClock};
use crate::engine::Engine;
use crate::events::{Listener, Subscription};
use crate::job::JobOutcome;
use crate::plan::to_delta;
use crate::store::{ContentRepository, MemoryJobStateStore};
use crate::timer::{TimerSlot, sleep_or_cancel};
use crate::{Autopilot, AutopilotDeps, AutopilotError};

pub struct SessionRunner {
    engine: Arc<Engine>,
    timer: TimerSlot,
}

impl SessionRunner {
    /// Runner keeping its state in memory only.
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        content: Arc<dyn ContentRepository>,
        config: AutopilotConfig,
    ) -> Self {
        let deps = AutopilotDeps {
            store: Arc::new(MemoryJobStateStore::new()),
            content,
            generator,
        };
        Self::with_clock(deps, config, Arc::new(SystemClock))
    }

    pub fn with_clock(deps: AutopilotDeps, config: AutopilotConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Arc::new(Engine::new(deps, config, clock)),
            timer: TimerSlot::default(),
        }
    }

    /// Wait until the current batch, including its cooldown, is over.
    pub async fn join(&self) {
        if let Some(task) = self.timer.take_task() {
            if let Err(e) = task.await {
                warn!("Autopilot session task ended abnormally: {e}");
            }
        }
    }
}

#[async_trait]
impl Autopilot for SessionRunner {
    async fn start(&self, settings: GenerationSettings) -> Result<JobState, AutopilotError> {
        let (state, started) = self.engine.begin(settings).await?;
        if started {
            info!(
                articles = state.articles_per_day,
                niche = %state.settings.niche,
                "Autopilot session started"
            );
            let engine = self.engine.clone();
            self.timer.arm(move |cancel| run_batch(engine, cancel));
        }
        Ok(state)
    }

    async fn stop(&self) -> Result<JobState, AutopilotError> {
        self.timer.disarm();
        self.engine.finish().await
    }

    async fn status(&self) -> Result<JobState, AutopilotError> {
        self.engine.status().await
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.engine.cell.events().subscribe(listener)
    }
}

async fn run_batch(engine: Arc<Engine>, cancel: CancellationToken) {
    let total = match engine.status().await {
        Ok(state) => state.articles_per_day,
        Err(e) => {
            engine.halt(&e).await;
            return;
        }
    };

    if !sleep_or_cancel(engine.config.initial_delay(), &cancel).await {
        return;
    }

    let mut failed = false;
    for index in 0..total {
        match engine.run_job().await {
            Ok(JobOutcome::Published(_)) => {}
            Ok(JobOutcome::Skipped(reason)) => {
                debug!(?reason, "Session job skipped, ending batch");
                break;
            }
            Err(e) => {
                warn!("Autopilot session aborted: {e}");
                failed = true;
                break;
            }
        }

        if index + 1 < total {
            let pause = engine.config.inter_job_pause();
            let now = engine.now_utc();
            let next_run_at = now + to_delta(pause);
            let waiting = engine
                .cell
                .update(move |s| {
                    if s.running {
                        s.run_state = RunState::Waiting;
                        s.next_run_at = Some(next_run_at);
                        s.push_log(LogEntry::system("Pausing before the next article").at(now));
                    }
                })
                .await;
            if let Err(e) = waiting {
                engine.halt(&e).await;
                return;
            }
            if !sleep_or_cancel(pause, &cancel).await {
                break;
            }
        }
    }

    if cancel.is_cancelled() {
        engine.settle_stopped().await;
        return;
    }

    let ended_at = engine.now_utc();
    let ended = engine
        .cell
        .update(move |s| {
            if !s.running {
                return;
            }
            s.running = false;
            s.next_run_at = None;
            if failed {
                s.run_state = RunState::Error;
                s.push_log(LogEntry::error("Autopilot run aborted").at(ended_at));
            } else {
                s.run_state = RunState::Complete;
                s.push_log(LogEntry::success("Autopilot run complete").at(ended_at));
            }
        })
        .await;
    if let Err(e) = ended {
        warn!("Failed to record end of autopilot session: {e}");
        return;
    }
    info!(failed, "Autopilot session finished");

    if sleep_or_cancel(engine.config.complete_cooldown(), &cancel).await {
        let reset = engine
            .cell
            .update(|s| {
                if !s.running && matches!(s.run_state, RunState::Complete | RunState::Error) {
                    s.run_state = RunState::Idle;
                }
            })
            .await;
        if let Err(e) = reset {
            warn!("Failed to reset autopilot session state: {e}");
        }
    }
}
