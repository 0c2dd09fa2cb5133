//! Durable autopilot: a daily quota spread over the day, surviving restarts.
//!
//! The timer loop is arm → plan → sleep → job → reschedule. Planning reads
//! the persisted record each time, so a process that comes back after a
//! crash picks up exactly where the record says it was.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use autoblog_config::AutopilotConfig;
use autoblog_types::{GenerationSettings, JobState};

use crate::clock::{Clock, SystemClock};
use crate::engine::Engine;
use crate::events::{Listener, Subscription};
use crate::plan::Plan;
use crate::timer::{TimerSlot, sleep_or_cancel};
use crate::{Autopilot, AutopilotDeps, AutopilotError};

/// Handle to the durable autopilot. Dropping it disarms the timer.
pub struct SchedulerHandle {
    engine: Arc<Engine>,
    timer: TimerSlot,
}

impl SchedulerHandle {
    pub fn new(deps: AutopilotDeps, config: AutopilotConfig) -> Self {
        Self::with_clock(deps, config, Arc::new(SystemClock))
    }

    pub fn with_clock(deps: AutopilotDeps, config: AutopilotConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine: Arc::new(Engine::new(deps, config, clock)),
            timer: TimerSlot::default(),
        }
    }

    /// Re-arm after a process restart if the persisted record says the
    /// autopilot was running. Returns whether it did.
    pub async fn resume(&self) -> Result<bool, AutopilotError> {
        let state = self.engine.status().await?;
        if !state.running {
            debug!("Autopilot was not running, nothing to resume");
            return Ok(false);
        }
        info!(
            generated_today = state.articles_generated_today,
            articles_per_day = state.articles_per_day,
            next_run_at = ?state.next_run_at,
            "Resuming autopilot"
        );
        self.arm();
        Ok(true)
    }

    /// Run one job right away, outside the regular schedule.
    ///
    /// Waits for a job already in flight instead of overlapping it. A failed
    /// generation is reported through the state log, not as an error.
    pub async fn run_now(&self) -> Result<JobState, AutopilotError> {
        match self.engine.run_job().await {
            Err(e) if e.is_persistence() => return Err(e.into()),
            _ => {}
        }
        self.engine.status().await
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    fn arm(&self) {
        let engine = self.engine.clone();
        self.timer.arm(move |cancel| drive(engine, cancel));
    }
}

#[async_trait]
impl Autopilot for SchedulerHandle {
    async fn start(&self, settings: GenerationSettings) -> Result<JobState, AutopilotError> {
        let (state, started) = self.engine.begin(settings).await?;
        if started {
            info!(
                articles_per_day = state.articles_per_day,
                niche = %state.settings.niche,
                "Autopilot started"
            );
            self.arm();
        } else if !self.is_armed() {
            info!("Autopilot already running but not armed here, re-arming");
            self.arm();
        } else {
            debug!("Autopilot already running");
        }
        Ok(state)
    }

    async fn stop(&self) -> Result<JobState, AutopilotError> {
        self.timer.disarm();
        let state = self.engine.finish().await?;
        info!("Autopilot stopped");
        Ok(state)
    }

    async fn status(&self) -> Result<JobState, AutopilotError> {
        self.engine.status().await
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        self.engine.cell.events().subscribe(listener)
    }
}

async fn drive(engine: Arc<Engine>, cancel: CancellationToken) {
    loop {
        let (plan, run_id) = match engine.plan().await {
            Ok(planned) => planned,
            Err(e) => {
                engine.halt(&e).await;
                return;
            }
        };

        let (delay, fire) = match plan {
            Plan::Disarmed => {
                debug!("Autopilot not running, timer disarmed");
                return;
            }
            Plan::AwaitRollover { at, delay } => {
                info!(%at, "Daily quota reached, sleeping until the next day");
                (delay + engine.config.rollover_margin(), false)
            }
            Plan::Fire { at, delay } => {
                debug!(%at, ?delay, "Next article scheduled");
                (delay, true)
            }
        };

        if !sleep_or_cancel(delay, &cancel).await {
            return;
        }
        if !fire {
            continue;
        }

        if let Err(e) = engine.run_job().await {
            if e.is_persistence() {
                return;
            }
        }
        // Stopped mid-job: the record may already belong to a fresh run.
        if cancel.is_cancelled() {
            engine.settle_stopped().await;
            return;
        }
        if let Err(e) = engine.schedule_next_slot(run_id).await {
            engine.halt(&e).await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use autoblog_types::{JobStage, LogKind, RunState};
    use chrono::{Local, TimeDelta, Utc};
    use tokio::time::Instant;

    use crate::plan::next_local_midnight;
    use crate::store::{JobStateStore, MemoryContentRepository, MemoryJobStateStore};
    use crate::testing::{
        FailingContentRepository, FakeGenerator, VirtualClock, local, wait_for,
    };

    const MINUTE: Duration = Duration::from_secs(60);

    struct Harness {
        handle: SchedulerHandle,
        generator: Arc<FakeGenerator>,
        content: Arc<MemoryContentRepository>,
        store: Arc<MemoryJobStateStore>,
        clock: Arc<VirtualClock>,
    }

    fn harness(generator: FakeGenerator, store: MemoryJobStateStore) -> Harness {
        let generator = Arc::new(generator);
        let content = Arc::new(MemoryContentRepository::new());
        let store = Arc::new(store);
        let clock = Arc::new(VirtualClock::at(local(2026, 6, 10, 0, 0, 10)));
        let deps = AutopilotDeps {
            store: store.clone(),
            content: content.clone(),
            generator: generator.clone(),
        };
        let handle = SchedulerHandle::with_clock(deps, AutopilotConfig::default(), clock.clone());
        Harness {
            handle,
            generator,
            content,
            store,
            clock,
        }
    }

    fn settings(per_day: u32) -> GenerationSettings {
        GenerationSettings {
            niche: "Tech".into(),
            articles_per_day: per_day,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_quota_spread_over_the_day() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        h.handle.start(settings(3)).await.unwrap();

        let state = wait_for(&h.handle, MINUTE, |s| {
            s.articles_generated_today == 3 && s.run_state == RunState::Complete
        })
        .await;

        let posts = h.content.posts();
        assert_eq!(posts.len(), 3);
        let gaps: Vec<_> = posts
            .windows(2)
            .map(|w| w[1].created_at - w[0].created_at)
            .collect();
        assert!(gaps.iter().all(|gap| *gap >= TimeDelta::hours(8)));
        let first_day = local(2026, 6, 10, 0, 0, 10).date_naive();
        assert!(
            posts
                .iter()
                .all(|p| p.created_at.with_timezone(&Local).date_naive() == first_day)
        );

        let midnight = next_local_midnight(&h.clock.now()).with_timezone(&Utc);
        assert_eq!(state.next_run_at, Some(midnight));
        assert!(state.running);
        assert!(h.handle.is_armed());

        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_production_resumes_after_midnight() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        h.handle.start(settings(1)).await.unwrap();
        wait_for(&h.handle, MINUTE, |s| s.run_state == RunState::Complete).await;
        let first_day = h.clock.now().date_naive();

        let state = wait_for(&h.handle, MINUTE, |s| {
            s.last_run_date.is_some_and(|d| d > first_day)
        })
        .await;
        assert_eq!(state.articles_generated_today, 1);
        assert_eq!(h.content.posts().len(), 2);

        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_fires_missed_slot_soon() {
        let clock_now = local(2026, 6, 10, 0, 0, 10);
        let seeded = JobState {
            running: true,
            articles_per_day: 2,
            last_run_date: Some(clock_now.date_naive()),
            next_run_at: Some(clock_now.with_timezone(&Utc) - TimeDelta::hours(3)),
            settings: settings(2),
            run_state: RunState::Waiting,
            ..Default::default()
        };
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::with_state(seeded));
        let started = Instant::now();

        assert!(h.handle.resume().await.unwrap());
        let state = wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.articles_generated_today == 1 && s.run_state == RunState::Waiting
        })
        .await;

        assert!(started.elapsed() < MINUTE);
        let next = state.next_run_at.unwrap();
        assert!(next > h.clock.now().with_timezone(&Utc) + TimeDelta::hours(11));
        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rolls_over_stale_full_quota() {
        let clock_now = local(2026, 6, 10, 0, 0, 10);
        let seeded = JobState {
            running: true,
            articles_per_day: 2,
            articles_generated_today: 2,
            last_run_date: Some(clock_now.date_naive() - TimeDelta::days(1)),
            next_run_at: Some(clock_now.with_timezone(&Utc) - TimeDelta::seconds(10)),
            settings: settings(2),
            run_state: RunState::Complete,
            ..Default::default()
        };
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::with_state(seeded));

        assert!(h.handle.resume().await.unwrap());
        let state = wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.last_run_date == Some(clock_now.date_naive())
        })
        .await;
        assert_eq!(state.articles_generated_today, 1);
        h.handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_when_stopped_does_nothing() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        assert!(!h.handle.resume().await.unwrap());
        assert!(!h.handle.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_keeps_schedule() {
        let generator = FakeGenerator::default();
        generator.topic_failures.store(1, Ordering::SeqCst);
        let h = harness(generator, MemoryJobStateStore::new());
        h.handle.start(settings(1)).await.unwrap();

        let state = wait_for(&h.handle, Duration::from_millis(500), |s| {
            s.log_entries.iter().any(|e| e.kind == LogKind::Error)
                && s.run_state == RunState::Waiting
        })
        .await;

        assert_eq!(state.articles_generated_today, 0);
        assert!(!state.quota_met());
        assert!(state.running);
        let next = state.next_run_at.unwrap();
        assert!(next > h.clock.now().with_timezone(&Utc) + TimeDelta::hours(23));
        assert!(h.content.posts().is_empty());
        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_job_in_flight_finish() {
        let (generator, gate) = FakeGenerator::gated();
        let h = harness(generator, MemoryJobStateStore::new());
        h.handle.start(settings(3)).await.unwrap();

        wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.run_state == RunState::Working(JobStage::PickingTopic)
        })
        .await;

        let stopped = h.handle.stop().await.unwrap();
        assert!(!stopped.running);
        assert_eq!(stopped.next_run_at, None);
        assert!(!h.handle.is_armed());

        gate.add_permits(10);
        let state = wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.articles_generated_today == 1 && s.run_state == RunState::Idle
        })
        .await;
        assert!(!state.running);

        tokio::time::sleep(Duration::from_secs(48 * 3600)).await;
        assert_eq!(h.content.posts().len(), 1);
        assert_eq!(h.generator.topics_requested.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        let mut first_settings = settings(3);
        first_settings.keywords = "first".into();
        let first = h.handle.start(first_settings).await.unwrap();
        assert!(first.log_entries.is_empty());
        h.handle.run_now().await.unwrap();

        let mut other = settings(5);
        other.keywords = "second".into();
        let again = h.handle.start(other).await.unwrap();

        assert_eq!(again.articles_generated_today, 1);
        assert_eq!(again.articles_per_day, 3);
        assert_eq!(again.settings.keywords, "first");
        assert_eq!(again.next_run_at, first.next_run_at);
        assert_eq!(
            again.log_entries.last().map(|e| e.message.as_str()),
            Some("Autopilot is already running")
        );
        assert!(h.handle.is_armed());
        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rearms_persisted_run_without_reset() {
        let seeded = JobState {
            running: true,
            articles_per_day: 4,
            articles_generated_today: 1,
            last_run_date: Some(local(2026, 6, 10, 0, 0, 10).date_naive()),
            settings: settings(4),
            run_state: RunState::Waiting,
            ..Default::default()
        };
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::with_state(seeded));
        assert!(!h.handle.is_armed());

        let state = h.handle.start(settings(1)).await.unwrap();
        assert_eq!(state.articles_generated_today, 1);
        assert_eq!(state.articles_per_day, 4);
        assert!(h.handle.is_armed());
        h.handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_rejects_zero_quota() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        let err = h.handle.start(settings(0)).await.unwrap_err();
        assert!(matches!(err, AutopilotError::InvalidSettings(_)));
        assert!(!h.handle.status().await.unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_triggers_never_overlap() {
        let h = harness(
            FakeGenerator::with_delay(Duration::from_millis(200)),
            MemoryJobStateStore::new(),
        );
        h.handle.start(settings(5)).await.unwrap();

        let (a, b) = tokio::join!(h.handle.run_now(), h.handle.run_now());
        a.unwrap();
        b.unwrap();

        assert_eq!(h.generator.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.content.posts().len(), 2);
        assert_eq!(h.handle.status().await.unwrap().articles_generated_today, 2);
        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_halts() {
        let generator = Arc::new(FakeGenerator::default());
        let store = Arc::new(MemoryJobStateStore::new());
        let deps = AutopilotDeps {
            store: store.clone(),
            content: Arc::new(FailingContentRepository),
            generator,
        };
        let handle = SchedulerHandle::with_clock(
            deps,
            AutopilotConfig::default(),
            Arc::new(VirtualClock::at(local(2026, 6, 10, 9, 0, 0))),
        );
        handle.start(settings(2)).await.unwrap();

        let state = wait_for(&handle, Duration::from_millis(100), |s| !s.running).await;
        assert_eq!(state.run_state, RunState::Error);
        assert!(
            state
                .log_entries
                .iter()
                .any(|e| e.kind == LogKind::Error && e.message.starts_with("Autopilot halted"))
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_follow_progress() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        let published = Arc::new(AtomicUsize::new(0));
        let seen = published.clone();
        let sub = h.handle.subscribe(Arc::new(move |s: &JobState| {
            seen.fetch_max(s.articles_generated_today as usize, Ordering::SeqCst);
        }));

        h.handle.start(settings(2)).await.unwrap();
        wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.articles_generated_today == 1
        })
        .await;
        assert_eq!(published.load(Ordering::SeqCst), 1);

        assert!(sub.unsubscribe());
        h.handle.run_now().await.unwrap();
        assert_eq!(published.load(Ordering::SeqCst), 1);
        h.handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_mid_job_keeps_fresh_schedule() {
        let (generator, gate) = FakeGenerator::gated();
        let h = harness(generator, MemoryJobStateStore::new());
        h.handle.start(settings(2)).await.unwrap();
        wait_for(&h.handle, Duration::from_millis(100), |s| {
            s.run_state == RunState::Working(JobStage::PickingTopic)
        })
        .await;

        h.handle.stop().await.unwrap();
        let fresh = h.handle.start(settings(2)).await.unwrap();
        let first_slot = fresh.next_run_at.unwrap();
        assert_eq!(fresh.articles_generated_today, 0);

        // Let the job of the stopped run finish.
        gate.add_permits(1);
        let content = h.content.clone();
        wait_for(&h.handle, Duration::from_millis(10), |_| content.posts().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = h.handle.status().await.unwrap();
        assert!(state.running);
        assert_eq!(state.run_id, fresh.run_id);
        assert_eq!(state.articles_generated_today, 0);
        assert_eq!(state.next_run_at, Some(first_slot));
        assert!(h.handle.is_armed());

        let saved = h.store.load().await.unwrap().unwrap();
        assert_eq!(saved.next_run_at, Some(first_slot));
        h.handle.stop().await.unwrap();
    }

    #[test]
    fn test_timer_loop_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        let task = drive(h.handle.engine.clone(), CancellationToken::new());
        assert_send(&task);
    }

    #[tokio::test]
    async fn test_persisted_record_survives_handle() {
        let h = harness(FakeGenerator::default(), MemoryJobStateStore::new());
        h.handle.start(settings(2)).await.unwrap();
        drop(h.handle);

        let saved = h.store.load().await.unwrap().unwrap();
        assert!(saved.running);
        assert_eq!(saved.articles_per_day, 2);
    }
}
