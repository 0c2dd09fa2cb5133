//! One unit of autopilot work: pick a topic, write it up, illustrate it and
//! publish the result.

use std::future::Future;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use autoblog_config::AutopilotConfig;
use autoblog_genai::{ContentGenerator, GenAiError, placeholder_image_url};
use autoblog_types::{BlogPost, GenerationSettings, JobStage, LogEntry, PostStatus, RunState};

use crate::clock::Clock;
use crate::state::JobStateCell;
use crate::store::ContentRepository;

/// Why a job ended without producing anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    QuotaMet,
}

#[derive(Debug)]
pub enum JobOutcome {
    Published(BlogPost),
    Skipped(SkipReason),
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("topic analysis failed: {0}")]
    Topic(#[source] GenAiError),

    #[error("article writing failed: {0}")]
    Article(#[source] GenAiError),

    #[error("failed to save post: {0}")]
    Persist(anyhow::Error),

    #[error("failed to save autopilot state: {0}")]
    State(anyhow::Error),
}

impl JobError {
    /// Storage failures; the autopilot cannot keep its promises after one.
    pub fn is_persistence(&self) -> bool {
        matches!(self, JobError::Persist(_) | JobError::State(_))
    }
}

/// Borrowed collaborators of a single job run.
pub struct GenerationJob<'a> {
    pub generator: &'a dyn ContentGenerator,
    pub content: &'a dyn ContentRepository,
    pub cell: &'a JobStateCell,
    pub clock: &'a dyn Clock,
    pub config: &'a AutopilotConfig,
}

impl GenerationJob<'_> {
    /// Produce and publish one article.
    ///
    /// Re-checks `running` and the daily quota first, so a job that fires
    /// after a stop, or after the quota was reached by another trigger,
    /// does nothing. A failed image never fails the job; a placeholder is
    /// used instead. Progress is only written while the record still belongs
    /// to the run the job started in.
    pub async fn run(&self) -> Result<JobOutcome, JobError> {
        let today = self.clock.now().date_naive();
        let entry_at = self.now();
        let (state, gate) = self
            .cell
            .update(move |s| {
                if !s.running {
                    return Err(SkipReason::NotRunning);
                }
                s.roll_over(today);
                if s.quota_met() {
                    return Err(SkipReason::QuotaMet);
                }
                s.run_state = RunState::Working(JobStage::PickingTopic);
                s.push_log(
                    LogEntry::system(format!(
                        "Starting article {} of {}: analyzing trends",
                        s.articles_generated_today + 1,
                        s.articles_per_day
                    ))
                    .at(entry_at),
                );
                Ok(s.run_id)
            })
            .await
            .map_err(JobError::State)?;
        let run_id = match gate {
            Ok(run_id) => run_id,
            Err(reason) => return Ok(JobOutcome::Skipped(reason)),
        };

        let result = self.produce(run_id, &state.settings).await;
        if let Err(e) = &result {
            if !e.is_persistence() {
                self.record_failure(run_id, e).await;
            }
        }
        result
    }

    async fn produce(
        &self,
        run_id: u64,
        settings: &GenerationSettings,
    ) -> Result<JobOutcome, JobError> {
        let pick = self
            .call(self.generator.analyze_topic(settings))
            .await
            .map_err(JobError::Topic)?;
        info!(topic = %pick.topic, "Topic selected");
        self.advance(
            run_id,
            JobStage::Writing,
            LogEntry::success(format!("Topic selected: {}", pick.topic)),
        )
        .await?;

        let draft = self
            .call(self.generator.write_article(&pick.topic, settings))
            .await
            .map_err(JobError::Article)?;
        self.advance(
            run_id,
            JobStage::RenderingImage,
            LogEntry::system(format!(
                "Article written, rendering {} cover image",
                settings.image_quality
            )),
        )
        .await?;

        let post_id = Uuid::new_v4().to_string();
        let image_url = match self
            .call(self.generator.render_image(&draft.image_prompt, settings.image_quality))
            .await
        {
            Ok(uri) if !uri.trim().is_empty() => uri,
            failed => {
                let reason = match failed {
                    Err(e) => e.to_string(),
                    Ok(_) => "empty image data".to_string(),
                };
                warn!(%post_id, "Image generation failed, using placeholder: {reason}");
                self.note(
                    run_id,
                    LogEntry::warning(format!(
                        "Image generation failed ({reason}), using a placeholder image"
                    )),
                )
                .await?;
                placeholder_image_url(&post_id)
            }
        };

        self.advance(run_id, JobStage::Persisting, LogEntry::system("Saving post"))
            .await?;
        let post = BlogPost {
            id: post_id,
            title: draft.title,
            excerpt: draft.excerpt,
            content: draft.content,
            image_url,
            author: self.config.author.clone(),
            created_at: self.now(),
            tags: draft.tags,
            category: draft.category,
            status: PostStatus::from_auto_publish(settings.auto_publish),
            views: 0,
            traffic_sources: Default::default(),
        };
        self.content
            .save_post(&post)
            .await
            .map_err(JobError::Persist)?;

        let today = self.clock.now().date_naive();
        let published_at = self.now();
        let title = post.title.clone();
        let (_, counted) = self
            .cell
            .update(move |s| {
                if s.run_id != run_id {
                    return false;
                }
                s.record_published(published_at, today, &title);
                s.run_state = RunState::Working(JobStage::Done);
                true
            })
            .await
            .map_err(JobError::State)?;
        if counted {
            info!(post_id = %post.id, title = %post.title, "Article published");
        } else {
            info!(post_id = %post.id, "Article of a replaced run saved without counting it");
        }

        Ok(JobOutcome::Published(post))
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }

    async fn call<T>(
        &self,
        step: impl Future<Output = Result<T, GenAiError>>,
    ) -> Result<T, GenAiError> {
        let limit = self.config.generation_timeout();
        tokio::time::timeout(limit, step)
            .await
            .unwrap_or(Err(GenAiError::Timeout(limit)))
    }

    async fn advance(&self, run_id: u64, stage: JobStage, entry: LogEntry) -> Result<(), JobError> {
        let entry = entry.at(self.now());
        self.cell
            .update(move |s| {
                if s.run_id == run_id {
                    s.run_state = RunState::Working(stage);
                    s.push_log(entry);
                }
            })
            .await
            .map(|_| ())
            .map_err(JobError::State)
    }

    async fn note(&self, run_id: u64, entry: LogEntry) -> Result<(), JobError> {
        let entry = entry.at(self.now());
        self.cell
            .update(move |s| {
                if s.run_id == run_id {
                    s.push_log(entry);
                }
            })
            .await
            .map(|_| ())
            .map_err(JobError::State)
    }

    /// Mark the run failed. Best effort: the job's own error is what matters.
    async fn record_failure(&self, run_id: u64, err: &JobError) {
        let entry = LogEntry::error(format!("Generation failed: {err}")).at(self.now());
        let recorded = self
            .cell
            .update(move |s| {
                if s.run_id == run_id {
                    s.run_state = RunState::Error;
                    s.push_log(entry);
                }
            })
            .await;
        if let Err(e) = recorded {
            error!("Failed to record job failure: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use autoblog_types::{GenerationSettings, JobState, LogKind};
    use chrono::{NaiveDate, TimeDelta};

    use crate::store::{MemoryContentRepository, MemoryJobStateStore};
    use crate::testing::{FailingContentRepository, FakeGenerator, VirtualClock, local};

    struct Fixture {
        generator: FakeGenerator,
        content: MemoryContentRepository,
        cell: JobStateCell,
        clock: VirtualClock,
        config: AutopilotConfig,
    }

    impl Fixture {
        fn new(state: JobState) -> Self {
            Self {
                generator: FakeGenerator::default(),
                content: MemoryContentRepository::new(),
                cell: JobStateCell::new(Arc::new(MemoryJobStateStore::with_state(state)), 200),
                clock: VirtualClock::at(local(2026, 3, 14, 10, 0, 0)),
                config: AutopilotConfig::default(),
            }
        }

        fn job(&self) -> GenerationJob<'_> {
            GenerationJob {
                generator: &self.generator,
                content: &self.content,
                cell: &self.cell,
                clock: &self.clock,
                config: &self.config,
            }
        }

        fn today(&self) -> NaiveDate {
            self.clock.now().date_naive()
        }
    }

    fn running(per_day: u32) -> JobState {
        JobState::started(
            GenerationSettings {
                articles_per_day: per_day,
                ..Default::default()
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_publishes_post_and_counts_it() {
        let fx = Fixture::new(running(2));

        let outcome = fx.job().run().await.unwrap();
        let JobOutcome::Published(post) = outcome else {
            panic!("expected a published post");
        };

        assert_eq!(post.author, "automated");
        assert_eq!(post.status, PostStatus::Published);
        assert!(post.image_url.starts_with("data:image/png"));
        assert_eq!(fx.content.posts(), vec![post.clone()]);

        let state = fx.cell.current().await.unwrap();
        assert_eq!(state.articles_generated_today, 1);
        assert_eq!(state.last_run_date, Some(fx.today()));
        assert_eq!(state.run_state, RunState::Working(JobStage::Done));
        assert!(
            state
                .log_entries
                .iter()
                .any(|e| e.kind == LogKind::Success && e.message == format!("Published: {}", post.title))
        );
    }

    #[tokio::test]
    async fn test_image_failure_uses_placeholder() {
        let fx = Fixture::new(running(1));
        fx.generator.fail_images.store(true, Ordering::SeqCst);

        let JobOutcome::Published(post) = fx.job().run().await.unwrap() else {
            panic!("expected a published post");
        };
        assert_eq!(
            post.image_url,
            format!("https://picsum.photos/seed/{}/800/450", post.id)
        );

        let state = fx.cell.current().await.unwrap();
        assert_eq!(state.articles_generated_today, 1);
        assert!(state.log_entries.iter().any(|e| e.kind == LogKind::Warning));
    }

    #[tokio::test]
    async fn test_draft_when_auto_publish_is_off() {
        let mut state = running(1);
        state.settings.auto_publish = false;
        let fx = Fixture::new(state);

        let JobOutcome::Published(post) = fx.job().run().await.unwrap() else {
            panic!("expected a post");
        };
        assert_eq!(post.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_skips_when_not_running() {
        let fx = Fixture::new(JobState::default());
        let outcome = fx.job().run().await.unwrap();
        assert!(matches!(outcome, JobOutcome::Skipped(SkipReason::NotRunning)));
        assert_eq!(fx.generator.topics_requested.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skips_when_quota_met_today() {
        let mut state = running(1);
        state.articles_generated_today = 1;
        state.last_run_date = NaiveDate::from_ymd_opt(2026, 3, 14);
        let fx = Fixture::new(state);

        let outcome = fx.job().run().await.unwrap();
        assert!(matches!(outcome, JobOutcome::Skipped(SkipReason::QuotaMet)));
        assert!(fx.content.posts().is_empty());
    }

    #[tokio::test]
    async fn test_yesterdays_quota_rolls_over() {
        let mut state = running(1);
        state.articles_generated_today = 1;
        let fx = Fixture::new(state);
        let yesterday = fx.today() - TimeDelta::days(1);
        fx.cell
            .update(move |s| s.last_run_date = Some(yesterday))
            .await
            .unwrap();

        assert!(matches!(fx.job().run().await.unwrap(), JobOutcome::Published(_)));
        let state = fx.cell.current().await.unwrap();
        assert_eq!(state.articles_generated_today, 1);
        assert_eq!(state.last_run_date, Some(fx.today()));
    }

    #[tokio::test]
    async fn test_topic_failure_leaves_counter_untouched() {
        let fx = Fixture::new(running(2));
        fx.generator.topic_failures.store(1, Ordering::SeqCst);

        let err = fx.job().run().await.unwrap_err();
        assert!(matches!(err, JobError::Topic(_)));
        assert!(!err.is_persistence());

        let state = fx.cell.current().await.unwrap();
        assert_eq!(state.articles_generated_today, 0);
        assert_eq!(state.run_state, RunState::Error);
        assert!(state.log_entries.iter().any(|e| {
            e.kind == LogKind::Error && e.message.starts_with("Generation failed: topic analysis failed")
        }));
        assert!(fx.content.posts().is_empty());
    }

    #[tokio::test]
    async fn test_log_entries_follow_the_injected_clock() {
        let fx = Fixture::new(running(1));
        fx.job().run().await.unwrap();

        let now = fx.clock.now().with_timezone(&Utc);
        let state = fx.cell.current().await.unwrap();
        assert!(state.log_entries.len() >= 4);
        for entry in &state.log_entries {
            assert!((now - entry.timestamp).abs() < TimeDelta::minutes(1), "{entry:?}");
        }
    }

    #[tokio::test]
    async fn test_job_of_a_replaced_run_leaves_the_new_run_alone() {
        let (generator, gate) = FakeGenerator::gated();
        let mut fx = Fixture::new(running(2));
        fx.generator = generator;
        let restarted = JobState::started(
            GenerationSettings {
                articles_per_day: 2,
                ..Default::default()
            },
            Utc::now(),
        );

        let job = fx.job();
        let (outcome, fresh) = tokio::join!(job.run(), async {
            while fx.generator.topics_requested.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
            // Stop and start again while the first job is mid-flight.
            let (fresh, _) = fx
                .cell
                .update(move |s| {
                    let run_id = s.run_id + 1;
                    *s = restarted;
                    s.run_id = run_id;
                })
                .await
                .unwrap();
            gate.add_permits(1);
            fresh
        });

        assert!(matches!(outcome.unwrap(), JobOutcome::Published(_)));
        assert_eq!(fx.content.posts().len(), 1);
        let state = fx.cell.current().await.unwrap();
        assert_eq!(state, fresh);
        assert_eq!(state.articles_generated_today, 0);
        assert_eq!(state.run_state, RunState::Waiting);
    }

    #[tokio::test]
    async fn test_save_failure_is_a_persistence_error() {
        let fx = Fixture::new(running(1));
        let job = GenerationJob {
            content: &FailingContentRepository,
            ..fx.job()
        };

        let err = job.run().await.unwrap_err();
        assert!(matches!(err, JobError::Persist(_)));
        assert!(err.is_persistence());
        assert_eq!(fx.cell.current().await.unwrap().articles_generated_today, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generator_times_out() {
        let mut fx = Fixture::new(running(1));
        fx.generator.work_delay = Duration::from_secs(600);
        fx.config.generation_timeout_secs = 30;

        let err = fx.job().run().await.unwrap_err();
        assert!(matches!(err, JobError::Topic(GenAiError::Timeout(d)) if d == Duration::from_secs(30)));
    }
}
