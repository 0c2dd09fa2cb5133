//! Test doubles shared by the autopilot tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use autoblog_genai::{ArticleDraft, ContentGenerator, GenAiError, TopicPick};
use autoblog_types::{BlogPost, GenerationSettings, ImageQuality, JobState};

use crate::Autopilot;
use crate::clock::Clock;
use crate::store::{ContentRepository, JobStateStore};

/// Scriptable stand-in for the model-backed generator.
#[derive(Default)]
pub(crate) struct FakeGenerator {
    /// Number of upcoming topic calls that fail.
    pub topic_failures: AtomicUsize,
    pub fail_images: AtomicBool,
    /// When set, topic calls wait for a permit before answering.
    pub gate: Option<Arc<Semaphore>>,
    /// Simulated model latency per topic call.
    pub work_delay: Duration,
    pub topics_requested: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
}

impl FakeGenerator {
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let generator = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (generator, gate)
    }

    /// Generator whose topic calls take `delay` to answer.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            work_delay: delay,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContentGenerator for FakeGenerator {
    async fn analyze_topic(&self, settings: &GenerationSettings) -> Result<TopicPick, GenAiError> {
        let n = self.topics_requested.fetch_add(1, Ordering::SeqCst) + 1;
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if !self.work_delay.is_zero() {
            tokio::time::sleep(self.work_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fail = self
            .topic_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if fail {
            return Err(GenAiError::Api {
                status: 503,
                message: "model overloaded".into(),
            });
        }
        Ok(TopicPick {
            topic: format!("{} trend {n}", settings.niche),
            analysis: "rising searches".into(),
        })
    }

    async fn write_article(
        &self,
        topic: &str,
        _settings: &GenerationSettings,
    ) -> Result<ArticleDraft, GenAiError> {
        Ok(ArticleDraft {
            title: format!("All about {topic}"),
            content: format!("<h2>{topic}</h2><p>Body</p>"),
            excerpt: "Short summary".into(),
            tags: vec!["trend".into()],
            category: "عام".into(),
            image_prompt: format!("A cover for {topic}"),
        })
    }

    async fn render_image(&self, _prompt: &str, _quality: ImageQuality) -> Result<String, GenAiError> {
        if self.fail_images.load(Ordering::SeqCst) {
            return Err(GenAiError::NoImage);
        }
        Ok("data:image/png;base64,iVBORw0KGgo=".into())
    }
}

/// Local clock that advances with tokio's (possibly paused) time.
pub(crate) struct VirtualClock {
    base: DateTime<Local>,
    origin: Instant,
}

impl VirtualClock {
    pub fn at(base: DateTime<Local>) -> Self {
        Self {
            base,
            origin: Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Local> {
        self.base + TimeDelta::from_std(self.origin.elapsed()).expect("elapsed fits")
    }
}

pub(crate) fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .earliest()
        .expect("valid local time")
}

pub(crate) struct FailingStateStore;

#[async_trait]
impl JobStateStore for FailingStateStore {
    async fn load(&self) -> anyhow::Result<Option<JobState>> {
        Ok(None)
    }

    async fn save(&self, _state: &JobState) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

pub(crate) struct FailingContentRepository;

#[async_trait]
impl ContentRepository for FailingContentRepository {
    async fn save_post(&self, _post: &BlogPost) -> anyhow::Result<()> {
        anyhow::bail!("database is locked")
    }
}

/// Poll `autopilot` every `step` until `cond` holds.
pub(crate) async fn wait_for(
    autopilot: &dyn Autopilot,
    step: Duration,
    cond: impl Fn(&JobState) -> bool,
) -> JobState {
    for _ in 0..20_000 {
        let state = autopilot.status().await.expect("status");
        if cond(&state) {
            return state;
        }
        tokio::time::sleep(step).await;
    }
    panic!("autopilot never reached the expected state");
}
