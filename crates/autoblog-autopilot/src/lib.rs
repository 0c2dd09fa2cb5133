//! autoblog-autopilot: Unattended article production.
//!
//! Two variants share one engine:
//! - [`SchedulerHandle`] spreads `articles_per_day` over each day, persists its
//!   progress and resumes after a restart;
//! - [`SessionRunner`] produces one batch back to back inside a single session
//!   and forgets everything when the process exits.
//!
//! Observers read progress through [`Autopilot::status`] or subscribe to every
//! state change with [`Autopilot::subscribe`].

pub mod clock;
pub mod events;
pub mod job;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod store;

mod engine;
mod timer;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use async_trait::async_trait;

use autoblog_genai::ContentGenerator;
use autoblog_types::{GenerationSettings, JobState};

pub use clock::{Clock, SystemClock};
pub use events::{EventBus, Listener, Subscription};
pub use job::{GenerationJob, JobError, JobOutcome, SkipReason};
pub use scheduler::SchedulerHandle;
pub use session::SessionRunner;
pub use store::{ContentRepository, JobStateStore, MemoryContentRepository, MemoryJobStateStore};

/// Errors surfaced by autopilot control operations.
#[derive(Debug, thiserror::Error)]
pub enum AutopilotError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("autopilot state unavailable: {0}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Collaborators an autopilot runs against.
#[derive(Clone)]
pub struct AutopilotDeps {
    pub store: Arc<dyn JobStateStore>,
    pub content: Arc<dyn ContentRepository>,
    pub generator: Arc<dyn ContentGenerator>,
}

/// Controller surface shared by both autopilot variants.
#[async_trait]
pub trait Autopilot: Send + Sync {
    /// Start producing articles with `settings`. Starting while already
    /// running changes nothing apart from a log entry.
    async fn start(&self, settings: GenerationSettings) -> Result<JobState, AutopilotError>;

    /// Stop after the current job, if any. Never interrupts a job mid-way.
    async fn stop(&self) -> Result<JobState, AutopilotError>;

    async fn status(&self) -> Result<JobState, AutopilotError>;

    /// Register `listener` for every subsequent state change.
    fn subscribe(&self, listener: Listener) -> Subscription;
}
