//! Persistence seams of the autopilot: where the job state and the produced
//! posts are kept.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use autoblog_storage::BlogStorage;
use autoblog_types::{BlogPost, JobState};

/// Durable slot holding the single autopilot record.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    /// `None` when nothing was ever saved.
    async fn load(&self) -> anyhow::Result<Option<JobState>>;
    async fn save(&self, state: &JobState) -> anyhow::Result<()>;
}

/// Destination of published posts.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn save_post(&self, post: &BlogPost) -> anyhow::Result<()>;
}

#[async_trait]
impl JobStateStore for BlogStorage {
    async fn load(&self) -> anyhow::Result<Option<JobState>> {
        Ok(self.load_autopilot_state().await?)
    }

    async fn save(&self, state: &JobState) -> anyhow::Result<()> {
        Ok(self.save_autopilot_state(state).await?)
    }
}

#[async_trait]
impl ContentRepository for BlogStorage {
    async fn save_post(&self, post: &BlogPost) -> anyhow::Result<()> {
        Ok(self.upsert_post(post).await?)
    }
}

/// Process-local state slot; its contents vanish with the process.
#[derive(Default)]
pub struct MemoryJobStateStore {
    state: Mutex<Option<JobState>>,
}

impl MemoryJobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`.
    pub fn with_state(state: JobState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStateStore {
    async fn load(&self) -> anyhow::Result<Option<JobState>> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, state: &JobState) -> anyhow::Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        Ok(())
    }
}

/// Post sink that keeps everything in memory, newest last.
#[derive(Default)]
pub struct MemoryContentRepository {
    posts: Mutex<Vec<BlogPost>>,
}

impl MemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posts(&self) -> Vec<BlogPost> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContentRepository for MemoryContentRepository {
    async fn save_post(&self, post: &BlogPost) -> anyhow::Result<()> {
        let mut posts = self.posts.lock().unwrap_or_else(PoisonError::into_inner);
        match posts.iter_mut().find(|p| p.id == post.id) {
            Some(existing) => *existing = post.clone(),
            None => posts.push(post.clone()),
        }
        Ok(())
    }
}
