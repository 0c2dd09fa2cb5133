//! Serialized access to the persisted autopilot record.

use std::sync::Arc;

use tokio::sync::Mutex;

use autoblog_types::JobState;

use crate::events::EventBus;
use crate::store::JobStateStore;

/// Owner of the job state. Every change goes through [`JobStateCell::update`],
/// which loads, mutates, trims the log, saves and then notifies listeners,
/// all under one lock so concurrent writers never lose each other's changes.
pub struct JobStateCell {
    store: Arc<dyn JobStateStore>,
    events: EventBus,
    max_log_entries: usize,
    lock: Mutex<()>,
}

impl JobStateCell {
    pub fn new(store: Arc<dyn JobStateStore>, max_log_entries: usize) -> Self {
        Self {
            store,
            events: EventBus::new(),
            max_log_entries,
            lock: Mutex::new(()),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Current record, or the idle default when none was saved yet.
    pub async fn current(&self) -> anyhow::Result<JobState> {
        let _guard = self.lock.lock().await;
        Ok(self.store.load().await?.unwrap_or_default())
    }

    /// Apply `f`, persist the result and notify subscribers.
    ///
    /// Listeners are only told about states that were saved successfully.
    pub async fn update<F, R>(&self, f: F) -> anyhow::Result<(JobState, R)>
    where
        F: FnOnce(&mut JobState) -> R + Send,
        R: Send,
    {
        let _guard = self.lock.lock().await;
        let mut state = self.store.load().await?.unwrap_or_default();
        let out = f(&mut state);
        state.trim_log(self.max_log_entries);
        self.store.save(&state).await?;
        self.events.notify(&state);
        Ok((state, out))
    }
}
