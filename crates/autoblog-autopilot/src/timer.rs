//! Single cancellable background task per autopilot.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Timer {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Holds at most one armed task. Arming again cancels the previous one.
#[derive(Default)]
pub(crate) struct TimerSlot {
    slot: Mutex<Option<Timer>>,
}

impl TimerSlot {
    pub(crate) fn arm<F, Fut>(&self, run: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));
        *slot = Some(Timer {
            cancel,
            task: Some(task),
        });
    }

    /// Cancel the armed task. A job already in flight finishes on its own;
    /// the task exits at its next cancellation point.
    pub(crate) fn disarm(&self) -> bool {
        match self.lock().take() {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.lock().as_ref().is_some_and(|timer| {
            !timer.cancel.is_cancelled()
                && timer.task.as_ref().is_none_or(|task| !task.is_finished())
        })
    }

    /// Hand the task over to a caller that wants to await it.
    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.lock().as_mut().and_then(|timer| timer.task.take())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Timer>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Sleep for `delay`; false when cancelled first.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
