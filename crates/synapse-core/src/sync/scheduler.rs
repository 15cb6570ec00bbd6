//! Debounced auto-sync
//!
//! Collapses bursts of local mutations into a single push. Each
//! [`AutoSyncScheduler::notify`] restarts a quiet-period timer; when it
//! expires the push task runs once with whatever state is current at that
//! moment. At most one push is in flight per scheduler. Notifications that
//! arrive during a push are remembered and trigger exactly one follow-up
//! push afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SyncResult;

type SyncTask = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;

#[derive(Default)]
struct SchedulerState {
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced; a stale timer sees a mismatch
    generation: u64,
    in_flight: bool,
    pending: bool,
    runs: u64,
}

struct Inner {
    name: String,
    delay: Duration,
    task: SyncTask,
    state: Mutex<SchedulerState>,
    idle: Notify,
}

/// Debounced, non-overlapping runner for one domain's push
#[derive(Clone)]
pub struct AutoSyncScheduler {
    inner: Arc<Inner>,
}

impl AutoSyncScheduler {
    /// Create a scheduler that runs `task` after `delay` of quiet
    pub fn new<F, Fut>(name: impl Into<String>, delay: Duration, task: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SyncResult<()>> + Send + 'static,
    {
        let task: SyncTask = Arc::new(move || task().boxed());
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                delay,
                task,
                state: Mutex::new(SchedulerState::default()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Record a local change and restart the quiet-period timer
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify(&self) {
        let mut state = self.inner.state.lock();
        state.pending = true;
        self.arm(&mut state);
    }

    /// Run any armed push now and wait until the scheduler is idle
    pub async fn flush(&self) {
        let fire_now = {
            let mut state = self.inner.state.lock();
            match state.timer.take() {
                Some(timer) => {
                    timer.abort();
                    state.generation += 1;
                    true
                }
                None => false,
            }
        };

        if fire_now {
            self.fire(None).await;
        }
        self.wait_idle().await;
    }

    /// Drop any armed timer and pending change
    ///
    /// A push already in flight is allowed to finish.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.pending = false;
        let idle = !state.in_flight;
        drop(state);

        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    /// No timer armed and no push running
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock();
        state.timer.is_none() && !state.in_flight
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.state.lock().in_flight
    }

    /// Completed task runs, successful or not
    pub fn runs(&self) -> u64 {
        self.inner.state.lock().runs
    }

    /// Wait until no timer is armed and no push is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn arm(&self, state: &mut SchedulerState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let delay = self.inner.delay;
        let scheduler = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(Some(generation)).await;
        }));
    }

    async fn fire(&self, generation: Option<u64>) {
        {
            let mut state = self.inner.state.lock();
            if let Some(generation) = generation {
                if state.generation != generation {
                    return;
                }
            }
            state.timer = None;

            if state.in_flight {
                state.pending = true;
                debug!(scheduler = %self.inner.name, "Push in flight, deferring");
                return;
            }
            state.in_flight = true;
            state.pending = false;
        }

        // Separate task so a panicking push can't wedge the in-flight flag
        match tokio::spawn((self.inner.task)()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(scheduler = %self.inner.name, error = %e, "Auto-sync failed");
            }
            Err(e) => {
                warn!(scheduler = %self.inner.name, error = %e, "Auto-sync task aborted");
            }
        }

        let mut state = self.inner.state.lock();
        state.in_flight = false;
        state.runs += 1;

        if state.pending {
            debug!(scheduler = %self.inner.name, "Changes arrived during push, rescheduling");
            self.arm(&mut state);
        } else {
            drop(state);
            self.inner.idle.notify_waiters();
        }
    }
}
