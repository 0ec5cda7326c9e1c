//! One-shot delayed work on a detached thread.

use std::io;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
struct Slot {
    cancelled: bool,
    fired: bool,
}

#[derive(Debug, Default)]
struct Shared {
    slot: Mutex<Slot>,
    wake: Condvar,
}

pub(crate) fn thread_builder() -> thread::Builder {
    thread::Builder::new().name("delayed-task".to_string())
}

/// Handle to work scheduled with [`DelayedTask::schedule`].
///
/// The work runs once after the delay unless [`cancel`](Self::cancel) is
/// called first. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct DelayedTask {
    shared: Arc<Shared>,
}

impl DelayedTask {
    /// Run `work` on a background thread after `delay`.
    ///
    /// Fails only if the thread cannot be spawned, in which case `work` is
    /// dropped without running.
    pub fn schedule<F>(delay: Duration, work: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::schedule_on(thread_builder(), delay, work)
    }

    pub(crate) fn schedule_on<F>(
        builder: thread::Builder,
        delay: Duration,
        work: F,
    ) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        let waiter = shared.clone();

        builder.spawn(move || {
            let guard = waiter.slot.lock().unwrap();
            let (mut guard, _) = waiter
                .wake
                .wait_timeout_while(guard, delay, |slot| !slot.cancelled)
                .unwrap();
            if guard.cancelled {
                return;
            }
            guard.fired = true;
            drop(guard);
            work();
        })?;

        Ok(Self { shared })
    }

    /// Cancel the task. Returns `true` if it had not fired yet.
    ///
    /// Calling this more than once is harmless.
    pub fn cancel(&self) -> bool {
        let mut slot = self.shared.slot.lock().unwrap();
        if slot.fired {
            return false;
        }
        let was_pending = !slot.cancelled;
        slot.cancelled = true;
        self.shared.wake.notify_all();
        was_pending
    }

    /// Whether the task is still waiting to fire.
    pub fn is_pending(&self) -> bool {
        let slot = self.shared.slot.lock().unwrap();
        !slot.cancelled && !slot.fired
    }
}

impl Drop for DelayedTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
