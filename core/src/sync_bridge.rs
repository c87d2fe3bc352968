// vim: tw=80
//! C3: the sync-IO bridge.
//!
//! Turns the Volume's callback-based submission API, and the executor's
//! post-an-event API, into ordinary blocking calls for the native threads
//! that make up the AoF's public surface (spec.md sections 4.2, 5: "append,
//! flush, and read are blocking calls on the caller's own thread; they must
//! never run inside an executor handler").
//!
//! [`SyncLatch`] is the "first-failure-wins" primitive spec.md describes:
//! N outstanding IOs share one latch, each completion posts to it exactly
//! once, and the waiter wakes when the count reaches zero having recorded
//! at most one failing status — whichever arrived first.

use crate::{
    error::{Error, Result},
    executor::Executor,
    volume::Completion,
};
use std::sync::{Arc, Condvar, Mutex};

struct LatchState {
    remaining:   usize,
    first_error: Option<i32>,
}

/// A shared countdown for `n` outstanding IO completions. Clone the handle
/// returned by [`SyncLatch::completion`] into each `Volume::submit_*` call;
/// call [`SyncLatch::wait`] once, after all `n` submissions have been made.
#[derive(Clone)]
pub struct SyncLatch {
    state: Arc<(Mutex<LatchState>, Condvar)>,
}

impl SyncLatch {
    pub fn new(n: usize) -> Self {
        SyncLatch {
            state: Arc::new((
                Mutex::new(LatchState { remaining: n, first_error: None }),
                Condvar::new(),
            )),
        }
    }

    /// A completion callback that posts one count down on this latch,
    /// recording `status` only if it's the first nonzero status seen.
    pub fn completion(&self) -> Completion {
        let state = self.state.clone();
        Box::new(move |status: i32| {
            let (lock, cvar) = &*state;
            let mut g = lock.lock().unwrap();
            if status != 0 && g.first_error.is_none() {
                g.first_error = Some(status);
            }
            g.remaining -= 1;
            if g.remaining == 0 {
                cvar.notify_all();
            }
        })
    }

    /// Block until every completion tied to this latch has posted. Returns
    /// the first failing status seen, if any.
    pub fn wait(self) -> Result<()> {
        let (lock, cvar) = &*self.state;
        let g = lock.lock().unwrap();
        let g = cvar.wait_while(g, |s| s.remaining > 0).unwrap();
        match g.first_error {
            Some(status) => Err(Error::Eio(format!("IO failed with status {status}"))),
            None => Ok(()),
        }
    }
}

/// The counting semaphore that bounds IO in-flight for a single
/// `append.flush` or `read` call to [`crate::types::MAX_INFLIGHT`] (spec.md
/// sections 4.5, 4.6, 5; testable property 5). Acquire a permit before each
/// submission and release it from that submission's completion callback;
/// `acquire` blocks the caller when the window is full exactly the way the
/// original's `sem_wait` does.
#[derive(Clone)]
pub struct InflightSemaphore {
    state:    Arc<(Mutex<usize>, Condvar)>,
    capacity: usize,
}

impl InflightSemaphore {
    pub fn new(capacity: usize) -> Self {
        InflightSemaphore {
            state: Arc::new((Mutex::new(capacity), Condvar::new())),
            capacity,
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let (lock, cvar) = &*self.state;
        let count = lock.lock().unwrap();
        let mut count = cvar.wait_while(count, |c| *c == 0).unwrap();
        *count -= 1;
    }

    /// Return a permit, waking one waiter (if any).
    pub fn release(&self) {
        let (lock, cvar) = &*self.state;
        let mut count = lock.lock().unwrap();
        *count += 1;
        cvar.notify_one();
    }

    /// Block until every outstanding permit has been returned. Used after a
    /// submission loop that doesn't otherwise wait for completions (a plain
    /// `release()` per completion isn't itself a barrier) to ensure nothing
    /// is still in flight before proceeding.
    #[cfg(test)]
    pub fn drain(&self) {
        let (lock, cvar) = &*self.state;
        let count = lock.lock().unwrap();
        let _ = cvar.wait_while(count, |c| *c < self.capacity).unwrap();
    }
}

/// Run `f` on `executor`'s worker thread and block the calling thread until
/// it returns, handing back `f`'s result.
///
/// This is the blocking counterpart to [`Executor::post_sync_invoke`]:
/// where that call only guarantees the closure *runs* on the executor
/// thread, `sync_invoke` additionally carries the return value back across
/// the thread boundary and parks the caller until it arrives.
pub fn sync_invoke<T, F>(executor: &Executor, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = std::sync::mpsc::channel();
    executor
        .post_sync_invoke(Box::new(move || {
            let _ = tx.send(f());
        }))
        .map_err(|_| Error::Other("executor queue full".to_string()))?;
    rx.recv()
        .map_err(|_| Error::Other("executor dropped sync_invoke reply".to_string()))
}
