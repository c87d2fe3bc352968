// vim: tw=80
//! C2: the single-threaded cooperative event executor.
//!
//! One dedicated OS thread drains a bounded event queue and dispatches each
//! event to the handler registered for its type, in the order it was
//! popped. Handlers run to completion before the next event is dispatched —
//! spec.md section 4.2's "no blocking in handlers" rule exists because of
//! this: a handler that blocks stalls every other event queued behind it.
//!
//! Two reserved event types never reach a registered handler: `SyncInvoke`
//! runs an arbitrary closure on the executor thread (the mechanism
//! [`crate::sync_bridge::sync_invoke`] is built on) and `ThreadExit` stops
//! the worker loop.

pub mod queue;

use crate::error::{Error, Result};
use queue::{EventQueue, LockFreeRingQueue, SoftwareRingQueue};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{error, warn};

/// A zero-argument callback run once per batch (blocking mode) or once per
/// iteration (polling mode). Runs on the executor thread, same as a
/// [`Handler`]; must not block (spec.md section 4.2).
pub type Hook = Box<dyn FnMut() + Send>;

/// One entry on the executor's queue.
///
/// `Custom` stands in for the original's `(type, arg_i, arg_p, arg_q)` tagged
/// union: `evt_type` selects the registered handler, `arg_i`/`arg_q` carry
/// the two original scalar payload fields. The original's `arg_p` (an
/// untyped pointer payload) isn't reproduced: every concrete use in this
/// crate fits in the two scalars, and a handle registry with real ownership
/// is safer than a raw pointer smuggled through the queue.
pub enum Event {
    /// Run `f` on the executor thread, then drop it. Used by
    /// [`crate::sync_bridge::sync_invoke`] to bridge an arbitrary call onto
    /// the executor (spec.md section 4.2's reserved `EVT_SYNC_INVOKE`).
    SyncInvoke(Box<dyn FnOnce() + Send>),
    /// Stop the worker loop after this event is drained. Idempotent: once
    /// queued, further events may still be popped and dispatched ahead of
    /// it if they were pushed first, but no new dispatch happens after it.
    ThreadExit,
    /// An application-defined event, dispatched to whatever handler is
    /// registered for `evt_type`.
    Custom {
        evt_type: i32,
        arg_i:    i64,
        arg_q:    u64,
    },
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::SyncInvoke(_) => f.write_str("Event::SyncInvoke(..)"),
            Event::ThreadExit => f.write_str("Event::ThreadExit"),
            Event::Custom { evt_type, arg_i, arg_q } => f
                .debug_struct("Event::Custom")
                .field("evt_type", evt_type)
                .field("arg_i", arg_i)
                .field("arg_q", arg_q)
                .finish(),
        }
    }
}

/// A registered per-type handler. Runs exclusively on the executor thread,
/// so `FnMut` (rather than `Fn`) is fine: there is never more than one
/// concurrent call.
pub type Handler = Box<dyn FnMut(i64, u64) + Send>;

/// How long the worker blocks waiting for the next event before checking
/// its stop flag again. Only relevant to shutdown latency, not to
/// steady-state dispatch.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum events drained and dispatched per batch in polling mode (spec.md
/// section 4.2, "run_batch").
const POLL_BATCH: usize = 8;

/// A running single-threaded executor: one worker OS thread plus the queue
/// feeding it.
pub struct Executor {
    queue:    Arc<dyn EventQueue>,
    handle:   Option<JoinHandle<()>>,
    stopped:  Arc<AtomicBool>,
    /// Nanoseconds spent with at least one event to dispatch, and nanoseconds
    /// spent with none, since the worker started. Spec.md section 4.2 names
    /// this pair the only observability contract the executor must
    /// preserve; it's tracked in both modes, mirroring the original's
    /// `thread_update_stats`.
    busy_tsc: Arc<AtomicU64>,
    idle_tsc: Arc<AtomicU64>,
}

struct WorkerState {
    queue:           Arc<dyn EventQueue>,
    handlers:        HashMap<i32, Handler>,
    stopped:         Arc<AtomicBool>,
    polling:         bool,
    busy_tsc:        Arc<AtomicU64>,
    idle_tsc:        Arc<AtomicU64>,
    last_tsc:        Instant,
    /// Blocking mode only: run once after each drained batch, before the
    /// worker blocks again waiting for the next one (spec.md section 4.2).
    commit_batch:    Option<Hook>,
    /// Polling mode only: run once per poll iteration regardless of whether
    /// that iteration found any events, mirroring the original's separate
    /// `spdk_io_completion_poll` call (spec.md section 4.2).
    completion_poll: Option<Hook>,
}

impl Executor {
    /// Spawn the worker thread and start draining `queue`.
    ///
    /// `name` is the OS thread name (truncated to 15 bytes, the Linux
    /// `pthread_setname_np` limit — see `std::thread::Builder::name`).
    /// Thread priority elevation is attempted best-effort; failure is logged
    /// at `warn!` and is not fatal (spec.md section 4.2).
    pub fn new(
        cfg: &crate::config::Config,
        name: &str,
        handlers: HashMap<i32, Handler>,
    ) -> Result<Self> {
        Self::with_hooks(cfg, name, handlers, None, None)
    }

    /// Like [`Executor::new`], but also installs the `commit_batch` and
    /// `completion_poll` hooks spec.md section 4.2 calls for: `commit_batch`
    /// fires once per drained batch in blocking mode, `completion_poll` fires
    /// once per iteration in polling mode. Either may be `None`.
    pub fn with_hooks(
        cfg: &crate::config::Config,
        name: &str,
        handlers: HashMap<i32, Handler>,
        commit_batch: Option<Hook>,
        completion_poll: Option<Hook>,
    ) -> Result<Self> {
        let queue: Arc<dyn EventQueue> = match cfg.queue_kind {
            crate::config::QueueKind::Blocking => {
                Arc::new(SoftwareRingQueue::new(cfg.queue_depth))
            }
            crate::config::QueueKind::Polling => {
                Arc::new(LockFreeRingQueue::new(cfg.queue_depth))
            }
        };
        let stopped = Arc::new(AtomicBool::new(false));
        let polling = cfg.queue_kind == crate::config::QueueKind::Polling;
        let busy_tsc = Arc::new(AtomicU64::new(0));
        let idle_tsc = Arc::new(AtomicU64::new(0));

        let mut state = WorkerState {
            queue: queue.clone(),
            handlers,
            stopped: stopped.clone(),
            polling,
            busy_tsc: busy_tsc.clone(),
            idle_tsc: idle_tsc.clone(),
            last_tsc: Instant::now(),
            commit_batch,
            completion_poll,
        };

        let thread_name = truncate_thread_name(name);
        let handle = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                elevate_priority();
                state.run();
            })
            .map_err(|e| Error::Other(format!("failed to spawn executor thread: {e}")))?;

        Ok(Executor {
            queue,
            handle: Some(handle),
            stopped,
            busy_tsc,
            idle_tsc,
        })
    }

    /// Nanoseconds the worker has spent with at least one event ready to
    /// dispatch (spec.md section 4.2's observability contract).
    pub fn busy_tsc(&self) -> u64 {
        self.busy_tsc.load(Ordering::Relaxed)
    }

    /// Nanoseconds the worker has spent with no event ready to dispatch.
    pub fn idle_tsc(&self) -> u64 {
        self.idle_tsc.load(Ordering::Relaxed)
    }

    /// Enqueue an event for dispatch. Returns `Err` if the queue is full;
    /// the caller decides whether to retry, log, or drop (spec.md section
    /// 4.2).
    pub fn post(&self, evt: Event) -> std::result::Result<(), Event> {
        self.queue.push(evt)
    }

    /// Run `f` on the executor thread and block until it returns. Builds on
    /// the reserved `SyncInvoke` event; see [`crate::sync_bridge::sync_invoke`]
    /// for the blocking wrapper most callers should use instead of this
    /// directly.
    pub fn post_sync_invoke(&self, f: Box<dyn FnOnce() + Send>) -> std::result::Result<(), Event> {
        self.post(Event::SyncInvoke(f))
    }

    /// Request the worker thread stop after draining events queued ahead of
    /// this call, then join it. Idempotent: calling `stop` twice is a no-op
    /// the second time.
    pub fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Best-effort: the queue may be full, in which case the worker will
        // still notice `stopped` on its next idle-timeout check.
        let _ = self.post(Event::ThreadExit);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("executor worker thread panicked");
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WorkerState {
    fn run(&mut self) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            if self.polling {
                // Mirrors the original's `thread_poll`: one `run_batch` call,
                // whose busy/idle result feeds the tsc counters, followed by
                // an unconditional completion-poll hook regardless of
                // whether the batch found anything.
                let batch = self.queue.pop_batch(POLL_BATCH);
                let now = Instant::now();
                let elapsed = now.duration_since(self.last_tsc).as_nanos() as u64;
                self.last_tsc = now;
                let busy = !batch.is_empty();
                if busy {
                    self.busy_tsc.fetch_add(elapsed, Ordering::Relaxed);
                } else {
                    self.idle_tsc.fetch_add(elapsed, Ordering::Relaxed);
                }

                let mut exit = false;
                for evt in batch {
                    if self.dispatch(evt) {
                        exit = true;
                        break;
                    }
                }
                if let Some(hook) = self.completion_poll.as_mut() {
                    hook();
                }
                if exit {
                    return;
                }
                if !busy {
                    std::hint::spin_loop();
                }
            } else if let Some(evt) = self.queue.pop_blocking(POLL_TIMEOUT) {
                let now = Instant::now();
                self.busy_tsc
                    .fetch_add(now.duration_since(self.last_tsc).as_nanos() as u64, Ordering::Relaxed);
                self.last_tsc = now;

                // Drain the rest of whatever batch woke us up, then call
                // commit_batch once, before blocking again — the original's
                // `thread_proc_eventq` drains its whole current queue between
                // wakeups rather than committing after every single event.
                let mut exit = self.dispatch(evt);
                if !exit {
                    for evt in self.queue.pop_batch(usize::MAX) {
                        if self.dispatch(evt) {
                            exit = true;
                            break;
                        }
                    }
                }
                if let Some(hook) = self.commit_batch.as_mut() {
                    hook();
                }
                if exit {
                    return;
                }
            } else {
                let now = Instant::now();
                self.idle_tsc
                    .fetch_add(now.duration_since(self.last_tsc).as_nanos() as u64, Ordering::Relaxed);
                self.last_tsc = now;
            }
        }
    }

    /// Dispatch one event. Returns `true` if this was a `ThreadExit` and the
    /// worker loop should stop.
    fn dispatch(&mut self, evt: Event) -> bool {
        match evt {
            Event::ThreadExit => true,
            Event::SyncInvoke(f) => {
                f();
                false
            }
            Event::Custom { evt_type, arg_i, arg_q } => {
                match self.handlers.get_mut(&evt_type) {
                    Some(handler) => handler(arg_i, arg_q),
                    None => warn!(evt_type, "no handler registered for event type"),
                }
                false
            }
        }
    }
}

fn truncate_thread_name(name: &str) -> String {
    if name.len() <= 15 {
        name.to_string()
    } else {
        name[..15].to_string()
    }
}

#[cfg(target_os = "linux")]
fn elevate_priority() {
    // SCHED_FIFO at a low real-time priority; failure (typically missing
    // CAP_SYS_NICE) is logged and otherwise ignored, per spec.md section
    // 4.2: priority elevation is an optimization, not a correctness
    // requirement.
    let param = libc::sched_param { sched_priority: 1 };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        warn!(
            errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
            "failed to elevate executor thread priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn elevate_priority() {}
