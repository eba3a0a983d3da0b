//! Execution contexts.
//!
//! Two contexts are involved in every overlay session:
//! - the UI context, which owns all visual-tree and mode-state mutation
//! - the render pipeline's context, where attach/detach may block
//!
//! An [`Executor`] must never run a task inline on the caller's stack.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

// ── BlockingExecutor ───────────────────────────────────────────────────────────

/// Runs tasks on tokio's blocking pool.
///
/// Suitable for pipeline calls that wait on pipeline-internal locks.
#[derive(Clone)]
pub struct BlockingExecutor {
    handle: Handle,
}

impl BlockingExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling task. `None` outside a runtime.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for BlockingExecutor {
    fn execute(&self, task: Task) {
        // Completion is reported by the task itself; the JoinHandle is not needed.
        drop(self.handle.spawn_blocking(task));
    }
}

// ── UI loop ───────────────────────────────────────────────────────────────────

/// Posts tasks to a [`UiLoop`].
#[derive(Clone)]
pub struct UiHandle {
    tx: mpsc::UnboundedSender<Task>,
}

impl Executor for UiHandle {
    fn execute(&self, task: Task) {
        if self.tx.send(task).is_err() {
            debug!("UI loop closed — dropping task");
        }
    }
}

/// Single-consumer task queue standing in for the UI thread.
///
/// Tasks run in posting order on whichever thread drives the loop.
pub struct UiLoop {
    rx: mpsc::UnboundedReceiver<Task>,
    executed: u64,
}

/// Creates a connected UI handle/loop pair.
pub fn ui_channel() -> (UiHandle, UiLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiHandle { tx }, UiLoop { rx, executed: 0 })
}

impl UiLoop {
    /// Runs until every [`UiHandle`] has been dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.rx.recv().await {
            task();
            self.executed += 1;
        }
        debug!("UI loop finished after {} tasks", self.executed);
    }

    /// Runs the tasks already queued, plus any they queue. Never waits.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            count += 1;
        }
        self.executed += count as u64;
        count
    }

    /// Runs tasks as they arrive for `window`, then returns how many ran.
    pub async fn run_for(&mut self, window: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + window;
        let mut count = 0;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(task)) => {
                    task();
                    count += 1;
                }
                Ok(None) | Err(_) => break,
            }
        }
        self.executed += count as u64;
        count
    }

    pub fn executed(&self) -> u64 {
        self.executed
    }
}
