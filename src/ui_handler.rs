//! Presentation-domain executor
//!
//! A single looper thread runs posted work items in FIFO order. Items carry a
//! [`TaskKey`] so work that has been queued but has not started yet can be
//! withdrawn with [`UiHandler::remove_callbacks`]. Posting never blocks on the
//! looper; only [`UiHandler::run_with_timeout`] waits, and only for a bounded time.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

/// What a queued work item does for its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Show,
    Dismiss,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub owner: u64,
    pub kind: TaskKind,
}

impl TaskKey {
    pub fn new(owner: u64, kind: TaskKind) -> Self {
        Self { owner, kind }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Task {
    key: Option<TaskKey>,
    job: Job,
}

#[derive(Default)]
struct Queue {
    tasks: VecDeque<Task>,
    quitting: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    wake: Condvar,
    /// Whether a looper thread drains the queue (false for manual handlers)
    threaded: bool,
}

/// Cheap, clonable handle for posting to the presentation domain
#[derive(Clone)]
pub struct UiHandler {
    shared: Arc<Shared>,
}

/// Owner of the looper thread; quits and joins on [`UiLooper::quit`]
pub struct UiLooper {
    handler: UiHandler,
    thread: Option<thread::JoinHandle<()>>,
}

impl UiLooper {
    /// Start a named looper thread
    pub fn spawn(name: &str) -> Result<Self> {
        let handler = UiHandler::with_mode(true);
        let looper_handler = handler.clone();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || looper_handler.run_loop())
            .context(format!("Failed to spawn UI looper thread '{name}'"))?;
        info!(thread = %name, "UI looper started");
        Ok(Self { handler, thread: Some(thread) })
    }

    pub fn handler(&self) -> UiHandler {
        self.handler.clone()
    }

    /// Stop accepting work, let already queued items finish, join the thread
    pub fn quit(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        {
            let mut queue = self.handler.lock();
            queue.quitting = true;
        }
        self.handler.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            debug!(pending = self.handler.pending(), "UI looper draining before exit");
            let _ = thread.join();
            info!("UI looper stopped");
        }
    }
}

impl Drop for UiLooper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UiHandler {
    fn with_mode(threaded: bool) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                wake: Condvar::new(),
                threaded,
            }),
        }
    }

    /// A handler without a thread: work runs only when [`UiHandler::run_pending`] is called
    #[cfg(test)]
    pub fn manual() -> Self {
        Self::with_mode(false)
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.shared.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a keyed work item. Returns false if the looper is quitting.
    pub fn post(&self, key: TaskKey, job: impl FnOnce() + Send + 'static) -> bool {
        self.enqueue(Some(key), Box::new(job))
    }

    fn enqueue(&self, key: Option<TaskKey>, job: Job) -> bool {
        let mut queue = self.lock();
        if queue.quitting {
            debug!(key = ?key, "UI looper quitting, dropping work item");
            return false;
        }
        queue.tasks.push_back(Task { key, job });
        drop(queue);
        self.shared.wake.notify_one();
        true
    }

    /// Withdraw every queued, not yet started item with this key
    pub fn remove_callbacks(&self, key: TaskKey) -> usize {
        let mut queue = self.lock();
        let before = queue.tasks.len();
        queue.tasks.retain(|task| task.key != Some(key));
        before - queue.tasks.len()
    }

    #[cfg(test)]
    pub fn has_callbacks(&self, key: TaskKey) -> bool {
        self.lock().tasks.iter().any(|task| task.key == Some(key))
    }

    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Run `job` on the looper and wait up to `timeout` for its result.
    /// Returns None on timeout, or if the job could not be queued.
    pub fn run_with_timeout<T: Send + 'static>(
        &self,
        job: impl FnOnce() -> T + Send + 'static,
        timeout: Duration,
    ) -> Option<T> {
        if !self.shared.threaded {
            // No looper to wait for: the caller's thread is the UI domain
            return Some(job());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        let queued = self.enqueue(
            None,
            Box::new(move || {
                let _ = tx.send(job());
            }),
        );
        if !queued {
            return None;
        }
        rx.recv_timeout(timeout).ok()
    }

    /// Drain the queue on the calling thread, including items queued while draining
    #[cfg(test)]
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.lock().tasks.pop_front();
            match task {
                Some(task) => {
                    (task.job)();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    fn run_loop(&self) {
        loop {
            let task = {
                let mut queue = self.lock();
                loop {
                    if let Some(task) = queue.tasks.pop_front() {
                        break Some(task);
                    }
                    if queue.quitting {
                        break None;
                    }
                    queue = self
                        .shared
                        .wake
                        .wait(queue)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            };
            match task {
                Some(task) => (task.job)(),
                None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(owner: u64, kind: TaskKind) -> TaskKey {
        TaskKey::new(owner, kind)
    }

    #[test]
    fn test_manual_handler_runs_in_order() {
        let ui = UiHandler::manual();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            ui.post(key(i, TaskKind::Show), move || log.lock().unwrap().push(i));
        }
        assert_eq!(ui.pending(), 3);
        assert_eq!(ui.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_callbacks_only_matching_key() {
        let ui = UiHandler::manual();
        let ran = Arc::new(AtomicUsize::new(0));
        for kind in [TaskKind::Show, TaskKind::Resize, TaskKind::Show] {
            let ran = ran.clone();
            ui.post(key(7, kind), move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        ui.post(key(8, TaskKind::Show), || {});

        assert_eq!(ui.remove_callbacks(key(7, TaskKind::Show)), 2);
        assert!(!ui.has_callbacks(key(7, TaskKind::Show)));
        assert!(ui.has_callbacks(key(8, TaskKind::Show)));
        ui.run_pending();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_items_posted_while_draining_also_run() {
        let ui = UiHandler::manual();
        let inner = ui.clone();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        ui.post(key(1, TaskKind::Show), move || {
            inner.post(key(1, TaskKind::Resize), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(ui.run_pending(), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_looper_thread_runs_work_and_quits() {
        let looper = UiLooper::spawn("test-ui").unwrap();
        let ui = looper.handler();
        let answer = ui.run_with_timeout(|| 6 * 7, Duration::from_secs(5));
        assert_eq!(answer, Some(42));
        looper.quit();
        assert!(!ui.post(key(1, TaskKind::Show), || {}));
    }

    #[test]
    fn test_run_with_timeout_gives_up() {
        let looper = UiLooper::spawn("test-ui-slow").unwrap();
        let ui = looper.handler();
        ui.post(key(1, TaskKind::Show), || thread::sleep(Duration::from_millis(300)));
        let answer = ui.run_with_timeout(|| 1, Duration::from_millis(20));
        assert_eq!(answer, None);
    }
}
