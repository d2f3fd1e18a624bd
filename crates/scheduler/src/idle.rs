//! Cooperative idle-task queue for the render thread
//!
//! Deferred work (off-screen slice refreshes, resource teardown) is queued as
//! closures and drained by the host loop one task at a time. A task receives
//! a mutable borrow of the host's context when it runs, which is how queued
//! work reaches resources that only exist on the render thread.
//!
//! Tasks may carry a name. While a named task is pending, further enqueues
//! under the same name are dropped, so a self-rescheduling loop never piles
//! up duplicate entries. The name is released when the task is popped, which
//! lets a running task re-enqueue itself under its own name. A pending task
//! whose guard has been cancelled no longer owns its name; an enqueue under
//! that name replaces it.
//!
//! Tasks may also carry a cancellation guard. Guarded tasks whose token has
//! been cancelled are discarded at pop time without running.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::cancel::CancellationToken;
use crate::frame_budget::FrameBudget;

struct QueuedTask<Ctx: ?Sized> {
    name: Option<String>,
    guard: Option<CancellationToken>,
    work: Box<dyn FnOnce(&mut Ctx) + Send>,
}

/// Counters describing queue traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted into the queue
    pub submitted: u64,
    /// Tasks handed to the host and run
    pub executed: u64,
    /// Enqueues dropped because the name was already pending
    pub deduplicated: u64,
    /// Tasks discarded at pop time because their guard was cancelled
    pub dropped_cancelled: u64,
    /// Tasks waiting in the queue right now
    pub pending: usize,
}

struct QueueInner<Ctx: ?Sized> {
    pending_names: HashSet<String>,
    submitted: u64,
    executed: u64,
    deduplicated: u64,
    dropped_cancelled: u64,
    tasks: VecDeque<QueuedTask<Ctx>>,
}

/// FIFO queue of deferred closures drained by the host loop
///
/// The queue itself is thread-safe and cheap to clone (clones share the same
/// queue), but tasks are only ever executed by whichever single thread calls
/// [`run_one`](IdleQueue::run_one) or the drain methods with its context.
///
/// # Example
///
/// ```
/// use sliceview_scheduler::IdleQueue;
///
/// let queue: IdleQueue<Vec<&str>> = IdleQueue::new();
/// queue.enqueue(|log: &mut Vec<&str>| log.push("first"));
/// queue.enqueue(|log: &mut Vec<&str>| log.push("second"));
///
/// let mut log = Vec::new();
/// queue.drain(&mut log);
/// assert_eq!(log, ["first", "second"]);
/// ```
pub struct IdleQueue<Ctx: ?Sized> {
    inner: Arc<Mutex<QueueInner<Ctx>>>,
}

impl<Ctx: ?Sized> Clone for IdleQueue<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Ctx: ?Sized> IdleQueue<Ctx> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                pending_names: HashSet::new(),
                submitted: 0,
                executed: 0,
                deduplicated: 0,
                dropped_cancelled: 0,
                tasks: VecDeque::new(),
            })),
        }
    }

    /// Queue an anonymous task
    pub fn enqueue<F>(&self, task: F)
    where
        F: FnOnce(&mut Ctx) + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.submitted += 1;
        inner.tasks.push_back(QueuedTask {
            name: None,
            guard: None,
            work: Box::new(task),
        });
    }

    /// Queue a named task, unless one with the same name is already pending
    ///
    /// Returns `false` if the task was dropped as a duplicate.
    pub fn enqueue_named<F>(&self, name: &str, task: F) -> bool
    where
        F: FnOnce(&mut Ctx) + Send + 'static,
    {
        self.push_named(name, None, Box::new(task))
    }

    /// Queue a named task whose execution is guarded by a cancellation token
    ///
    /// The task is discarded at pop time if the token has been cancelled by
    /// then. Returns `false` if the task was dropped as a duplicate.
    pub fn enqueue_guarded<F>(&self, name: &str, guard: &CancellationToken, task: F) -> bool
    where
        F: FnOnce(&mut Ctx) + Send + 'static,
    {
        self.push_named(name, Some(guard.clone()), Box::new(task))
    }

    fn push_named(
        &self,
        name: &str,
        guard: Option<CancellationToken>,
        work: Box<dyn FnOnce(&mut Ctx) + Send>,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending_names.contains(name) {
            // A cancelled task no longer holds its name; replace it. A
            // live task still deduplicates the new one.
            let stale = inner.tasks.iter().position(|task| {
                task.name.as_deref() == Some(name)
                    && task
                        .guard
                        .as_ref()
                        .is_some_and(|guard| guard.is_cancelled())
            });
            match stale {
                Some(position) => {
                    if inner.tasks.remove(position).is_some() {
                        inner.dropped_cancelled += 1;
                    }
                }
                None => {
                    inner.deduplicated += 1;
                    return false;
                }
            }
        } else {
            inner.pending_names.insert(name.to_string());
        }
        inner.submitted += 1;
        inner.tasks.push_back(QueuedTask {
            name: Some(name.to_string()),
            guard,
            work,
        });
        true
    }

    /// Run the next live task, if any
    ///
    /// Cancelled tasks are discarded until a live one is found. The lock is
    /// not held while the task runs, so tasks are free to enqueue more work.
    /// Returns `true` if a task was executed.
    pub fn run_one(&self, ctx: &mut Ctx) -> bool {
        loop {
            let task = {
                let mut inner = self.inner.lock().unwrap();
                let task = match inner.tasks.pop_front() {
                    Some(task) => task,
                    None => return false,
                };
                if let Some(name) = &task.name {
                    inner.pending_names.remove(name);
                }
                if task
                    .guard
                    .as_ref()
                    .is_some_and(|guard| guard.is_cancelled())
                {
                    inner.dropped_cancelled += 1;
                    continue;
                }
                inner.executed += 1;
                task
            };
            (task.work)(ctx);
            return true;
        }
    }

    /// Run tasks until the queue is empty
    ///
    /// Tasks queued while draining (including self-rescheduling loops) are
    /// run too. Returns the number of tasks executed.
    pub fn drain(&self, ctx: &mut Ctx) -> usize {
        let mut ran = 0;
        while self.run_one(ctx) {
            ran += 1;
        }
        ran
    }

    /// Run tasks until the queue is empty or the budget is spent
    ///
    /// The budget is checked before each task, so one slow task can overrun
    /// the slice but never more than one. Returns the number of tasks
    /// executed.
    pub fn drain_budgeted(&self, ctx: &mut Ctx, budget: &FrameBudget) -> usize {
        let mut ran = 0;
        while !budget.is_exhausted() && self.run_one(ctx) {
            ran += 1;
        }
        ran
    }

    /// Number of tasks currently waiting
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().tasks.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().tasks.is_empty()
    }

    /// Whether a task with this name is pending
    pub fn has_named(&self, name: &str) -> bool {
        self.inner.lock().unwrap().pending_names.contains(name)
    }

    /// Discard all pending tasks without running them
    ///
    /// Returns the number of tasks discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let dropped = inner.tasks.len();
        inner.tasks.clear();
        inner.pending_names.clear();
        dropped
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            submitted: inner.submitted,
            executed: inner.executed,
            deduplicated: inner.deduplicated,
            dropped_cancelled: inner.dropped_cancelled,
            pending: inner.tasks.len(),
        }
    }
}

impl<Ctx: ?Sized> Default for IdleQueue<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_one_executes_task() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        queue.enqueue(|n| *n += 1);

        let mut count = 0;
        assert!(queue.run_one(&mut count));
        assert_eq!(count, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_run_one_on_empty_queue() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let mut count = 0;
        assert!(!queue.run_one(&mut count));
        assert_eq!(count, 0);
    }

    #[test]
    fn test_fifo_order() {
        let queue: IdleQueue<Vec<u32>> = IdleQueue::new();
        for i in 0..5 {
            queue.enqueue(move |log: &mut Vec<u32>| log.push(i));
        }

        let mut log = Vec::new();
        queue.drain(&mut log);
        assert_eq!(log, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_named_deduplication() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        assert!(queue.enqueue_named("tick", |n| *n += 1));
        assert!(!queue.enqueue_named("tick", |n| *n += 1));
        assert_eq!(queue.pending(), 1);

        let mut count = 0;
        queue.drain(&mut count);
        assert_eq!(count, 1);
        assert_eq!(queue.stats().deduplicated, 1);
    }

    #[test]
    fn test_name_released_when_popped() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        assert!(queue.enqueue_named("tick", |n| *n += 1));
        assert!(queue.has_named("tick"));

        let mut count = 0;
        queue.run_one(&mut count);
        assert!(!queue.has_named("tick"));

        // Same name is accepted again once the first task has run.
        assert!(queue.enqueue_named("tick", |n| *n += 1));
    }

    #[test]
    fn test_task_can_reschedule_itself() {
        fn tick(queue: IdleQueue<u32>) -> impl FnOnce(&mut u32) + Send + 'static {
            move |n: &mut u32| {
                *n += 1;
                if *n < 4 {
                    let again = queue.clone();
                    queue.enqueue_named("loop", tick(again));
                }
            }
        }

        let queue: IdleQueue<u32> = IdleQueue::new();
        queue.enqueue_named("loop", tick(queue.clone()));

        let mut count = 0;
        let ran = queue.drain(&mut count);
        assert_eq!(count, 4);
        assert_eq!(ran, 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_guarded_task_dropped_when_cancelled() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let token = CancellationToken::new();
        queue.enqueue_guarded("tick", &token, |n| *n += 1);

        token.cancel();
        let mut count = 0;
        assert!(!queue.run_one(&mut count));
        assert_eq!(count, 0);
        assert_eq!(queue.stats().dropped_cancelled, 1);
    }

    #[test]
    fn test_run_one_skips_cancelled_until_live_task() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let token = CancellationToken::new();
        queue.enqueue_guarded("a", &token, |n| *n += 1);
        queue.enqueue_guarded("b", &token, |n| *n += 1);
        queue.enqueue(|n| *n += 100);

        token.cancel();
        let mut count = 0;
        assert!(queue.run_one(&mut count));
        assert_eq!(count, 100);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_cancelled_pending_task_is_replaced() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let old = CancellationToken::new();
        queue.enqueue_guarded("tick", &old, |n| *n += 1);
        old.cancel();

        // The cancelled entry no longer blocks the name.
        let fresh = CancellationToken::new();
        assert!(queue.enqueue_guarded("tick", &fresh, |n| *n += 10));
        assert_eq!(queue.pending(), 1);

        let mut count = 0;
        queue.drain(&mut count);
        assert_eq!(count, 10);
        assert_eq!(queue.stats().dropped_cancelled, 1);
    }

    #[test]
    fn test_cancelled_name_free_for_reuse() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let token = CancellationToken::new();
        queue.enqueue_guarded("tick", &token, |n| *n += 1);
        token.cancel();

        let mut count = 0;
        queue.run_one(&mut count);

        let fresh = CancellationToken::new();
        assert!(queue.enqueue_guarded("tick", &fresh, |n| *n += 2));
        queue.run_one(&mut count);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_drain_counts_tasks() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        for _ in 0..3 {
            queue.enqueue(|n| *n += 1);
        }

        let mut count = 0;
        assert_eq!(queue.drain(&mut count), 3);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_drain_budgeted_respects_exhausted_budget() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        queue.enqueue(|n| *n += 1);

        let spent = FrameBudget::new(Duration::ZERO);
        let mut count = 0;
        assert_eq!(queue.drain_budgeted(&mut count, &spent), 0);
        assert_eq!(queue.pending(), 1);

        let generous = FrameBudget::new(Duration::from_secs(10));
        assert_eq!(queue.drain_budgeted(&mut count, &generous), 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_clear_discards_pending() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        queue.enqueue(|n| *n += 1);
        queue.enqueue_named("tick", |n| *n += 1);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(!queue.has_named("tick"));
    }

    #[test]
    fn test_stats() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        queue.enqueue(|n| *n += 1);
        queue.enqueue_named("tick", |n| *n += 1);
        queue.enqueue_named("tick", |n| *n += 1);

        let mut count = 0;
        queue.run_one(&mut count);

        let stats = queue.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.pending, 1);
    }

    #[test]
    fn test_clones_share_the_queue() {
        let queue: IdleQueue<u32> = IdleQueue::new();
        let clone = queue.clone();
        clone.enqueue(|n| *n += 7);

        let mut count = 0;
        assert!(queue.run_one(&mut count));
        assert_eq!(count, 7);
    }

    #[test]
    fn test_works_with_unsized_context() {
        // The queue is used elsewhere with trait-object contexts.
        let queue: IdleQueue<dyn Fn() -> u32> = IdleQueue::new();
        queue.enqueue(|f: &mut (dyn Fn() -> u32 + 'static)| {
            assert_eq!(f(), 3);
        });

        let mut f: Box<dyn Fn() -> u32> = Box::new(|| 3);
        assert!(queue.run_one(&mut *f));
    }
}
