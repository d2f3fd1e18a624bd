//! Sliceview Scheduler Library
//!
//! Cooperative idle-task scheduling for a single render thread.
//!
//! This crate provides the deferred-work machinery the rendering engine runs
//! on. Work that must happen on the render thread but not right now (slice
//! refreshes, resource teardown) is queued as closures, optionally named for
//! deduplication and guarded by cancellation tokens, and drained by the host
//! loop either to exhaustion or under a wall-clock frame budget.
//!
//! # Example
//!
//! ```
//! use sliceview_scheduler::{FrameBudget, IdleQueue};
//!
//! let queue: IdleQueue<u32> = IdleQueue::new();
//!
//! // Queue deferred work. Named tasks are deduplicated while pending.
//! queue.enqueue(|n: &mut u32| *n += 1);
//! queue.enqueue_named("refresh", |n: &mut u32| *n += 10);
//! queue.enqueue_named("refresh", |n: &mut u32| *n += 10); // dropped
//!
//! // The host drains the queue with its context between frames.
//! let mut frames = 0;
//! let ran = queue.drain_budgeted(&mut frames, &FrameBudget::for_60fps());
//! assert_eq!(ran, 2);
//! assert_eq!(frames, 11);
//! ```

mod cancel;
mod frame_budget;
mod idle;

// Re-export public API
pub use cancel::CancellationToken;
pub use frame_budget::{FrameBudget, EVENT_RESERVE, FRAME_BUDGET_120FPS, FRAME_BUDGET_60FPS};
pub use idle::{IdleQueue, QueueStats};
