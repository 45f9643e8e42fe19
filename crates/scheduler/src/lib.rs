//! Document Panel Scheduler Library
//!
//! Cooperative, single-threaded scheduling primitives for the document panel.
//!
//! The host application owns the event loop. Everything in the panel that
//! would take too long for one event handler is written as a step machine, and
//! each step is queued on a [`TimerQueue`] that the host pumps between its own
//! events. There is no parallelism and no locking: tasks are interleaved, never
//! concurrent.
//!
//! # Example
//!
//! ```
//! use docpanel_scheduler::{CancellationToken, TimerQueue};
//!
//! #[derive(Debug, PartialEq)]
//! enum Task {
//!     Step,
//! }
//!
//! let mut queue = TimerQueue::new();
//! let token = CancellationToken::new();
//! queue.schedule(0, Task::Step);
//!
//! while let Some((_id, task)) = queue.pop_due() {
//!     assert_eq!(task, Task::Step);
//!     if !token.is_cancelled() {
//!         // run one short step, reschedule if more work remains
//!     }
//! }
//! ```

mod cancel;
mod debounce;
mod timer;

pub use cancel::CancellationToken;
pub use debounce::Debouncer;
pub use timer::{TimerId, TimerQueue, TimerStats};
