//! Flush scheduling
//!
//! The runtime never decides on its own when a flush happens. It hands a
//! [`FlushTask`] to an injected [`Scheduler`] at most once per batch of
//! invalidations, and the host decides when that task runs: at the next paint,
//! at the end of the current task, or on an explicit tick.
//!
//! Two schedulers ship with the crate:
//!
//! - [`ManualScheduler`] holds tasks until the caller ticks it. Suited to
//!   servers, tests and any host that owns its own loop.
//! - [`LocalSpawnScheduler`] spawns each task onto the current tokio
//!   [`LocalSet`](tokio::task::LocalSet) (feature `tokio`).

use std::cell::RefCell;
use std::collections::VecDeque;

use futures::future::LocalBoxFuture;

/// A pending flush, ready to be polled by the host.
pub type FlushTask = LocalBoxFuture<'static, ()>;

/// Host-provided scheduling primitive.
///
/// Implementations must not poll `task` synchronously from inside `schedule`;
/// the flush has to run after the write that triggered it has returned.
pub trait Scheduler {
	/// Arranges for `task` to run at the next coalescing point.
	fn schedule(&self, task: FlushTask);
}

/// Scheduler whose tasks run only when [`tick`](ManualScheduler::tick) is called.
#[derive(Default)]
pub struct ManualScheduler {
	pending: RefCell<VecDeque<FlushTask>>,
}

impl ManualScheduler {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs every task scheduled before this call, in order.
	///
	/// Tasks scheduled while ticking wait for the next tick. Returns the number
	/// of tasks run.
	pub async fn tick(&self) -> usize {
		let tasks: Vec<FlushTask> = self.pending.borrow_mut().drain(..).collect();
		let count = tasks.len();
		for task in tasks {
			task.await;
		}
		count
	}

	/// Number of tasks waiting for a tick.
	pub fn pending(&self) -> usize {
		self.pending.borrow().len()
	}
}

impl Scheduler for ManualScheduler {
	fn schedule(&self, task: FlushTask) {
		self.pending.borrow_mut().push_back(task);
	}
}

impl std::fmt::Debug for ManualScheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ManualScheduler")
			.field("pending", &self.pending())
			.finish()
	}
}

/// Scheduler that spawns each flush onto the current tokio `LocalSet`.
///
/// Scheduling panics if called outside a `LocalSet` context, as
/// [`tokio::task::spawn_local`] does.
#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSpawnScheduler;

#[cfg(feature = "tokio")]
impl LocalSpawnScheduler {
	pub fn new() -> Self {
		Self
	}
}

#[cfg(feature = "tokio")]
impl Scheduler for LocalSpawnScheduler {
	fn schedule(&self, task: FlushTask) {
		tokio::task::spawn_local(task);
	}
}
