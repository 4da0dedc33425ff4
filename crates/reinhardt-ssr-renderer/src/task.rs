//! Units of scheduled work and the queue that re-schedules them.

use crate::arena::{BoundaryId, RowId, SegmentId};
use crate::node::Node;
use crate::tree::{KeyPath, TreeContext};
use parking_lot::Mutex;
use reinhardt_ssr_markup::format::FormatContext;
use std::collections::VecDeque;
use std::task::Waker;

/// Identifier of a [`Task`], unique within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u64);

/// Renders one node into one segment.
///
/// Tasks are created for the root, for a node that suspended or exceeded the
/// render depth, and for each boundary fallback. A task that suspends again
/// keeps its id and bumps `ping_epoch`, so a stale ping cannot run it twice.
#[derive(Debug)]
pub(crate) struct Task {
	pub(crate) id: TaskId,
	pub(crate) node: Node,
	/// Boundary whose pending count includes this task; `None` for the shell.
	pub(crate) boundary: Option<BoundaryId>,
	pub(crate) segment: SegmentId,
	/// Boundary whose fallback this task renders; revealing that boundary
	/// cancels the task.
	pub(crate) fallback_of: Option<BoundaryId>,
	pub(crate) format: FormatContext,
	pub(crate) key_path: KeyPath,
	pub(crate) tree: TreeContext,
	pub(crate) row: Option<RowId>,
	pub(crate) discard: bool,
	pub(crate) ping_epoch: u64,
}

/// Tasks whose dependency settled, waiting for the next work pass.
///
/// Pings arrive from whichever thread settles a [`Thenable`](crate::thenable::Thenable),
/// so the queue is shared and locked. The request drains it on its own
/// thread of control; the registered waker lets an async driver know that
/// draining would make progress.
#[derive(Debug, Default)]
pub(crate) struct PingQueue {
	pinged: Mutex<VecDeque<(TaskId, u64)>>,
	waker: Mutex<Option<Waker>>,
}

impl PingQueue {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn ping(&self, id: TaskId, epoch: u64) {
		tracing::trace!(task = id.0, epoch, "Task pinged");
		self.pinged.lock().push_back((id, epoch));
		if let Some(waker) = self.waker.lock().take() {
			waker.wake();
		}
	}

	pub(crate) fn drain(&self) -> Vec<(TaskId, u64)> {
		self.pinged.lock().drain(..).collect()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.pinged.lock().is_empty()
	}

	pub(crate) fn register(&self, waker: &Waker) {
		let mut slot = self.waker.lock();
		if !slot.as_ref().is_some_and(|w| w.will_wake(waker)) {
			*slot = Some(waker.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::task::noop_waker;
	use rstest::rstest;

	#[rstest]
	fn test_drain_preserves_ping_order() {
		let queue = PingQueue::new();
		queue.ping(TaskId(2), 0);
		queue.ping(TaskId(1), 3);

		assert!(!queue.is_empty());
		assert_eq!(queue.drain(), vec![(TaskId(2), 0), (TaskId(1), 3)]);
		assert!(queue.is_empty());
	}

	#[rstest]
	fn test_ping_consumes_registered_waker() {
		let queue = PingQueue::new();
		queue.register(&noop_waker());
		queue.ping(TaskId(0), 0);

		assert!(queue.waker.lock().is_none());
	}
}
