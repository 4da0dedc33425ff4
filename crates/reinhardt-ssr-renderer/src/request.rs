//! The render request.
//!
//! A [`Request`] owns every segment, boundary, row and task of one render and
//! moves them through their lifecycles. Work happens in passes: each call to
//! [`Request::perform_work`] runs the tasks whose dependencies settled since
//! the previous pass, then flushes whatever became ready to the destination.
//! Nothing runs in the background; whoever drives the request (a stream, a
//! string renderer, or a test) decides when the next pass happens.

use crate::arena::{
	Arena, Boundary, BoundaryId, BoundaryStatus, Row, RowId, Segment, SegmentId, SegmentStatus,
};
use crate::config::{RenderHooks, RenderOptions};
use crate::destination::Destination;
use crate::error::{Interrupt, RenderError, RenderResult};
use crate::node::{IntoNode, Node};
use crate::postpone::{PostponedState, ReplayNode, ReplayPlan, ReplaySlot, TrackedPostpones};
use crate::state::{RenderState, ResumableState};
use crate::task::{PingQueue, Task, TaskId};
use crate::thenable::Wakeable;
use crate::tree::KeyPath;
use crate::walk::WalkCx;
use reinhardt_ssr_markup::format::FormatContext;
use reinhardt_ssr_markup::markers::TEXT_SEPARATOR;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::task::Waker;

/// Lifecycle of a [`Request`].
///
/// The discriminants are ordered so that `status >= Closing` reads as "no
/// more work will run".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RequestStatus {
	/// Created; the root task has not run.
	Opening = 10,
	/// Rendering.
	Open = 11,
	/// An abort is cancelling the remaining tasks.
	Aborting = 12,
	/// A fatal error occurred before a destination was attached.
	Closing = 13,
	/// The destination was closed.
	Closed = 14,
}

/// How the request treats postponed work.
enum Mode {
	Render,
	Prerender,
	Resume(ReplayPlan),
}

/// One server render.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::config::{RenderHooks, RenderOptions};
/// use reinhardt_ssr_renderer::destination::BufferDestination;
/// use reinhardt_ssr_renderer::node::Element;
/// use reinhardt_ssr_renderer::request::Request;
///
/// let mut request = Request::new(
/// 	Element::new("p").child("hi"),
/// 	RenderOptions::new(),
/// 	RenderHooks::new(),
/// );
/// request.start_work();
/// let sink = BufferDestination::new();
/// request.start_flowing(Box::new(sink.clone()));
///
/// assert_eq!(&sink.drain()[..], b"<p>hi</p>");
/// assert!(sink.is_closed());
/// ```
pub struct Request {
	pub(crate) status: RequestStatus,
	pub(crate) options: RenderOptions,
	pub(crate) hooks: RenderHooks,
	pub(crate) segments: Arena<SegmentId, Segment>,
	pub(crate) boundaries: Arena<BoundaryId, Boundary>,
	pub(crate) rows: Arena<RowId, Row>,
	pub(crate) tasks: BTreeMap<TaskId, Task>,
	next_task_id: u64,
	pub(crate) pings: Arc<PingQueue>,
	pub(crate) root_segment: SegmentId,
	pub(crate) completed_root_segment: Option<SegmentId>,
	pub(crate) shell_complete: bool,
	pub(crate) shell_flushed: bool,
	pub(crate) client_rendered_boundaries: VecDeque<BoundaryId>,
	pub(crate) completed_boundaries: VecDeque<BoundaryId>,
	pub(crate) partial_boundaries: VecDeque<BoundaryId>,
	pub(crate) completed_slots: VecDeque<SegmentId>,
	pub(crate) all_pending_tasks: usize,
	pub(crate) pending_root_tasks: usize,
	/// Next runtime id for `B:`/`S:`/`P:` elements.
	pub(crate) next_segment_id: u32,
	pub(crate) resumable_state: ResumableState,
	pub(crate) render_state: RenderState,
	pub(crate) tracked: Option<TrackedPostpones>,
	pub(crate) replay: Option<ReplayPlan>,
	pub(crate) root_format: FormatContext,
	pub(crate) destination: Option<Box<dyn Destination>>,
	pub(crate) flowing: bool,
	pub(crate) fatal: Option<RenderError>,
	pub(crate) resuming: bool,
}

impl Request {
	/// Creates a request that renders `node` to completion.
	pub fn new(node: impl IntoNode, options: RenderOptions, hooks: RenderHooks) -> Self {
		let format = FormatContext::root(options.namespace);
		let resumable = ResumableState::new(options.identifier_prefix.clone());
		Self::create(node.into_node(), options, hooks, format, resumable, 0, Mode::Render)
	}

	/// Creates a request that records postponed work instead of failing on it.
	///
	/// Aborting a prerender also postpones the unfinished work, so the
	/// result can be completed later with [`Request::resume`].
	pub fn prerender(node: impl IntoNode, options: RenderOptions, hooks: RenderHooks) -> Self {
		let format = FormatContext::root(options.namespace);
		let resumable = ResumableState::new(options.identifier_prefix.clone());
		Self::create(
			node.into_node(),
			options,
			hooks,
			format,
			resumable,
			0,
			Mode::Prerender,
		)
	}

	/// Creates a request that fills the holes a prerender left.
	///
	/// `node` must be the same tree the prerender rendered. Output the
	/// prelude already contains is walked but not written again.
	pub fn resume(
		node: impl IntoNode,
		postponed: PostponedState,
		options: RenderOptions,
		hooks: RenderHooks,
	) -> RenderResult<Self> {
		postponed.validate()?;
		let PostponedState {
			next_segment_id,
			root_format_context,
			resumable_state,
			replay_nodes,
			replay_slots,
		} = postponed;
		let plan = ReplayPlan::new(&replay_nodes, &replay_slots);
		tracing::debug!(
			boundaries = replay_nodes.len(),
			slots = replay_slots.len(),
			"Resuming prerender"
		);
		Ok(Self::create(
			node.into_node(),
			options,
			hooks,
			root_format_context,
			resumable_state,
			next_segment_id,
			Mode::Resume(plan),
		))
	}

	fn create(
		node: Node,
		options: RenderOptions,
		hooks: RenderHooks,
		format: FormatContext,
		resumable_state: ResumableState,
		next_segment_id: u32,
		mode: Mode,
	) -> Self {
		let (tracked, replay) = match mode {
			Mode::Render => (None, None),
			Mode::Prerender => (Some(TrackedPostpones::default()), None),
			Mode::Resume(plan) => (None, Some(plan)),
		};
		let resuming = replay.is_some();
		let render_state = RenderState::new(&options);

		let mut segments = Arena::new();
		let mut root = Segment::new(0, format.clone(), false, false);
		root.parent_flushed = !resuming;
		root.discard = resuming;
		let root_segment = segments.push(root);

		let mut request = Self {
			status: RequestStatus::Opening,
			options,
			hooks,
			segments,
			boundaries: Arena::new(),
			rows: Arena::new(),
			tasks: BTreeMap::new(),
			next_task_id: 0,
			pings: Arc::new(PingQueue::new()),
			root_segment,
			completed_root_segment: None,
			shell_complete: false,
			shell_flushed: resuming,
			client_rendered_boundaries: VecDeque::new(),
			completed_boundaries: VecDeque::new(),
			partial_boundaries: VecDeque::new(),
			completed_slots: VecDeque::new(),
			all_pending_tasks: 0,
			pending_root_tasks: 0,
			next_segment_id,
			resumable_state,
			render_state,
			tracked,
			replay,
			root_format: format.clone(),
			destination: None,
			flowing: false,
			fatal: None,
			resuming,
		};
		let cx = WalkCx::root(root_segment, format, resuming);
		let id = request.allocate_task_id();
		let (id, epoch) = request.spawn_task(cx.task(id, node, root_segment));
		request.pings.ping(id, epoch);
		request
	}

	/// Runs the root task and everything it can complete synchronously.
	pub fn start_work(&mut self) {
		if self.status != RequestStatus::Opening {
			return;
		}
		self.status = RequestStatus::Open;
		tracing::debug!(prefix = %self.resumable_state.id_prefix, "Render started");
		self.perform_work();
	}

	/// Runs every pinged task, then flushes if a destination is attached.
	pub fn perform_work(&mut self) {
		if self.status >= RequestStatus::Closing {
			return;
		}
		loop {
			let pinged = self.pings.drain();
			if pinged.is_empty() {
				break;
			}
			for (id, epoch) in pinged {
				if self.status >= RequestStatus::Closing {
					return;
				}
				if self.tasks.get(&id).map(|t| t.ping_epoch) != Some(epoch) {
					continue;
				}
				if let Some(task) = self.tasks.remove(&id) {
					self.retry_task(task);
				}
			}
		}
		if self.destination.is_some() {
			self.flush_completed_queues();
		}
	}

	/// Attaches `destination` and writes everything ready so far.
	pub fn start_flowing(&mut self, destination: Box<dyn Destination>) {
		if self.status == RequestStatus::Closed {
			return;
		}
		if self.status == RequestStatus::Closing {
			let mut destination = destination;
			if let Some(error) = &self.fatal {
				destination.close_with_error(error);
			}
			self.status = RequestStatus::Closed;
			return;
		}
		self.destination = Some(destination);
		self.flowing = true;
		self.flush_completed_queues();
	}

	/// Stops writing until [`Request::resume_flowing`] is called.
	pub fn stop_flowing(&mut self) {
		self.flowing = false;
	}

	/// Continues writing after backpressure or [`Request::stop_flowing`].
	pub fn resume_flowing(&mut self) {
		if self.destination.is_none() {
			return;
		}
		self.flowing = true;
		self.flush_completed_queues();
	}

	/// Returns `true` while the destination accepts data.
	pub fn is_flowing(&self) -> bool {
		self.flowing
	}

	/// Current lifecycle state.
	pub fn status(&self) -> RequestStatus {
		self.status
	}

	/// Returns `true` once every task outside a boundary finished.
	pub fn is_shell_ready(&self) -> bool {
		self.shell_complete
	}

	/// Returns `true` once no task is pending.
	pub fn is_all_ready(&self) -> bool {
		self.all_pending_tasks == 0
	}

	/// Returns `true` if a task was pinged since the last work pass.
	pub fn has_pending_pings(&self) -> bool {
		!self.pings.is_empty()
	}

	/// The error that ended the request, if any.
	pub fn fatal_error(&self) -> Option<&RenderError> {
		self.fatal.as_ref()
	}

	/// Status of every boundary created so far, in creation order.
	pub fn boundary_statuses(&self) -> Vec<BoundaryStatus> {
		self.boundaries.iter().map(|b| b.status).collect()
	}

	/// State a resume needs, or `None` if nothing was postponed.
	pub fn postponed_state(&self) -> Option<PostponedState> {
		let tracked = self.tracked.as_ref()?;
		if tracked.is_empty() {
			return None;
		}
		Some(PostponedState {
			next_segment_id: self.next_segment_id,
			root_format_context: self.root_format.clone(),
			resumable_state: self.resumable_state.clone(),
			replay_nodes: tracked.replay_nodes.clone(),
			replay_slots: tracked.replay_slots.clone(),
		})
	}

	/// Wakes `waker` when a task is pinged.
	pub(crate) fn register_waker(&self, waker: &Waker) {
		self.pings.register(waker);
	}

	/// Cancels every remaining task.
	///
	/// Pending boundaries are handed to the client; a task outside every
	/// boundary makes the whole request fail. In a prerender the remaining
	/// work is postponed instead.
	pub fn abort(&mut self, reason: impl Into<String>) {
		if self.status >= RequestStatus::Closing {
			return;
		}
		let reason = reason.into();
		tracing::debug!(reason = %reason, tasks = self.tasks.len(), "Aborting render");
		self.status = RequestStatus::Aborting;
		let error = RenderError::aborted(reason.clone());
		let ids: Vec<TaskId> = self.tasks.keys().copied().collect();
		for id in ids {
			if let Some(task) = self.tasks.remove(&id) {
				self.abort_task(task, &error, &reason);
			}
		}
		if self.destination.is_some() {
			self.flush_completed_queues();
		}
	}

	fn abort_task(&mut self, task: Task, error: &RenderError, reason: &str) {
		if self.tracked.is_some() {
			self.segments[task.segment].status = SegmentStatus::Pending;
			self.postpone_task(task, reason.to_string());
			return;
		}
		self.segments[task.segment].status = SegmentStatus::Aborted;
		if let Some(b) = task.fallback_of {
			self.boundaries[b].fallback_abortable_tasks.remove(&task.id);
		}
		if let Some(row) = task.row {
			self.release_row(row);
		}
		match task.boundary {
			None => {
				self.pending_root_tasks = self.pending_root_tasks.saturating_sub(1);
				if self.fatal.is_none() {
					let _ = self.report_error(error);
					self.fail_fatally(error.clone());
				}
			}
			Some(b) => {
				let boundary = &mut self.boundaries[b];
				boundary.pending_tasks = boundary.pending_tasks.saturating_sub(1);
				if matches!(
					boundary.status,
					BoundaryStatus::Pending | BoundaryStatus::Postponed
				) {
					let digest = self.report_error(error);
					self.client_render_boundary(b, digest);
				}
				if self.boundaries[b].pending_tasks == 0 {
					self.settle_boundary(b);
				}
			}
		}
		self.decrement_all_pending();
	}

	pub(crate) fn allocate_task_id(&mut self) -> TaskId {
		let id = TaskId(self.next_task_id);
		self.next_task_id += 1;
		id
	}

	/// Registers `task` with every counter it blocks and stores it.
	pub(crate) fn spawn_task(&mut self, task: Task) -> (TaskId, u64) {
		self.all_pending_tasks += 1;
		match task.boundary {
			None => self.pending_root_tasks += 1,
			Some(b) => self.boundaries[b].pending_tasks += 1,
		}
		if let Some(row) = task.row {
			self.rows[row].pending_tasks += 1;
		}
		if let Some(b) = task.fallback_of {
			self.boundaries[b].fallback_abortable_tasks.insert(task.id);
		}
		let key = (task.id, task.ping_epoch);
		tracing::trace!(task = task.id.0, boundary = ?task.boundary, "Task spawned");
		self.tasks.insert(task.id, task);
		key
	}

	/// Pings the task once `wakeable` settles.
	pub(crate) fn subscribe_ping(&self, wakeable: &Wakeable, id: TaskId, epoch: u64) {
		let pings = Arc::clone(&self.pings);
		wakeable.subscribe(move || pings.ping(id, epoch));
	}

	fn retry_task(&mut self, mut task: Task) {
		let segment = task.segment;
		if self.segments[segment].status != SegmentStatus::Pending {
			return;
		}
		self.segments[segment].status = SegmentStatus::Rendering;
		let initial_text = self.segments[segment].last_pushed_text;
		let mut cx = WalkCx::from_task(&task);
		let node = std::mem::take(&mut task.node);
		let result = self.render_node_inner(&mut cx, &node);
		task.node = node;
		match result {
			Ok(()) => {
				self.finish_segment(segment);
				self.finished_task(&task);
			}
			Err(Interrupt::Suspend(wakeable)) => {
				self.reset_segment(segment, initial_text);
				task.ping_epoch += 1;
				let (id, epoch) = (task.id, task.ping_epoch);
				tracing::trace!(task = id.0, epoch, "Task suspended again");
				self.tasks.insert(id, task);
				self.subscribe_ping(&wakeable, id, epoch);
			}
			Err(Interrupt::Postpone(reason)) => {
				self.reset_segment(segment, initial_text);
				self.postpone_task(task, reason);
			}
			Err(Interrupt::Error(error)) => {
				self.segments[segment].status = SegmentStatus::Errored;
				self.errored_task(&task, error);
			}
		}
	}

	fn reset_segment(&mut self, segment: SegmentId, last_pushed_text: bool) {
		let seg = &mut self.segments[segment];
		seg.chunks.clear();
		seg.children.clear();
		seg.last_pushed_text = last_pushed_text;
		seg.status = SegmentStatus::Pending;
	}

	/// Seals a rendered segment.
	pub(crate) fn finish_segment(&mut self, segment: SegmentId) {
		let seg = &mut self.segments[segment];
		if seg.discard {
			seg.chunks.clear();
		} else if seg.last_pushed_text && seg.text_embedded {
			seg.chunks.push_static(TEXT_SEPARATOR);
		}
		seg.status = SegmentStatus::Completed;
	}

	pub(crate) fn finished_task(&mut self, task: &Task) {
		if let Some(b) = task.fallback_of {
			self.boundaries[b].fallback_abortable_tasks.remove(&task.id);
		}
		if let Some(row) = task.row {
			self.release_row(row);
		}
		let segment = task.segment;
		match task.boundary {
			None => {
				let seg = &self.segments[segment];
				if seg.parent_flushed && seg.status == SegmentStatus::Completed {
					if segment == self.root_segment {
						self.completed_root_segment = Some(segment);
					} else {
						self.completed_slots.push_back(segment);
					}
				}
				self.pending_root_tasks = self.pending_root_tasks.saturating_sub(1);
				if self.pending_root_tasks == 0 {
					self.complete_shell();
				}
			}
			Some(b) => {
				let boundary = &mut self.boundaries[b];
				boundary.pending_tasks = boundary.pending_tasks.saturating_sub(1);
				let pending = boundary.pending_tasks;
				if boundary.status == BoundaryStatus::Pending {
					let seg = &self.segments[segment];
					if seg.parent_flushed && seg.status == SegmentStatus::Completed {
						self.queue_completed_segment(b, segment);
						let boundary = &self.boundaries[b];
						if pending > 0
							&& boundary.completed_segments.len() == 1
							&& boundary.parent_flushed
						{
							self.partial_boundaries.push_back(b);
						}
					}
				}
				if pending == 0 {
					self.settle_boundary(b);
				}
			}
		}
		self.decrement_all_pending();
	}

	pub(crate) fn errored_task(&mut self, task: &Task, error: RenderError) {
		if let Some(b) = task.fallback_of {
			self.boundaries[b].fallback_abortable_tasks.remove(&task.id);
		}
		if let Some(row) = task.row {
			self.release_row(row);
		}
		let digest = self.report_error(&error);
		match task.boundary {
			None => {
				self.pending_root_tasks = self.pending_root_tasks.saturating_sub(1);
				self.fail_fatally(error);
			}
			Some(b) => {
				let boundary = &mut self.boundaries[b];
				boundary.pending_tasks = boundary.pending_tasks.saturating_sub(1);
				self.client_render_boundary(b, digest);
				if self.boundaries[b].pending_tasks == 0 {
					self.settle_boundary(b);
				}
			}
		}
		self.decrement_all_pending();
	}

	fn decrement_all_pending(&mut self) {
		self.all_pending_tasks = self.all_pending_tasks.saturating_sub(1);
		if self.all_pending_tasks == 0 {
			self.complete_all();
		}
	}

	/// Handles a postponed task: its boundary, or a slot in its segment.
	fn postpone_task(&mut self, task: Task, reason: String) {
		if self.tracked.is_none() {
			self.segments[task.segment].status = SegmentStatus::Errored;
			self.errored_task(&task, RenderError::PostponedOutsidePrerender { reason });
			return;
		}
		self.report_postpone(&reason);
		match task.boundary {
			Some(b) => {
				self.postpone_boundary(b);
				self.segments[task.segment].status = SegmentStatus::Postponed;
			}
			None => {
				self.insert_postponed_slot(task.segment, &task.key_path, task.format.clone());
				self.finish_segment(task.segment);
			}
		}
		self.finished_task(&task);
	}

	pub(crate) fn report_postpone(&mut self, reason: &str) {
		tracing::debug!(reason, "Render postponed");
		if let Some(on_postpone) = self.hooks.on_postpone.as_mut() {
			on_postpone(reason);
		}
	}

	/// Reports a recoverable error and returns the digest `on_error` chose.
	pub(crate) fn report_error(&mut self, error: &RenderError) -> Option<String> {
		tracing::warn!(error = %error, "Render error");
		self.hooks.on_error.as_mut().and_then(|on_error| on_error(error))
	}

	/// Leaves the current position for a resume, outside every boundary.
	pub(crate) fn insert_postponed_slot(
		&mut self,
		parent: SegmentId,
		key_path: &KeyPath,
		format: FormatContext,
	) {
		let id = self.next_segment_id;
		self.next_segment_id += 1;
		let index = self.segments[parent].chunks.len();
		let mut slot = Segment::new(index, format, false, false);
		slot.status = SegmentStatus::Postponed;
		slot.id = Some(id);
		let slot = self.segments.push(slot);
		let parent = &mut self.segments[parent];
		parent.children.push(slot);
		parent.last_pushed_text = false;
		if let Some(tracked) = self.tracked.as_mut() {
			tracked.replay_slots.push(ReplaySlot {
				key_path: key_path.clone(),
				segment_id: id,
			});
		}
	}

	pub(crate) fn postpone_boundary(&mut self, b: BoundaryId) {
		if self.boundaries[b].status != BoundaryStatus::Pending {
			return;
		}
		let id = self.next_segment_id;
		self.next_segment_id += 1;
		let boundary = &mut self.boundaries[b];
		boundary.status = BoundaryStatus::Postponed;
		boundary.root_segment_id = Some(id);
		let key_path = boundary.tracked_key_path.clone();
		if let (Some(tracked), Some(key_path)) = (self.tracked.as_mut(), key_path) {
			tracked.replay_nodes.push(ReplayNode {
				key_path,
				boundary_id: id,
			});
		}
		tracing::debug!(boundary_id = id, "Boundary postponed");
	}

	pub(crate) fn client_render_boundary(&mut self, b: BoundaryId, digest: Option<String>) {
		let boundary = &mut self.boundaries[b];
		match boundary.status {
			BoundaryStatus::Completed | BoundaryStatus::ClientRendered => return,
			BoundaryStatus::Postponed => {
				if let (Some(tracked), Some(id)) = (self.tracked.as_mut(), boundary.root_segment_id) {
					tracked.replay_nodes.retain(|n| n.boundary_id != id);
				}
			}
			BoundaryStatus::Pending => {}
		}
		boundary.status = BoundaryStatus::ClientRendered;
		boundary.error_digest = digest;
		if boundary.parent_flushed {
			self.client_rendered_boundaries.push_back(b);
		}
		tracing::debug!(boundary = ?b, "Boundary handed to the client");
	}

	/// Called once a boundary's pending count reaches zero.
	pub(crate) fn settle_boundary(&mut self, b: BoundaryId) {
		let boundary = &mut self.boundaries[b];
		if boundary.settled {
			return;
		}
		boundary.settled = true;
		let row = boundary.row;
		if boundary.status == BoundaryStatus::Pending {
			match row {
				Some(row) => {
					self.rows[row].boundaries.push(b);
					self.release_row(row);
				}
				None => self.reveal_boundary(b),
			}
		} else if let Some(row) = row {
			self.release_row(row);
		}
	}

	fn reveal_boundary(&mut self, b: BoundaryId) {
		let boundary = &mut self.boundaries[b];
		if boundary.status != BoundaryStatus::Pending {
			return;
		}
		boundary.status = BoundaryStatus::Completed;
		if boundary.parent_flushed {
			self.completed_boundaries.push_back(b);
		}
		let fallback_tasks = std::mem::take(&mut boundary.fallback_abortable_tasks);
		tracing::debug!(boundary = ?b, cancelled = fallback_tasks.len(), "Boundary completed");
		for id in fallback_tasks {
			if let Some(task) = self.tasks.remove(&id) {
				// The fallback is no longer needed; nothing is reported.
				self.segments[task.segment].status = SegmentStatus::Aborted;
				self.finished_task(&task);
			}
		}
	}

	pub(crate) fn release_row(&mut self, row: RowId) {
		let r = &mut self.rows[row];
		r.pending_tasks = r.pending_tasks.saturating_sub(1);
		if r.pending_tasks > 0 {
			return;
		}
		let held = std::mem::take(&mut r.boundaries);
		let next = r.next.take();
		tracing::trace!(row = ?row, together = r.together, revealed = held.len(), "Row unblocked");
		for b in held {
			self.reveal_boundary(b);
		}
		if let Some(next) = next {
			self.release_row(next);
		}
	}

	/// Adds a finished segment to its boundary, collapsing wrappers that
	/// only hold one child.
	pub(crate) fn queue_completed_segment(&mut self, b: BoundaryId, segment: SegmentId) {
		let seg = &self.segments[segment];
		if seg.chunks.is_empty() && seg.children.len() == 1 {
			let child = seg.children[0];
			let id = seg.id;
			let child_seg = &self.segments[child];
			if child_seg.boundary.is_none() && child_seg.id.is_none() {
				let child_seg = &mut self.segments[child];
				child_seg.id = id;
				child_seg.parent_flushed = true;
				if child_seg.status == SegmentStatus::Completed {
					self.queue_completed_segment(b, child);
				}
				return;
			}
		}
		self.boundaries[b].completed_segments.push(segment);
	}

	fn complete_shell(&mut self) {
		if self.fatal.is_some() || self.shell_complete {
			return;
		}
		self.shell_complete = true;
		self.emit_early_headers();
		self.hooks.on_shell_error = None;
		tracing::debug!("Shell ready");
		if let Some(on_shell_ready) = self.hooks.on_shell_ready.take() {
			on_shell_ready();
		}
	}

	fn complete_all(&mut self) {
		if self.fatal.is_some() {
			return;
		}
		tracing::debug!("All work complete");
		if let Some(on_all_ready) = self.hooks.on_all_ready.take() {
			on_all_ready();
		}
	}

	fn emit_early_headers(&mut self) {
		if !self.options.emit_headers || self.resuming {
			return;
		}
		let Some(on_headers) = self.hooks.on_headers.take() else {
			return;
		};
		let headers = self.render_state.take_headers(self.options.max_headers_length);
		if !headers.is_empty() {
			on_headers(headers);
		}
	}

	/// Queues a `Link` header entry while the headers can still be sent.
	pub(crate) fn queue_header_link(&mut self, entry: String) {
		if self.options.emit_headers && self.hooks.on_headers.is_some() && !self.shell_complete {
			self.render_state.add_header_link(entry);
		}
	}

	pub(crate) fn fail_fatally(&mut self, error: RenderError) {
		if self.fatal.is_some() || self.status == RequestStatus::Closed {
			return;
		}
		tracing::error!(error = %error, "Fatal render error");
		self.hooks.on_shell_ready = None;
		self.hooks.on_all_ready = None;
		if let Some(on_shell_error) = self.hooks.on_shell_error.take() {
			on_shell_error(&error);
		}
		if let Some(on_fatal_error) = self.hooks.on_fatal_error.take() {
			on_fatal_error(&error);
		}
		match self.destination.as_mut() {
			Some(destination) => {
				destination.close_with_error(&error);
				self.destination = None;
				self.flowing = false;
				self.status = RequestStatus::Closed;
			}
			None => self.status = RequestStatus::Closing,
		}
		self.fatal = Some(error);
	}
}

impl fmt::Debug for Request {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Request")
			.field("status", &self.status)
			.field("pending_tasks", &self.all_pending_tasks)
			.field("pending_root_tasks", &self.pending_root_tasks)
			.field("shell_complete", &self.shell_complete)
			.field("shell_flushed", &self.shell_flushed)
			.field("flowing", &self.flowing)
			.finish_non_exhaustive()
	}
}
