//! Tree walk: renders nodes into segments and defers what cannot finish.

use crate::arena::{Boundary, BoundaryId, BoundaryStatus, Row, RowId, Segment, SegmentId, SegmentStatus};
use crate::error::{Interrupt, RenderError, RenderResult};
use crate::node::{Component, ComponentCx, Node, RevealOrder, Suspense, SuspenseList};
use crate::request::Request;
use crate::task::{Task, TaskId};
use crate::tree::{KeyPath, KeySegment, TreeContext};
use reinhardt_ssr_markup::escape::escape_text;
use reinhardt_ssr_markup::format::FormatContext;
use reinhardt_ssr_markup::markers::TEXT_SEPARATOR;
use reinhardt_ssr_markup::style::format_number;
use std::borrow::Cow;

/// Position of the walk: where output goes and what it belongs to.
#[derive(Debug, Clone)]
pub(crate) struct WalkCx {
	pub(crate) segment: SegmentId,
	pub(crate) boundary: Option<BoundaryId>,
	pub(crate) fallback_of: Option<BoundaryId>,
	pub(crate) row: Option<RowId>,
	pub(crate) format: FormatContext,
	pub(crate) key_path: KeyPath,
	pub(crate) tree: TreeContext,
	pub(crate) depth: usize,
	pub(crate) discard: bool,
}

impl WalkCx {
	pub(crate) fn root(segment: SegmentId, format: FormatContext, discard: bool) -> Self {
		Self {
			segment,
			boundary: None,
			fallback_of: None,
			row: None,
			format,
			key_path: KeyPath::new(),
			tree: TreeContext::root(),
			depth: 0,
			discard,
		}
	}

	pub(crate) fn from_task(task: &Task) -> Self {
		Self {
			segment: task.segment,
			boundary: task.boundary,
			fallback_of: task.fallback_of,
			row: task.row,
			format: task.format.clone(),
			key_path: task.key_path.clone(),
			tree: task.tree.clone(),
			depth: 0,
			discard: task.discard,
		}
	}

	/// A task that renders `node` into `segment` from this position.
	pub(crate) fn task(&self, id: TaskId, node: Node, segment: SegmentId) -> Task {
		Task {
			id,
			node,
			boundary: self.boundary,
			segment,
			fallback_of: self.fallback_of,
			format: self.format.clone(),
			key_path: self.key_path.clone(),
			tree: self.tree.clone(),
			row: self.row,
			discard: self.discard,
			ping_epoch: 0,
		}
	}

	/// Context for the content of a boundary rendered into `segment`.
	fn boundary_content(&self, boundary: BoundaryId, segment: SegmentId) -> Self {
		let mut key_path = self.key_path.clone();
		key_path.push(KeySegment::named("Suspense"));
		Self {
			segment,
			boundary: Some(boundary),
			fallback_of: None,
			row: None,
			format: self.format.clone(),
			key_path,
			tree: self.tree.clone(),
			depth: self.depth,
			discard: false,
		}
	}
}

/// Where to rewind to when a node suspends, postpones or fails halfway.
struct Snapshot {
	format: FormatContext,
	key_len: usize,
	tree: TreeContext,
	chunk_len: usize,
	children_len: usize,
	last_pushed_text: bool,
}

impl Snapshot {
	fn take(request: &Request, cx: &WalkCx) -> Self {
		let seg = &request.segments[cx.segment];
		Self {
			format: cx.format.clone(),
			key_len: cx.key_path.len(),
			tree: cx.tree.clone(),
			chunk_len: seg.chunks.len(),
			children_len: seg.children.len(),
			last_pushed_text: seg.last_pushed_text,
		}
	}

	fn restore(self, request: &mut Request, cx: &mut WalkCx) {
		cx.format = self.format;
		cx.key_path.truncate(self.key_len);
		cx.tree = self.tree;
		let seg = &mut request.segments[cx.segment];
		seg.chunks.truncate(self.chunk_len);
		seg.children.truncate(self.children_len);
		seg.last_pushed_text = self.last_pushed_text;
	}
}

impl Request {
	/// Renders `node`, deferring it to a new task if it suspends.
	///
	/// Only real errors are returned; suspension and postponement are
	/// absorbed here.
	pub(crate) fn render_node(&mut self, cx: &mut WalkCx, node: &Node) -> RenderResult<()> {
		if cx.discard {
			let Some(plan) = self.replay.as_mut() else {
				return Ok(());
			};
			if !plan.has_descendant(&cx.key_path) {
				return Ok(());
			}
			if let Some(id) = plan.take_slot(&cx.key_path) {
				return self.render_replay_slot(cx, node, id);
			}
		}
		if cx.depth >= self.options.max_render_depth {
			tracing::trace!(depth = cx.depth, "Render depth reached, deferring subtree");
			let (id, epoch) = self.spawn_child_task(cx, node.clone());
			self.pings.ping(id, epoch);
			return Ok(());
		}

		let snapshot = Snapshot::take(self, cx);
		cx.depth += 1;
		let result = self.render_node_inner(cx, node);
		cx.depth -= 1;
		match result {
			Ok(()) => Ok(()),
			Err(Interrupt::Suspend(wakeable)) => {
				snapshot.restore(self, cx);
				let (id, epoch) = self.spawn_child_task(cx, node.clone());
				self.subscribe_ping(&wakeable, id, epoch);
				Ok(())
			}
			Err(Interrupt::Postpone(reason)) => {
				snapshot.restore(self, cx);
				self.postpone_node(cx, reason)
			}
			Err(Interrupt::Error(error)) => {
				snapshot.restore(self, cx);
				Err(error)
			}
		}
	}

	pub(crate) fn render_node_inner(
		&mut self,
		cx: &mut WalkCx,
		node: &Node,
	) -> Result<(), Interrupt> {
		match node {
			Node::Empty => Ok(()),
			Node::Text(text) => {
				self.push_text(cx, text);
				Ok(())
			}
			Node::Number(n) => {
				self.push_text(cx, &format_number(*n));
				Ok(())
			}
			Node::Raw(html) => {
				let seg = &mut self.segments[cx.segment];
				match html {
					Cow::Borrowed(s) => seg.chunks.push_static(*s),
					Cow::Owned(s) => seg.chunks.push_str(s),
				}
				seg.last_pushed_text = false;
				Ok(())
			}
			Node::Element(element) => self.render_element(cx, element),
			Node::Component(component) => self.render_component(cx, component),
			Node::Fragment(children) => Ok(self.render_children(cx, children)?),
			Node::Keyed { key, node } => {
				cx.key_path.push(KeySegment::keyed(key.to_string()));
				let result = self.render_node(cx, node);
				cx.key_path.pop();
				Ok(result?)
			}
			Node::Suspense(suspense) => Ok(self.render_suspense(cx, suspense)?),
			Node::SuspenseList(list) => Ok(self.render_suspense_list(cx, list)?),
			Node::Await(thenable) => match thenable.get() {
				Some(Ok(resolved)) => Ok(self.render_node(cx, &resolved)?),
				Some(Err(error)) => Err(Interrupt::Error(error)),
				None => Err(Interrupt::Suspend(thenable.wakeable())),
			},
		}
	}

	/// Writes escaped text, separating it from a preceding text node.
	pub(crate) fn push_text(&mut self, cx: &WalkCx, text: &str) {
		if text.is_empty() {
			return;
		}
		let seg = &mut self.segments[cx.segment];
		if seg.last_pushed_text {
			seg.chunks.push_static(TEXT_SEPARATOR);
		}
		seg.chunks.push_str(&escape_text(text));
		seg.last_pushed_text = true;
	}

	fn render_component(&mut self, cx: &mut WalkCx, component: &Component) -> Result<(), Interrupt> {
		let rendered = {
			let mut component_cx =
				ComponentCx::new(&cx.key_path, &cx.tree, &self.resumable_state.id_prefix);
			component.call(&mut component_cx)?
		};
		cx.key_path.push(KeySegment::named(component.name()));
		let result = self.render_node(cx, &rendered);
		cx.key_path.pop();
		Ok(result?)
	}

	/// Renders siblings. Each of several children gets its own tree slot and
	/// an index key unless it carries an explicit one.
	pub(crate) fn render_children(&mut self, cx: &mut WalkCx, children: &[Node]) -> RenderResult<()> {
		if let [only] = children {
			return self.render_node(cx, only);
		}
		let tree = cx.tree.clone();
		let mut result = Ok(());
		for (i, child) in children.iter().enumerate() {
			cx.tree = tree.push(children.len(), i);
			let indexed = !matches!(child, Node::Keyed { .. });
			if indexed {
				cx.key_path.push(KeySegment::keyed(i.to_string()));
			}
			result = self.render_node(cx, child);
			if indexed {
				cx.key_path.pop();
			}
			if result.is_err() {
				break;
			}
		}
		cx.tree = tree;
		result
	}

	/// Defers `node` to a task rendering into a new child segment at the
	/// current position.
	pub(crate) fn spawn_child_task(&mut self, cx: &WalkCx, node: Node) -> (TaskId, u64) {
		let parent = cx.segment;
		let index = self.segments[parent].chunks.len();
		let last_pushed_text = self.segments[parent].last_pushed_text;
		let mut child = Segment::new(index, cx.format.clone(), last_pushed_text, true);
		child.discard = cx.discard;
		let child = self.segments.push(child);
		let parent = &mut self.segments[parent];
		parent.children.push(child);
		parent.last_pushed_text = false;
		let id = self.allocate_task_id();
		self.spawn_task(cx.task(id, node, child))
	}

	fn postpone_node(&mut self, cx: &WalkCx, reason: String) -> RenderResult<()> {
		if self.tracked.is_none() {
			return Err(RenderError::PostponedOutsidePrerender { reason });
		}
		self.report_postpone(&reason);
		match cx.boundary {
			Some(b) => self.postpone_boundary(b),
			None => self.insert_postponed_slot(cx.segment, &cx.key_path, cx.format.clone()),
		}
		Ok(())
	}

	fn render_suspense(&mut self, cx: &mut WalkCx, suspense: &Suspense) -> RenderResult<()> {
		if cx.discard {
			return self.replay_suspense(cx, suspense);
		}
		let parent = cx.segment;
		let tracked_path = self.tracked.is_some().then(|| cx.key_path.clone());
		let boundary = self.boundaries.push(Boundary::new(cx.row, tracked_path));
		if let Some(row) = cx.row {
			self.rows[row].pending_tasks += 1;
		}

		let index = self.segments[parent].chunks.len();
		let mut placeholder = Segment::new(index, cx.format.clone(), false, false);
		placeholder.boundary = Some(boundary);
		let placeholder = self.segments.push(placeholder);
		let parent_seg = &mut self.segments[parent];
		parent_seg.children.push(placeholder);
		parent_seg.last_pushed_text = false;

		let mut content = Segment::new(0, cx.format.clone(), false, false);
		content.parent_flushed = true;
		let content = self.segments.push(content);
		let mut content_cx = cx.boundary_content(boundary, content);
		self.render_boundary_content(boundary, &mut content_cx, &suspense.children);

		if self.boundaries[boundary].status == BoundaryStatus::Completed {
			// Content is ready, so the fallback is never shown. Flush either
			// inlines it or outlines it behind an empty pending wrapper.
			self.segments[placeholder].status = SegmentStatus::Completed;
			return Ok(());
		}

		let mut key_path = cx.key_path.clone();
		key_path.push(KeySegment::named("Suspense Fallback"));
		let id = self.allocate_task_id();
		let task = Task {
			id,
			node: (*suspense.fallback).clone(),
			boundary: cx.boundary,
			segment: placeholder,
			fallback_of: Some(boundary),
			format: cx.format.clone(),
			key_path,
			tree: cx.tree.clone(),
			row: cx.row,
			discard: false,
			ping_epoch: 0,
		};
		let (id, epoch) = self.spawn_task(task);
		self.pings.ping(id, epoch);
		Ok(())
	}

	/// Renders a boundary's content into its first segment. Errors hand the
	/// boundary to the client instead of propagating.
	fn render_boundary_content(&mut self, boundary: BoundaryId, cx: &mut WalkCx, children: &Node) {
		let content = cx.segment;
		match self.render_node(cx, children) {
			Ok(()) => {
				self.finish_segment(content);
				if self.boundaries[boundary].status == BoundaryStatus::Pending {
					self.queue_completed_segment(boundary, content);
				}
			}
			Err(error) => {
				self.segments[content].status = SegmentStatus::Errored;
				let digest = self.report_error(&error);
				self.client_render_boundary(boundary, digest);
			}
		}
		if self.boundaries[boundary].pending_tasks == 0 {
			self.settle_boundary(boundary);
		}
	}

	pub(crate) fn boundary_byte_size(&self, boundary: BoundaryId) -> usize {
		self.boundaries[boundary]
			.completed_segments
			.iter()
			.map(|&s| self.segment_byte_size(s))
			.sum()
	}

	fn segment_byte_size(&self, segment: SegmentId) -> usize {
		let seg = &self.segments[segment];
		seg.chunks.len_bytes()
			+ seg
				.children
				.iter()
				.map(|&c| self.segment_byte_size(c))
				.sum::<usize>()
	}

	/// A boundary met while skipping prelude output.
	fn replay_suspense(&mut self, cx: &mut WalkCx, suspense: &Suspense) -> RenderResult<()> {
		let replay_id = self
			.replay
			.as_mut()
			.and_then(|plan| plan.take_boundary(&cx.key_path));
		if let Some(id) = replay_id {
			self.render_replay_boundary(cx, suspense, id);
			return Ok(());
		}
		cx.key_path.push(KeySegment::named("Suspense"));
		let result = self.render_node(cx, &suspense.children);
		cx.key_path.pop();
		result
	}

	/// Renders the content of a postponed boundary. Its fallback and pending
	/// template are already in the prelude.
	fn render_replay_boundary(&mut self, cx: &WalkCx, suspense: &Suspense, id: u32) {
		let mut boundary = Boundary::new(None, None);
		boundary.root_segment_id = Some(id);
		boundary.parent_flushed = true;
		let boundary = self.boundaries.push(boundary);
		let mut content = Segment::new(0, cx.format.clone(), false, false);
		content.parent_flushed = true;
		let content = self.segments.push(content);
		tracing::debug!(boundary_id = id, "Replaying postponed boundary");
		let mut content_cx = cx.boundary_content(boundary, content);
		self.render_boundary_content(boundary, &mut content_cx, &suspense.children);
	}

	/// Renders a postponed slot into a segment carrying its prelude id.
	fn render_replay_slot(&mut self, cx: &WalkCx, node: &Node, id: u32) -> RenderResult<()> {
		let mut segment = Segment::new(0, cx.format.clone(), false, false);
		segment.id = Some(id);
		segment.parent_flushed = true;
		let segment = self.segments.push(segment);
		let mut slot_cx = WalkCx {
			segment,
			discard: false,
			..cx.clone()
		};
		tracing::debug!(segment_id = id, "Replaying postponed slot");
		self.render_node(&mut slot_cx, node)?;
		self.finish_segment(segment);
		self.completed_slots.push_back(segment);
		Ok(())
	}

	fn render_suspense_list(&mut self, cx: &mut WalkCx, list: &SuspenseList) -> RenderResult<()> {
		let count = list.children.len();
		let order = if cx.discard {
			RevealOrder::Independent
		} else {
			list.reveal_order
		};
		let rows: Vec<Option<RowId>> = match order {
			RevealOrder::Independent => vec![None; count],
			RevealOrder::Together => {
				let row = self.rows.push(Row::new(true));
				vec![Some(row); count]
			}
			RevealOrder::Forwards | RevealOrder::Backwards => {
				let rows: Vec<RowId> = (0..count).map(|_| self.rows.push(Row::new(false))).collect();
				for i in 1..count {
					let (first, then) = if order == RevealOrder::Forwards {
						(rows[i - 1], rows[i])
					} else {
						(rows[i], rows[i - 1])
					};
					self.rows[first].next = Some(then);
					self.rows[then].pending_tasks += 1;
				}
				rows.into_iter().map(Some).collect()
			}
		};
		tracing::trace!(order = ?order, count, "Rendering suspense list");

		let outer_row = cx.row;
		let tree = cx.tree.clone();
		let mut result = Ok(());
		for (i, child) in list.children.iter().enumerate() {
			if result.is_ok() {
				cx.row = rows[i].or(outer_row);
				cx.tree = tree.push(count, i);
				cx.key_path.push(KeySegment::keyed(i.to_string()));
				result = self.render_node(cx, child);
				cx.key_path.pop();
			}
			if order != RevealOrder::Together {
				if let Some(row) = rows[i] {
					self.release_row(row);
				}
			}
		}
		if order == RevealOrder::Together {
			if let Some(Some(row)) = rows.first() {
				self.release_row(*row);
			}
		}
		cx.row = outer_row;
		cx.tree = tree;
		result
	}
}
