//! Writing finished work to the destination.
//!
//! Output leaves the request in units: the shell, a batch of hoisted
//! resources, one boundary instruction, one partial boundary, one slot. Each
//! unit is staged in a [`ChunkBuffer`] and written whole. A unit is removed
//! from its queue before it is written, so backpressure only stops the pass
//! between units and nothing is ever written twice.

use crate::arena::{BoundaryId, BoundaryStatus, SegmentId, SegmentStatus};
use crate::destination::Destination;
use crate::request::{Request, RequestStatus};
use reinhardt_ssr_markup::chunk::ChunkBuffer;
use reinhardt_ssr_markup::format::{write_end_segment, write_start_segment};
use reinhardt_ssr_markup::instructions::{
	write_client_render_boundary, write_complete_boundary, write_complete_segment,
};
use reinhardt_ssr_markup::markers::{
	IdKind, format_id, write_boundary_end, write_client_rendered_boundary_start,
	write_completed_boundary_start, write_pending_boundary_start, write_placeholder,
};

impl Request {
	/// Writes everything that is ready, if the destination is flowing.
	pub fn flush(&mut self) {
		self.flush_completed_queues();
	}

	pub(crate) fn flush_completed_queues(&mut self) {
		let Some(mut destination) = self.destination.take() else {
			return;
		};
		if !self.flowing || self.status == RequestStatus::Closed {
			self.destination = Some(destination);
			return;
		}
		let drained = self.flush_units(destination.as_mut());
		destination.flush();
		if drained && self.is_complete() {
			self.write_postamble(destination.as_mut());
			destination.close();
			self.status = RequestStatus::Closed;
			self.flowing = false;
			tracing::debug!("Response complete");
		} else {
			self.destination = Some(destination);
		}
	}

	fn is_complete(&self) -> bool {
		self.all_pending_tasks == 0
			&& self.shell_flushed
			&& self.completed_root_segment.is_none()
			&& self.client_rendered_boundaries.is_empty()
			&& self.completed_boundaries.is_empty()
			&& self.partial_boundaries.is_empty()
			&& self.completed_slots.is_empty()
	}

	/// Writes queued units in order. Returns `false` if the destination
	/// pushed back before every queue was drained.
	fn flush_units(&mut self, dest: &mut dyn Destination) -> bool {
		if !self.shell_flushed {
			if self.pending_root_tasks > 0 {
				return true;
			}
			let Some(root) = self.completed_root_segment.take() else {
				return true;
			};
			let mut body = ChunkBuffer::new();
			self.flush_segment(&mut body, root);
			let mut buf = self.write_preamble();
			buf.append(&mut body);
			buf.append(&mut self.render_state.bootstrap);
			self.shell_flushed = true;
			tracing::debug!(bytes = buf.len_bytes(), "Shell flushed");
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}

		if self.render_state.has_pending_hoistables() {
			let mut buf = ChunkBuffer::new();
			self.render_state.write_hoistables(&mut buf);
			self.render_state
				.write_stylesheets(&mut self.resumable_state, &mut buf, true);
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}

		while let Some(b) = self.client_rendered_boundaries.pop_front() {
			let mut buf = ChunkBuffer::new();
			self.write_client_rendered_instruction(&mut buf, b);
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}

		while let Some(b) = self.completed_boundaries.pop_front() {
			let mut buf = ChunkBuffer::new();
			self.write_completed_boundary(&mut buf, b);
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}

		while let Some(b) = self.partial_boundaries.pop_front() {
			let mut buf = ChunkBuffer::new();
			let segments = std::mem::take(&mut self.boundaries[b].completed_segments);
			for s in segments {
				self.flush_partially_completed_segment(&mut buf, b, s);
			}
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}

		while let Some(s) = self.completed_slots.pop_front() {
			let mut buf = ChunkBuffer::new();
			self.write_completed_slot(&mut buf, s);
			if !self.write_unit(dest, &buf) {
				return false;
			}
		}
		true
	}

	fn write_unit(&mut self, dest: &mut dyn Destination, buf: &ChunkBuffer) -> bool {
		let mut accepted = true;
		for chunk in buf.iter() {
			if !chunk.is_empty() {
				accepted &= dest.write(chunk.as_bytes());
			}
		}
		if !accepted {
			self.flowing = false;
			tracing::trace!(bytes = buf.len_bytes(), "Destination pushed back");
		}
		accepted
	}

	/// Document start, head resources, and the head segment.
	fn write_preamble(&mut self) -> ChunkBuffer {
		let mut buf = ChunkBuffer::new();
		let state = &mut self.render_state;
		let has_html = !state.html_start.is_empty();
		let head_open = !state.head_start.is_empty() || has_html;
		buf.append(&mut state.html_start);
		if state.head_start.is_empty() {
			if has_html {
				buf.push_static("<head>");
			}
		} else {
			buf.append(&mut state.head_start);
		}
		buf.append(&mut state.charset);
		buf.append(&mut state.preconnects);
		state.write_stylesheets(&mut self.resumable_state, &mut buf, false);
		buf.append(&mut state.preloads);
		buf.append(&mut state.scripts);
		buf.append(&mut state.hoistable_chunks);
		if let Some(head) = state.head_segment {
			self.flush_subtree(&mut buf, head);
		}
		if head_open {
			buf.push_static("</head>");
		}
		buf
	}

	/// End tags owed by the document. A prelude with postponed holes leaves
	/// them to the resume.
	fn write_postamble(&mut self, dest: &mut dyn Destination) {
		if self.tracked.as_ref().is_some_and(|t| !t.is_empty()) {
			return;
		}
		let mut buf = ChunkBuffer::new();
		if self.resumable_state.has_body {
			buf.push_static("</body>");
		}
		if self.resumable_state.has_html {
			buf.push_static("</html>");
		}
		self.write_unit(dest, &buf);
	}

	fn assign_segment_id(&mut self, s: SegmentId) -> u32 {
		if let Some(id) = self.segments[s].id {
			return id;
		}
		let id = self.next_segment_id;
		self.next_segment_id += 1;
		self.segments[s].id = Some(id);
		id
	}

	fn assign_boundary_id(&mut self, b: BoundaryId) -> u32 {
		if let Some(id) = self.boundaries[b].root_segment_id {
			return id;
		}
		let id = self.next_segment_id;
		self.next_segment_id += 1;
		self.boundaries[b].root_segment_id = Some(id);
		id
	}

	fn id(&self, kind: IdKind, n: u32) -> String {
		format_id(&self.resumable_state.id_prefix, kind, n)
	}

	/// Writes a segment in place: a boundary wrapper if it holds one,
	/// otherwise its subtree.
	pub(crate) fn flush_segment(&mut self, buf: &mut ChunkBuffer, s: SegmentId) {
		let Some(b) = self.segments[s].boundary else {
			self.flush_subtree(buf, s);
			return;
		};
		self.segments[s].parent_flushed = true;
		self.boundaries[b].parent_flushed = true;
		match self.boundaries[b].status {
			BoundaryStatus::ClientRendered => {
				let digest = self.boundaries[b].error_digest.clone();
				write_client_rendered_boundary_start(buf, digest.as_deref());
				self.flush_subtree(buf, s);
				write_boundary_end(buf);
			}
			BoundaryStatus::Completed
				if self.boundaries[b].completed_segments.len() == 1
					&& self.boundary_byte_size(b) <= self.options.progressive_chunk_size =>
			{
				let segments = std::mem::take(&mut self.boundaries[b].completed_segments);
				if self.shell_flushed {
					let stylesheets = self.boundaries[b].content_state.stylesheets.clone();
					self.render_state.write_stylesheets_inline(
						&mut self.resumable_state,
						buf,
						&stylesheets,
					);
				}
				write_completed_boundary_start(buf);
				for content in segments {
					self.flush_segment(buf, content);
				}
				write_boundary_end(buf);
			}
			BoundaryStatus::Completed => {
				let id = self.assign_boundary_id(b);
				self.completed_boundaries.push_back(b);
				write_pending_boundary_start(buf, &self.id(IdKind::Boundary, id));
				self.flush_subtree(buf, s);
				write_boundary_end(buf);
			}
			BoundaryStatus::Pending => {
				let id = self.assign_boundary_id(b);
				if !self.boundaries[b].completed_segments.is_empty() {
					self.partial_boundaries.push_back(b);
				}
				write_pending_boundary_start(buf, &self.id(IdKind::Boundary, id));
				self.flush_subtree(buf, s);
				write_boundary_end(buf);
			}
			BoundaryStatus::Postponed => {
				let id = self.assign_boundary_id(b);
				write_pending_boundary_start(buf, &self.id(IdKind::Boundary, id));
				self.flush_subtree(buf, s);
				write_boundary_end(buf);
			}
		}
	}

	/// Writes a segment's chunks with its children spliced in at their
	/// indices. Unfinished children become `P:` placeholders.
	fn flush_subtree(&mut self, buf: &mut ChunkBuffer, s: SegmentId) {
		self.segments[s].parent_flushed = true;
		match self.segments[s].status {
			SegmentStatus::Pending => {
				let id = self.assign_segment_id(s);
				write_placeholder(buf, &self.id(IdKind::Placeholder, id));
			}
			SegmentStatus::Postponed => {
				if let Some(id) = self.segments[s].id {
					write_placeholder(buf, &self.id(IdKind::Placeholder, id));
				}
			}
			SegmentStatus::Completed => {
				let seg = &mut self.segments[s];
				seg.status = SegmentStatus::Flushed;
				let chunks = std::mem::take(&mut seg.chunks);
				let children = std::mem::take(&mut seg.children);
				let mut next = 0;
				for child in children {
					let index = self.segments[child].index;
					while next < index {
						if let Some(chunk) = chunks.get(next) {
							buf.push(chunk.clone());
						}
						next += 1;
					}
					self.flush_segment(buf, child);
				}
				for chunk in chunks.iter().skip(next) {
					buf.push(chunk.clone());
				}
			}
			SegmentStatus::Flushed
			| SegmentStatus::Aborted
			| SegmentStatus::Errored
			| SegmentStatus::Rendering => {}
		}
	}

	/// Writes a finished segment of a boundary into a hidden container. Any
	/// segment other than the boundary's root is also moved over its
	/// placeholder.
	fn flush_partially_completed_segment(
		&mut self,
		buf: &mut ChunkBuffer,
		b: BoundaryId,
		s: SegmentId,
	) {
		if self.segments[s].status == SegmentStatus::Flushed {
			return;
		}
		let root_id = self.boundaries[b].root_segment_id;
		let id = match (self.segments[s].id, root_id) {
			(Some(id), _) => id,
			(None, Some(root_id)) => {
				self.segments[s].id = Some(root_id);
				root_id
			}
			(None, None) => return,
		};
		let mode = self.segments[s].format.mode;
		write_start_segment(buf, mode, &self.id(IdKind::Segment, id));
		self.flush_segment(buf, s);
		write_end_segment(buf, mode);
		if Some(id) != root_id {
			let nonce = self.options.nonce.clone();
			let segment_id = self.id(IdKind::Segment, id);
			let placeholder_id = self.id(IdKind::Placeholder, id);
			write_complete_segment(
				buf,
				&mut self.resumable_state.instructions,
				nonce.as_deref(),
				&segment_id,
				&placeholder_id,
			);
		}
	}

	/// Writes the boundary's remaining segments and the instruction that
	/// reveals it.
	fn write_completed_boundary(&mut self, buf: &mut ChunkBuffer, b: BoundaryId) {
		let segments = std::mem::take(&mut self.boundaries[b].completed_segments);
		for s in segments {
			self.flush_partially_completed_segment(buf, b, s);
		}
		let Some(id) = self.boundaries[b].root_segment_id else {
			return;
		};
		let stylesheets = self.boundaries[b].content_state.stylesheets.clone();
		let refs = self
			.render_state
			.take_boundary_stylesheets(&mut self.resumable_state, &stylesheets);
		let nonce = self.options.nonce.clone();
		let boundary_id = self.id(IdKind::Boundary, id);
		let segment_id = self.id(IdKind::Segment, id);
		write_complete_boundary(
			buf,
			&mut self.resumable_state.instructions,
			nonce.as_deref(),
			&boundary_id,
			&segment_id,
			&refs,
		);
	}

	fn write_client_rendered_instruction(&mut self, buf: &mut ChunkBuffer, b: BoundaryId) {
		let Some(id) = self.boundaries[b].root_segment_id else {
			return;
		};
		let digest = self.boundaries[b].error_digest.clone();
		let nonce = self.options.nonce.clone();
		let boundary_id = self.id(IdKind::Boundary, id);
		write_client_render_boundary(
			buf,
			&mut self.resumable_state.instructions,
			nonce.as_deref(),
			&boundary_id,
			digest.as_deref(),
		);
	}

	/// A finished segment outside every boundary whose placeholder was
	/// already written.
	fn write_completed_slot(&mut self, buf: &mut ChunkBuffer, s: SegmentId) {
		if self.segments[s].status == SegmentStatus::Flushed {
			return;
		}
		let Some(id) = self.segments[s].id else {
			return;
		};
		let mode = self.segments[s].format.mode;
		let segment_id = self.id(IdKind::Segment, id);
		write_start_segment(buf, mode, &segment_id);
		self.flush_segment(buf, s);
		write_end_segment(buf, mode);
		let nonce = self.options.nonce.clone();
		let placeholder_id = self.id(IdKind::Placeholder, id);
		write_complete_segment(
			buf,
			&mut self.resumable_state.instructions,
			nonce.as_deref(),
			&segment_id,
			&placeholder_id,
		);
	}
}

#[cfg(test)]
mod tests {
	use crate::config::{RenderHooks, RenderOptions};
	use crate::destination::BufferDestination;
	use crate::node::{Element, IntoNode, Node};
	use crate::request::{Request, RequestStatus};
	use crate::thenable::Thenable;
	use rstest::rstest;

	fn start(node: impl IntoNode, options: RenderOptions) -> (Request, BufferDestination) {
		let mut request = Request::new(node, options, RenderHooks::new());
		request.start_work();
		let sink = BufferDestination::new();
		request.start_flowing(Box::new(sink.clone()));
		(request, sink)
	}

	fn text(sink: &BufferDestination) -> String {
		String::from_utf8(sink.drain().to_vec()).unwrap()
	}

	#[rstest]
	fn test_pending_boundary_streams_fallback_then_content() {
		let data = Thenable::<Node>::pending();
		let (mut request, sink) = start(
			Element::new("main").child(Node::suspense("…", Node::deferred(data.clone()))),
			RenderOptions::new(),
		);

		assert_eq!(
			text(&sink),
			"<main><!--$?--><template id=\"B:0\"></template>…<!--/$--></main>"
		);

		data.resolve(Element::new("p").child("done").into_node());
		request.perform_work();

		let out = text(&sink);
		assert!(out.starts_with("<div hidden id=\"S:0\"><p>done</p></div><script>$RC="));
		assert!(out.ends_with("$RC(\"B:0\",\"S:0\")</script>"));
		assert_eq!(request.status(), RequestStatus::Closed);
	}

	#[rstest]
	fn test_large_completed_boundary_is_outlined() {
		let big = "x".repeat(64);
		let (request, sink) = start(
			Node::suspense("wait", Element::new("p").child(big.clone())),
			RenderOptions::new().progressive_chunk_size(16),
		);

		let out = text(&sink);
		assert!(out.starts_with(&format!(
			"<!--$?--><template id=\"B:0\"></template><!--/$--><div hidden id=\"S:0\"><p>{big}</p></div>"
		)));
		assert!(out.contains("$RC(\"B:0\",\"S:0\")"));
		assert!(!out.contains("wait"));
		assert_eq!(request.status(), RequestStatus::Closed);
	}

	#[rstest]
	fn test_root_level_suspension_blocks_shell() {
		let data = Thenable::<Node>::pending();
		let (mut request, sink) = start(
			Element::new("div").child(Node::fragment([
				Node::text("a"),
				Node::deferred(data.clone()),
			])),
			RenderOptions::new(),
		);
		assert!(sink.drain().is_empty());
		assert!(!request.is_shell_ready());

		data.resolve(Node::text("b"));
		request.perform_work();

		assert_eq!(text(&sink), "<div>a<!-- -->b<!-- --></div>");
		assert_eq!(request.status(), RequestStatus::Closed);
	}

	#[rstest]
	fn test_backpressure_stops_between_units() {
		let data = Thenable::<Node>::pending();
		let mut request = Request::new(
			Node::fragment([
				Node::suspense("1", Node::deferred(data.clone())),
				Node::suspense("2", Node::deferred(data.clone())),
			]),
			RenderOptions::new(),
			RenderHooks::new(),
		);
		request.start_work();
		let sink = BufferDestination::with_high_water_mark(1);
		request.start_flowing(Box::new(sink.clone()));
		assert!(!request.is_flowing());
		let shell = text(&sink);
		assert!(shell.contains("B:1"));

		data.resolve(Node::text("ok"));
		request.perform_work();
		assert!(!request.is_flowing());
		assert!(sink.drain().is_empty());

		request.resume_flowing();
		let first = text(&sink);
		assert!(first.contains("$RC(\"B:0\",\"S:0\")"));
		assert!(!first.contains("B:1\""));

		request.resume_flowing();
		let second = text(&sink);
		assert!(second.contains("$RC(\"B:1\",\"S:1\")"));
		assert!(!second.contains("$RC=function"));
	}
}
