//! Index-addressed storage for segments, boundaries and rows.
//!
//! The render graph has parent/child links in both directions (a boundary
//! knows its row, a segment knows its boundary, a row holds boundaries). All
//! of them are stored as typed indices into per-request arenas, so the
//! request can mutate any node while walking another.

use crate::task::TaskId;
use crate::tree::KeyPath;
use reinhardt_ssr_markup::chunk::ChunkBuffer;
use reinhardt_ssr_markup::format::FormatContext;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`].
pub(crate) trait ArenaId: Copy {
	fn from_index(index: usize) -> Self;
	fn index(self) -> usize;
}

macro_rules! arena_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(usize);

		impl ArenaId for $name {
			fn from_index(index: usize) -> Self {
				Self(index)
			}

			fn index(self) -> usize {
				self.0
			}
		}
	};
}

arena_id!(
	/// Index of a [`Segment`].
	SegmentId
);
arena_id!(
	/// Index of a [`Boundary`].
	BoundaryId
);
arena_id!(
	/// Index of a [`Row`].
	RowId
);

/// Append-only vector addressed by `I`.
#[derive(Debug)]
pub(crate) struct Arena<I, T> {
	items: Vec<T>,
	_id: PhantomData<I>,
}

impl<I: ArenaId, T> Arena<I, T> {
	pub(crate) fn new() -> Self {
		Self {
			items: Vec::new(),
			_id: PhantomData,
		}
	}

	pub(crate) fn push(&mut self, item: T) -> I {
		self.items.push(item);
		I::from_index(self.items.len() - 1)
	}

	pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
		self.items.iter()
	}
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
	type Output = T;

	fn index(&self, id: I) -> &T {
		&self.items[id.index()]
	}
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
	fn index_mut(&mut self, id: I) -> &mut T {
		&mut self.items[id.index()]
	}
}

/// Lifecycle of a [`Segment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SegmentStatus {
	/// Waiting for its task to run.
	Pending = 0,
	/// Rendered; may still have pending children.
	Completed = 1,
	/// Written to the destination.
	Flushed = 2,
	/// Its task was aborted.
	Aborted = 3,
	/// Its task failed.
	Errored = 4,
	/// Left for a later resume.
	Postponed = 5,
	/// Its task is running.
	Rendering = 6,
}

/// A buffered slice of output at one position of the document.
#[derive(Debug)]
pub(crate) struct Segment {
	pub(crate) status: SegmentStatus,
	/// Runtime id, assigned the first time the segment must be addressed out
	/// of band.
	pub(crate) id: Option<u32>,
	/// Chunk index of the parent at which this segment is spliced in.
	pub(crate) index: usize,
	pub(crate) chunks: ChunkBuffer,
	pub(crate) children: Vec<SegmentId>,
	/// Set when this segment is the placeholder of a boundary; its chunks are
	/// then the boundary's fallback.
	pub(crate) boundary: Option<BoundaryId>,
	pub(crate) parent_flushed: bool,
	pub(crate) format: FormatContext,
	pub(crate) last_pushed_text: bool,
	pub(crate) text_embedded: bool,
	/// Output is only walked for replay positions and never written.
	pub(crate) discard: bool,
}

impl Segment {
	pub(crate) fn new(
		index: usize,
		format: FormatContext,
		last_pushed_text: bool,
		text_embedded: bool,
	) -> Self {
		Self {
			status: SegmentStatus::Pending,
			id: None,
			index,
			chunks: ChunkBuffer::new(),
			children: Vec::new(),
			boundary: None,
			parent_flushed: false,
			format,
			last_pushed_text,
			text_embedded,
			discard: false,
		}
	}
}

/// Lifecycle of a [`Boundary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStatus {
	/// Content is still rendering, or is held back by a reveal order.
	Pending,
	/// Content is ready to replace the fallback.
	Completed,
	/// Content failed; the client renders it.
	ClientRendered,
	/// Content is left for a later resume.
	Postponed,
}

/// Resources a boundary's content depends on.
#[derive(Debug, Default)]
pub(crate) struct HoistableState {
	/// Indices into the render state's stylesheet table.
	pub(crate) stylesheets: Vec<usize>,
}

/// A suspense boundary.
#[derive(Debug)]
pub(crate) struct Boundary {
	pub(crate) status: BoundaryStatus,
	/// Number shared by the `B:` placeholder and the `S:` content container.
	pub(crate) root_segment_id: Option<u32>,
	pub(crate) pending_tasks: usize,
	pub(crate) completed_segments: Vec<SegmentId>,
	pub(crate) fallback_abortable_tasks: BTreeSet<TaskId>,
	pub(crate) content_state: HoistableState,
	pub(crate) row: Option<RowId>,
	pub(crate) parent_flushed: bool,
	pub(crate) error_digest: Option<String>,
	/// Key path of the boundary, kept while postponed work is tracked.
	pub(crate) tracked_key_path: Option<KeyPath>,
	/// Set once the pending count has reached zero and the row was told.
	pub(crate) settled: bool,
}

impl Boundary {
	pub(crate) fn new(row: Option<RowId>, tracked_key_path: Option<KeyPath>) -> Self {
		Self {
			status: BoundaryStatus::Pending,
			root_segment_id: None,
			pending_tasks: 0,
			completed_segments: Vec::new(),
			fallback_abortable_tasks: BTreeSet::new(),
			content_state: HoistableState::default(),
			row,
			parent_flushed: false,
			error_digest: None,
			tracked_key_path,
			settled: false,
		}
	}
}

/// A cohort of sibling boundaries revealed together or in order.
///
/// `pending_tasks` counts everything that blocks the row: its own
/// synchronous render, tasks spawned inside it, boundaries that have not
/// settled, and the previous row in a `forwards`/`backwards` chain.
#[derive(Debug)]
pub(crate) struct Row {
	pub(crate) pending_tasks: usize,
	/// Settled boundaries held back until the row unblocks.
	pub(crate) boundaries: Vec<BoundaryId>,
	pub(crate) together: bool,
	/// Row released when this one unblocks.
	pub(crate) next: Option<RowId>,
}

impl Row {
	pub(crate) fn new(together: bool) -> Self {
		Self {
			pending_tasks: 1,
			boundaries: Vec::new(),
			together,
			next: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use reinhardt_ssr_markup::format::Namespace;
	use rstest::rstest;

	#[rstest]
	fn test_arena_ids_are_sequential() {
		let mut arena: Arena<SegmentId, Segment> = Arena::new();
		let format = FormatContext::root(Namespace::Html);
		let a = arena.push(Segment::new(0, format.clone(), false, false));
		let b = arena.push(Segment::new(3, format, false, true));

		assert_eq!(a.index(), 0);
		assert_eq!(b.index(), 1);
		assert_eq!(arena[b].index, 3);
		arena[a].status = SegmentStatus::Completed;
		assert_eq!(arena.iter().filter(|s| s.status == SegmentStatus::Pending).count(), 1);
	}

	#[rstest]
	fn test_segment_status_discriminants() {
		assert_eq!(SegmentStatus::Pending as u8, 0);
		assert_eq!(SegmentStatus::Postponed as u8, 5);
		assert_eq!(SegmentStatus::Rendering as u8, 6);
	}

	#[rstest]
	fn test_new_row_blocks_on_its_own_render() {
		let row = Row::new(true);
		assert_eq!(row.pending_tasks, 1);
		assert!(row.together);
		assert!(row.next.is_none());
	}
}
