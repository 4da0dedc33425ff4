//! Output sinks.

use crate::error::RenderError;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives flushed output.
///
/// `write` returns `false` once the sink wants no more data for now. The
/// chunk passed to that call has still been accepted; the request finishes
/// the unit it is writing and stops flushing until it is resumed.
pub trait Destination: Send {
	/// Accepts a chunk; returns `false` to signal backpressure.
	fn write(&mut self, chunk: &[u8]) -> bool;

	/// Called after each flush pass.
	fn flush(&mut self) {}

	/// Called once when the response is complete.
	fn close(&mut self);

	/// Called once when the response failed.
	fn close_with_error(&mut self, error: &RenderError);
}

#[derive(Debug, Default)]
struct BufferInner {
	buffer: BytesMut,
	high_water_mark: Option<usize>,
	closed: bool,
	error: Option<RenderError>,
}

/// In-memory destination shared between the request and a reader.
///
/// Clones share the same buffer. With a high-water mark, `write` reports
/// backpressure once that many bytes are waiting to be drained.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::destination::{BufferDestination, Destination};
///
/// let reader = BufferDestination::with_high_water_mark(4);
/// let mut writer = reader.clone();
/// assert!(writer.write(b"ab"));
/// assert!(!writer.write(b"cd"));
/// assert_eq!(&reader.drain()[..], b"abcd");
/// assert!(writer.write(b"e"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BufferDestination {
	inner: Arc<Mutex<BufferInner>>,
}

impl BufferDestination {
	/// Creates a destination that never reports backpressure.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a destination that reports backpressure at `bytes` buffered.
	pub fn with_high_water_mark(bytes: usize) -> Self {
		let dest = Self::default();
		dest.inner.lock().high_water_mark = Some(bytes);
		dest
	}

	/// Removes and returns everything buffered so far.
	pub fn drain(&self) -> Bytes {
		self.inner.lock().buffer.split().freeze()
	}

	/// Returns a copy of everything buffered and not yet drained.
	pub fn contents(&self) -> Bytes {
		Bytes::copy_from_slice(&self.inner.lock().buffer)
	}

	/// Number of bytes waiting to be drained.
	pub fn buffered(&self) -> usize {
		self.inner.lock().buffer.len()
	}

	/// Returns `true` once the request closed the destination.
	pub fn is_closed(&self) -> bool {
		self.inner.lock().closed
	}

	/// Error the destination was closed with, if any.
	pub fn error(&self) -> Option<RenderError> {
		self.inner.lock().error.clone()
	}

	/// Takes the error the destination was closed with.
	pub fn take_error(&self) -> Option<RenderError> {
		self.inner.lock().error.take()
	}
}

impl Destination for BufferDestination {
	fn write(&mut self, chunk: &[u8]) -> bool {
		let mut inner = self.inner.lock();
		inner.buffer.extend_from_slice(chunk);
		match inner.high_water_mark {
			Some(mark) => inner.buffer.len() < mark,
			None => true,
		}
	}

	fn close(&mut self) {
		self.inner.lock().closed = true;
	}

	fn close_with_error(&mut self, error: &RenderError) {
		let mut inner = self.inner.lock();
		inner.closed = true;
		inner.error = Some(error.clone());
	}
}
