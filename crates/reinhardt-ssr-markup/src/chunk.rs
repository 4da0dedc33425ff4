//! Output chunks and the append-only buffer that segments render into.

use bytes::{Bytes, BytesMut};
use std::fmt;

/// A piece of rendered output.
///
/// Static markup (tags, markers, runtime helpers) is never copied; dynamic
/// text is stored as reference-counted [`Bytes`].
#[derive(Clone, PartialEq, Eq)]
pub enum Chunk {
	/// Markup known at compile time.
	Static(&'static str),
	/// Markup produced at render time.
	Owned(Bytes),
}

impl Chunk {
	/// Returns the chunk contents as bytes.
	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Chunk::Static(s) => s.as_bytes(),
			Chunk::Owned(b) => b,
		}
	}

	/// Returns the length in bytes.
	pub fn len(&self) -> usize {
		self.as_bytes().len()
	}

	/// Returns `true` for a zero-length chunk.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl fmt::Debug for Chunk {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
	}
}

impl From<&'static str> for Chunk {
	fn from(s: &'static str) -> Self {
		Chunk::Static(s)
	}
}

impl From<String> for Chunk {
	fn from(s: String) -> Self {
		Chunk::Owned(Bytes::from(s))
	}
}

impl From<Bytes> for Chunk {
	fn from(b: Bytes) -> Self {
		Chunk::Owned(b)
	}
}

/// Ordered list of chunks with a running byte count.
///
/// The chunk count doubles as an insertion index: child segments remember
/// `len()` at the time they were created, and a suspended render rolls back
/// with [`ChunkBuffer::truncate`].
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ChunkBuffer {
	chunks: Vec<Chunk>,
	byte_len: usize,
}

impl ChunkBuffer {
	/// Creates an empty buffer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a chunk. Empty chunks are ignored.
	pub fn push(&mut self, chunk: impl Into<Chunk>) {
		let chunk = chunk.into();
		if chunk.is_empty() {
			return;
		}
		self.byte_len += chunk.len();
		self.chunks.push(chunk);
	}

	/// Appends static markup.
	pub fn push_static(&mut self, s: &'static str) {
		self.push(Chunk::Static(s));
	}

	/// Copies `s` into a new owned chunk.
	pub fn push_str(&mut self, s: &str) {
		if s.is_empty() {
			return;
		}
		self.push(Chunk::Owned(Bytes::copy_from_slice(s.as_bytes())));
	}

	/// Moves every chunk of `other` to the end of this buffer.
	pub fn append(&mut self, other: &mut ChunkBuffer) {
		self.byte_len += other.byte_len;
		self.chunks.append(&mut other.chunks);
		other.byte_len = 0;
	}

	/// Number of chunks.
	pub fn len(&self) -> usize {
		self.chunks.len()
	}

	/// Returns `true` when no chunk has been pushed.
	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	/// Total size in bytes.
	pub fn len_bytes(&self) -> usize {
		self.byte_len
	}

	/// Drops every chunk at or after `len`.
	pub fn truncate(&mut self, len: usize) {
		if len >= self.chunks.len() {
			return;
		}
		let removed: usize = self.chunks[len..].iter().map(Chunk::len).sum();
		self.chunks.truncate(len);
		self.byte_len -= removed;
	}

	/// Returns the chunk at `index`.
	pub fn get(&self, index: usize) -> Option<&Chunk> {
		self.chunks.get(index)
	}

	/// Iterates the chunks in order.
	pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
		self.chunks.iter()
	}

	/// Removes every chunk.
	pub fn clear(&mut self) {
		self.chunks.clear();
		self.byte_len = 0;
	}

	/// Concatenates the chunks into one contiguous buffer.
	pub fn to_bytes(&self) -> Bytes {
		let mut out = BytesMut::with_capacity(self.byte_len);
		for chunk in &self.chunks {
			out.extend_from_slice(chunk.as_bytes());
		}
		out.freeze()
	}
}

impl fmt::Debug for ChunkBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChunkBuffer")
			.field("chunks", &self.chunks.len())
			.field("bytes", &self.byte_len)
			.finish()
	}
}

impl fmt::Display for ChunkBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
	}
}

impl<'a> IntoIterator for &'a ChunkBuffer {
	type Item = &'a Chunk;
	type IntoIter = std::slice::Iter<'a, Chunk>;

	fn into_iter(self) -> Self::IntoIter {
		self.chunks.iter()
	}
}
