//! Position tracking: tree ids for `use_id` and key paths for replay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Packed position of a node among its ancestors' siblings.
///
/// Each level contributes `bit_length(siblings)` bits holding `index + 1`.
/// When the packed id would exceed 30 bits, whole 5-bit groups move to the
/// `overflow` string in base 32, so ids stay deterministic at any depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeContext {
	id: u32,
	overflow: String,
}

impl Default for TreeContext {
	fn default() -> Self {
		Self::root()
	}
}

fn bit_length(n: u32) -> u32 {
	32 - n.leading_zeros()
}

fn to_base32(n: u32, min_digits: usize) -> String {
	const DIGITS: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
	let mut out = Vec::new();
	let mut rest = n;
	while rest > 0 || out.is_empty() {
		out.push(DIGITS[(rest % 32) as usize]);
		rest /= 32;
	}
	while out.len() < min_digits {
		out.push(b'0');
	}
	out.reverse();
	String::from_utf8_lossy(&out).into_owned()
}

impl TreeContext {
	/// Context of the root node.
	pub fn root() -> Self {
		Self {
			id: 1,
			overflow: String::new(),
		}
	}

	/// Context of child `index` out of `total` siblings.
	pub fn push(&self, total: usize, index: usize) -> Self {
		let total = u32::try_from(total).unwrap_or(u32::MAX);
		let slot = u32::try_from(index).unwrap_or(u32::MAX - 1) + 1;
		let base_length = bit_length(self.id) - 1;
		let base_id = self.id & !(1 << base_length);
		let length = bit_length(total) + base_length;

		if length > 30 {
			let overflow_bits = base_length - (base_length % 5);
			let overflow_mask = (1u32 << overflow_bits) - 1;
			let new_overflow = to_base32(base_id & overflow_mask, (overflow_bits / 5) as usize);
			let rest_of_base_id = base_id >> overflow_bits;
			let rest_of_base_length = base_length - overflow_bits;
			let rest_of_length = bit_length(total) + rest_of_base_length;
			let id = (slot << rest_of_base_length) | rest_of_base_id;
			Self {
				id: (1 << rest_of_length) | id,
				overflow: new_overflow + &self.overflow,
			}
		} else {
			let id = (slot << base_length) | base_id;
			Self {
				id: (1 << length) | id,
				overflow: self.overflow.clone(),
			}
		}
	}

	/// Deterministic id for this position.
	pub fn tree_id(&self) -> String {
		let leading = 1u32 << (bit_length(self.id) - 1);
		to_base32(self.id & !leading, 1) + &self.overflow
	}
}

/// One step of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySegment {
	/// Component or boundary name; empty for list positions.
	pub name: String,
	/// Explicit key or list index; empty for named steps.
	pub key: String,
}

impl KeySegment {
	/// A named step (component, boundary).
	pub fn named(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			key: String::new(),
		}
	}

	/// A list position or explicit key.
	pub fn keyed(key: impl Into<String>) -> Self {
		Self {
			name: String::new(),
			key: key.into(),
		}
	}
}

/// Path from the root to a node, stable across renders of the same tree.
///
/// Prerendering records the key path of every postponed position; resuming
/// walks the tree again and matches positions by key path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(Vec<KeySegment>);

impl KeyPath {
	/// The empty (root) path.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a step.
	pub fn push(&mut self, segment: KeySegment) {
		self.0.push(segment);
	}

	/// Removes the last step.
	pub fn pop(&mut self) {
		self.0.pop();
	}

	/// Number of steps.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` for the root path.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Drops steps past `len`.
	pub fn truncate(&mut self, len: usize) {
		self.0.truncate(len);
	}

	/// Returns `true` if `self` is `other` or one of its ancestors.
	pub fn is_prefix_of(&self, other: &KeyPath) -> bool {
		other.0.starts_with(&self.0)
	}

	/// Steps from the root.
	pub fn segments(&self) -> &[KeySegment] {
		&self.0
	}
}

impl fmt::Display for KeyPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for segment in &self.0 {
			f.write_str("/")?;
			if !segment.name.is_empty() {
				f.write_str(&segment.name)?;
			}
			if !segment.key.is_empty() {
				write!(f, "[{}]", segment.key)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::collections::HashSet;

	#[rstest]
	fn test_root_id_is_empty_number() {
		assert_eq!(TreeContext::root().tree_id(), "0");
	}

	#[rstest]
	fn test_siblings_get_distinct_ids() {
		let root = TreeContext::root();
		let ids: HashSet<String> = (0..5).map(|i| root.push(5, i).tree_id()).collect();
		assert_eq!(ids.len(), 5);
	}

	#[rstest]
	fn test_deep_nesting_keeps_siblings_apart() {
		let mut ctx = TreeContext::root();
		for depth in 0..40 {
			let a = ctx.push(3, 0);
			let b = ctx.push(3, 2);
			assert_ne!(a.tree_id(), b.tree_id(), "collision at depth {depth}");
			ctx = ctx.push(3, 1);
		}
		assert!(!ctx.overflow.is_empty());
	}

	#[rstest]
	fn test_same_position_same_id() {
		let a = TreeContext::root().push(2, 1).push(4, 3);
		let b = TreeContext::root().push(2, 1).push(4, 3);
		assert_eq!(a.tree_id(), b.tree_id());
	}

	#[rstest]
	fn test_key_path_prefix() {
		let mut parent = KeyPath::new();
		parent.push(KeySegment::named("App"));
		let mut child = parent.clone();
		child.push(KeySegment::keyed("3"));

		assert!(parent.is_prefix_of(&child));
		assert!(child.is_prefix_of(&child));
		assert!(!child.is_prefix_of(&parent));
		assert_eq!(child.to_string(), "/App/[3]");
	}

	#[rstest]
	fn test_key_path_serializes_as_list() {
		let mut path = KeyPath::new();
		path.push(KeySegment::named("Suspense"));
		let json = serde_json::to_string(&path).unwrap();
		assert_eq!(json, r#"[{"name":"Suspense","key":""}]"#);
	}
}
