//! Postponed work recorded by a prerender and replayed by a resume.
//!
//! A prerender leaves holes where a component postponed or where the render
//! was aborted. Holes inside a boundary postpone the whole boundary; the
//! prelude then carries the boundary's pending template and fallback. Holes
//! outside every boundary become slots: `<template id="P:n">` placeholders in
//! the prelude. [`PostponedState`] lists both by key path so that a resume
//! can walk the same tree, skip everything the prelude already contains, and
//! fill exactly those positions.

use crate::error::{RenderError, RenderResult};
use crate::state::ResumableState;
use crate::tree::KeyPath;
use reinhardt_ssr_markup::format::FormatContext;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A postponed boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayNode {
	/// Key path of the boundary.
	pub key_path: KeyPath,
	/// Id shared by the boundary's `B:` template and its `S:` content.
	pub boundary_id: u32,
}

/// A postponed position outside every boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySlot {
	/// Key path of the postponed node.
	pub key_path: KeyPath,
	/// Id of the `P:` placeholder in the prelude.
	pub segment_id: u32,
}

/// Everything a resume needs to continue a prerender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostponedState {
	/// First runtime id the resume may assign.
	pub next_segment_id: u32,
	/// Format context of the root node.
	pub root_format_context: FormatContext,
	/// Resources and helpers the prelude already sent.
	pub resumable_state: ResumableState,
	/// Postponed boundaries.
	pub replay_nodes: Vec<ReplayNode>,
	/// Postponed slots.
	pub replay_slots: Vec<ReplaySlot>,
}

impl PostponedState {
	/// Serializes the state to JSON.
	pub fn to_json(&self) -> RenderResult<String> {
		serde_json::to_string(self).map_err(|e| RenderError::InvalidPostponedState(e.to_string()))
	}

	/// Parses and validates a state produced by [`PostponedState::to_json`].
	pub fn from_json(json: &str) -> RenderResult<Self> {
		let state: Self = serde_json::from_str(json)
			.map_err(|e| RenderError::InvalidPostponedState(e.to_string()))?;
		state.validate()?;
		Ok(state)
	}

	/// Checks that every recorded id was assigned before `next_segment_id`.
	pub fn validate(&self) -> RenderResult<()> {
		let ids = self
			.replay_nodes
			.iter()
			.map(|n| n.boundary_id)
			.chain(self.replay_slots.iter().map(|s| s.segment_id));
		for id in ids {
			if id >= self.next_segment_id {
				return Err(RenderError::InvalidPostponedState(format!(
					"id {id} is not below next_segment_id {}",
					self.next_segment_id
				)));
			}
		}
		Ok(())
	}
}

/// Postponed positions recorded while prerendering.
#[derive(Debug, Default)]
pub(crate) struct TrackedPostpones {
	pub(crate) replay_nodes: Vec<ReplayNode>,
	pub(crate) replay_slots: Vec<ReplaySlot>,
}

impl TrackedPostpones {
	pub(crate) fn is_empty(&self) -> bool {
		self.replay_nodes.is_empty() && self.replay_slots.is_empty()
	}
}

/// Positions a resume still has to fill. Entries are consumed when matched.
#[derive(Debug, Default)]
pub(crate) struct ReplayPlan {
	nodes: HashMap<KeyPath, u32>,
	slots: HashMap<KeyPath, u32>,
}

impl ReplayPlan {
	pub(crate) fn new(nodes: &[ReplayNode], slots: &[ReplaySlot]) -> Self {
		Self {
			nodes: nodes
				.iter()
				.map(|n| (n.key_path.clone(), n.boundary_id))
				.collect(),
			slots: slots
				.iter()
				.map(|s| (s.key_path.clone(), s.segment_id))
				.collect(),
		}
	}

	pub(crate) fn take_boundary(&mut self, path: &KeyPath) -> Option<u32> {
		self.nodes.remove(path)
	}

	pub(crate) fn take_slot(&mut self, path: &KeyPath) -> Option<u32> {
		self.slots.remove(path)
	}

	/// Returns `true` if `path` or one of its descendants is still to fill.
	pub(crate) fn has_descendant(&self, path: &KeyPath) -> bool {
		self.nodes
			.keys()
			.chain(self.slots.keys())
			.any(|p| path.is_prefix_of(p))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tree::KeySegment;
	use reinhardt_ssr_markup::format::Namespace;
	use rstest::rstest;

	fn path(names: &[&str]) -> KeyPath {
		let mut p = KeyPath::new();
		for n in names {
			p.push(KeySegment::named(*n));
		}
		p
	}

	fn state() -> PostponedState {
		PostponedState {
			next_segment_id: 3,
			root_format_context: FormatContext::root(Namespace::Html),
			resumable_state: ResumableState::new("p-"),
			replay_nodes: vec![ReplayNode {
				key_path: path(&["App", "div"]),
				boundary_id: 1,
			}],
			replay_slots: vec![ReplaySlot {
				key_path: path(&["App", "Nav"]),
				segment_id: 2,
			}],
		}
	}

	#[rstest]
	fn test_json_round_trip() {
		let original = state();
		let json = original.to_json().unwrap();
		assert_eq!(PostponedState::from_json(&json).unwrap(), original);
	}

	#[rstest]
	#[case("{")]
	#[case("{\"next_segment_id\":1}")]
	fn test_from_json_rejects_malformed(#[case] json: &str) {
		assert!(matches!(
			PostponedState::from_json(json),
			Err(RenderError::InvalidPostponedState(_))
		));
	}

	#[rstest]
	fn test_validate_rejects_unassigned_ids() {
		let mut bad = state();
		bad.next_segment_id = 2;
		assert!(bad.validate().is_err());
	}

	#[rstest]
	fn test_replay_plan_prefix_and_consumption() {
		let s = state();
		let mut plan = ReplayPlan::new(&s.replay_nodes, &s.replay_slots);

		assert!(plan.has_descendant(&path(&[])));
		assert!(plan.has_descendant(&path(&["App"])));
		assert!(!plan.has_descendant(&path(&["Other"])));

		assert_eq!(plan.take_boundary(&path(&["App", "div"])), Some(1));
		assert_eq!(plan.take_boundary(&path(&["App", "div"])), None);
		assert_eq!(plan.take_slot(&path(&["App", "Nav"])), Some(2));
		assert!(!plan.has_descendant(&path(&["App"])));
	}
}
