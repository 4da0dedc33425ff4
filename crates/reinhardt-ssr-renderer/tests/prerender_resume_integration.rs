//! Prerender and resume integration tests
//!
//! A prerender writes a static prelude and records what was postponed; a
//! resume over the same tree fills exactly those holes.
//!
//! Test Categories:
//! - Postponed Boundaries: 2 tests
//! - Postponed Slots: 1 test
//! - Aborted Prerender: 1 test
//! - Postponed State: 2 tests

use futures::StreamExt;
use futures::executor::block_on;
use reinhardt_ssr_renderer::prelude::*;
use rstest::*;

/// A page whose `Greeting` needs request data. `None` postpones it.
fn page(user: Option<&'static str>) -> Node {
	let greeting = Node::component("Greeting", move |cx| match user {
		Some(name) => Ok(Element::new("p").child(format!("Hello, {name}")).into_node()),
		None => Err(cx.postpone("needs the session")),
	});
	Element::new("main")
		.children([
			Element::new("h1").child("Shop").into_node(),
			Node::suspense("Loading user…", greeting),
		])
		.into_node()
}

/// A page with a postponed node outside every boundary.
fn clock(time: Option<&'static str>) -> Node {
	let now = Node::component("Clock", move |cx| match time {
		Some(t) => Ok(Node::text(t)),
		None => Err(cx.postpone("needs the request time")),
	});
	Element::new("div")
		.children([Node::text("static "), now])
		.into_node()
}

fn collect(stream: RenderStream) -> String {
	let chunks: Vec<RenderResult<bytes::Bytes>> = block_on(stream.collect());
	chunks
		.into_iter()
		.map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
		.collect()
}

// ============================================================================
// Postponed Boundary Tests
// ============================================================================

/// Tests that a postponed boundary leaves its fallback in the prelude.
#[rstest]
fn test_prerender_postpones_boundary() {
	let prerendered = block_on(prerender(page(None), RenderOptions::new(), RenderHooks::new())).unwrap();

	assert_eq!(
		String::from_utf8(prerendered.prelude.to_vec()).unwrap(),
		"<main><h1>Shop</h1><!--$?--><template id=\"B:0\"></template>Loading user…<!--/$--></main>"
	);
	let postponed = prerendered.postponed.unwrap();
	assert_eq!(postponed.replay_nodes.len(), 1);
	assert_eq!(postponed.replay_nodes[0].boundary_id, 0);
	assert!(postponed.replay_slots.is_empty());
}

/// Tests that a resume streams only the postponed boundary.
#[rstest]
fn test_resume_completes_postponed_boundary() {
	let prerendered = block_on(prerender(page(None), RenderOptions::new(), RenderHooks::new())).unwrap();
	let postponed = prerendered.postponed.unwrap();

	let stream = resume(page(Some("Ada")), postponed, RenderOptions::new(), RenderHooks::new()).unwrap();
	let out = collect(stream);

	assert!(out.starts_with("<div hidden id=\"S:0\"><p>Hello, Ada</p></div><script>"));
	assert!(out.ends_with("$RC(\"B:0\",\"S:0\")</script>"));
	assert!(!out.contains("Shop"));
	assert!(!out.contains("Loading user"));
}

// ============================================================================
// Postponed Slot Tests
// ============================================================================

/// Tests that a node postponed outside a boundary becomes a slot.
#[rstest]
fn test_slot_round_trip() {
	let prerendered = block_on(prerender(clock(None), RenderOptions::new(), RenderHooks::new())).unwrap();
	assert_eq!(
		String::from_utf8(prerendered.prelude.to_vec()).unwrap(),
		"<div>static <template id=\"P:0\"></template></div>"
	);
	let postponed = prerendered.postponed.unwrap();
	assert_eq!(postponed.replay_slots.len(), 1);

	let out = resume_to_string(clock(Some("12:00")), postponed, RenderOptions::new()).unwrap();

	assert!(out.starts_with("<div hidden id=\"S:0\">12:00</div><script>$RS="));
	assert!(out.ends_with("$RS(\"S:0\",\"P:0\")</script>"));
}

// ============================================================================
// Aborted Prerender Tests
// ============================================================================

/// Tests that aborting a prerender postpones the boundaries still waiting.
#[rstest]
fn test_aborted_prerender_can_be_resumed() {
	let pending = Thenable::<Node>::pending();
	let abort = AbortHandle::new();
	abort.abort("build timeout");

	let prerendered = block_on(prerender_with_abort(
		Node::suspense("wait", Node::deferred(pending)),
		RenderOptions::new(),
		RenderHooks::new(),
		abort,
	))
	.unwrap();
	assert_eq!(
		&prerendered.prelude[..],
		b"<!--$?--><template id=\"B:0\"></template>wait<!--/$-->"
	);
	let postponed = prerendered.postponed.unwrap();

	let ready = Thenable::resolved(Element::new("p").child("fresh").into_node());
	let out = resume_to_string(
		Node::suspense("wait", Node::deferred(ready)),
		postponed,
		RenderOptions::new(),
	)
	.unwrap();

	assert!(out.starts_with("<div hidden id=\"S:0\"><p>fresh</p></div>"));
	assert!(out.contains("$RC(\"B:0\",\"S:0\")"));
}

// ============================================================================
// Postponed State Tests
// ============================================================================

/// Tests that the postponed state survives JSON.
#[rstest]
fn test_postponed_state_json_round_trip() {
	let prerendered = block_on(prerender(page(None), RenderOptions::new(), RenderHooks::new())).unwrap();
	let postponed = prerendered.postponed.unwrap();

	let json = postponed.to_json().unwrap();
	let parsed = PostponedState::from_json(&json).unwrap();

	assert_eq!(parsed, postponed);
}

/// Tests that a state referring to unassigned ids is rejected.
#[rstest]
fn test_inconsistent_state_is_rejected() {
	let prerendered = block_on(prerender(page(None), RenderOptions::new(), RenderHooks::new())).unwrap();
	let mut postponed = prerendered.postponed.unwrap();
	postponed.next_segment_id = 0;

	let result = resume(page(Some("Ada")), postponed, RenderOptions::new(), RenderHooks::new());

	assert!(matches!(result, Err(RenderError::InvalidPostponedState(_))));
}
