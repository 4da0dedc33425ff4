//! Streaming render integration tests
//!
//! Drives a [`Request`] against a [`BufferDestination`] and checks the bytes
//! a browser would receive.
//!
//! Test Categories:
//! - Document Order: 2 tests
//! - Fallbacks: 2 tests
//! - Flushing and Backpressure: 3 tests
//! - Abort: 2 tests
//! - Escaping: 3 tests
//! - Documents: 1 test
//! - Suspense Lists: 2 tests
//! - Headers and Hooks: 4 tests
//! - Depth Limit: 1 test

use parking_lot::Mutex;
use proptest::prelude::*;
use reinhardt_ssr_renderer::prelude::*;
use rstest::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn start(node: impl IntoNode, options: RenderOptions, hooks: RenderHooks) -> (Request, BufferDestination) {
	let mut request = Request::new(node, options, hooks);
	request.start_work();
	let sink = BufferDestination::new();
	request.start_flowing(Box::new(sink.clone()));
	(request, sink)
}

fn drain(sink: &BufferDestination) -> String {
	String::from_utf8(sink.drain().to_vec()).unwrap()
}

fn item(i: usize) -> Node {
	Element::new("p").child(format!("item {i}")).into_node()
}

/// `n` boundaries in a list, each waiting on its own thenable.
fn boundaries(n: usize) -> (Node, Vec<Thenable<Node>>) {
	let data: Vec<Thenable<Node>> = (0..n).map(|_| Thenable::pending()).collect();
	let node = Element::new("ul").children(data.iter().map(|d| {
		Element::new("li").child(Node::suspense("…", Node::deferred(d.clone())))
	}));
	(node.into_node(), data)
}

// ============================================================================
// Document Order Tests
// ============================================================================

/// Tests that boundary ids follow document order regardless of resolution order.
#[rstest]
fn test_boundary_ids_follow_document_order() {
	let (node, data) = boundaries(3);
	let (mut request, sink) = start(node, RenderOptions::new(), RenderHooks::new());

	let shell = drain(&sink);
	let b0 = shell.find("B:0").unwrap();
	let b1 = shell.find("B:1").unwrap();
	let b2 = shell.find("B:2").unwrap();
	assert!(b0 < b1 && b1 < b2);

	data[2].resolve(item(2));
	request.perform_work();
	let out = drain(&sink);
	assert!(out.contains("<div hidden id=\"S:2\"><p>item 2</p></div>"));
	assert!(out.contains("$RC(\"B:2\",\"S:2\")"));
}

proptest! {
	/// Test: every boundary is revealed once, in the order its data arrives
	///
	/// Category: Property
	/// Verifies that output is the same set of instructions for any
	/// resolution order and that each boundary is completed exactly once.
	#[test]
	fn prop_reveal_order_follows_resolution_order(
		order in (1usize..6).prop_flat_map(|n| Just((0..n).collect::<Vec<usize>>()).prop_shuffle())
	) {
		let (node, data) = boundaries(order.len());
		let (mut request, sink) = start(node, RenderOptions::new(), RenderHooks::new());
		let mut out = drain(&sink);

		for &i in &order {
			data[i].resolve(item(i));
			request.perform_work();
			out.push_str(&drain(&sink));
		}

		prop_assert_eq!(request.status(), RequestStatus::Closed);
		let mut last = 0;
		for &i in &order {
			let call = format!("$RC(\"B:{i}\",\"S:{i}\")");
			prop_assert_eq!(out.matches(&call).count(), 1);
			let at = out.find(&call).unwrap();
			prop_assert!(at >= last);
			last = at;
			let content = format!("<p>item {i}</p>");
			prop_assert_eq!(out.matches(&content).count(), 1);
		}
		prop_assert_eq!(out.matches("$RC=function").count(), 1);
	}
}

// ============================================================================
// Fallback Tests
// ============================================================================

/// Tests that a boundary ready before the first flush never shows its fallback.
#[rstest]
fn test_boundary_resolved_before_flowing_skips_fallback() {
	let data = Thenable::<Node>::pending();
	let mut request = Request::new(
		Node::suspense("loading", Node::deferred(data.clone())),
		RenderOptions::new(),
		RenderHooks::new(),
	);
	request.start_work();
	data.resolve(Element::new("p").child("ready").into_node());
	request.perform_work();

	let sink = BufferDestination::new();
	request.start_flowing(Box::new(sink.clone()));

	let out = drain(&sink);
	assert_eq!(out, "<!--$--><p>ready</p><!--/$-->");
	assert!(sink.is_closed());
}

/// Tests that a boundary shows its fallback at most once.
#[rstest]
fn test_fallback_is_written_once() {
	let data = Thenable::<Node>::pending();
	let (mut request, sink) = start(
		Node::suspense(Element::new("i").child("loading"), Node::deferred(data.clone())),
		RenderOptions::new(),
		RenderHooks::new(),
	);
	let mut out = drain(&sink);
	data.resolve(Node::text("x"));
	request.perform_work();
	out.push_str(&drain(&sink));

	assert_eq!(out.matches("<i>loading</i>").count(), 1);
}

// ============================================================================
// Flushing and Backpressure Tests
// ============================================================================

/// Tests that flushing a closed request writes nothing.
#[rstest]
fn test_flush_after_close_is_a_no_op() {
	let (mut request, sink) = start(
		Element::new("div").child("done"),
		RenderOptions::new(),
		RenderHooks::new(),
	);
	assert_eq!(drain(&sink), "<div>done</div>");

	request.flush();
	request.perform_work();
	request.resume_flowing();

	assert!(sink.drain().is_empty());
	assert_eq!(request.status(), RequestStatus::Closed);
}

/// Tests that stopping the flow holds output until it is resumed.
#[rstest]
fn test_stop_flowing_holds_output() {
	let data = Thenable::<Node>::pending();
	let (mut request, sink) = start(
		Node::suspense("…", Node::deferred(data.clone())),
		RenderOptions::new(),
		RenderHooks::new(),
	);
	drain(&sink);

	request.stop_flowing();
	data.resolve(Node::text("late"));
	request.perform_work();
	assert!(sink.drain().is_empty());
	assert!(request.is_all_ready());

	request.resume_flowing();
	assert!(drain(&sink).contains("$RC(\"B:0\",\"S:0\")"));
	assert!(sink.is_closed());
}

/// Tests that a full destination receives one unit per resume.
#[rstest]
fn test_backpressure_yields_one_unit_per_resume() {
	let (node, data) = boundaries(3);
	let mut request = Request::new(node, RenderOptions::new(), RenderHooks::new());
	request.start_work();
	let sink = BufferDestination::with_high_water_mark(1);
	request.start_flowing(Box::new(sink.clone()));
	assert!(drain(&sink).starts_with("<ul>"));

	for d in &data {
		d.resolve(Node::text("v"));
	}
	request.perform_work();
	assert!(sink.drain().is_empty());

	let mut units = Vec::new();
	while !sink.is_closed() {
		request.resume_flowing();
		let unit = drain(&sink);
		if !unit.is_empty() {
			units.push(unit);
		}
	}

	assert_eq!(units.len(), 3);
	for (i, unit) in units.iter().enumerate() {
		assert!(unit.contains(&format!("$RC(\"B:{i}\",\"S:{i}\")")));
	}
}

// ============================================================================
// Abort Tests
// ============================================================================

/// Tests that aborting after the shell hands pending boundaries to the client.
#[rstest]
fn test_abort_client_renders_pending_boundaries() {
	let (node, _data) = boundaries(2);
	let errors = Arc::new(AtomicUsize::new(0));
	let hooks = RenderHooks::new().on_error({
		let errors = Arc::clone(&errors);
		move |_| {
			errors.fetch_add(1, Ordering::SeqCst);
			None
		}
	});
	let (mut request, sink) = start(node, RenderOptions::new(), hooks);
	drain(&sink);

	request.abort("client disconnected");

	let out = drain(&sink);
	assert!(out.contains("$RX(\"B:0\")"));
	assert!(out.contains("$RX(\"B:1\")"));
	assert_eq!(out.matches("$RX=function").count(), 1);
	assert_eq!(errors.load(Ordering::SeqCst), 2);
	assert_eq!(request.status(), RequestStatus::Closed);
	assert!(sink.is_closed());
	assert_eq!(
		request.boundary_statuses(),
		vec![BoundaryStatus::ClientRendered, BoundaryStatus::ClientRendered]
	);
}

/// Tests that aborting while the shell is pending fails the response.
#[rstest]
fn test_abort_before_shell_closes_with_error() {
	let data = Thenable::<Node>::pending();
	let fatal = Arc::new(Mutex::new(None));
	let hooks = RenderHooks::new().on_shell_error({
		let fatal = Arc::clone(&fatal);
		move |error| *fatal.lock() = Some(error.clone())
	});
	let (mut request, sink) = start(Node::deferred(data), RenderOptions::new(), hooks);

	request.abort("timeout");

	assert!(sink.drain().is_empty());
	assert_eq!(sink.error(), Some(RenderError::aborted("timeout")));
	assert_eq!(*fatal.lock(), Some(RenderError::aborted("timeout")));
	assert_eq!(request.status(), RequestStatus::Closed);
}

// ============================================================================
// Escaping Tests
// ============================================================================

/// Tests that text content cannot open tags.
#[rstest]
fn test_text_is_escaped() {
	let html = render_to_string(
		Element::new("p").child("<script>alert(1)</script>"),
		RenderOptions::new(),
	)
	.unwrap();

	assert_eq!(html, "<p>&lt;script&gt;alert(1)&lt;/script&gt;</p>");
}

/// Tests that attribute values cannot close their quotes.
#[rstest]
fn test_attribute_is_escaped() {
	let html = render_to_string(
		Element::new("a").attr("title", "say \"hi\" & go"),
		RenderOptions::new(),
	)
	.unwrap();

	assert_eq!(html, "<a title=\"say &quot;hi&quot; &amp; go\"></a>");
}

/// Tests that `javascript:` URLs are replaced.
#[rstest]
fn test_javascript_url_is_blocked() {
	let html = render_to_string(
		Element::new("a").attr("href", "javascript:alert(1)").child("x"),
		RenderOptions::new(),
	)
	.unwrap();

	assert!(!html.contains("javascript:alert(1)"));
	assert!(html.contains("blocked as a security precaution"));
}

// ============================================================================
// Document Tests
// ============================================================================

/// Tests a full page whose comments arrive after the shell.
#[rstest]
fn test_document_with_late_boundary() {
	let comments = Thenable::<Node>::pending();
	let page = Element::new("html").child(Element::new("body").children([
		Element::new("h1").child("Title").into_node(),
		Node::suspense("Loading...", Node::deferred(comments.clone())),
	]));
	let (mut request, sink) = start(page, RenderOptions::new(), RenderHooks::new());

	let shell = drain(&sink);
	assert_eq!(
		shell,
		"<!DOCTYPE html><html><head></head><body><h1>Title</h1>\
		 <!--$?--><template id=\"B:0\"></template>Loading...<!--/$-->"
	);

	comments.resolve(Element::new("ul").child(Element::new("li").child("first")).into_node());
	request.perform_work();

	let rest = drain(&sink);
	assert!(rest.starts_with("<div hidden id=\"S:0\"><ul><li>first</li></ul></div><script>"));
	assert!(rest.contains("$RC(\"B:0\",\"S:0\")</script>"));
	assert!(rest.ends_with("</body></html>"));
}

// ============================================================================
// Suspense List Tests
// ============================================================================

/// Tests that ordered lists hold back boundaries until earlier rows reveal.
#[rstest]
#[case(RevealOrder::Forwards, 1, 0)]
#[case(RevealOrder::Backwards, 0, 1)]
fn test_ordered_list_reveals_in_order(
	#[case] order: RevealOrder,
	#[case] early: usize,
	#[case] late: usize,
) {
	let data = [Thenable::<Node>::pending(), Thenable::<Node>::pending()];
	let list = Node::suspense_list(
		order,
		data.iter()
			.map(|d| Node::suspense("…", Node::deferred(d.clone()))),
	);
	let (mut request, sink) = start(list, RenderOptions::new(), RenderHooks::new());
	drain(&sink);

	data[early].resolve(Node::text("a"));
	request.perform_work();
	assert!(!drain(&sink).contains("$RC("));

	data[late].resolve(Node::text("b"));
	request.perform_work();
	let out = drain(&sink);
	let first = out.find(&format!("$RC(\"B:{late}\"")).unwrap();
	let second = out.find(&format!("$RC(\"B:{early}\"")).unwrap();
	assert!(first < second);
}

/// Tests that a together list reveals every boundary in one pass.
#[rstest]
fn test_together_list_reveals_at_once() {
	let data = [Thenable::<Node>::pending(), Thenable::<Node>::pending()];
	let list = Node::suspense_list(
		RevealOrder::Together,
		data.iter()
			.map(|d| Node::suspense("…", Node::deferred(d.clone()))),
	);
	let (mut request, sink) = start(list, RenderOptions::new(), RenderHooks::new());
	drain(&sink);

	data[0].resolve(Node::text("a"));
	request.perform_work();
	assert!(!drain(&sink).contains("$RC("));

	data[1].resolve(Node::text("b"));
	request.perform_work();
	let out = drain(&sink);
	assert!(out.contains("$RC(\"B:0\",\"S:0\")"));
	assert!(out.contains("$RC(\"B:1\",\"S:1\")"));
}

// ============================================================================
// Headers and Hooks Tests
// ============================================================================

/// Tests that preloads found in the shell are offered as early headers.
#[rstest]
fn test_preload_is_sent_as_link_header() {
	let headers = Arc::new(Mutex::new(None));
	let hooks = RenderHooks::new().on_headers({
		let headers = Arc::clone(&headers);
		move |h| *headers.lock() = Some(h)
	});
	let page = Element::new("div").child(
		Element::new("link")
			.attr("rel", "preload")
			.attr("href", "/font.woff2")
			.attr("as", "font"),
	);
	let (_request, sink) = start(page, RenderOptions::new().emit_headers(true), hooks);

	let headers = headers.lock().clone().unwrap();
	assert_eq!(
		headers.get("Link").map(String::as_str),
		Some("</font.woff2>; rel=preload; as=\"font\"")
	);
	assert_eq!(
		drain(&sink),
		"<link rel=\"preload\" href=\"/font.woff2\" as=\"font\"/><div></div>"
	);
}

/// Tests that the shell and completion hooks fire once each.
#[rstest]
fn test_lifecycle_hooks_fire_once() {
	let shell = Arc::new(AtomicUsize::new(0));
	let all = Arc::new(AtomicUsize::new(0));
	let hooks = RenderHooks::new()
		.on_shell_ready({
			let shell = Arc::clone(&shell);
			move || {
				shell.fetch_add(1, Ordering::SeqCst);
			}
		})
		.on_all_ready({
			let all = Arc::clone(&all);
			move || {
				all.fetch_add(1, Ordering::SeqCst);
			}
		});
	let data = Thenable::<Node>::pending();
	let (mut request, _sink) = start(
		Node::suspense("…", Node::deferred(data.clone())),
		RenderOptions::new(),
		hooks,
	);
	assert_eq!(shell.load(Ordering::SeqCst), 1);
	assert_eq!(all.load(Ordering::SeqCst), 0);

	data.resolve(Node::text("x"));
	request.perform_work();
	assert_eq!(shell.load(Ordering::SeqCst), 1);
	assert_eq!(all.load(Ordering::SeqCst), 1);
}

/// Tests that the digest returned by `on_error` reaches the markup.
#[rstest]
fn test_error_digest_is_written() {
	let hooks = RenderHooks::new().on_error(|_| Some("d1".to_string()));
	let broken = Node::component("Broken", |_| Err(Interrupt::error("boom")));
	let (request, sink) = start(
		Node::suspense("fallback", broken),
		RenderOptions::new(),
		hooks,
	);

	assert_eq!(
		drain(&sink),
		"<!--$!--><template data-dgst=\"d1\"></template>fallback<!--/$-->"
	);
	assert!(request.fatal_error().is_none());
}

/// Tests that an error outside every boundary reaches the fatal hook.
#[rstest]
fn test_fatal_error_hook() {
	let fatal = Arc::new(Mutex::new(None));
	let hooks = RenderHooks::new().on_fatal_error({
		let fatal = Arc::clone(&fatal);
		move |error| *fatal.lock() = Some(error.to_string())
	});
	let broken = Node::component("Broken", |_| Err(Interrupt::error("boom")));
	let (request, sink) = start(Element::new("div").child(broken), RenderOptions::new(), hooks);

	assert!(fatal.lock().is_some());
	assert!(sink.error().is_some());
	assert!(sink.drain().is_empty());
	assert_eq!(request.status(), RequestStatus::Closed);
}

// ============================================================================
// Depth Limit Tests
// ============================================================================

/// Tests that a deferred deep subtree renders the same markup.
#[rstest]
fn test_depth_limit_does_not_change_output() {
	let deep = || {
		let mut node = Element::new("b").child("leaf").into_node();
		for _ in 0..8 {
			node = Element::new("div").child(node).into_node();
		}
		node
	};

	let limited = render_to_string(deep(), RenderOptions::new().max_render_depth(3)).unwrap();
	let unlimited = render_to_string(deep(), RenderOptions::new()).unwrap();

	assert_eq!(limited, unlimited);
	assert!(limited.ends_with("<b>leaf</b></div></div></div></div></div></div></div></div>"));
}
