//! Async stream tests
//!
//! Polls [`RenderStream`] from a tokio runtime while data resolves on
//! other tasks.
//!
//! Test Categories:
//! - Streaming: 2 tests
//! - Cancellation: 2 tests
//! - Prerender: 1 test

use futures::{FutureExt, StreamExt};
use reinhardt_ssr_renderer::prelude::*;
use rstest::*;
use std::time::Duration;

fn to_string(chunks: Vec<RenderResult<bytes::Bytes>>) -> String {
	chunks
		.into_iter()
		.map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
		.collect()
}

// ============================================================================
// Streaming Tests
// ============================================================================

/// Tests that the stream wakes up when data resolves on another task.
#[rstest]
#[tokio::test]
async fn test_stream_wakes_on_resolution() {
	let data = Thenable::<Node>::pending();
	let mut stream = render_to_stream(
		Element::new("section").child(Node::suspense("…", Node::deferred(data.clone()))),
		RenderOptions::new(),
		RenderHooks::new(),
	)
	.unwrap();

	let shell = stream.next().await.unwrap().unwrap();
	assert!(shell.starts_with(b"<section><!--$?-->"));

	let resolver = tokio::spawn({
		let data = data.clone();
		async move {
			tokio::time::sleep(Duration::from_millis(10)).await;
			data.resolve(Element::new("p").child("late").into_node());
		}
	});

	let rest: Vec<_> = stream.collect().await;
	resolver.await.unwrap();
	let rest = to_string(rest);
	assert!(rest.contains("<p>late</p>"));
	assert!(rest.contains("$RC(\"B:0\",\"S:0\")"));
}

/// Tests that a small high-water mark splits the output without changing it.
#[rstest]
#[tokio::test]
async fn test_small_high_water_mark_preserves_output() {
	let page = || {
		Element::new("ol").children((0..5).map(|i| {
			Element::new("li").child(Node::suspense(
				"…",
				Node::deferred(Thenable::resolved(Node::text(format!("row {i}")))),
			))
		}))
	};

	let expected = render_to_string(page(), RenderOptions::new()).unwrap();
	let stream = render_to_stream(page(), RenderOptions::new().high_water_mark(4), RenderHooks::new()).unwrap();
	let actual = to_string(stream.collect().await);

	assert_eq!(actual, expected);
}

// ============================================================================
// Cancellation Tests
// ============================================================================

/// Tests that aborting a stream finishes it with client-rendered boundaries.
#[rstest]
#[tokio::test]
async fn test_abort_handle_finishes_stream() {
	let data = Thenable::<Node>::pending();
	let mut stream = render_to_stream(
		Node::suspense("…", Node::deferred(data)),
		RenderOptions::new(),
		RenderHooks::new(),
	)
	.unwrap();
	let handle = stream.abort_handle();

	let shell = stream.next().await.unwrap().unwrap();
	assert!(shell.starts_with(b"<!--$?-->"));
	assert!(stream.next().now_or_never().is_none());

	tokio::spawn(async move { handle.abort("deadline") });

	let rest = to_string(stream.collect().await);
	assert!(rest.contains("$RX(\"B:0\")"));
}

/// Tests that aborting before the shell yields the error.
#[rstest]
#[tokio::test]
async fn test_abort_before_shell_yields_error() {
	let data = Thenable::<Node>::pending();
	let mut stream = render_to_stream(Node::deferred(data), RenderOptions::new(), RenderHooks::new()).unwrap();

	assert!(stream.next().now_or_never().is_none());
	stream.abort("deadline");

	let item = stream.next().await.unwrap();
	assert_eq!(item, Err(RenderError::aborted("deadline")));
	assert!(stream.next().await.is_none());
}

// ============================================================================
// Prerender Tests
// ============================================================================

/// Tests that a prerender waits for data instead of postponing it.
#[rstest]
#[tokio::test]
async fn test_prerender_waits_for_data() {
	let data = Thenable::<Node>::pending();
	tokio::spawn({
		let data = data.clone();
		async move {
			tokio::time::sleep(Duration::from_millis(10)).await;
			data.resolve(Node::text("loaded"));
		}
	});

	let prerendered = prerender(
		Node::suspense("…", Node::deferred(data)),
		RenderOptions::new(),
		RenderHooks::new(),
	)
	.await
	.unwrap();

	assert!(prerendered.postponed.is_none());
	let prelude = String::from_utf8(prerendered.prelude.to_vec()).unwrap();
	assert!(prelude.starts_with("<!--$-->loaded"));
	assert!(!prelude.contains("…"));
}
