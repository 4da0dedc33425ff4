//! Entry points that drive a [`Request`] to completion.
//!
//! [`render_to_string`] renders synchronously and hands every unfinished
//! boundary to the client. [`render_to_stream`] and [`resume`] return a
//! [`RenderStream`] that yields bytes as they become ready. [`prerender`]
//! waits for all data and returns a static prelude plus the state needed to
//! finish it later.

use crate::config::{RenderHooks, RenderOptions};
use crate::destination::BufferDestination;
use crate::error::RenderResult;
use crate::node::IntoNode;
use crate::postpone::PostponedState;
use crate::request::{Request, RequestStatus};
use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// Reason used when a synchronous render stops waiting for data.
const SYNC_ABORT_REASON: &str = "the render finished synchronously before all data resolved";

#[derive(Default)]
struct AbortInner {
	reason: Mutex<Option<String>>,
	waker: Mutex<Option<Waker>>,
}

/// Cancels a stream or prerender from another task.
///
/// The first reason wins; later calls are ignored.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::stream::AbortHandle;
///
/// let handle = AbortHandle::new();
/// assert!(!handle.is_aborted());
/// handle.abort("client went away");
/// handle.abort("ignored");
/// assert_eq!(handle.reason().as_deref(), Some("client went away"));
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
	inner: Arc<AbortInner>,
}

impl AbortHandle {
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests cancellation and wakes the driver.
	pub fn abort(&self, reason: impl Into<String>) {
		{
			let mut slot = self.inner.reason.lock();
			if slot.is_some() {
				return;
			}
			*slot = Some(reason.into());
		}
		if let Some(waker) = self.inner.waker.lock().take() {
			waker.wake();
		}
	}

	pub fn is_aborted(&self) -> bool {
		self.inner.reason.lock().is_some()
	}

	/// The reason given to [`AbortHandle::abort`], if it was called.
	pub fn reason(&self) -> Option<String> {
		self.inner.reason.lock().clone()
	}

	fn register(&self, waker: &Waker) {
		let mut slot = self.inner.waker.lock();
		if !slot.as_ref().is_some_and(|w| w.will_wake(waker)) {
			*slot = Some(waker.clone());
		}
	}
}

impl fmt::Debug for AbortHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AbortHandle")
			.field("reason", &self.reason())
			.finish()
	}
}

/// Output of [`prerender`].
#[derive(Debug, Clone)]
pub struct Prerendered {
	/// Static HTML that can be cached and sent as is.
	pub prelude: Bytes,
	/// What a [`resume`] needs to fill the holes, or `None` if there are none.
	pub postponed: Option<PostponedState>,
}

/// A response body that yields chunks as the render makes progress.
///
/// The request only runs while the stream is polled. Chunks are produced
/// up to the configured high-water mark; polling again drains them and
/// lets the request continue.
pub struct RenderStream {
	request: Request,
	sink: BufferDestination,
	abort: AbortHandle,
	started: bool,
	abort_applied: bool,
	done: bool,
}

impl RenderStream {
	fn new(request: Request, high_water_mark: usize) -> Self {
		Self {
			request,
			sink: BufferDestination::with_high_water_mark(high_water_mark),
			abort: AbortHandle::new(),
			started: false,
			abort_applied: false,
			done: false,
		}
	}

	/// Handle that cancels this stream from elsewhere.
	pub fn abort_handle(&self) -> AbortHandle {
		self.abort.clone()
	}

	/// Cancels the render; the next poll writes what remains and closes.
	pub fn abort(&self, reason: impl Into<String>) {
		self.abort.abort(reason);
	}

	/// State of the underlying request.
	pub fn status(&self) -> RequestStatus {
		self.request.status()
	}

	/// Returns `true` once every task has finished.
	pub fn is_all_ready(&self) -> bool {
		self.request.is_all_ready()
	}

	fn apply_abort(&mut self) {
		if self.abort_applied {
			return;
		}
		if let Some(reason) = self.abort.reason() {
			self.abort_applied = true;
			self.request.abort(reason);
		}
	}
}

impl fmt::Debug for RenderStream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderStream")
			.field("status", &self.request.status())
			.field("buffered", &self.sink.buffered())
			.field("done", &self.done)
			.finish()
	}
}

impl Stream for RenderStream {
	type Item = RenderResult<Bytes>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		if this.done {
			return Poll::Ready(None);
		}
		this.request.register_waker(cx.waker());
		this.abort.register(cx.waker());
		if !this.started {
			this.started = true;
			this.request.start_work();
			this.request.start_flowing(Box::new(this.sink.clone()));
		}

		loop {
			this.apply_abort();

			let data = this.sink.drain();
			if !data.is_empty() {
				return Poll::Ready(Some(Ok(data)));
			}
			if let Some(error) = this.sink.take_error() {
				this.done = true;
				return Poll::Ready(Some(Err(error)));
			}
			if this.sink.is_closed() {
				this.done = true;
				return Poll::Ready(None);
			}

			if !this.request.is_flowing() && this.request.status() < RequestStatus::Closed {
				this.request.resume_flowing();
				if this.sink.buffered() > 0 || this.sink.is_closed() {
					continue;
				}
			}
			if this.request.has_pending_pings() {
				this.request.perform_work();
				continue;
			}
			return Poll::Pending;
		}
	}
}

/// Renders `node` to a complete string without waiting for data.
///
/// Boundaries still pending after the synchronous pass are aborted and
/// left for the client, with their fallback in place. Pending work outside
/// every boundary is an error.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_renderer::config::RenderOptions;
/// use reinhardt_ssr_renderer::node::Element;
/// use reinhardt_ssr_renderer::stream::render_to_string;
///
/// let html = render_to_string(
/// 	Element::new("p").attr("class", "note").child("1 < 2"),
/// 	RenderOptions::new(),
/// )
/// .unwrap();
/// assert_eq!(html, "<p class=\"note\">1 &lt; 2</p>");
/// ```
pub fn render_to_string(node: impl IntoNode, options: RenderOptions) -> RenderResult<String> {
	options.validate()?;
	finish_to_string(Request::new(node, options, RenderHooks::new()))
}

/// Completes a prerender's holes into a string, like [`render_to_string`].
pub fn resume_to_string(
	node: impl IntoNode,
	postponed: PostponedState,
	options: RenderOptions,
) -> RenderResult<String> {
	options.validate()?;
	finish_to_string(Request::resume(
		node,
		postponed,
		options,
		RenderHooks::new(),
	)?)
}

fn finish_to_string(mut request: Request) -> RenderResult<String> {
	request.start_work();
	if !request.is_all_ready() {
		request.abort(SYNC_ABORT_REASON);
	}
	let sink = BufferDestination::new();
	request.start_flowing(Box::new(sink.clone()));
	if let Some(error) = sink.take_error() {
		return Err(error);
	}
	Ok(String::from_utf8_lossy(&sink.drain()).into_owned())
}

/// Starts a streaming render. Nothing runs until the stream is polled.
pub fn render_to_stream(
	node: impl IntoNode,
	options: RenderOptions,
	hooks: RenderHooks,
) -> RenderResult<RenderStream> {
	options.validate()?;
	let high_water_mark = options.high_water_mark;
	Ok(RenderStream::new(
		Request::new(node, options, hooks),
		high_water_mark,
	))
}

/// Streams the output a prerender left out.
///
/// `node` must describe the same tree that was prerendered.
pub fn resume(
	node: impl IntoNode,
	postponed: PostponedState,
	options: RenderOptions,
	hooks: RenderHooks,
) -> RenderResult<RenderStream> {
	options.validate()?;
	let high_water_mark = options.high_water_mark;
	let request = Request::resume(node, postponed, options, hooks)?;
	Ok(RenderStream::new(request, high_water_mark))
}

/// Renders `node` once all data resolved and returns the static prelude.
///
/// Work that postpones is recorded in [`Prerendered::postponed`] instead of
/// being rendered.
pub async fn prerender(
	node: impl IntoNode,
	options: RenderOptions,
	hooks: RenderHooks,
) -> RenderResult<Prerendered> {
	prerender_with_abort(node, options, hooks, AbortHandle::new()).await
}

/// Like [`prerender`], but stops waiting once `abort` fires. Unfinished
/// work is postponed rather than failed.
pub async fn prerender_with_abort(
	node: impl IntoNode,
	options: RenderOptions,
	hooks: RenderHooks,
	abort: AbortHandle,
) -> RenderResult<Prerendered> {
	options.validate()?;
	let mut request = Request::prerender(node, options, hooks);
	request.start_work();

	let mut aborted = false;
	futures::future::poll_fn(|cx| {
		request.register_waker(cx.waker());
		abort.register(cx.waker());
		loop {
			if !aborted {
				if let Some(reason) = abort.reason() {
					aborted = true;
					request.abort(reason);
				}
			}
			if request.is_all_ready() || request.fatal_error().is_some() {
				return Poll::Ready(());
			}
			if request.has_pending_pings() {
				request.perform_work();
				continue;
			}
			return Poll::Pending;
		}
	})
	.await;

	if let Some(error) = request.fatal_error() {
		return Err(error.clone());
	}
	let sink = BufferDestination::new();
	request.start_flowing(Box::new(sink.clone()));
	if let Some(error) = sink.take_error() {
		return Err(error);
	}
	let postponed = request.postponed_state();
	tracing::debug!(
		bytes = sink.buffered(),
		postponed = postponed.is_some(),
		"Prerender complete"
	);
	Ok(Prerendered {
		prelude: sink.drain(),
		postponed,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::RenderError;
	use crate::node::{Element, Node};
	use crate::thenable::Thenable;
	use futures::StreamExt;
	use futures::executor::block_on;
	use rstest::rstest;

	#[rstest]
	#[case(Node::text("a & b"), "a &amp; b")]
	#[case(Element::new("br").into_node(), "<br/>")]
	#[case(Node::fragment(["x", "y"]), "x<!-- -->y")]
	fn test_render_to_string(#[case] node: Node, #[case] expected: &str) {
		assert_eq!(render_to_string(node, RenderOptions::new()).unwrap(), expected);
	}

	#[rstest]
	fn test_render_to_string_client_renders_pending_boundary() {
		let data = Thenable::<Node>::pending();
		let html = render_to_string(
			Node::suspense("loading", Node::deferred(data)),
			RenderOptions::new(),
		)
		.unwrap();

		assert!(html.starts_with("<!--$!-->"));
		assert!(html.contains("loading"));
		assert!(html.ends_with("<!--/$-->"));
	}

	#[rstest]
	fn test_render_to_string_fails_on_pending_shell() {
		let data = Thenable::<Node>::pending();
		let result = render_to_string(Node::deferred(data), RenderOptions::new());

		assert!(matches!(result, Err(RenderError::Aborted { .. })));
	}

	#[rstest]
	fn test_invalid_options_are_rejected() {
		let result = render_to_string("x", RenderOptions::new().progressive_chunk_size(0));

		assert!(matches!(result, Err(RenderError::Config(_))));
	}

	#[rstest]
	fn test_abort_handle_keeps_first_reason() {
		let handle = AbortHandle::new();
		let other = handle.clone();
		other.abort("first");
		handle.abort("second");

		assert!(handle.is_aborted());
		assert_eq!(handle.reason().as_deref(), Some("first"));
	}

	#[rstest]
	fn test_stream_yields_shell_then_boundary() {
		let data = Thenable::<Node>::pending();
		let mut stream = render_to_stream(
			Node::suspense("…", Node::deferred(data.clone())),
			RenderOptions::new(),
			RenderHooks::new(),
		)
		.unwrap();

		let shell = block_on(stream.next()).unwrap().unwrap();
		assert!(shell.starts_with(b"<!--$?-->"));

		data.resolve(Node::text("ready"));
		let rest = block_on(stream.next()).unwrap().unwrap();
		assert!(String::from_utf8_lossy(&rest).contains("$RC(\"B:0\",\"S:0\")"));
		assert!(block_on(stream.next()).is_none());
		assert_eq!(stream.status(), RequestStatus::Closed);
	}

	#[rstest]
	fn test_prerender_without_postpones() {
		let prerendered = block_on(prerender(
			Element::new("p").child("static"),
			RenderOptions::new(),
			RenderHooks::new(),
		))
		.unwrap();

		assert_eq!(&prerendered.prelude[..], b"<p>static</p>");
		assert!(prerendered.postponed.is_none());
	}
}
