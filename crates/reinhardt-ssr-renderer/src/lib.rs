//! # Reinhardt SSR Renderer
//!
//! Streaming server renderer for node trees with suspense boundaries.
//!
//! The shell is written as soon as everything outside a boundary is ready.
//! Boundaries that are still waiting show their fallback and stream in later
//! as hidden containers plus a small inline script that swaps them into
//! place. A prerender writes a static prelude and records the parts that
//! were postponed, so a later resume can fill them without redoing the rest.
//!
//! ## Modules
//!
//! - [`node`]: the renderable tree (elements, components, suspense, lists)
//! - [`thenable`]: settle-once values that suspend the render
//! - [`config`]: options and lifecycle hooks
//! - [`request`]: the request state machine and task scheduler
//! - [`stream`]: entry points (`render_to_string`, `render_to_stream`,
//!   `prerender`, `resume`)
//! - [`destination`]: output sinks and backpressure
//! - [`postpone`]: the state carried from a prerender to its resume
//! - [`arena`], [`task`], [`tree`], [`state`]: bookkeeping shared by the above
//!
//! ## Example
//!
//! ```
//! use reinhardt_ssr_renderer::prelude::*;
//!
//! let page = Element::new("ul").children(["one", "two"].map(|item| Element::new("li").child(item)));
//! let html = render_to_string(page, RenderOptions::new()).unwrap();
//! assert_eq!(html, "<ul><li>one</li><li>two</li></ul>");
//! ```

pub mod arena;
pub mod config;
pub mod destination;
mod element;
pub mod error;
mod flush;
pub mod node;
pub mod postpone;
pub mod request;
pub mod state;
pub mod stream;
pub mod task;
pub mod thenable;
pub mod tree;
mod walk;

pub use error::{ConfigError, Interrupt, RenderError, RenderResult};

/// Commonly used items.
pub mod prelude {
	pub use crate::arena::{BoundaryStatus, SegmentStatus};
	pub use crate::config::{Headers, RenderHooks, RenderOptions};
	pub use crate::destination::{BufferDestination, Destination};
	pub use crate::error::{ConfigError, Interrupt, RenderError, RenderResult};
	pub use crate::node::{
		Component, ComponentCx, Element, IntoNode, Node, RevealOrder, Suspense, SuspenseList,
	};
	pub use crate::postpone::PostponedState;
	pub use crate::request::{Request, RequestStatus};
	pub use crate::stream::{
		AbortHandle, Prerendered, RenderStream, prerender, prerender_with_abort, render_to_stream,
		render_to_string, resume, resume_to_string,
	};
	pub use crate::thenable::{Thenable, ThenableStatus};
}
