//! # Reinhardt SSR
//!
//! Streaming server-side rendering of HTML with suspense boundaries.
//!
//! This crate is a facade over the SSR crates of the workspace:
//!
//! - `reinhardt-ssr-markup`: escaping, the attribute table, boundary markers
//!   and the inline-script instruction protocol
//! - `reinhardt-ssr-renderer`: the request state machine, flushing with
//!   backpressure, prerendering and resuming
//!
//! ## Feature Flags
//!
//! - `markup` - Wire-level markup only
//! - `renderer` - The streaming renderer (enables `markup`)
//! - `full` (default) - Everything
//!
//! ## Quick Example
//!
//! ```rust
//! # #[cfg(feature = "renderer")]
//! # {
//! use reinhardt_ssr::prelude::*;
//!
//! let data = Thenable::<Node>::pending();
//! let page = Element::new("main").child(Node::suspense(
//! 	Element::new("p").child("Loading…"),
//! 	Node::deferred(data.clone()),
//! ));
//!
//! let mut stream = render_to_stream(page, RenderOptions::new(), RenderHooks::new()).unwrap();
//! let shell = futures::executor::block_on(futures::StreamExt::next(&mut stream));
//! assert!(shell.is_some());
//!
//! data.resolve(Node::text("Loaded"));
//! # }
//! ```

#[cfg(feature = "markup")]
pub use reinhardt_ssr_markup as markup;

#[cfg(feature = "renderer")]
pub use reinhardt_ssr_renderer as renderer;

// Re-export errors
#[cfg(feature = "markup")]
pub use reinhardt_ssr_markup::{MarkupError, MarkupResult};

#[cfg(feature = "renderer")]
pub use reinhardt_ssr_renderer::{ConfigError, RenderError, RenderResult};

// Re-export entry points
#[cfg(feature = "renderer")]
pub use reinhardt_ssr_renderer::stream::{
	AbortHandle, Prerendered, RenderStream, prerender, prerender_with_abort, render_to_stream,
	render_to_string, resume, resume_to_string,
};

/// Commonly used items.
pub mod prelude {
	#[cfg(feature = "markup")]
	pub use reinhardt_ssr_markup::prelude::{
		AttrValue, ChunkBuffer, FormatContext, InsertionMode, Namespace, StyleMap, StyleValue,
	};

	#[cfg(feature = "renderer")]
	pub use reinhardt_ssr_renderer::prelude::*;
}
