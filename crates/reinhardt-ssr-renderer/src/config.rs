//! Render configuration and lifecycle hooks.
//!
//! [`RenderOptions`] is plain data: it derives serde traits and can be loaded
//! from a `[render]`-style TOML table. [`RenderHooks`] carries the callbacks,
//! which are not serializable and are consumed by the request.

use crate::error::{ConfigError, RenderError};
use reinhardt_ssr_markup::format::Namespace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Response headers produced by the headers channel.
pub type Headers = BTreeMap<String, String>;

/// Default byte budget for inlining a completed boundary.
pub const DEFAULT_PROGRESSIVE_CHUNK_SIZE: usize = 12_800;

/// Default recursion depth before a subtree is deferred to a fresh task.
pub const DEFAULT_MAX_RENDER_DEPTH: usize = 256;

/// Default byte budget of the `Link` header.
pub const DEFAULT_MAX_HEADERS_LENGTH: usize = 2_000;

/// Default number of buffered bytes after which a stream reports backpressure.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16_384;

/// Options for a render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
	/// Prefix for every id handed to the client runtime and `use_id`.
	pub identifier_prefix: String,
	/// Namespace of the root node.
	pub namespace: Namespace,
	/// Completed boundaries larger than this are streamed out of band even
	/// when their parent has not been flushed yet.
	pub progressive_chunk_size: usize,
	/// Nesting depth after which rendering continues in a new task.
	pub max_render_depth: usize,
	/// Nonce added to every inline `<script>`.
	pub nonce: Option<String>,
	/// Inline script emitted after the shell.
	pub bootstrap_script_content: Option<String>,
	/// Classic scripts loaded after the shell.
	pub bootstrap_scripts: Vec<String>,
	/// Module scripts loaded after the shell.
	pub bootstrap_modules: Vec<String>,
	/// Budget, in bytes, of the `Link` header delivered to `on_headers`.
	pub max_headers_length: usize,
	/// Whether to compute early headers at all.
	pub emit_headers: bool,
	/// Buffered bytes after which a stream stops pulling more output.
	pub high_water_mark: usize,
}

impl Default for RenderOptions {
	fn default() -> Self {
		Self {
			identifier_prefix: String::new(),
			namespace: Namespace::Html,
			progressive_chunk_size: DEFAULT_PROGRESSIVE_CHUNK_SIZE,
			max_render_depth: DEFAULT_MAX_RENDER_DEPTH,
			nonce: None,
			bootstrap_script_content: None,
			bootstrap_scripts: Vec::new(),
			bootstrap_modules: Vec::new(),
			max_headers_length: DEFAULT_MAX_HEADERS_LENGTH,
			emit_headers: true,
			high_water_mark: DEFAULT_HIGH_WATER_MARK,
		}
	}
}

impl RenderOptions {
	/// Creates new default options.
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses options from a TOML document and validates them.
	///
	/// # Examples
	///
	/// ```
	/// use reinhardt_ssr_renderer::config::RenderOptions;
	///
	/// let options = RenderOptions::from_toml_str(r#"
	///     identifier_prefix = "app-"
	///     progressive_chunk_size = 4096
	///     bootstrap_modules = ["/main.js"]
	/// "#).unwrap();
	/// assert_eq!(options.identifier_prefix, "app-");
	/// assert_eq!(options.max_render_depth, 256);
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let options: Self = toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
		options.validate()?;
		Ok(options)
	}

	/// Rejects values the renderer cannot work with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let positive = [
			("progressive_chunk_size", self.progressive_chunk_size),
			("max_render_depth", self.max_render_depth),
			("high_water_mark", self.high_water_mark),
		];
		for (field, value) in positive {
			if value == 0 {
				return Err(ConfigError::Invalid {
					field,
					message: "must be greater than zero".to_string(),
				});
			}
		}
		if self.nonce.as_deref().is_some_and(str::is_empty) {
			return Err(ConfigError::Invalid {
				field: "nonce",
				message: "must not be empty when set".to_string(),
			});
		}
		Ok(())
	}

	/// Sets the identifier prefix.
	pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
		self.identifier_prefix = prefix.into();
		self
	}

	/// Sets the root namespace.
	pub fn namespace(mut self, namespace: Namespace) -> Self {
		self.namespace = namespace;
		self
	}

	/// Sets the progressive chunk size.
	pub fn progressive_chunk_size(mut self, bytes: usize) -> Self {
		self.progressive_chunk_size = bytes;
		self
	}

	/// Sets the recursion bailout depth.
	pub fn max_render_depth(mut self, depth: usize) -> Self {
		self.max_render_depth = depth;
		self
	}

	/// Sets the script nonce.
	pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
		self.nonce = Some(nonce.into());
		self
	}

	/// Sets the inline bootstrap script.
	pub fn bootstrap_script_content(mut self, content: impl Into<String>) -> Self {
		self.bootstrap_script_content = Some(content.into());
		self
	}

	/// Adds a classic bootstrap script.
	pub fn bootstrap_script(mut self, src: impl Into<String>) -> Self {
		self.bootstrap_scripts.push(src.into());
		self
	}

	/// Adds a module bootstrap script.
	pub fn bootstrap_module(mut self, src: impl Into<String>) -> Self {
		self.bootstrap_modules.push(src.into());
		self
	}

	/// Sets the `Link` header budget.
	pub fn max_headers_length(mut self, bytes: usize) -> Self {
		self.max_headers_length = bytes;
		self
	}

	/// Enables or disables the headers channel.
	pub fn emit_headers(mut self, enable: bool) -> Self {
		self.emit_headers = enable;
		self
	}

	/// Sets the stream high-water mark.
	pub fn high_water_mark(mut self, bytes: usize) -> Self {
		self.high_water_mark = bytes;
		self
	}
}

type Callback = Box<dyn FnOnce() + Send>;
type ErrorCallback = Box<dyn FnOnce(&RenderError) + Send>;

/// Lifecycle callbacks of a render.
///
/// All hooks are optional. One-shot hooks are consumed when they fire.
#[derive(Default)]
pub struct RenderHooks {
	pub(crate) on_shell_ready: Option<Callback>,
	pub(crate) on_shell_error: Option<ErrorCallback>,
	pub(crate) on_all_ready: Option<Callback>,
	pub(crate) on_error: Option<Box<dyn FnMut(&RenderError) -> Option<String> + Send>>,
	pub(crate) on_postpone: Option<Box<dyn FnMut(&str) + Send>>,
	pub(crate) on_fatal_error: Option<ErrorCallback>,
	pub(crate) on_headers: Option<Box<dyn FnOnce(Headers) + Send>>,
}

impl RenderHooks {
	/// Creates an empty set of hooks.
	pub fn new() -> Self {
		Self::default()
	}

	/// Called once when the shell (everything outside boundaries) is complete.
	pub fn on_shell_ready(mut self, f: impl FnOnce() + Send + 'static) -> Self {
		self.on_shell_ready = Some(Box::new(f));
		self
	}

	/// Called once if the shell cannot be produced.
	pub fn on_shell_error(mut self, f: impl FnOnce(&RenderError) + Send + 'static) -> Self {
		self.on_shell_error = Some(Box::new(f));
		self
	}

	/// Called once when every task has finished.
	pub fn on_all_ready(mut self, f: impl FnOnce() + Send + 'static) -> Self {
		self.on_all_ready = Some(Box::new(f));
		self
	}

	/// Called for every caught error; the returned digest is sent to the
	/// client with the client-rendered boundary.
	pub fn on_error(
		mut self,
		f: impl FnMut(&RenderError) -> Option<String> + Send + 'static,
	) -> Self {
		self.on_error = Some(Box::new(f));
		self
	}

	/// Called with the reason whenever a prerender leaves a hole.
	pub fn on_postpone(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
		self.on_postpone = Some(Box::new(f));
		self
	}

	/// Called once when the request fails as a whole.
	pub fn on_fatal_error(mut self, f: impl FnOnce(&RenderError) + Send + 'static) -> Self {
		self.on_fatal_error = Some(Box::new(f));
		self
	}

	/// Called once, before the shell is flushed, with early `Link` headers.
	pub fn on_headers(mut self, f: impl FnOnce(Headers) + Send + 'static) -> Self {
		self.on_headers = Some(Box::new(f));
		self
	}
}

impl fmt::Debug for RenderHooks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderHooks")
			.field("on_shell_ready", &self.on_shell_ready.is_some())
			.field("on_shell_error", &self.on_shell_error.is_some())
			.field("on_all_ready", &self.on_all_ready.is_some())
			.field("on_error", &self.on_error.is_some())
			.field("on_postpone", &self.on_postpone.is_some())
			.field("on_fatal_error", &self.on_fatal_error.is_some())
			.field("on_headers", &self.on_headers.is_some())
			.finish()
	}
}
