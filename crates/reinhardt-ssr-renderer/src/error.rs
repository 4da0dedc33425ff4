//! Error types for the streaming renderer.
//!
//! [`RenderError`] is what callers see: it reaches `on_error`, the
//! destination's `close_with_error`, and the `Err` side of the public render
//! functions. [`Interrupt`] is internal control flow during the tree walk:
//! suspension and postponement unwind to the nearest node that can defer the
//! work, and only real errors continue to a boundary or the shell.

use crate::thenable::Wakeable;
use reinhardt_ssr_markup::MarkupError;
use std::fmt;
use thiserror::Error;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors produced while rendering a tree.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum RenderError {
	/// A component reported an error.
	#[error("component error: {message}")]
	Component {
		/// Error message.
		message: String,
	},

	/// The render was aborted before this work finished.
	#[error("render aborted: {reason}")]
	Aborted {
		/// Abort reason.
		reason: String,
	},

	/// A component postponed while no prerender was tracking postponed work.
	#[error("postponed outside of a prerender: {reason}")]
	PostponedOutsidePrerender {
		/// Postpone reason.
		reason: String,
	},

	/// Element is structurally invalid.
	#[error("invalid <{tag}> element: {message}")]
	InvalidElement {
		/// Tag name.
		tag: String,
		/// What is wrong.
		message: String,
	},

	/// Tag or attribute name cannot be written safely.
	#[error(transparent)]
	Markup(#[from] MarkupError),

	/// The render was resumed with state it cannot use.
	#[error("invalid postponed state: {0}")]
	InvalidPostponedState(String),

	/// Options failed validation.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl RenderError {
	/// Shorthand for [`RenderError::Component`].
	pub fn component(message: impl Into<String>) -> Self {
		Self::Component {
			message: message.into(),
		}
	}

	/// Shorthand for [`RenderError::Aborted`].
	pub fn aborted(reason: impl Into<String>) -> Self {
		Self::Aborted {
			reason: reason.into(),
		}
	}
}

/// Errors loading or validating [`RenderOptions`](crate::config::RenderOptions).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
	/// The TOML document could not be parsed.
	#[error("failed to parse render options: {0}")]
	Parse(String),

	/// A field holds a value the renderer cannot work with.
	#[error("invalid render option `{field}`: {message}")]
	Invalid {
		/// Field name.
		field: &'static str,
		/// Why the value is rejected.
		message: String,
	},
}

/// Non-local exit from rendering a node.
///
/// Components return `Result<Node, Interrupt>` and use `?` on
/// [`ComponentCx::read`](crate::node::ComponentCx::read), so a pending value
/// unwinds to the walker which defers that node to a new task.
pub enum Interrupt {
	/// Waiting on a value; retry once the wakeable settles.
	Suspend(Wakeable),
	/// Leave this subtree for a later resume.
	Postpone(String),
	/// Render failed.
	Error(RenderError),
}

impl Interrupt {
	/// Builds an [`Interrupt::Error`] from a component message.
	pub fn error(message: impl Into<String>) -> Self {
		Interrupt::Error(RenderError::component(message))
	}
}

impl From<RenderError> for Interrupt {
	fn from(error: RenderError) -> Self {
		Interrupt::Error(error)
	}
}

impl From<MarkupError> for Interrupt {
	fn from(error: MarkupError) -> Self {
		Interrupt::Error(error.into())
	}
}

impl fmt::Debug for Interrupt {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Interrupt::Suspend(_) => f.write_str("Suspend"),
			Interrupt::Postpone(reason) => f.debug_tuple("Postpone").field(reason).finish(),
			Interrupt::Error(e) => f.debug_tuple("Error").field(e).finish(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_display_messages() {
		assert_eq!(
			RenderError::component("boom").to_string(),
			"component error: boom"
		);
		assert_eq!(
			RenderError::aborted("client went away").to_string(),
			"render aborted: client went away"
		);
		assert_eq!(
			RenderError::from(ConfigError::Invalid {
				field: "progressive_chunk_size",
				message: "must be greater than zero".into(),
			})
			.to_string(),
			"invalid render option `progressive_chunk_size`: must be greater than zero"
		);
	}

	#[rstest]
	fn test_markup_error_converts_to_interrupt() {
		let interrupt: Interrupt = MarkupError::InvalidTagName("a b".into()).into();
		assert!(matches!(
			interrupt,
			Interrupt::Error(RenderError::Markup(MarkupError::InvalidTagName(_)))
		));
	}
}
