//! Error types for markup generation.

use thiserror::Error;

/// Result type for markup operations.
pub type MarkupResult<T> = Result<T, MarkupError>;

/// Errors raised while validating names that end up in the markup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MarkupError {
	/// Tag name contains characters that would break out of the tag.
	#[error("invalid tag name: {0:?}")]
	InvalidTagName(String),

	/// Attribute name is not a valid XML name.
	#[error("invalid attribute name: {0:?}")]
	InvalidAttributeName(String),
}
