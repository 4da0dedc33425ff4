//! # Reinhardt SSR Markup
//!
//! Wire-level building blocks for streaming server rendering.
//!
//! ## Modules
//!
//! - [`escape`]: text, attribute, script and style escaping
//! - [`url`]: `javascript:` URL blocking
//! - [`attributes`]: the attribute lookup table and serializer
//! - [`style`]: inline style serialization
//! - [`format`]: insertion modes and hidden segment containers
//! - [`markers`]: boundary comment markers and runtime ids
//! - [`instructions`]: the inline-script protocol (`$RS`, `$RC`, `$RR`, `$RX`)
//! - [`chunk`]: output chunks and the segment buffer
//!
//! ## Example
//!
//! ```
//! use reinhardt_ssr_markup::prelude::*;
//!
//! let mut buf = ChunkBuffer::new();
//! buf.push_static("<a");
//! push_attribute(&mut buf, "href", &"javascript:alert(1)".into());
//! buf.push_static(">");
//! assert!(buf.to_string().contains("blocked as a security precaution"));
//! ```

pub mod attributes;
pub mod chunk;
pub mod error;
pub mod escape;
pub mod format;
pub mod instructions;
pub mod markers;
pub mod style;
pub mod url;

pub use error::{MarkupError, MarkupResult};

/// Commonly used items.
pub mod prelude {
	pub use crate::attributes::{AttrValue, AttributeRule, attribute_rule, push_attribute};
	pub use crate::chunk::{Chunk, ChunkBuffer};
	pub use crate::error::{MarkupError, MarkupResult};
	pub use crate::escape::{
		escape_attr, escape_json_for_script, escape_script_body, escape_style_body, escape_text,
	};
	pub use crate::format::{FormatContext, InsertionMode, Namespace, SelectedValue};
	pub use crate::instructions::{Instructions, StylesheetRef};
	pub use crate::markers::{IdKind, format_id};
	pub use crate::style::{StyleMap, StyleValue, serialize_style};
	pub use crate::url::{BLOCKED_URL_SENTINEL, sanitize_url};
}
