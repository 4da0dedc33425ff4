//! Comment markers that delimit suspense boundaries and segment placeholders.
//!
//! The client runtime walks these comments to find a boundary's fallback and
//! replace it, so their spelling is part of the wire protocol.

use crate::chunk::ChunkBuffer;
use crate::escape::escape_attr;

/// Opens a boundary whose content is inline.
pub const BOUNDARY_COMPLETED_START: &str = "<!--$-->";
/// Opens a boundary whose content will arrive later.
pub const BOUNDARY_PENDING_START: &str = "<!--$?-->";
/// Opens a boundary the client must render itself.
pub const BOUNDARY_CLIENT_RENDERED_START: &str = "<!--$!-->";
/// Closes any boundary.
pub const BOUNDARY_END: &str = "<!--/$-->";
/// Separates two adjacent text nodes so hydration sees two nodes.
pub const TEXT_SEPARATOR: &str = "<!-- -->";

/// Kind of element id handed to the client runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
	/// Boundary placeholder (`B:`).
	Boundary,
	/// Hidden segment container (`S:`).
	Segment,
	/// Segment placeholder (`P:`).
	Placeholder,
}

impl IdKind {
	fn tag(self) -> &'static str {
		match self {
			IdKind::Boundary => "B:",
			IdKind::Segment => "S:",
			IdKind::Placeholder => "P:",
		}
	}
}

/// Formats a runtime id: `{prefix}B:{n}`, `{prefix}S:{n}` or `{prefix}P:{n}`.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::markers::{format_id, IdKind};
///
/// assert_eq!(format_id("", IdKind::Boundary, 0), "B:0");
/// assert_eq!(format_id("app-", IdKind::Segment, 12), "app-S:12");
/// ```
pub fn format_id(prefix: &str, kind: IdKind, n: u32) -> String {
	format!("{prefix}{}{n}", kind.tag())
}

/// `<!--$?--><template id="B:n"></template>`
pub fn write_pending_boundary_start(buf: &mut ChunkBuffer, boundary_id: &str) {
	buf.push_static(BOUNDARY_PENDING_START);
	buf.push_static("<template id=\"");
	buf.push_str(&escape_attr(boundary_id));
	buf.push_static("\"></template>");
}

/// `<!--$!--><template data-dgst="…"></template>`
pub fn write_client_rendered_boundary_start(buf: &mut ChunkBuffer, digest: Option<&str>) {
	buf.push_static(BOUNDARY_CLIENT_RENDERED_START);
	buf.push_static("<template");
	if let Some(digest) = digest {
		buf.push_static(" data-dgst=\"");
		buf.push_str(&escape_attr(digest));
		buf.push_static("\"");
	}
	buf.push_static("></template>");
}

/// `<!--$-->`
pub fn write_completed_boundary_start(buf: &mut ChunkBuffer) {
	buf.push_static(BOUNDARY_COMPLETED_START);
}

/// `<!--/$-->`
pub fn write_boundary_end(buf: &mut ChunkBuffer) {
	buf.push_static(BOUNDARY_END);
}

/// `<template id="P:n"></template>`
pub fn write_placeholder(buf: &mut ChunkBuffer, placeholder_id: &str) {
	buf.push_static("<template id=\"");
	buf.push_str(&escape_attr(placeholder_id));
	buf.push_static("\"></template>");
}
