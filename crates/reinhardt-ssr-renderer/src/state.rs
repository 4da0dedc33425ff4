//! Per-request render state.
//!
//! [`ResumableState`] is the part that must survive from a prerender into its
//! resume: which runtime helpers and resources the prelude already sent.
//! [`RenderState`] holds everything else discovered while rendering that is
//! written outside of the segment tree (document preamble, hoisted head
//! tags, bootstrap scripts, early headers).

use crate::arena::SegmentId;
use crate::config::{Headers, RenderOptions};
use reinhardt_ssr_markup::chunk::ChunkBuffer;
use reinhardt_ssr_markup::escape::{escape_attr, escape_script_body};
use reinhardt_ssr_markup::instructions::{Instructions, StylesheetRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// State shared by a prerender and the resume that completes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumableState {
	/// Prefix of every runtime id.
	pub id_prefix: String,
	/// Runtime helpers already sent.
	pub instructions: Instructions,
	/// Stylesheet URLs already sent.
	pub styles: BTreeSet<String>,
	/// Async script URLs already sent.
	pub scripts: BTreeSet<String>,
	/// Preload and preconnect hints already sent, keyed by `"{rel} {href}"`.
	pub preloads: BTreeSet<String>,
	/// The document has an `<html>` element whose end tag is still owed.
	pub has_html: bool,
	/// The document has a `<body>` element whose end tag is still owed.
	pub has_body: bool,
}

impl ResumableState {
	pub(crate) fn new(id_prefix: impl Into<String>) -> Self {
		Self {
			id_prefix: id_prefix.into(),
			..Self::default()
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StylesheetState {
	Pending,
	Sent,
}

/// A `<link rel="stylesheet" precedence>` resource.
#[derive(Debug)]
pub(crate) struct Stylesheet {
	pub(crate) href: String,
	pub(crate) precedence: String,
	pub(crate) chunks: ChunkBuffer,
	pub(crate) state: StylesheetState,
	/// Discovered outside every boundary, so the shell depends on it.
	pub(crate) in_shell: bool,
}

/// Output routed around the segment tree.
#[derive(Debug, Default)]
pub(crate) struct RenderState {
	pub(crate) html_start: ChunkBuffer,
	pub(crate) head_start: ChunkBuffer,
	pub(crate) head_segment: Option<SegmentId>,
	pub(crate) charset: ChunkBuffer,
	pub(crate) preconnects: ChunkBuffer,
	pub(crate) preloads: ChunkBuffer,
	pub(crate) scripts: ChunkBuffer,
	pub(crate) hoistable_chunks: ChunkBuffer,
	/// Precedence groups in the order they were first seen.
	pub(crate) precedences: Vec<String>,
	pub(crate) stylesheets: Vec<Stylesheet>,
	pub(crate) stylesheet_index: HashMap<String, usize>,
	pub(crate) bootstrap: ChunkBuffer,
	/// `Link` header entries collected before the shell completed.
	pub(crate) header_links: Vec<String>,
	pub(crate) headers_sent: bool,
}

impl RenderState {
	pub(crate) fn new(options: &RenderOptions) -> Self {
		Self {
			bootstrap: bootstrap_chunks(options),
			..Self::default()
		}
	}

	/// Registers a stylesheet and returns its index, or `None` if the
	/// prelude of a resumed render already sent it.
	pub(crate) fn register_stylesheet(
		&mut self,
		resumable: &ResumableState,
		href: &str,
		precedence: &str,
		chunks: ChunkBuffer,
		in_shell: bool,
	) -> Option<usize> {
		if let Some(&index) = self.stylesheet_index.get(href) {
			self.stylesheets[index].in_shell |= in_shell;
			return Some(index);
		}
		if resumable.styles.contains(href) {
			return None;
		}
		if !self.precedences.iter().any(|p| p == precedence) {
			self.precedences.push(precedence.to_string());
		}
		let index = self.stylesheets.len();
		self.stylesheets.push(Stylesheet {
			href: href.to_string(),
			precedence: precedence.to_string(),
			chunks,
			state: StylesheetState::Pending,
			in_shell,
		});
		self.stylesheet_index.insert(href.to_string(), index);
		Some(index)
	}

	/// Moves pending stylesheets into `buf`, grouped by precedence.
	pub(crate) fn write_stylesheets(
		&mut self,
		resumable: &mut ResumableState,
		buf: &mut ChunkBuffer,
		shell_only: bool,
	) {
		for precedence in &self.precedences {
			for sheet in self.stylesheets.iter_mut() {
				if sheet.precedence != *precedence
					|| sheet.state == StylesheetState::Sent
					|| (shell_only && !sheet.in_shell)
				{
					continue;
				}
				buf.append(&mut sheet.chunks);
				sheet.state = StylesheetState::Sent;
				resumable.styles.insert(sheet.href.clone());
			}
		}
	}

	/// Returns the unsent stylesheets among `indices` and marks them sent.
	pub(crate) fn take_boundary_stylesheets(
		&mut self,
		resumable: &mut ResumableState,
		indices: &[usize],
	) -> Vec<StylesheetRef> {
		let mut refs = Vec::new();
		for &index in indices {
			let Some(sheet) = self.stylesheets.get_mut(index) else {
				continue;
			};
			if sheet.state == StylesheetState::Sent {
				continue;
			}
			sheet.state = StylesheetState::Sent;
			sheet.chunks.clear();
			resumable.styles.insert(sheet.href.clone());
			refs.push(StylesheetRef {
				href: sheet.href.clone(),
				precedence: sheet.precedence.clone(),
			});
		}
		refs
	}

	/// Writes the unsent stylesheets among `indices` in place, for boundary
	/// content inlined after the preamble was sent.
	pub(crate) fn write_stylesheets_inline(
		&mut self,
		resumable: &mut ResumableState,
		buf: &mut ChunkBuffer,
		indices: &[usize],
	) {
		for &index in indices {
			let Some(sheet) = self.stylesheets.get_mut(index) else {
				continue;
			};
			if sheet.state == StylesheetState::Sent {
				continue;
			}
			buf.append(&mut sheet.chunks);
			sheet.state = StylesheetState::Sent;
			resumable.styles.insert(sheet.href.clone());
		}
	}

	/// Moves every resource chunk discovered since the last call into `buf`.
	pub(crate) fn write_hoistables(&mut self, buf: &mut ChunkBuffer) {
		buf.append(&mut self.charset);
		buf.append(&mut self.preconnects);
		buf.append(&mut self.preloads);
		buf.append(&mut self.scripts);
		buf.append(&mut self.hoistable_chunks);
	}

	pub(crate) fn has_pending_hoistables(&self) -> bool {
		!(self.charset.is_empty()
			&& self.preconnects.is_empty()
			&& self.preloads.is_empty()
			&& self.scripts.is_empty()
			&& self.hoistable_chunks.is_empty())
			|| self
				.stylesheets
				.iter()
				.any(|s| s.in_shell && s.state == StylesheetState::Pending)
	}

	/// Records a `Link` header entry if the headers have not been sent yet.
	pub(crate) fn add_header_link(&mut self, entry: String) {
		if !self.headers_sent {
			self.header_links.push(entry);
		}
	}

	/// Builds the early headers, keeping whole entries within `budget` bytes.
	pub(crate) fn take_headers(&mut self, budget: usize) -> Headers {
		self.headers_sent = true;
		let mut value = String::new();
		for entry in self.header_links.drain(..) {
			let extra = if value.is_empty() {
				entry.len()
			} else {
				entry.len() + 2
			};
			if value.len() + extra > budget {
				break;
			}
			if !value.is_empty() {
				value.push_str(", ");
			}
			value.push_str(&entry);
		}
		let mut headers = Headers::new();
		if !value.is_empty() {
			headers.insert("Link".to_string(), value);
		}
		headers
	}
}

/// Escapes a URL for use inside `<…>` of a `Link` header.
pub(crate) fn escape_link_href(href: &str) -> String {
	let mut out = String::with_capacity(href.len());
	for c in href.chars() {
		match c {
			'<' => out.push_str("%3C"),
			'>' => out.push_str("%3E"),
			'\n' => out.push_str("%0A"),
			'\r' => out.push_str("%0D"),
			_ => out.push(c),
		}
	}
	out
}

/// Escapes a parameter value of a `Link` header entry.
pub(crate) fn escape_link_param(value: &str) -> String {
	value
		.chars()
		.filter(|c| !matches!(c, '\n' | '\r'))
		.map(|c| if c == '"' { '\'' } else { c })
		.collect()
}

fn push_nonce(buf: &mut ChunkBuffer, nonce: Option<&str>) {
	if let Some(nonce) = nonce {
		buf.push_static(" nonce=\"");
		buf.push_str(&escape_attr(nonce));
		buf.push_static("\"");
	}
}

fn bootstrap_chunks(options: &RenderOptions) -> ChunkBuffer {
	let nonce = options.nonce.as_deref();
	let mut buf = ChunkBuffer::new();
	if let Some(content) = &options.bootstrap_script_content {
		buf.push_static("<script");
		push_nonce(&mut buf, nonce);
		buf.push_static(">");
		buf.push_str(&escape_script_body(content));
		buf.push_static("</script>");
	}
	for src in &options.bootstrap_scripts {
		buf.push_static("<script src=\"");
		buf.push_str(&escape_attr(src));
		buf.push_static("\"");
		push_nonce(&mut buf, nonce);
		buf.push_static(" async=\"\"></script>");
	}
	for src in &options.bootstrap_modules {
		buf.push_static("<script type=\"module\" src=\"");
		buf.push_str(&escape_attr(src));
		buf.push_static("\"");
		push_nonce(&mut buf, nonce);
		buf.push_static(" async=\"\"></script>");
	}
	buf
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn sheet(href: &str) -> ChunkBuffer {
		let mut buf = ChunkBuffer::new();
		buf.push(format!("<link rel=\"stylesheet\" href=\"{href}\">"));
		buf
	}

	#[rstest]
	fn test_stylesheets_grouped_by_first_seen_precedence() {
		let mut state = RenderState::default();
		let mut resumable = ResumableState::default();
		state.register_stylesheet(&resumable, "/a.css", "low", sheet("/a.css"), true);
		state.register_stylesheet(&resumable, "/b.css", "high", sheet("/b.css"), true);
		state.register_stylesheet(&resumable, "/c.css", "low", sheet("/c.css"), true);

		let mut buf = ChunkBuffer::new();
		state.write_stylesheets(&mut resumable, &mut buf, false);

		let out = buf.to_string();
		let a = out.find("/a.css").unwrap();
		let b = out.find("/b.css").unwrap();
		let c = out.find("/c.css").unwrap();
		assert!(a < c && c < b);
		assert_eq!(resumable.styles.len(), 3);
	}

	#[rstest]
	fn test_stylesheet_already_sent_by_prelude_is_skipped() {
		let mut state = RenderState::default();
		let mut resumable = ResumableState::default();
		resumable.styles.insert("/a.css".to_string());

		assert_eq!(
			state.register_stylesheet(&resumable, "/a.css", "p", sheet("/a.css"), false),
			None
		);
	}

	#[rstest]
	fn test_boundary_stylesheets_sent_once() {
		let mut state = RenderState::default();
		let mut resumable = ResumableState::default();
		let index = state
			.register_stylesheet(&resumable, "/x.css", "p", sheet("/x.css"), false)
			.unwrap();

		let first = state.take_boundary_stylesheets(&mut resumable, &[index]);
		let second = state.take_boundary_stylesheets(&mut resumable, &[index]);

		assert_eq!(first.len(), 1);
		assert_eq!(first[0].precedence, "p");
		assert!(second.is_empty());
	}

	#[rstest]
	fn test_headers_respect_budget() {
		let mut state = RenderState::default();
		state.add_header_link("</a.css>; rel=preload; as=\"style\"".to_string());
		state.add_header_link("</b.css>; rel=preload; as=\"style\"".to_string());

		let headers = state.take_headers(40);
		assert_eq!(headers["Link"], "</a.css>; rel=preload; as=\"style\"");

		state.add_header_link("<late>".to_string());
		assert!(state.header_links.is_empty());
	}

	#[rstest]
	fn test_bootstrap_scripts_carry_nonce() {
		let options = RenderOptions::new()
			.nonce("n1")
			.bootstrap_script_content("go()")
			.bootstrap_module("/m.js");
		let state = RenderState::new(&options);

		assert_eq!(
			state.bootstrap.to_string(),
			"<script nonce=\"n1\">go()</script><script type=\"module\" src=\"/m.js\" nonce=\"n1\" async=\"\"></script>"
		);
	}

	#[rstest]
	#[case("/a b", "/a b")]
	#[case("/<x>", "/%3Cx%3E")]
	fn test_escape_link_href(#[case] input: &str, #[case] expected: &str) {
		assert_eq!(escape_link_href(input), expected);
	}
}
