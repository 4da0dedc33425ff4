//! Element rendering: validation, resource hoisting, document structure and
//! form-control special cases.

use crate::arena::Segment;
use crate::error::{Interrupt, RenderError};
use crate::node::{Element, Node};
use crate::request::Request;
use crate::state::{escape_link_href, escape_link_param};
use crate::tree::KeySegment;
use crate::walk::WalkCx;
use reinhardt_ssr_markup::attributes::{AttrValue, push_attribute};
use reinhardt_ssr_markup::chunk::ChunkBuffer;
use reinhardt_ssr_markup::escape::{escape_attr, escape_script_body, escape_style_body, escape_text};
use reinhardt_ssr_markup::format::{
	InsertionMode, SelectedValue, check_tag_name, is_preformatted, is_void_element,
};
use reinhardt_ssr_markup::style::format_number;

fn invalid(tag: &str, message: &str) -> Interrupt {
	Interrupt::Error(RenderError::InvalidElement {
		tag: tag.to_string(),
		message: message.to_string(),
	})
}

/// String form of an attribute, if it has one.
fn attr_text(element: &Element, name: &str) -> Option<String> {
	element
		.get_attr(name)
		.and_then(AttrValue::as_text)
		.map(|v| v.into_owned())
}

fn has_attr(element: &Element, name: &str) -> bool {
	element
		.get_attr(name)
		.is_some_and(|v| !matches!(v, AttrValue::Null))
}

/// Concatenated text of `children`, or `None` if any child is not text.
fn plain_text(children: &[Node]) -> Option<String> {
	let mut out = String::new();
	for child in children {
		match child {
			Node::Empty => {}
			Node::Text(text) => out.push_str(text),
			Node::Number(n) => out.push_str(&format_number(*n)),
			_ => return None,
		}
	}
	Some(out)
}

fn write_attrs(buf: &mut ChunkBuffer, element: &Element, skip: &[&str]) {
	for (name, value) in element.attrs() {
		if !skip.contains(&name) {
			push_attribute(buf, name, value);
		}
	}
}

/// `<tag attrs/>`
fn write_void_tag(buf: &mut ChunkBuffer, tag: &'static str, element: &Element, skip: &[&str]) {
	buf.push_static("<");
	buf.push_static(tag);
	write_attrs(buf, element, skip);
	buf.push_static("/>");
}

/// `defaultValue`/`defaultChecked` stand in for `value`/`checked` when those
/// are absent.
fn write_input_attrs(buf: &mut ChunkBuffer, element: &Element) {
	let has_value = has_attr(element, "value");
	let has_checked = has_attr(element, "checked");
	for (name, value) in element.attrs() {
		match name {
			"defaultValue" if !has_value => push_attribute(buf, "value", value),
			"defaultChecked" if !has_checked => push_attribute(buf, "checked", value),
			_ => push_attribute(buf, name, value),
		}
	}
}

fn select_value(element: &Element) -> Option<SelectedValue> {
	let value = element
		.get_attr("value")
		.filter(|v| !matches!(v, AttrValue::Null))
		.or_else(|| element.get_attr("defaultValue"))?;
	match value {
		AttrValue::List(items) => Some(SelectedValue::Multiple(
			items.iter().map(|s| s.to_string()).collect(),
		)),
		other => other.as_text().map(|v| SelectedValue::Single(v.into_owned())),
	}
}

fn option_value(element: &Element) -> String {
	attr_text(element, "value")
		.or_else(|| plain_text(element.child_nodes()))
		.unwrap_or_default()
}

fn textarea_value(element: &Element) -> Option<String> {
	attr_text(element, "value")
		.or_else(|| attr_text(element, "defaultValue"))
		.map_or_else(|| plain_text(element.child_nodes()), Some)
}

impl Request {
	pub(crate) fn render_element(&mut self, cx: &mut WalkCx, element: &Element) -> Result<(), Interrupt> {
		let tag = element.tag();
		check_tag_name(tag)?;
		let has_children = !element.child_nodes().is_empty();
		let inner_html = element.inner_html_content();
		if is_void_element(tag) && (has_children || inner_html.is_some()) {
			return Err(invalid(tag, "void elements cannot have children"));
		}
		if has_children && inner_html.is_some() {
			return Err(invalid(tag, "children and inner_html are mutually exclusive"));
		}

		if !cx.discard {
			if cx.format.allows_hoisting() && self.hoist_element(cx, element) {
				return Ok(());
			}
			match (tag, cx.format.mode) {
				("html", InsertionMode::Root) if self.render_state.html_start.is_empty() => {
					return self.render_html(cx, element);
				}
				("head", InsertionMode::Root | InsertionMode::HtmlHtml)
					if self.render_state.head_segment.is_none() =>
				{
					return self.render_head(cx, element);
				}
				_ => {}
			}
		}
		self.render_generic(cx, element)
	}

	/// Moves a head-only element into the preamble. Returns `false` if the
	/// element must be rendered in place.
	fn hoist_element(&mut self, cx: &WalkCx, element: &Element) -> bool {
		if has_attr(element, "itemProp") {
			return false;
		}
		match element.tag() {
			"title" => self.hoist_title(element),
			"meta" => {
				let target = if has_attr(element, "charSet") || has_attr(element, "charset") {
					&mut self.render_state.charset
				} else {
					&mut self.render_state.hoistable_chunks
				};
				write_void_tag(target, "meta", element, &[]);
				true
			}
			"link" => self.hoist_link(cx, element),
			"script" => self.hoist_script(element),
			_ => false,
		}
	}

	fn hoist_title(&mut self, element: &Element) -> bool {
		let Some(text) = plain_text(element.child_nodes()) else {
			return false;
		};
		let buf = &mut self.render_state.hoistable_chunks;
		buf.push_static("<title");
		write_attrs(buf, element, &[]);
		buf.push_static(">");
		buf.push_str(&escape_text(&text));
		buf.push_static("</title>");
		true
	}

	fn hoist_link(&mut self, cx: &WalkCx, element: &Element) -> bool {
		let Some(rel) = attr_text(element, "rel") else {
			return false;
		};
		let rel = rel.to_ascii_lowercase();
		let href = attr_text(element, "href");
		match (rel.as_str(), href) {
			("stylesheet", Some(href)) => {
				let Some(precedence) = attr_text(element, "precedence") else {
					return false;
				};
				let mut chunks = ChunkBuffer::new();
				chunks.push_static("<link");
				write_attrs(&mut chunks, element, &["precedence"]);
				chunks.push_static(" data-precedence=\"");
				chunks.push_str(&escape_attr(&precedence));
				chunks.push_static("\"/>");

				let is_new = !self.render_state.stylesheet_index.contains_key(&href)
					&& !self.resumable_state.styles.contains(&href);
				let index = self.render_state.register_stylesheet(
					&self.resumable_state,
					&href,
					&precedence,
					chunks,
					cx.boundary.is_none(),
				);
				if let (Some(index), Some(b)) = (index, cx.boundary) {
					let stylesheets = &mut self.boundaries[b].content_state.stylesheets;
					if !stylesheets.contains(&index) {
						stylesheets.push(index);
					}
				}
				if is_new {
					self.queue_header_link(format!(
						"<{}>; rel=preload; as=\"style\"",
						escape_link_href(&href)
					));
				}
				true
			}
			("stylesheet", None) => false,
			("preload" | "modulepreload", Some(href)) => {
				if self.resumable_state.preloads.insert(format!("{rel} {href}")) {
					write_void_tag(&mut self.render_state.preloads, "link", element, &[]);
					let entry = match attr_text(element, "as") {
						Some(kind) if rel == "preload" => format!(
							"<{}>; rel=preload; as=\"{}\"",
							escape_link_href(&href),
							escape_link_param(&kind)
						),
						_ => format!("<{}>; rel={rel}", escape_link_href(&href)),
					};
					self.queue_header_link(entry);
				}
				true
			}
			("preconnect" | "dns-prefetch", Some(href)) => {
				if self.resumable_state.preloads.insert(format!("{rel} {href}")) {
					write_void_tag(&mut self.render_state.preconnects, "link", element, &[]);
					self.queue_header_link(format!("<{}>; rel={rel}", escape_link_href(&href)));
				}
				true
			}
			_ => {
				write_void_tag(&mut self.render_state.hoistable_chunks, "link", element, &[]);
				true
			}
		}
	}

	fn hoist_script(&mut self, element: &Element) -> bool {
		let is_async = element.get_attr("async").is_some_and(AttrValue::is_truthy);
		let Some(src) = attr_text(element, "src") else {
			return false;
		};
		if !is_async
			|| !element.child_nodes().is_empty()
			|| element.inner_html_content().is_some()
		{
			return false;
		}
		if self.resumable_state.scripts.insert(src) {
			let buf = &mut self.render_state.scripts;
			buf.push_static("<script");
			write_attrs(buf, element, &[]);
			buf.push_static("></script>");
		}
		true
	}

	/// `<html>` at the top of a document opens the preamble.
	fn render_html(&mut self, cx: &mut WalkCx, element: &Element) -> Result<(), Interrupt> {
		let start = &mut self.render_state.html_start;
		start.push_static("<!DOCTYPE html><html");
		write_attrs(start, element, &[]);
		start.push_static(">");
		self.resumable_state.has_html = true;

		let format = cx.format.child("html", None);
		let previous = std::mem::replace(&mut cx.format, format);
		cx.key_path.push(KeySegment::named("html"));
		let result = self.render_children(cx, element.child_nodes());
		cx.key_path.pop();
		cx.format = previous;
		Ok(result?)
	}

	/// `<head>` renders into its own segment, written with the preamble.
	fn render_head(&mut self, cx: &mut WalkCx, element: &Element) -> Result<(), Interrupt> {
		let start = &mut self.render_state.head_start;
		start.push_static("<head");
		write_attrs(start, element, &[]);
		start.push_static(">");

		let format = cx.format.child("head", None);
		let segment = self.segments.push(Segment::new(0, format.clone(), false, false));
		self.render_state.head_segment = Some(segment);
		let mut head_cx = WalkCx {
			segment,
			format,
			..cx.clone()
		};
		head_cx.key_path.push(KeySegment::named("head"));
		self.render_children(&mut head_cx, element.child_nodes())?;
		self.finish_segment(segment);
		Ok(())
	}

	fn render_generic(&mut self, cx: &mut WalkCx, element: &Element) -> Result<(), Interrupt> {
		let tag = element.tag();
		let mut start = ChunkBuffer::new();
		start.push_static("<");
		start.push_str(tag);
		let mut selected = None;
		match tag {
			"select" => {
				selected = select_value(element);
				write_attrs(&mut start, element, &["value", "defaultValue"]);
			}
			"option" => match &cx.format.selected_value {
				Some(select) => {
					write_attrs(&mut start, element, &["selected"]);
					if select.contains(&option_value(element)) {
						start.push_static(" selected=\"\"");
					}
				}
				None => write_attrs(&mut start, element, &[]),
			},
			"textarea" => write_attrs(&mut start, element, &["value", "defaultValue"]),
			"input" => write_input_attrs(&mut start, element),
			_ => write_attrs(&mut start, element, &[]),
		}

		let seg = &mut self.segments[cx.segment];
		seg.last_pushed_text = false;
		if is_void_element(tag) {
			start.push_static("/>");
			seg.chunks.append(&mut start);
			return Ok(());
		}
		start.push_static(">");
		seg.chunks.append(&mut start);

		if let Some(html) = element.inner_html_content() {
			if is_preformatted(tag) && html.starts_with('\n') {
				seg.chunks.push_static("\n");
			}
			seg.chunks.push_str(html);
		} else if tag == "textarea" {
			let value = textarea_value(element)
				.ok_or_else(|| invalid(tag, "children must be text"))?;
			if value.starts_with('\n') {
				seg.chunks.push_static("\n");
			}
			seg.chunks.push_str(&escape_text(&value));
		} else if matches!(tag, "script" | "style") {
			let body = plain_text(element.child_nodes())
				.ok_or_else(|| invalid(tag, "children must be text"))?;
			let escaped = if tag == "script" {
				escape_script_body(&body)
			} else {
				escape_style_body(&body)
			};
			seg.chunks.push_str(&escaped);
		} else {
			if is_preformatted(tag) {
				if let Some(Node::Text(text)) = element.child_nodes().first() {
					if text.starts_with('\n') {
						seg.chunks.push_static("\n");
					}
				}
			}
			let format = cx.format.child(tag, selected);
			let previous = std::mem::replace(&mut cx.format, format);
			cx.key_path.push(KeySegment::named(tag));
			let result = self.render_children(cx, element.child_nodes());
			cx.key_path.pop();
			cx.format = previous;
			result?;
		}

		if tag == "body" && matches!(cx.format.mode, InsertionMode::Root | InsertionMode::HtmlHtml) {
			// Closed by the postamble once everything else was written.
			self.resumable_state.has_body = true;
		} else {
			let seg = &mut self.segments[cx.segment];
			seg.chunks.push_static("</");
			seg.chunks.push_str(tag);
			seg.chunks.push_static(">");
		}
		self.segments[cx.segment].last_pushed_text = false;
		Ok(())
	}
}
