//! Insertion modes and the hidden containers used for out-of-band segments.
//!
//! A segment rendered after its placeholder was streamed is written inside a
//! hidden container and moved into place by an inline script. The container
//! must be valid markup wherever the parser currently is, so a table row is
//! wrapped in `<table hidden><tr>` rather than a `<div>`.

use crate::chunk::ChunkBuffer;
use crate::error::{MarkupError, MarkupResult};
use crate::escape::escape_attr;
use serde::{Deserialize, Serialize};

/// Root namespace of a render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
	/// A whole document or an HTML fragment.
	#[default]
	Html,
	/// An SVG fragment.
	Svg,
	/// A MathML fragment.
	Math,
}

/// Where in the document the parser is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionMode {
	/// Top of the document, before `<html>`.
	Root,
	/// Directly inside `<html>`.
	HtmlHtml,
	/// Inside `<head>`.
	HtmlHead,
	/// Ordinary HTML flow content.
	Html,
	/// Inside `<svg>`.
	Svg,
	/// Inside `<math>`.
	MathMl,
	/// Inside `<table>`.
	Table,
	/// Inside `<thead>`, `<tbody>` or `<tfoot>`.
	TableBody,
	/// Inside `<tr>`.
	TableRow,
	/// Inside `<colgroup>`.
	ColGroup,
}

/// Value(s) of the enclosing `<select>`, used to mark `<option selected>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectedValue {
	/// `<select value="a">`.
	Single(String),
	/// `<select multiple value={["a", "b"]}>`.
	Multiple(Vec<String>),
}

impl SelectedValue {
	/// Returns `true` if `value` is selected.
	pub fn contains(&self, value: &str) -> bool {
		match self {
			SelectedValue::Single(v) => v == value,
			SelectedValue::Multiple(values) => values.iter().any(|v| v == value),
		}
	}
}

/// Context inherited from ancestors that changes how children are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatContext {
	/// Current insertion mode.
	pub mode: InsertionMode,
	/// Value of the enclosing `<select>`, if any.
	pub selected_value: Option<SelectedValue>,
	/// Inside `<noscript>`; hoisting is disabled.
	pub no_script: bool,
}

impl FormatContext {
	/// Initial context for a render in `namespace`.
	pub fn root(namespace: Namespace) -> Self {
		let mode = match namespace {
			Namespace::Html => InsertionMode::Root,
			Namespace::Svg => InsertionMode::Svg,
			Namespace::Math => InsertionMode::MathMl,
		};
		Self::with_mode(mode)
	}

	fn with_mode(mode: InsertionMode) -> Self {
		Self {
			mode,
			selected_value: None,
			no_script: false,
		}
	}

	/// Context for the children of a `<tag>` element.
	///
	/// `selected` is the value of the element when `tag` is `select`.
	pub fn child(&self, tag: &str, selected: Option<SelectedValue>) -> Self {
		use InsertionMode::*;
		let mode = match tag {
			"select" => {
				return Self {
					mode: Html,
					selected_value: selected,
					no_script: self.no_script,
				};
			}
			"noscript" => {
				return Self {
					mode: Html,
					selected_value: None,
					no_script: true,
				};
			}
			"svg" => Svg,
			"math" => MathMl,
			"foreignObject" => Html,
			"table" => Table,
			"thead" | "tbody" | "tfoot" => TableBody,
			"colgroup" => ColGroup,
			"tr" => TableRow,
			"head" if matches!(self.mode, Root | HtmlHtml) => HtmlHead,
			"html" if self.mode == Root => HtmlHtml,
			_ => match self.mode {
				Svg | MathMl | Html => return self.clone(),
				Root | HtmlHtml | HtmlHead | Table | TableBody | TableRow | ColGroup => Html,
			},
		};
		Self {
			mode,
			selected_value: None,
			no_script: self.no_script,
		}
	}

	/// Returns `true` where `<title>`, `<meta>` and `<link>` may be hoisted to
	/// the document head.
	pub fn allows_hoisting(&self) -> bool {
		!self.no_script && !matches!(self.mode, InsertionMode::Svg | InsertionMode::MathMl)
	}
}

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
	"wbr",
];

/// Returns `true` for void elements.
pub fn is_void_element(tag: &str) -> bool {
	VOID_ELEMENTS.contains(&tag)
}

/// Returns `true` for elements whose first newline is dropped by the parser.
pub fn is_preformatted(tag: &str) -> bool {
	matches!(tag, "pre" | "textarea" | "listing")
}

/// Checks that `tag` can be written verbatim into a start tag.
pub fn check_tag_name(tag: &str) -> MarkupResult<()> {
	let mut chars = tag.chars();
	let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '-'));
	if valid {
		Ok(())
	} else {
		Err(MarkupError::InvalidTagName(tag.to_string()))
	}
}

/// Opens the hidden container for an out-of-band segment.
pub fn write_start_segment(buf: &mut ChunkBuffer, mode: InsertionMode, id: &str) {
	use InsertionMode::*;
	let opening = match mode {
		Root | HtmlHtml | HtmlHead | Html => "<div hidden id=\"",
		Svg => "<svg aria-hidden=\"true\" style=\"display:none\" id=\"",
		MathMl => "<math aria-hidden=\"true\" style=\"display:none\" id=\"",
		Table => "<table hidden id=\"",
		TableBody => "<table hidden><tbody id=\"",
		TableRow => "<table hidden><tr id=\"",
		ColGroup => "<table hidden><colgroup id=\"",
	};
	buf.push_static(opening);
	buf.push_str(&escape_attr(id));
	buf.push_static("\">");
}

/// Closes the container opened by [`write_start_segment`].
pub fn write_end_segment(buf: &mut ChunkBuffer, mode: InsertionMode) {
	use InsertionMode::*;
	buf.push_static(match mode {
		Root | HtmlHtml | HtmlHead | Html => "</div>",
		Svg => "</svg>",
		MathMl => "</math>",
		Table => "</table>",
		TableBody => "</tbody></table>",
		TableRow => "</tr></table>",
		ColGroup => "</colgroup></table>",
	});
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(InsertionMode::Root, "table", InsertionMode::Table)]
	#[case(InsertionMode::Table, "tbody", InsertionMode::TableBody)]
	#[case(InsertionMode::TableBody, "tr", InsertionMode::TableRow)]
	#[case(InsertionMode::TableRow, "td", InsertionMode::Html)]
	#[case(InsertionMode::Html, "svg", InsertionMode::Svg)]
	#[case(InsertionMode::Svg, "g", InsertionMode::Svg)]
	#[case(InsertionMode::Svg, "foreignObject", InsertionMode::Html)]
	#[case(InsertionMode::Html, "math", InsertionMode::MathMl)]
	#[case(InsertionMode::Root, "html", InsertionMode::HtmlHtml)]
	#[case(InsertionMode::HtmlHtml, "head", InsertionMode::HtmlHead)]
	#[case(InsertionMode::HtmlHtml, "body", InsertionMode::Html)]
	#[case(InsertionMode::Html, "head", InsertionMode::Html)]
	#[case(InsertionMode::Table, "colgroup", InsertionMode::ColGroup)]
	fn test_child_mode(
		#[case] parent: InsertionMode,
		#[case] tag: &str,
		#[case] expected: InsertionMode,
	) {
		let ctx = FormatContext::with_mode(parent);
		assert_eq!(ctx.child(tag, None).mode, expected);
	}

	#[rstest]
	fn test_select_value_flows_to_options() {
		let root = FormatContext::root(Namespace::Html);
		let select = root.child("select", Some(SelectedValue::Single("b".into())));
		let optgroup = select.child("optgroup", None);
		let option = optgroup.child("option", None);

		assert_eq!(
			option.selected_value,
			Some(SelectedValue::Single("b".into()))
		);
		assert_eq!(root.child("div", None).selected_value, None);
	}

	#[rstest]
	fn test_noscript_disables_hoisting() {
		let ctx = FormatContext::root(Namespace::Html).child("noscript", None);
		assert!(!ctx.allows_hoisting());
		assert!(!ctx.child("table", None).allows_hoisting());
	}

	#[rstest]
	#[case(InsertionMode::Html, "<div hidden id=\"S:1\">x</div>")]
	#[case(InsertionMode::Table, "<table hidden id=\"S:1\">x</table>")]
	#[case(InsertionMode::TableBody, "<table hidden><tbody id=\"S:1\">x</tbody></table>")]
	#[case(InsertionMode::TableRow, "<table hidden><tr id=\"S:1\">x</tr></table>")]
	#[case(
		InsertionMode::Svg,
		"<svg aria-hidden=\"true\" style=\"display:none\" id=\"S:1\">x</svg>"
	)]
	fn test_segment_container(#[case] mode: InsertionMode, #[case] expected: &str) {
		let mut buf = ChunkBuffer::new();
		write_start_segment(&mut buf, mode, "S:1");
		buf.push_static("x");
		write_end_segment(&mut buf, mode);
		assert_eq!(buf.to_string(), expected);
	}

	#[rstest]
	#[case("div", true)]
	#[case("my-element", true)]
	#[case("svg:rect", true)]
	#[case("1abc", false)]
	#[case("div onclick", false)]
	#[case("a>", false)]
	fn test_check_tag_name(#[case] tag: &str, #[case] ok: bool) {
		assert_eq!(check_tag_name(tag).is_ok(), ok);
	}

	#[rstest]
	fn test_namespace_deserializes_lowercase() {
		let ns: Namespace = serde_json::from_str("\"svg\"").unwrap();
		assert_eq!(ns, Namespace::Svg);
	}
}
