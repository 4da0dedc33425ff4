//! Context-specific escaping for streamed markup.
//!
//! Each function targets one insertion context: HTML text, quoted attribute
//! values, raw `<script>`/`<style>` bodies and JSON embedded in a script.
//! All of them return a borrowed [`Cow`] when the input needs no changes.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

static SCRIPT_TAG: OnceLock<Regex> = OnceLock::new();
static STYLE_TAG: OnceLock<Regex> = OnceLock::new();

fn script_tag_pattern() -> &'static Regex {
	SCRIPT_TAG.get_or_init(|| Regex::new(r"(?i)(<\/|<)(s)(cript)").unwrap())
}

fn style_tag_pattern() -> &'static Regex {
	STYLE_TAG.get_or_init(|| Regex::new(r"(?i)(<\/|<)(s)(tyle)").unwrap())
}

/// Escapes HTML special characters in text content.
///
/// This function replaces the following characters:
/// - `&` → `&amp;`
/// - `<` → `&lt;`
/// - `>` → `&gt;`
/// - `"` → `&quot;`
/// - `'` → `&#x27;`
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::escape::escape_text;
///
/// assert_eq!(escape_text("<b>Tom & Jerry</b>"), "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;");
/// assert!(matches!(escape_text("plain"), std::borrow::Cow::Borrowed(_)));
/// ```
pub fn escape_text(s: &str) -> Cow<'_, str> {
	if s.contains(['&', '<', '>', '"', '\'']) {
		let mut escaped = String::with_capacity(s.len() + 8);
		for c in s.chars() {
			match c {
				'&' => escaped.push_str("&amp;"),
				'<' => escaped.push_str("&lt;"),
				'>' => escaped.push_str("&gt;"),
				'"' => escaped.push_str("&quot;"),
				'\'' => escaped.push_str("&#x27;"),
				_ => escaped.push(c),
			}
		}
		Cow::Owned(escaped)
	} else {
		Cow::Borrowed(s)
	}
}

/// Escapes a value placed inside a double-quoted attribute.
///
/// Uses the same character class as [`escape_text`].
pub fn escape_attr(s: &str) -> Cow<'_, str> {
	escape_text(s)
}

/// Neutralizes `<script` and `</script` sequences inside a raw script body.
///
/// The `s` of each match is rewritten as a JavaScript unicode escape
/// (`\u0073` or `\u0053` depending on its case), so the browser tokenizer
/// never sees a tag while the script still evaluates to the same string.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::escape::escape_script_body;
///
/// assert_eq!(
///     escape_script_body("var s = '</script>';"),
///     "var s = '</\\u0073cript>';"
/// );
/// ```
pub fn escape_script_body(s: &str) -> Cow<'_, str> {
	script_tag_pattern().replace_all(s, |caps: &Captures<'_>| {
		let letter = if &caps[2] == "s" { r"\u0073" } else { r"\u0053" };
		format!("{}{}{}", &caps[1], letter, &caps[3])
	})
}

/// Neutralizes `<style` and `</style` sequences inside a raw style body.
///
/// The `s` is rewritten as a CSS escape (`\73 ` or `\53 `).
pub fn escape_style_body(s: &str) -> Cow<'_, str> {
	style_tag_pattern().replace_all(s, |caps: &Captures<'_>| {
		let letter = if &caps[2] == "s" { r"\73 " } else { r"\53 " };
		format!("{}{}{}", &caps[1], letter, &caps[3])
	})
}

/// Escapes serialized JSON for embedding in an inline `<script>`.
///
/// `<` becomes `\u003c` so no closing tag or comment opener can appear, and
/// the line separators U+2028/U+2029 are escaped for older script parsers.
pub fn escape_json_for_script(json: &str) -> Cow<'_, str> {
	if json.contains(['<', '\u{2028}', '\u{2029}']) {
		let mut escaped = String::with_capacity(json.len() + 16);
		for c in json.chars() {
			match c {
				'<' => escaped.push_str(r"\u003c"),
				'\u{2028}' => escaped.push_str(r"\u2028"),
				'\u{2029}' => escaped.push_str(r"\u2029"),
				_ => escaped.push(c),
			}
		}
		Cow::Owned(escaped)
	} else {
		Cow::Borrowed(json)
	}
}

/// Encodes a string as a JavaScript string literal safe for an inline script.
pub fn script_string_literal(s: &str) -> String {
	// Serializing a &str cannot fail.
	let json = serde_json::to_string(s).unwrap_or_default();
	escape_json_for_script(&json).into_owned()
}
