//! Inline `style` attribute serialization.

use crate::escape::escape_attr;
use std::borrow::Cow;

/// A single CSS declaration value.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleValue {
	/// Used verbatim (trimmed).
	Str(Cow<'static, str>),
	/// Gets a `px` unit unless the property is unitless or the value is 0.
	Number(f64),
	/// Skipped.
	Bool(bool),
	/// Skipped.
	Null,
}

impl From<&'static str> for StyleValue {
	fn from(s: &'static str) -> Self {
		StyleValue::Str(Cow::Borrowed(s))
	}
}

impl From<String> for StyleValue {
	fn from(s: String) -> Self {
		StyleValue::Str(Cow::Owned(s))
	}
}

impl From<f64> for StyleValue {
	fn from(n: f64) -> Self {
		StyleValue::Number(n)
	}
}

impl From<i32> for StyleValue {
	fn from(n: i32) -> Self {
		StyleValue::Number(f64::from(n))
	}
}

impl From<bool> for StyleValue {
	fn from(b: bool) -> Self {
		StyleValue::Bool(b)
	}
}

impl<T: Into<StyleValue>> From<Option<T>> for StyleValue {
	fn from(v: Option<T>) -> Self {
		v.map_or(StyleValue::Null, Into::into)
	}
}

/// Ordered style declarations keyed by camelCase (or custom `--`) names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleMap {
	declarations: Vec<(Cow<'static, str>, StyleValue)>,
}

impl StyleMap {
	/// Creates an empty style map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a declaration (builder form).
	pub fn set(mut self, name: impl Into<Cow<'static, str>>, value: impl Into<StyleValue>) -> Self {
		self.insert(name, value);
		self
	}

	/// Adds a declaration, replacing an existing one with the same name.
	pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<StyleValue>) {
		let name = name.into();
		let value = value.into();
		if let Some(slot) = self.declarations.iter_mut().find(|(n, _)| *n == name) {
			slot.1 = value;
		} else {
			self.declarations.push((name, value));
		}
	}

	/// Iterates declarations in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &StyleValue)> {
		self.declarations.iter().map(|(n, v)| (n.as_ref(), v))
	}

	/// Returns `true` if no declaration was added.
	pub fn is_empty(&self) -> bool {
		self.declarations.is_empty()
	}
}

const UNITLESS_PROPERTIES: &[&str] = &[
	"animationIterationCount",
	"aspectRatio",
	"borderImageOutset",
	"borderImageSlice",
	"borderImageWidth",
	"boxFlex",
	"boxFlexGroup",
	"boxOrdinalGroup",
	"columnCount",
	"columns",
	"fillOpacity",
	"flex",
	"flexGrow",
	"flexNegative",
	"flexOrder",
	"flexPositive",
	"flexShrink",
	"floodOpacity",
	"fontWeight",
	"gridArea",
	"gridColumn",
	"gridColumnEnd",
	"gridColumnSpan",
	"gridColumnStart",
	"gridRow",
	"gridRowEnd",
	"gridRowSpan",
	"gridRowStart",
	"lineClamp",
	"lineHeight",
	"opacity",
	"order",
	"orphans",
	"scale",
	"stopOpacity",
	"strokeDasharray",
	"strokeDashoffset",
	"strokeMiterlimit",
	"strokeOpacity",
	"strokeWidth",
	"tabSize",
	"widows",
	"zIndex",
	"zoom",
];

const VENDOR_PREFIXES: &[&str] = &["Webkit", "Moz", "ms", "O"];

/// Returns `true` for properties whose numeric values take no unit.
///
/// Vendor-prefixed spellings (`WebkitLineClamp`, `msFlex`) are recognized.
pub fn is_unitless_property(name: &str) -> bool {
	if UNITLESS_PROPERTIES.contains(&name) {
		return true;
	}
	VENDOR_PREFIXES.iter().any(|prefix| {
		name.strip_prefix(prefix).is_some_and(|rest| {
			let mut chars = rest.chars();
			match chars.next() {
				Some(first) if first.is_ascii_uppercase() => {
					let unprefixed = format!("{}{}", first.to_ascii_lowercase(), chars.as_str());
					UNITLESS_PROPERTIES.contains(&unprefixed.as_str())
				}
				_ => false,
			}
		})
	})
}

/// Converts a camelCase property name to its CSS spelling.
///
/// Custom properties are returned untouched and the `ms` vendor prefix gets
/// its leading dash.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::style::hyphenate_style_name;
///
/// assert_eq!(hyphenate_style_name("backgroundColor"), "background-color");
/// assert_eq!(hyphenate_style_name("msTransition"), "-ms-transition");
/// assert_eq!(hyphenate_style_name("WebkitTransform"), "-webkit-transform");
/// assert_eq!(hyphenate_style_name("--brandColor"), "--brandColor");
/// ```
pub fn hyphenate_style_name(name: &str) -> Cow<'_, str> {
	if name.starts_with("--") || !name.contains(|c: char| c.is_ascii_uppercase()) {
		return Cow::Borrowed(name);
	}
	let mut out = String::with_capacity(name.len() + 4);
	for c in name.chars() {
		if c.is_ascii_uppercase() {
			out.push('-');
			out.push(c.to_ascii_lowercase());
		} else {
			out.push(c);
		}
	}
	if out.starts_with("ms-") {
		out.insert(0, '-');
	}
	Cow::Owned(out)
}

/// Formats a number the way a script engine stringifies it: integral values
/// have no fractional part.
pub fn format_number(n: f64) -> String {
	if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
		format!("{}", n as i64)
	} else {
		format!("{n}")
	}
}

/// Serializes a style map into the contents of a `style` attribute.
///
/// The result is already attribute-escaped. An empty string means no
/// attribute should be written.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::style::{serialize_style, StyleMap};
///
/// let style = StyleMap::new()
///     .set("marginTop", 10)
///     .set("opacity", 0.5)
///     .set("zIndex", 3)
///     .set("width", 0)
///     .set("--gap", 4)
///     .set("display", None::<&'static str>);
/// assert_eq!(serialize_style(&style), "margin-top:10px;opacity:0.5;z-index:3;width:0;--gap:4");
/// ```
pub fn serialize_style(style: &StyleMap) -> String {
	let mut out = String::new();
	for (name, value) in style.iter() {
		let is_custom = name.starts_with("--");
		let value = match value {
			StyleValue::Null | StyleValue::Bool(_) => continue,
			StyleValue::Str(s) => {
				let trimmed = s.trim();
				if trimmed.is_empty() {
					continue;
				}
				Cow::Borrowed(trimmed)
			}
			StyleValue::Number(n) if n.is_nan() => continue,
			StyleValue::Number(n) => {
				if *n != 0.0 && !is_custom && !is_unitless_property(name) {
					Cow::Owned(format!("{}px", format_number(*n)))
				} else {
					Cow::Owned(format_number(*n))
				}
			}
		};
		if !out.is_empty() {
			out.push(';');
		}
		out.push_str(&escape_attr(&hyphenate_style_name(name)));
		out.push(':');
		out.push_str(&escape_attr(&value));
	}
	out
}
