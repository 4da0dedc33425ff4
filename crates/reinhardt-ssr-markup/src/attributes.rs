//! Attribute serialization driven by a static lookup table.
//!
//! Every attribute name maps to an [`AttributeRule`] that decides how its
//! value is written: boolean presence, numeric validation, URL sanitization,
//! style serialization, or plain escaping. Names missing from the table are
//! [`AttributeRule::Plain`].

use crate::chunk::ChunkBuffer;
use crate::error::{MarkupError, MarkupResult};
use crate::escape::escape_attr;
use crate::style::{StyleMap, format_number, serialize_style};
use crate::url::sanitize_url;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

/// How an attribute value is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeRule {
	/// Plain attribute written under another name (`className` → `class`).
	Alias(&'static str),
	/// Present (`name=""`) when truthy, omitted otherwise.
	Boolean,
	/// Boolean when given `true`, plain value when given a string (`download`).
	OverloadedBoolean,
	/// Always written as the string `"true"` or `"false"`.
	Booleanish,
	/// Numeric; omitted when not a number.
	Numeric,
	/// Numeric; omitted when not a number or below 1.
	PositiveNumeric,
	/// URL-valued; `javascript:` URLs are replaced.
	Url,
	/// Serialized from a [`StyleMap`].
	Style,
	/// Never written to the markup.
	Reserved,
	/// Escaped string value.
	Plain,
}

/// HTML boolean attributes. Both the camelCase and lowercase spellings are
/// accepted; the lowercase one is written.
pub const BOOLEAN_ATTRS: &[&str] = &[
	"allowFullScreen",
	"async",
	"autoFocus",
	"autoPlay",
	"checked",
	"controls",
	"default",
	"defer",
	"disabled",
	"disablePictureInPicture",
	"disableRemotePlayback",
	"formNoValidate",
	"hidden",
	"inert",
	"itemScope",
	"loop",
	"multiple",
	"muted",
	"noModule",
	"noValidate",
	"open",
	"playsInline",
	"readOnly",
	"required",
	"reversed",
	"scoped",
	"seamless",
	"selected",
];

const ALIASES: &[(&str, &str)] = &[
	("className", "class"),
	("htmlFor", "for"),
	("httpEquiv", "http-equiv"),
	("acceptCharset", "accept-charset"),
	("accessKey", "accesskey"),
	("autoCapitalize", "autocapitalize"),
	("autoComplete", "autocomplete"),
	("autoCorrect", "autocorrect"),
	("cellPadding", "cellpadding"),
	("cellSpacing", "cellspacing"),
	("charSet", "charset"),
	("colSpan", "colspan"),
	("crossOrigin", "crossorigin"),
	("dateTime", "datetime"),
	("encType", "enctype"),
	("enterKeyHint", "enterkeyhint"),
	("fetchPriority", "fetchpriority"),
	("formEncType", "formenctype"),
	("formMethod", "formmethod"),
	("formTarget", "formtarget"),
	("frameBorder", "frameborder"),
	("hrefLang", "hreflang"),
	("inputMode", "inputmode"),
	("marginHeight", "marginheight"),
	("marginWidth", "marginwidth"),
	("maxLength", "maxlength"),
	("minLength", "minlength"),
	("referrerPolicy", "referrerpolicy"),
	("srcDoc", "srcdoc"),
	("srcLang", "srclang"),
	("srcSet", "srcset"),
	("tabIndex", "tabindex"),
	("useMap", "usemap"),
	("clipPath", "clip-path"),
	("fillOpacity", "fill-opacity"),
	("fillRule", "fill-rule"),
	("fontFamily", "font-family"),
	("fontSize", "font-size"),
	("stopColor", "stop-color"),
	("strokeDasharray", "stroke-dasharray"),
	("strokeLinecap", "stroke-linecap"),
	("strokeLinejoin", "stroke-linejoin"),
	("strokeOpacity", "stroke-opacity"),
	("strokeWidth", "stroke-width"),
	("textAnchor", "text-anchor"),
	("xmlLang", "xml:lang"),
	("xmlSpace", "xml:space"),
];

const RESERVED: &[&str] = &[
	"children",
	"dangerouslySetInnerHTML",
	"defaultChecked",
	"defaultValue",
	"innerHTML",
	"innerText",
	"key",
	"ref",
	"suppressContentEditableWarning",
	"suppressHydrationWarning",
	"textContent",
];

static RULES: OnceLock<HashMap<Cow<'static, str>, AttributeRule>> = OnceLock::new();

fn rules() -> &'static HashMap<Cow<'static, str>, AttributeRule> {
	RULES.get_or_init(|| {
		let mut map: HashMap<Cow<'static, str>, AttributeRule> = HashMap::new();
		let mut insert = |name: &'static str, rule: AttributeRule| {
			// Lowercase spellings (`readonly`, `rowspan`) resolve to the same rule.
			if !matches!(rule, AttributeRule::Alias(_)) && name.bytes().any(|b| b.is_ascii_uppercase())
			{
				map.insert(Cow::Owned(name.to_ascii_lowercase()), rule);
			}
			map.insert(Cow::Borrowed(name), rule);
		};
		for &(from, to) in ALIASES {
			insert(from, AttributeRule::Alias(to));
		}
		for &name in RESERVED {
			insert(name, AttributeRule::Reserved);
		}
		for &name in BOOLEAN_ATTRS {
			insert(name, AttributeRule::Boolean);
		}
		for name in ["capture", "download"] {
			insert(name, AttributeRule::OverloadedBoolean);
		}
		for name in ["contentEditable", "draggable", "spellCheck"] {
			insert(name, AttributeRule::Booleanish);
		}
		for name in ["rowSpan", "start"] {
			insert(name, AttributeRule::Numeric);
		}
		for name in ["cols", "rows", "size", "span"] {
			insert(name, AttributeRule::PositiveNumeric);
		}
		for name in [
			"action",
			"cite",
			"data",
			"formAction",
			"href",
			"poster",
			"src",
			"xlinkHref",
		] {
			insert(name, AttributeRule::Url);
		}
		insert("style", AttributeRule::Style);
		map
	})
}

/// Looks up the serialization rule for `name`.
pub fn attribute_rule(name: &str) -> AttributeRule {
	rules().get(name).copied().unwrap_or(AttributeRule::Plain)
}

fn is_name_start_char(c: char) -> bool {
	matches!(c,
		':' | 'A'..='Z' | '_' | 'a'..='z'
		| '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}'
		| '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' | '\u{200C}'..='\u{200D}'
		| '\u{2070}'..='\u{218F}' | '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}'
		| '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}')
}

fn is_name_char(c: char) -> bool {
	is_name_start_char(c)
		|| matches!(c,
			'-' | '.' | '0'..='9' | '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// Checks that `name` is a valid XML attribute name.
///
/// Anything else could close the tag or inject another attribute.
pub fn check_attribute_name(name: &str) -> MarkupResult<()> {
	let mut chars = name.chars();
	let valid = match chars.next() {
		Some(first) => is_name_start_char(first) && chars.all(is_name_char),
		None => false,
	};
	if valid {
		Ok(())
	} else {
		Err(MarkupError::InvalidAttributeName(name.to_string()))
	}
}

/// Returns `true` for event-handler attribute names (`onClick`, `onload`).
pub fn is_event_handler(name: &str) -> bool {
	let bytes = name.as_bytes();
	bytes.len() > 2 && bytes[0].eq_ignore_ascii_case(&b'o') && bytes[1].eq_ignore_ascii_case(&b'n')
}

/// Value of an element attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
	/// String value.
	Str(Cow<'static, str>),
	/// Boolean value.
	Bool(bool),
	/// Numeric value.
	Number(f64),
	/// Several string values (`<select multiple>` values, class lists).
	List(Vec<Cow<'static, str>>),
	/// Inline style.
	Style(StyleMap),
	/// Absent value; the attribute is omitted.
	Null,
}

impl AttrValue {
	/// Returns the string form of a `Str` or `Number` value.
	pub fn as_text(&self) -> Option<Cow<'_, str>> {
		match self {
			AttrValue::Str(s) => Some(Cow::Borrowed(s.as_ref())),
			AttrValue::Number(n) if !n.is_nan() => Some(Cow::Owned(format_number(*n))),
			_ => None,
		}
	}

	/// Interprets the value as a boolean attribute.
	pub fn is_truthy(&self) -> bool {
		match self {
			AttrValue::Bool(b) => *b,
			AttrValue::Str(s) => is_boolean_attr_truthy(s),
			AttrValue::Number(n) => *n != 0.0 && !n.is_nan(),
			AttrValue::List(items) => !items.is_empty(),
			AttrValue::Style(_) => true,
			AttrValue::Null => false,
		}
	}
}

impl From<&'static str> for AttrValue {
	fn from(s: &'static str) -> Self {
		AttrValue::Str(Cow::Borrowed(s))
	}
}

impl From<String> for AttrValue {
	fn from(s: String) -> Self {
		AttrValue::Str(Cow::Owned(s))
	}
}

impl From<Cow<'static, str>> for AttrValue {
	fn from(s: Cow<'static, str>) -> Self {
		AttrValue::Str(s)
	}
}

impl From<bool> for AttrValue {
	fn from(b: bool) -> Self {
		AttrValue::Bool(b)
	}
}

impl From<f64> for AttrValue {
	fn from(n: f64) -> Self {
		AttrValue::Number(n)
	}
}

macro_rules! impl_from_integer {
	($($ty:ty),*) => {
		$(impl From<$ty> for AttrValue {
			fn from(n: $ty) -> Self {
				AttrValue::Number(n as f64)
			}
		})*
	};
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<StyleMap> for AttrValue {
	fn from(style: StyleMap) -> Self {
		AttrValue::Style(style)
	}
}

impl From<Vec<&'static str>> for AttrValue {
	fn from(items: Vec<&'static str>) -> Self {
		AttrValue::List(items.into_iter().map(Cow::Borrowed).collect())
	}
}

impl From<Vec<String>> for AttrValue {
	fn from(items: Vec<String>) -> Self {
		AttrValue::List(items.into_iter().map(Cow::Owned).collect())
	}
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
	fn from(v: Option<T>) -> Self {
		v.map_or(AttrValue::Null, Into::into)
	}
}

/// Checks if a boolean attribute value should result in the attribute being set.
///
/// Returns `false` for empty strings, "false", or "0".
pub fn is_boolean_attr_truthy(value: &str) -> bool {
	!value.is_empty() && value != "false" && value != "0"
}

fn write_pair(buf: &mut ChunkBuffer, name: &str, value: &str) {
	buf.push_static(" ");
	buf.push_str(name);
	buf.push_static("=\"");
	buf.push_str(&escape_attr(value));
	buf.push_static("\"");
}

fn write_present(buf: &mut ChunkBuffer, name: &str) {
	buf.push_static(" ");
	buf.push_str(name);
	buf.push_static("=\"\"");
}

fn write_plain(buf: &mut ChunkBuffer, name: &str, value: &AttrValue) {
	match value {
		AttrValue::Str(s) => write_pair(buf, name, s),
		AttrValue::Number(n) if !n.is_nan() => write_pair(buf, name, &format_number(*n)),
		AttrValue::List(items) => write_pair(buf, name, &items.join(" ")),
		AttrValue::Bool(b) if name.starts_with("data-") || name.starts_with("aria-") => {
			write_pair(buf, name, if *b { "true" } else { "false" })
		}
		_ => {}
	}
}

/// Writes ` name="value"` for one attribute, or nothing if the rule says the
/// attribute must be omitted.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::attributes::{push_attribute, AttrValue};
/// use reinhardt_ssr_markup::chunk::ChunkBuffer;
///
/// let mut buf = ChunkBuffer::new();
/// push_attribute(&mut buf, "className", &"card".into());
/// push_attribute(&mut buf, "disabled", &true.into());
/// push_attribute(&mut buf, "hidden", &false.into());
/// push_attribute(&mut buf, "onClick", &"alert(1)".into());
/// assert_eq!(buf.to_string(), r#" class="card" disabled="""#);
/// ```
pub fn push_attribute(buf: &mut ChunkBuffer, name: &str, value: &AttrValue) {
	if is_event_handler(name) {
		return;
	}
	match attribute_rule(name) {
		AttributeRule::Reserved => {}
		AttributeRule::Alias(alias) => write_plain(buf, alias, value),
		AttributeRule::Style => match value {
			AttrValue::Style(style) => {
				let css = serialize_style(style);
				if !css.is_empty() {
					buf.push_static(" style=\"");
					buf.push(css);
					buf.push_static("\"");
				}
			}
			AttrValue::Str(s) if !s.trim().is_empty() => write_pair(buf, "style", s),
			_ => {}
		},
		AttributeRule::Boolean => {
			if value.is_truthy() {
				write_present(buf, &name.to_ascii_lowercase());
			}
		}
		AttributeRule::OverloadedBoolean => match value {
			AttrValue::Bool(true) => write_present(buf, name),
			AttrValue::Str(s) if !s.is_empty() => write_pair(buf, name, s),
			AttrValue::Number(n) if !n.is_nan() => write_pair(buf, name, &format_number(*n)),
			_ => {}
		},
		AttributeRule::Booleanish => {
			let lowered = name.to_ascii_lowercase();
			match value {
				AttrValue::Bool(b) => write_pair(buf, &lowered, if *b { "true" } else { "false" }),
				AttrValue::Str(s) => write_pair(buf, &lowered, s),
				_ => {}
			}
		}
		rule @ (AttributeRule::Numeric | AttributeRule::PositiveNumeric) => {
			let number = match value {
				AttrValue::Number(n) => Some(*n),
				AttrValue::Str(s) => s.trim().parse::<f64>().ok(),
				_ => None,
			};
			let Some(n) = number.filter(|n| !n.is_nan()) else {
				return;
			};
			if rule == AttributeRule::PositiveNumeric && n < 1.0 {
				return;
			}
			write_pair(buf, &name.to_ascii_lowercase(), &format_number(n));
		}
		AttributeRule::Url => {
			let attr_name = if name == "xlinkHref" {
				Cow::Borrowed("xlink:href")
			} else {
				Cow::Owned(name.to_ascii_lowercase())
			};
			match value {
				AttrValue::Str(s) if !s.is_empty() => write_pair(buf, &attr_name, &sanitize_url(s)),
				AttrValue::Number(n) if !n.is_nan() => {
					write_pair(buf, &attr_name, &format_number(*n))
				}
				_ => {}
			}
		}
		AttributeRule::Plain => {
			if let Err(e) = check_attribute_name(name) {
				tracing::warn!(error = %e, "Dropping attribute with an unsafe name");
				return;
			}
			write_plain(buf, name, value);
		}
	}
}
