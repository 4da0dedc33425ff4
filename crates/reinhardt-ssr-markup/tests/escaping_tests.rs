//! Escaping properties of the markup layer.
//!
//! Test categories:
//! 1. Text and attribute escaping never leave markup-significant characters
//! 2. Script and style bodies never contain a closing tag
//! 3. JSON embedded in scripts never contains `<` or line separators
//! 4. URL attributes never carry a `javascript:` scheme

use proptest::prelude::*;
use reinhardt_ssr_markup::prelude::*;
use reinhardt_ssr_markup::url::is_javascript_url;
use rstest::rstest;

// ============================================================================
// Text and attribute escaping
// ============================================================================

proptest! {
	#[test]
	fn escaped_text_has_no_raw_markup(input in ".*") {
		let escaped = escape_text(&input);
		prop_assert!(!escaped.contains('<'));
		prop_assert!(!escaped.contains('>'));
		prop_assert!(!escaped.contains('"'));
		prop_assert!(!escaped.contains('\''));
	}

	#[test]
	fn attribute_value_cannot_break_out(value in ".*") {
		let mut buf = ChunkBuffer::new();
		push_attribute(&mut buf, "title", &AttrValue::from(value));
		let out = buf.to_string();
		if !out.is_empty() {
			// Exactly the two delimiting quotes.
			prop_assert_eq!(out.matches('"').count(), 2);
			prop_assert!(out.starts_with(" title=\""));
			prop_assert!(out.ends_with('"'));
		}
	}
}

// ============================================================================
// Script and style bodies
// ============================================================================

proptest! {
	#[test]
	fn script_body_never_closes_script(body in "(.|</script>|</SCRIPT|<script)*") {
		let escaped = escape_script_body(&body).to_lowercase();
		prop_assert!(!escaped.contains("</script"));
		prop_assert!(!escaped.contains("<script"));
	}

	#[test]
	fn style_body_never_closes_style(body in "(.|</style>|</STYLE|<style)*") {
		let escaped = escape_style_body(&body).to_lowercase();
		prop_assert!(!escaped.contains("</style"));
	}

	#[test]
	fn json_for_script_is_inert(value in ".*") {
		let json = serde_json::to_string(&value).unwrap();
		let escaped = escape_json_for_script(&json);
		prop_assert!(!escaped.contains('<'));
		prop_assert!(!escaped.contains('\u{2028}'), "raw U+2028 in output");
		prop_assert!(!escaped.contains('\u{2029}'), "raw U+2029 in output");
		// Still parses back to the same value.
		let decoded: String = serde_json::from_str(&escaped).unwrap();
		prop_assert_eq!(decoded, value);
	}
}

// ============================================================================
// URL attributes
// ============================================================================

#[rstest]
#[case("href")]
#[case("src")]
#[case("action")]
#[case("formAction")]
fn url_attributes_block_javascript(#[case] name: &str) {
	let mut buf = ChunkBuffer::new();
	push_attribute(&mut buf, name, &"\u{0000} jAvA\nscript:alert(document.cookie)".into());
	let out = buf.to_string();

	assert!(out.contains("blocked as a security precaution"));
	assert!(!out.contains("alert(document.cookie)"));
}

proptest! {
	#[test]
	fn sanitized_urls_are_never_executable_except_sentinel(url in "[ \t\njavscript:A-Z]{0,20}") {
		let sanitized = sanitize_url(&url);
		if is_javascript_url(&url) {
			prop_assert_eq!(sanitized.as_ref(), BLOCKED_URL_SENTINEL);
		} else {
			prop_assert_eq!(sanitized.as_ref(), url.as_str());
		}
	}
}
