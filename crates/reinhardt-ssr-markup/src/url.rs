//! URL attribute sanitization.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Replacement emitted instead of a blocked `javascript:` URL.
///
/// Evaluating it throws, so a click on the element fails loudly instead of
/// running attacker-controlled code.
pub const BLOCKED_URL_SENTINEL: &str =
	"javascript:throw new Error('A javascript: URL was blocked as a security precaution.')";

static JAVASCRIPT_URL: OnceLock<Regex> = OnceLock::new();

fn javascript_url_pattern() -> &'static Regex {
	// Browsers strip leading C0 controls and spaces, and ignore tabs and
	// newlines anywhere inside the scheme.
	JAVASCRIPT_URL.get_or_init(|| {
		Regex::new(
			r"(?i)^[\x00-\x20]*j[\r\n\t]*a[\r\n\t]*v[\r\n\t]*a[\r\n\t]*s[\r\n\t]*c[\r\n\t]*r[\r\n\t]*i[\r\n\t]*p[\r\n\t]*t[\r\n\t]*:",
		)
		.unwrap()
	})
}

/// Returns `true` when the browser would interpret `url` as a `javascript:` URL.
///
/// # Examples
///
/// ```
/// use reinhardt_ssr_markup::url::is_javascript_url;
///
/// assert!(is_javascript_url("javascript:alert(1)"));
/// assert!(is_javascript_url("  JaVa\tScRiPt:void(0)"));
/// assert!(!is_javascript_url("/javascript:relative"));
/// assert!(!is_javascript_url("https://example.com"));
/// ```
pub fn is_javascript_url(url: &str) -> bool {
	javascript_url_pattern().is_match(url)
}

/// Replaces a `javascript:` URL with [`BLOCKED_URL_SENTINEL`].
///
/// Any other value is returned unchanged. The result still needs attribute
/// escaping.
pub fn sanitize_url(url: &str) -> Cow<'_, str> {
	if is_javascript_url(url) {
		tracing::warn!("Blocked javascript: URL in a URL-valued attribute");
		Cow::Borrowed(BLOCKED_URL_SENTINEL)
	} else {
		Cow::Borrowed(url)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("javascript:alert(1)")]
	#[case("JAVASCRIPT:alert(1)")]
	#[case("\u{0001}\u{0010} javascript:alert(1)")]
	#[case("java\nscript:alert(1)")]
	#[case("j\ta\rv\na\ts\nc\rr\ti\np\tt:alert(1)")]
	fn test_blocks_javascript_urls(#[case] url: &str) {
		assert_eq!(sanitize_url(url), BLOCKED_URL_SENTINEL);
	}

	#[rstest]
	#[case("https://example.com/")]
	#[case("/relative/javascript:path")]
	#[case("mailto:someone@example.com")]
	#[case("javascripts:alert(1)")]
	#[case("java script:alert(1)")]
	fn test_keeps_other_urls(#[case] url: &str) {
		assert_eq!(sanitize_url(url), url);
	}
}
