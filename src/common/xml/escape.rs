use aho_corasick::{AhoCorasick, MatchKind};
use once_cell::sync::Lazy;
use std::borrow::Cow;

// Static initialization: automaton is built only once, thread-safe
static XML_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "'"])
        .expect("Failed to build XML escaper")
});

// Use LeftmostLongest to ensure longer entities are matched first (e.g., &amp; instead of &lt;)
static XML_UNESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"])
        .expect("Failed to build XML unescaper")
});

/// Typographic quotes that PowerPoint writes as raw UTF-8.
const SMART_PUNCTUATION: [&str; 4] = ["\u{201C}", "\u{201D}", "\u{2018}", "\u{2019}"];

/// Character references used for typographic quotes in the working tree.
const SMART_ENTITIES: [&str; 4] = ["&#x201C;", "&#x201D;", "&#x2018;", "&#x2019;"];

static SMART_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(SMART_PUNCTUATION)
        .expect("Failed to build punctuation escaper")
});

static SMART_RESTORER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(SMART_ENTITIES)
        .expect("Failed to build punctuation restorer")
});

/// Escape XML special characters.
///
/// # Examples
///
/// ```
/// use pptx_engine::common::xml::escape_xml;
/// assert_eq!(escape_xml("a & b"), "a &amp; b");
/// assert_eq!(escape_xml("<tag>\"hello\"</tag>"), "&lt;tag&gt;&quot;hello&quot;&lt;/tag&gt;");
/// ```
#[inline]
pub fn escape_xml(s: &str) -> String {
    XML_ESCAPER.replace_all(s, &["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"])
}

/// Unescape XML special characters.
///
/// Replaces the five standard XML entities with their corresponding characters.
/// Unknown or malformed entities are left unchanged.
///
/// # Examples
///
/// ```
/// use pptx_engine::common::xml::unescape_xml;
/// assert_eq!(unescape_xml("&lt;a &amp; b&gt;"), "<a & b>");
/// assert_eq!(unescape_xml("&amp;lt;"), "&lt;");
/// assert_eq!(unescape_xml("&invalid;"), "&invalid;");
/// ```
#[inline]
pub fn unescape_xml(s: &str) -> String {
    XML_UNESCAPER.replace_all(s, &["&", "<", ">", "\"", "'"])
}

/// Replace typographic quotes with numeric character references.
///
/// The working tree never carries raw U+201C/U+201D/U+2018/U+2019, so that
/// plain-ASCII editing tools cannot silently swap them for straight quotes.
/// Returns the input unchanged (borrowed) when nothing needs replacing.
///
/// ```
/// use pptx_engine::common::xml::escape_smart_punctuation;
/// assert_eq!(escape_smart_punctuation("\u{201C}hi\u{201D}"), "&#x201C;hi&#x201D;");
/// assert_eq!(escape_smart_punctuation("plain"), "plain");
/// ```
pub fn escape_smart_punctuation(s: &str) -> Cow<'_, str> {
    if SMART_ESCAPER.is_match(s) {
        Cow::Owned(SMART_ESCAPER.replace_all(s, &SMART_ENTITIES))
    } else {
        Cow::Borrowed(s)
    }
}

/// Inverse of [`escape_smart_punctuation`], applied before a part is written back.
pub fn restore_smart_punctuation(s: &str) -> Cow<'_, str> {
    if SMART_RESTORER.is_match(s) {
        Cow::Owned(SMART_RESTORER.replace_all(s, &SMART_PUNCTUATION))
    } else {
        Cow::Borrowed(s)
    }
}
