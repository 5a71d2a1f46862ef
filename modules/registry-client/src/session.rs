//! Session bootstrap for the registry's search API.
//!
//! The search endpoint rejects requests without an anti-forgery token and the
//! cookies issued alongside it. Both come from an unauthenticated page load.
//! The token can appear in three places depending on how the page was built,
//! so extraction is an ordered list of independent strategies.

use std::sync::LazyLock;

use regex::Regex;

/// Per-run credentials for the search endpoint. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub csrf_token: Option<String>,
    /// Raw `Cookie` header value, `name=value` pairs joined with `"; "`.
    pub cookies: String,
}

impl Session {
    /// The session a failed bootstrap resolves to.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.csrf_token.is_some()
    }
}

/// A pure `HTML -> token` strategy.
pub type TokenExtractor = fn(&str) -> Option<String>;

/// Strategies in the order they are tried. First non-empty match wins.
pub const TOKEN_EXTRACTORS: [(&str, TokenExtractor); 3] = [
    ("hidden_input", from_hidden_input),
    ("meta_tag", from_meta_tag),
    ("script_variable", from_script_variable),
];

static HIDDEN_INPUT_NAME_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<input\b[^>]*\bname\s*=\s*["'](?:_token|csrf_token|_csrf|csrfmiddlewaretoken)["'][^>]*\bvalue\s*=\s*["']([^"']+)["']"#,
    )
    .unwrap()
});
static HIDDEN_INPUT_VALUE_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<input\b[^>]*\bvalue\s*=\s*["']([^"']+)["'][^>]*\bname\s*=\s*["'](?:_token|csrf_token|_csrf|csrfmiddlewaretoken)["']"#,
    )
    .unwrap()
});
static META_NAME_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta\b[^>]*\bname\s*=\s*["'](?:csrf-token|csrf_token|_csrf)["'][^>]*\bcontent\s*=\s*["']([^"']+)["']"#,
    )
    .unwrap()
});
static META_CONTENT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta\b[^>]*\bcontent\s*=\s*["']([^"']+)["'][^>]*\bname\s*=\s*["'](?:csrf-token|csrf_token|_csrf)["']"#,
    )
    .unwrap()
});
static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").unwrap());
static SCRIPT_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:csrfToken|csrf_token|_token)["']?\s*[:=]\s*["']([^"']+)["']"#).unwrap()
});

fn first_capture(patterns: &[&Regex], haystack: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(haystack)
            .and_then(|cap| cap.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|token| !token.is_empty())
    })
}

/// `<input type="hidden" name="_token" value="...">`
pub fn from_hidden_input(html: &str) -> Option<String> {
    first_capture(&[&HIDDEN_INPUT_NAME_FIRST, &HIDDEN_INPUT_VALUE_FIRST], html)
}

/// `<meta name="csrf-token" content="...">`
pub fn from_meta_tag(html: &str) -> Option<String> {
    first_capture(&[&META_NAME_FIRST, &META_CONTENT_FIRST], html)
}

/// `csrfToken = "..."` / `"csrfToken": "..."` inside an inline `<script>` block.
pub fn from_script_variable(html: &str) -> Option<String> {
    SCRIPT_BLOCK
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .find_map(|body| first_capture(&[&SCRIPT_ASSIGNMENT], body.as_str()))
}

/// Run every strategy in order and return the first token found,
/// together with the name of the strategy that produced it.
pub fn extract_csrf_token(html: &str) -> Option<(&'static str, String)> {
    TOKEN_EXTRACTORS
        .iter()
        .find_map(|(name, extract)| extract(html).map(|token| (*name, token)))
}

/// Collapse `Set-Cookie` header values into a single `Cookie` header value.
/// Attributes (`Path`, `HttpOnly`, `Expires`, ...) are dropped.
pub fn join_set_cookies<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .collect::<Vec<_>>()
        .join("; ")
}
