//! HTML escaping, URL linking and ellipsizing for note content.

use regex::Regex;
use std::sync::LazyLock;

/// URLs in raw note text. Stops at whitespace and markup characters and does
/// not swallow trailing punctuation.
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r#"https?://[\w-]+(?:\.[\w-]+)*(?::\d+)?(?:[/?#](?:[^\s<>"]*[\w/#=&-])?)?"#).unwrap()
    });

/// Maximum length of the visible text of a linked URL.
const LINK_TEXT_LIMIT: usize = 50;

/// Escape text for inclusion in HTML element content.
pub fn escape_html(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

/// Escape a value for a double-quoted attribute such as `href`.
pub fn escape_attribute(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// Shorten `s` to at most `limit` characters plus a trailing `...`.
///
/// Words are dropped from the end while the text is too long; text with no
/// spaces left is cut at the character limit.
pub fn ellipsize(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }

    let mut text = s;
    while text.chars().count() > limit {
        match text.rfind(' ') {
            Some(idx) => text = text[..idx].trim_end(),
            None => break,
        }
    }

    let mut out: String = if text.chars().count() > limit || text.is_empty() {
        s.chars().take(limit).collect()
    } else {
        text.to_string()
    };
    out.push_str("...");
    out
}

fn link_text(url: &str) -> String {
    let bare = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    if bare.chars().count() > LINK_TEXT_LIMIT {
        let mut short: String = bare.chars().take(LINK_TEXT_LIMIT).collect();
        short.push_str("...");
        short
    } else {
        bare.to_string()
    }
}

/// Escape HTML and turn URLs into links.
pub fn render_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for m in URL_RE.find_iter(content) {
        out.push_str(&escape_html(&content[last..m.start()]));
        out.push_str(&format!(
            r#"<a href="{}" target="_blank" rel="noopener" class="underline">{}</a>"#,
            escape_attribute(m.as_str()),
            escape_html(&link_text(m.as_str()))
        ));
        last = m.end();
    }
    out.push_str(&escape_html(&content[last..]));
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<b>"x" & 'y'</b>"#),
            r#"&lt;b&gt;"x" &amp; 'y'&lt;/b&gt;"#
        );
    }

    #[test]
    fn attribute_escaping_closes_no_quotes() {
        let out = escape_attribute(r#"/p/"><script>"#);
        assert!(out.starts_with("/p/&quot;"));
        assert!(!out.contains('"'));
        assert!(!out.contains("<script>"));
    }

    #[test]
    fn ellipsize_keeps_short_text() {
        assert_eq!(ellipsize("hello world", 20), "hello world");
    }

    #[test]
    fn ellipsize_drops_words() {
        assert_eq!(ellipsize("one two three four", 10), "one two...");
    }

    #[test]
    fn ellipsize_cuts_unbroken_text() {
        let s = "x".repeat(30);
        assert_eq!(ellipsize(&s, 10), format!("{}...", "x".repeat(10)));
    }

    #[test]
    fn ellipsize_counts_chars_not_bytes() {
        let s = "é".repeat(12);
        assert_eq!(ellipsize(&s, 10), format!("{}...", "é".repeat(10)));
    }

    #[test]
    fn links_urls() {
        let out = render_content("see https://example.com/a?b=1 now");
        assert_eq!(
            out,
            r#"see <a href="https://example.com/a?b=1" target="_blank" rel="noopener" class="underline">example.com/a?b=1</a> now"#
        );
    }

    #[test]
    fn url_does_not_take_trailing_period() {
        let out = render_content("go to https://example.com.");
        assert!(out.contains(r#"href="https://example.com""#));
        assert!(out.ends_with("</a>."));
    }

    #[test]
    fn escapes_before_linking() {
        let out = render_content("<script> https://x.io");
        assert!(out.starts_with("&lt;script&gt; <a"));
    }

    #[test]
    fn url_query_ampersand_is_escaped_once() {
        let out = render_content("https://x.io/?a=1&b=2");
        assert!(out.contains(r#"href="https://x.io/?a=1&amp;b=2""#));
        assert!(out.contains(">x.io/?a=1&amp;b=2</a>"));
    }

    #[test]
    fn quote_ends_a_url() {
        let out = render_content(r#"https://x.io/"onmouseover="alert(1)"#);
        assert!(out.starts_with(r#"<a href="https://x.io/" "#));
        assert!(!out.contains(r#"" onmouseover"#));
    }
}
