//! Best-effort HTML parsing: link discovery and plain-text extraction.
//!
//! Both functions are pure and tolerate malformed markup; the parser
//! recovers whatever structure it can and the rest is ignored.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

use crate::urlnorm::{self, NormalizedUrl};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// Extract in-scope links from a page.
///
/// Anchors are resolved against `base`, `mailto:`/`tel:` targets dropped,
/// out-of-scope hosts filtered, and the rest normalized into a dedup'd set.
#[must_use]
pub fn extract_links(html: &str, base: &NormalizedUrl) -> HashSet<NormalizedUrl> {
    let mut links = HashSet::new();
    let Ok(base_url) = Url::parse(base.as_str()) else {
        return links;
    };

    let document = Html::parse_document(html);
    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with("mailto:") || href.starts_with("tel:") {
            continue;
        }
        let Some(resolved) = urlnorm::resolve(&base_url, href) else {
            continue;
        };
        if let Some(normalized) = urlnorm::normalize(resolved.as_str())
            && normalized.is_in_scope()
        {
            links.insert(normalized);
        }
    }
    links
}

/// Extract the visible text of a page, one trimmed line per text node,
/// skipping script/style/noscript content.
#[must_use]
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> NormalizedUrl {
        urlnorm::normalize("http://example.onion/dir/page").unwrap()
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let html = r#"<a href="/abs">a</a><a href="rel">b</a>"#;
        let links = extract_links(html, &base());
        assert!(links.contains(&urlnorm::normalize("http://example.onion/abs").unwrap()));
        assert!(links.contains(&urlnorm::normalize("http://example.onion/dir/rel").unwrap()));
    }

    #[test]
    fn out_of_scope_and_mail_links_dropped() {
        let html = concat!(
            r#"<a href="http://clearnet.example.com/">x</a>"#,
            r#"<a href="mailto:a@b.onion">m</a>"#,
            r#"<a href="tel:+1234">t</a>"#,
            r#"<a href="http://other.onion/ok">ok</a>"#,
        );
        let links = extract_links(html, &base());
        assert_eq!(links.len(), 1);
        assert!(links.contains(&urlnorm::normalize("http://other.onion/ok").unwrap()));
    }

    #[test]
    fn duplicate_spellings_collapse() {
        let html = concat!(
            r#"<a href="http://example.onion/p/">1</a>"#,
            r#"<a href="http://EXAMPLE.onion/p">2</a>"#,
        );
        assert_eq!(extract_links(html, &base()).len(), 1);
    }

    #[test]
    fn malformed_html_does_not_panic() {
        let links = extract_links("<a href='http://x.onion/<<<' <div>><a", &base());
        // Best-effort parse; just must not panic.
        let _ = links;
    }

    #[test]
    fn text_skips_script_and_style() {
        let html = "<body><p>Hello</p><script>var x=1;</script><style>p{}</style><p>World</p></body>";
        assert_eq!(extract_text(html), "Hello\nWorld");
    }
}
