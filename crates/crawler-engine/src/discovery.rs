use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// A minimal streaming-cost anchor scan. Full DOM parsing is the downstream
/// parser's job; the crawler only needs `href` targets to grow the frontier.
static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).unwrap());

/// Extract and resolve outbound anchors against `base`, deduping within the page.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for caps in HREF_RE.captures_iter(html) {
        let href = caps[1].trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("data:")
        {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if seen.insert(resolved.to_string()) {
            out.push(resolved);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_relative_and_absolute_links() {
        let base = Url::parse("https://a.test/dir/").unwrap();
        let html = r#"<a href="x">x</a> <a href="https://b.test/y">y</a>"#;
        let links: Vec<String> = extract_links(html, &base).iter().map(|u| u.to_string()).collect();
        assert!(links.contains(&"https://a.test/dir/x".to_string()));
        assert!(links.contains(&"https://b.test/y".to_string()));
    }

    #[test]
    fn skips_fragments_mailto_and_javascript() {
        let base = Url::parse("https://a.test/").unwrap();
        let html = r#"<a href="#frag">f</a><a href="mailto:x@y.test">m</a><a href="javascript:void(0)">j</a>"#;
        assert!(extract_links(html, &base).is_empty());
    }

    #[test]
    fn dedups_within_a_page() {
        let base = Url::parse("https://a.test/").unwrap();
        let html = r#"<a href="/x">one</a><a href="/x">two</a>"#;
        assert_eq!(extract_links(html, &base).len(), 1);
    }

    #[test]
    fn is_case_insensitive_on_tag_and_attr() {
        let base = Url::parse("https://a.test/").unwrap();
        let html = r#"<A HREF='/x'>x</A>"#;
        assert_eq!(extract_links(html, &base).len(), 1);
    }
}
