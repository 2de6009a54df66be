use dashmap::DashMap;
use url::Url;

use crate::error::CrawlerError;

/// Normalizes URLs and enforces scheme/domain admission rules. Stateless
/// apart from a memoized host → allowed decision, which tolerates benign
/// double-computation under concurrent access (last-writer-wins).
pub struct UrlValidator {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
    domain_cache: DashMap<String, bool>,
}

impl UrlValidator {
    pub fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist: whitelist.into_iter().map(|s| s.to_lowercase()).collect(),
            blacklist: blacklist.into_iter().map(|s| s.to_lowercase()).collect(),
            domain_cache: DashMap::new(),
        }
    }

    /// Parse, lowercase scheme/host, strip fragment and query, and trim a
    /// trailing slash unless the path is exactly `/`.
    pub fn normalize(&self, raw: &str) -> Result<String, CrawlerError> {
        let mut url = Url::parse(raw).map_err(|e| CrawlerError::InvalidUrl(format!("{raw}: {e}")))?;

        let scheme = url.scheme().to_lowercase();
        url.set_scheme(&scheme)
            .map_err(|_| CrawlerError::InvalidUrl(raw.to_string()))?;

        if let Some(host) = url.host_str() {
            let host = host.to_lowercase();
            url.set_host(Some(&host))
                .map_err(|e| CrawlerError::InvalidUrl(format!("{raw}: {e}")))?;
        }

        url.set_fragment(None);
        url.set_query(None);

        let path = url.path().to_string();
        if path.len() > 1 && path.ends_with('/') {
            url.set_path(&path[..path.len() - 1]);
        }

        Ok(url.to_string())
    }

    pub fn is_scheme_allowed(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    /// Check a host against the whitelist/blacklist, memoizing the decision.
    pub fn is_domain_allowed(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        if let Some(allowed) = self.domain_cache.get(&host) {
            return *allowed;
        }

        let allowed = if self.blacklist.iter().any(|p| Self::matches(&host, p)) {
            false
        } else if !self.whitelist.is_empty() {
            self.whitelist.iter().any(|p| Self::matches(&host, p))
        } else {
            true
        };

        self.domain_cache.insert(host, allowed);
        allowed
    }

    fn matches(host: &str, pattern: &str) -> bool {
        host == pattern || host.ends_with(&format!(".{pattern}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(whitelist: &[&str], blacklist: &[&str]) -> UrlValidator {
        UrlValidator::new(
            whitelist.iter().map(|s| s.to_string()).collect(),
            blacklist.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn normalizes_scheme_and_host_case() {
        let v = validator(&[], &[]);
        assert_eq!(v.normalize("HTTPS://Example.COM/Path").unwrap(), "https://example.com/Path");
    }

    #[test]
    fn strips_fragment_and_query() {
        let v = validator(&[], &[]);
        assert_eq!(v.normalize("https://a.test/x?q=1#frag").unwrap(), "https://a.test/x");
    }

    #[test]
    fn trims_trailing_slash_except_root() {
        let v = validator(&[], &[]);
        assert_eq!(v.normalize("https://a.test/x/").unwrap(), "https://a.test/x");
        assert_eq!(v.normalize("https://a.test/").unwrap(), "https://a.test/");
    }

    #[test]
    fn normalize_is_idempotent() {
        let v = validator(&[], &[]);
        let once = v.normalize("HTTPS://A.test/x/?q=1#f").unwrap();
        let twice = v.normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_unparseable_input() {
        let v = validator(&[], &[]);
        assert!(v.normalize("not a url").is_err());
    }

    #[test]
    fn only_http_and_https_schemes_allowed() {
        let v = validator(&[], &[]);
        assert!(v.is_scheme_allowed(&Url::parse("http://a.test/").unwrap()));
        assert!(v.is_scheme_allowed(&Url::parse("https://a.test/").unwrap()));
        assert!(!v.is_scheme_allowed(&Url::parse("ftp://a.test/").unwrap()));
    }

    #[test]
    fn blacklist_exact_and_suffix_match() {
        let v = validator(&[], &["ads.example.com"]);
        assert!(!v.is_domain_allowed("ads.example.com"));
        assert!(!v.is_domain_allowed("foo.ads.example.com"));
        assert!(v.is_domain_allowed("notadsexample.com"));
    }

    #[test]
    fn whitelist_requires_match_when_non_empty() {
        let v = validator(&["example.com"], &[]);
        assert!(v.is_domain_allowed("example.com"));
        assert!(v.is_domain_allowed("www.example.com"));
        assert!(!v.is_domain_allowed("other.test"));
    }

    #[test]
    fn blacklist_wins_over_whitelist() {
        let v = validator(&["example.com"], &["ads.example.com"]);
        assert!(!v.is_domain_allowed("ads.example.com"));
        assert!(v.is_domain_allowed("www.example.com"));
    }

    #[test]
    fn domain_decision_is_stable() {
        let v = validator(&["example.com"], &[]);
        let first = v.is_domain_allowed("other.test");
        let second = v.is_domain_allowed("other.test");
        assert_eq!(first, second);
    }
}
