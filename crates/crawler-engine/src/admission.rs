use url::Url;

use crawler_core::{UrlTask, UrlValidator};
use crawler_metrics::Metrics;

/// Runs the full pre-enqueue pipeline for a candidate URL: normalize, scheme
/// check, domain check, depth check. Returns `None` for anything rejected;
/// only a normalization failure is counted against `pages_failed`, since
/// scheme/domain/depth rejection is routine filtering, not a page failure.
pub fn admit(
    validator: &UrlValidator,
    metrics: &Metrics,
    max_depth: u32,
    raw_url: &str,
    depth: u32,
    parent: Option<String>,
) -> Option<UrlTask> {
    let canonical = match validator.normalize(raw_url) {
        Ok(c) => c,
        Err(_) => {
            metrics.increment_failed();
            return None;
        }
    };

    let parsed = Url::parse(&canonical).ok()?;

    if !validator.is_scheme_allowed(&parsed) {
        return None;
    }

    let host = parsed.host_str()?;
    if !validator.is_domain_allowed(host) {
        return None;
    }

    if depth > max_depth {
        return None;
    }

    Some(match parent {
        Some(p) => UrlTask::discovered(canonical, depth, p),
        None => UrlTask::seed(canonical),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_seed_within_depth() {
        let v = UrlValidator::new(vec![], vec![]);
        let m = Metrics::new();
        let task = admit(&v, &m, 3, "https://a.test/", 1, None).unwrap();
        assert_eq!(task.depth, 1);
        assert_eq!(m.failed(), 0);
    }

    #[test]
    fn rejects_discovered_beyond_max_depth() {
        let v = UrlValidator::new(vec![], vec![]);
        let m = Metrics::new();
        assert!(admit(&v, &m, 1, "https://a.test/x", 2, Some("https://a.test/".into())).is_none());
    }

    #[test]
    fn counts_unparseable_url_as_failed() {
        let v = UrlValidator::new(vec![], vec![]);
        let m = Metrics::new();
        assert!(admit(&v, &m, 3, "not a url", 1, None).is_none());
        assert_eq!(m.failed(), 1);
    }

    #[test]
    fn blocked_domain_is_silently_dropped_not_failed() {
        let v = UrlValidator::new(vec![], vec!["blocked.test".into()]);
        let m = Metrics::new();
        assert!(admit(&v, &m, 3, "https://blocked.test/", 1, None).is_none());
        assert_eq!(m.failed(), 0);
    }

    #[test]
    fn disallowed_scheme_is_silently_dropped() {
        let v = UrlValidator::new(vec![], vec![]);
        let m = Metrics::new();
        assert!(admit(&v, &m, 3, "ftp://a.test/", 1, None).is_none());
        assert_eq!(m.failed(), 0);
    }
}
