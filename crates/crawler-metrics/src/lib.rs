use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Process-wide counters for the crawl pipeline. All increments are
/// independent atomic operations; a `Snapshot` is not guaranteed to be
/// consistent across counters, only each counter internally consistent.
pub struct Metrics {
    inflight_pages: AtomicI64,
    pages_processed: AtomicU64,
    pages_successful: AtomicU64,
    pages_failed: AtomicU64,
    bus_ok: AtomicU64,
    bus_failed: AtomicU64,
    bus_errored: AtomicU64,
    kv_ok: AtomicU64,
    kv_failed: AtomicU64,
    kv_errored: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inflight_pages: AtomicI64::new(0),
            pages_processed: AtomicU64::new(0),
            pages_successful: AtomicU64::new(0),
            pages_failed: AtomicU64::new(0),
            bus_ok: AtomicU64::new(0),
            bus_failed: AtomicU64::new(0),
            bus_errored: AtomicU64::new(0),
            kv_ok: AtomicU64::new(0),
            kv_failed: AtomicU64::new(0),
            kv_errored: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn increment_inflight(&self) {
        self.inflight_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_inflight(&self) {
        self.inflight_pages.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn increment_processed(&self) {
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_successful(&self) {
        self.pages_successful.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.pages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bus_ok(&self) {
        self.bus_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bus_failed(&self) {
        self.bus_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_bus_errored(&self) {
        self.bus_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_kv_ok(&self) {
        self.kv_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_kv_failed(&self) {
        self.kv_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_kv_errored(&self) {
        self.kv_errored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inflight(&self) -> i64 {
        self.inflight_pages.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u64 {
        self.pages_processed.load(Ordering::Relaxed)
    }

    pub fn successful(&self) -> u64 {
        self.pages_successful.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.pages_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            inflight_pages: self.inflight(),
            pages_processed: self.processed(),
            pages_successful: self.successful(),
            pages_failed: self.failed(),
            bus_ok: self.bus_ok.load(Ordering::Relaxed),
            bus_failed: self.bus_failed.load(Ordering::Relaxed),
            bus_errored: self.bus_errored.load(Ordering::Relaxed),
            kv_ok: self.kv_ok.load(Ordering::Relaxed),
            kv_failed: self.kv_failed.load(Ordering::Relaxed),
            kv_errored: self.kv_errored.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    /// Copy current counters into a pull-based (Prometheus text) exposition.
    /// Called fresh on every `/metrics` scrape — there is no cached gauge state.
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();
        let gauge = |out: &mut String, name: &str, help: &str, value: i64| {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"));
        };
        gauge(&mut out, "crawler_inflight_pages", "URLs currently being fetched", s.inflight_pages);
        gauge(&mut out, "crawler_pages_processed_total", "URLs processed to a terminal state", s.pages_processed as i64);
        gauge(&mut out, "crawler_pages_successful_total", "Pages published successfully", s.pages_successful as i64);
        gauge(&mut out, "crawler_pages_failed_total", "Pages permanently failed", s.pages_failed as i64);
        gauge(&mut out, "crawler_bus_ok_total", "Bus publishes acknowledged", s.bus_ok as i64);
        gauge(&mut out, "crawler_bus_failed_total", "Bus publishes rejected (conditional failure)", s.bus_failed as i64);
        gauge(&mut out, "crawler_bus_errored_total", "Bus publishes abandoned after retry (transport failure)", s.bus_errored as i64);
        gauge(&mut out, "crawler_kv_ok_total", "Coordination store operations that succeeded", s.kv_ok as i64);
        gauge(&mut out, "crawler_kv_failed_total", "Coordination store operations rejected (already claimed)", s.kv_failed as i64);
        gauge(&mut out, "crawler_kv_errored_total", "Coordination store operations abandoned after retry", s.kv_errored as i64);
        gauge(&mut out, "crawler_uptime_seconds", "Seconds since process start", s.uptime_seconds as i64);
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub inflight_pages: i64,
    pub pages_processed: u64,
    pub pages_successful: u64,
    pub pages_failed: u64,
    pub bus_ok: u64,
    pub bus_failed: u64,
    pub bus_errored: u64,
    pub kv_ok: u64,
    pub kv_failed: u64,
    pub kv_errored: u64,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inflight_goes_up_and_down() {
        let m = Metrics::new();
        m.increment_inflight();
        m.increment_inflight();
        m.decrement_inflight();
        assert_eq!(m.inflight(), 1);
    }

    #[test]
    fn counters_start_at_zero() {
        let m = Metrics::new();
        let s = m.snapshot();
        assert_eq!(s.pages_processed, 0);
        assert_eq!(s.pages_successful, 0);
        assert_eq!(s.pages_failed, 0);
        assert_eq!(s.inflight_pages, 0);
    }

    #[test]
    fn snapshot_reflects_increments() {
        let m = Metrics::new();
        m.increment_processed();
        m.increment_successful();
        m.increment_bus_ok();
        let s = m.snapshot();
        assert_eq!(s.pages_processed, 1);
        assert_eq!(s.pages_successful, 1);
        assert_eq!(s.bus_ok, 1);
    }

    #[test]
    fn prometheus_text_contains_all_gauges() {
        let m = Metrics::new();
        let text = m.render_prometheus();
        for name in [
            "crawler_inflight_pages",
            "crawler_pages_processed_total",
            "crawler_pages_successful_total",
            "crawler_pages_failed_total",
            "crawler_bus_ok_total",
            "crawler_bus_failed_total",
            "crawler_bus_errored_total",
            "crawler_kv_ok_total",
            "crawler_kv_failed_total",
            "crawler_kv_errored_total",
            "crawler_uptime_seconds",
        ] {
            assert!(text.contains(name), "missing {name}");
        }
    }
}
