use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work flowing through the frontier: an already-canonical URL
/// at a given depth, with an optional parent for provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTask {
    pub url: String,
    pub depth: u32,
    pub parent: Option<String>,
    pub retry_count: u32,
}

impl UrlTask {
    /// Seeds start at depth 1, the first crawled level. `CrawlDepth = 1`
    /// therefore means "fetch the seeds, enqueue nothing discovered".
    pub fn seed(url: String) -> Self {
        Self {
            url,
            depth: 1,
            parent: None,
            retry_count: 0,
        }
    }

    pub fn discovered(url: String, depth: u32, parent: String) -> Self {
        Self {
            url,
            depth,
            parent: Some(parent),
            retry_count: 0,
        }
    }
}

/// The payload published to the message bus for every successfully fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawHtmlMessage {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub status: u16,
    pub content_type: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub body: String,
}

/// Outcome of a single `try_claim` call against the coordination store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
}

/// Health of one external dependency as observed by the monitor endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub healthy: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: HealthServices,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthServices {
    pub redis: ServiceStatus,
    pub kafka: ServiceStatus,
    pub application: ServiceStatus,
}

impl HealthReport {
    pub fn new(redis: ServiceStatus, kafka: ServiceStatus) -> Self {
        let mut errors = Vec::new();
        if let Some(e) = &redis.error {
            errors.push(format!("redis: {e}"));
        }
        if let Some(e) = &kafka.error {
            errors.push(format!("kafka: {e}"));
        }
        let healthy = redis.healthy && kafka.healthy;
        Self {
            status: if healthy { "healthy" } else { "unhealthy" },
            timestamp: Utc::now(),
            services: HealthServices {
                redis,
                kafka,
                application: ServiceStatus {
                    healthy: true,
                    error: None,
                },
            },
            errors,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
