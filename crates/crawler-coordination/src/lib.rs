use std::time::Duration;

use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::warn;

use crawler_core::config::KvConfig;
use crawler_core::{ClaimOutcome, CrawlerError};

/// Claim TTL defaults to four times the per-request timeout: long enough to
/// cover a slow fetch, short enough that a crashed worker's claim expires
/// and another instance can retry the URL.
pub fn default_claim_ttl(request_timeout: Duration) -> Duration {
    request_timeout * 4
}

/// `done` records are retained for a day so recently crawled URLs do not
/// immediately re-enter the frontier after a restart.
pub const DEFAULT_DONE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn key_for(canonical_url: &str) -> String {
    format!("crawler:url:{canonical_url}")
}

/// Thin coordination protocol over a shared Redis-compatible store: claim a
/// URL for crawling, mark it done, and answer liveness pings. Every command
/// inherits `timeout` as its deadline, independent of the retry loop around it.
pub struct KvClient {
    manager: ConnectionManager,
    retry_max: u32,
    timeout: Duration,
}

impl KvClient {
    pub async fn connect(config: &KvConfig) -> Result<Self, CrawlerError> {
        let mut url = format!("redis://{}:{}/{}", config.host, config.port, config.db);
        if let Some(password) = &config.password {
            url = format!("redis://:{password}@{}:{}/{}", config.host, config.port, config.db);
        }
        let client = redis::Client::open(url).map_err(|e| CrawlerError::Kv(e.to_string()))?;
        let manager = tokio::time::timeout(config.timeout, client.get_connection_manager())
            .await
            .map_err(|_| CrawlerError::Kv("connection timed out".into()))?
            .map_err(|e| CrawlerError::Kv(e.to_string()))?;
        Ok(Self {
            manager,
            retry_max: config.retry_max,
            timeout: config.timeout,
        })
    }

    /// Set-if-absent with TTL. Retries transient errors up to `retry_max`
    /// times with exponential backoff + jitter; on persistent failure the
    /// URL is neither claimed nor rejected, just abandoned by the caller.
    pub async fn try_claim(&self, canonical_url: &str, ttl: Duration) -> Result<ClaimOutcome, CrawlerError> {
        let key = key_for(canonical_url);
        let mut attempt = 0u32;
        loop {
            let mut conn = self.manager.clone();
            let result = tokio::time::timeout(
                self.timeout,
                redis::cmd("SET")
                    .arg(&key)
                    .arg("claimed")
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async::<_, Option<String>>(&mut conn),
            )
            .await
            .map_err(|_| CrawlerError::Timeout(self.timeout.as_secs()));

            match result {
                Ok(Ok(Some(_))) => return Ok(ClaimOutcome::Claimed),
                Ok(Ok(None)) => return Ok(ClaimOutcome::AlreadyClaimed),
                Ok(Err(e)) if attempt < self.retry_max => {
                    warn!(url = %canonical_url, attempt, error = %e, "kv claim transient error, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) if attempt < self.retry_max => {
                    warn!(url = %canonical_url, attempt, error = %e, "kv claim timed out, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(CrawlerError::Kv(e.to_string())),
                Err(e) => return Err(e),
            }
        }
    }

    /// Overwrite with a terminal status and a longer retention TTL.
    pub async fn mark_done(&self, canonical_url: &str, retention_ttl: Duration) -> Result<(), CrawlerError> {
        let key = key_for(canonical_url);
        let mut attempt = 0u32;
        loop {
            let mut conn = self.manager.clone();
            let result = tokio::time::timeout(
                self.timeout,
                conn.set_ex::<_, _, ()>(&key, "done", retention_ttl.as_secs()),
            )
            .await
            .map_err(|_| CrawlerError::Timeout(self.timeout.as_secs()));

            match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if attempt < self.retry_max => {
                    warn!(url = %canonical_url, attempt, error = %e, "kv mark_done transient error, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) if attempt < self.retry_max => {
                    warn!(url = %canonical_url, attempt, error = %e, "kv mark_done timed out, retrying");
                    backoff(attempt).await;
                    attempt += 1;
                }
                Ok(Err(e)) => return Err(CrawlerError::Kv(e.to_string())),
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn ping(&self) -> Result<(), CrawlerError> {
        let mut conn = self.manager.clone();
        tokio::time::timeout(
            self.timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await
        .map_err(|_| CrawlerError::Timeout(self.timeout.as_secs()))?
        .map(|_| ())
        .map_err(|e| CrawlerError::Kv(e.to_string()))
    }
}

async fn backoff(attempt: u32) {
    let base_ms = 100u64.saturating_mul(1u64 << attempt.min(10));
    let jitter_ms = rand::thread_rng().gen_range(0..50);
    tokio::time::sleep(Duration::from_millis(base_ms + jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_namespace_is_prefixed() {
        assert_eq!(key_for("https://a.test/"), "crawler:url:https://a.test/");
    }

    #[test]
    fn claim_ttl_is_four_times_request_timeout() {
        assert_eq!(default_claim_ttl(Duration::from_secs(10)), Duration::from_secs(40));
    }
}
