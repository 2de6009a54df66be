use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crawler_core::{ClaimOutcome, Config, CrawlerError, RawHtmlMessage, UrlTask, UrlValidator};
use crawler_coordination::{self as coordination, KvClient};
use crawler_metrics::Metrics;

use crate::admission;
use crate::budget::BudgetGate;
use crate::bus::{BusProducer, PublishOutcome};
use crate::discovery;
use crate::frontier::Frontier;

type DelayLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Everything a worker needs to process one `UrlTask` end to end. Shared by
/// `Arc` across the whole pool; nothing here is worker-local state.
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub budget: Arc<BudgetGate>,
    pub kv: Arc<KvClient>,
    pub bus: Arc<BusProducer>,
    pub validator: Arc<UrlValidator>,
    pub metrics: Arc<Metrics>,
    pub http: reqwest::Client,
    pub limiter: Option<Arc<DelayLimiter>>,
    pub max_depth: u32,
    pub max_content_size: usize,
    pub claim_ttl: Duration,
}

impl WorkerContext {
    pub fn new(
        config: &Config,
        frontier: Arc<Frontier>,
        budget: Arc<BudgetGate>,
        kv: Arc<KvClient>,
        bus: Arc<BusProducer>,
        validator: Arc<UrlValidator>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, CrawlerError> {
        let http = reqwest::Client::builder()
            .user_agent(config.app.user_agent.clone())
            .timeout(config.performance.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| CrawlerError::Network(e.to_string()))?;

        let limiter = if config.performance.request_delay.is_zero() {
            None
        } else {
            let per_second = (Duration::from_secs(1).as_millis()
                / config.performance.request_delay.as_millis().max(1))
            .max(1) as u32;
            Some(Arc::new(RateLimiter::direct(Quota::per_second(
                std::num::NonZeroU32::new(per_second).unwrap(),
            ))))
        };

        Ok(Self {
            frontier,
            budget,
            kv,
            bus,
            validator,
            metrics,
            http,
            limiter,
            max_depth: config.crawl.max_depth,
            max_content_size: config.performance.max_content_size,
            claim_ttl: coordination::default_claim_ttl(config.performance.request_timeout),
        })
    }
}

/// Runs until the shutdown broadcast fires or the frontier closes.
pub async fn run(worker_id: usize, ctx: Arc<WorkerContext>, mut shutdown: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            task = ctx.frontier.dequeue() => {
                match task {
                    Some(task) => process(worker_id, &ctx, task).await,
                    None => return,
                }
            }
        }
    }
}

async fn process(worker_id: usize, ctx: &WorkerContext, task: UrlTask) {
    if !ctx.budget.try_reserve() {
        return;
    }

    match ctx.kv.try_claim(&task.url, ctx.claim_ttl).await {
        Ok(ClaimOutcome::AlreadyClaimed) => {
            ctx.metrics.increment_kv_failed();
            return;
        }
        Ok(ClaimOutcome::Claimed) => {
            ctx.metrics.increment_kv_ok();
        }
        Err(e) => {
            ctx.metrics.increment_kv_errored();
            warn!(worker_id, url = %task.url, error = %e, "claim failed, abandoning url");
            return;
        }
    }

    ctx.metrics.increment_inflight();
    let outcome = fetch_and_publish(worker_id, ctx, &task).await;
    ctx.metrics.decrement_inflight();
    ctx.metrics.increment_processed();

    match outcome {
        Ok(links) => {
            ctx.metrics.increment_successful();
            if let Err(e) = ctx.kv.mark_done(&task.url, coordination::DEFAULT_DONE_TTL).await {
                warn!(worker_id, url = %task.url, error = %e, "mark_done failed");
            }
            for link in links {
                if let Some(next) = admission::admit(
                    &ctx.validator,
                    &ctx.metrics,
                    ctx.max_depth,
                    link.as_str(),
                    task.depth + 1,
                    Some(task.url.clone()),
                ) {
                    ctx.frontier.try_enqueue_discovered(next);
                }
            }
        }
        Err(CrawlerError::Bus(reason)) => {
            // Already accounted for in bus_failed/bus_errored; not a fetch failure.
            debug!(worker_id, url = %task.url, reason = %reason, "bus publish did not succeed");
        }
        Err(e) => {
            debug!(worker_id, url = %task.url, error = %e, "fetch failed");
            ctx.metrics.increment_failed();
        }
    }
}

/// A fetched, gated, and parsed page, independent of how it gets published.
/// Kept separate from `fetch_and_publish` so the fetch/gate/discover path can
/// be exercised against a mock HTTP server without a live KV store or bus.
struct FetchedPage {
    canonical_url: String,
    status: u16,
    content_type: String,
    body: String,
    links: Vec<Url>,
}

/// Fetches `request_url`, applies the status/content-type gate, and resolves
/// discovered links against the final, post-redirect, canonicalized URL —
/// not the URL that was requested.
async fn fetch_page(
    http: &reqwest::Client,
    validator: &UrlValidator,
    max_content_size: usize,
    limiter: Option<&DelayLimiter>,
    worker_id: usize,
    request_url: &str,
) -> Result<FetchedPage, CrawlerError> {
    if let Some(limiter) = limiter {
        limiter.until_ready().await;
    }

    let response = http
        .get(request_url)
        .send()
        .await
        .map_err(|e| CrawlerError::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let final_url = response.url().clone();

    if !(200..300).contains(&status) {
        warn!(worker_id, url = request_url, status, "rejecting non-2xx response");
        return Err(CrawlerError::Rejected(format!("status {status}")));
    }
    if !content_type.contains("text/html") {
        debug!(worker_id, url = request_url, content_type = %content_type, "rejecting non-HTML response");
        return Err(CrawlerError::Rejected(format!("content-type {content_type}")));
    }

    let body = read_capped(response, max_content_size).await?;

    let canonical_final = validator.normalize(final_url.as_str())?;
    let base = Url::parse(&canonical_final)
        .map_err(|e| CrawlerError::InvalidUrl(format!("{canonical_final}: {e}")))?;
    let links = discovery::extract_links(&body, &base);

    Ok(FetchedPage {
        canonical_url: canonical_final,
        status,
        content_type,
        body,
        links,
    })
}

/// Fetches, publishes, and returns the discovered links on success.
async fn fetch_and_publish(
    worker_id: usize,
    ctx: &WorkerContext,
    task: &UrlTask,
) -> Result<Vec<Url>, CrawlerError> {
    let page = fetch_page(
        &ctx.http,
        &ctx.validator,
        ctx.max_content_size,
        ctx.limiter.as_deref(),
        worker_id,
        &task.url,
    )
    .await?;

    let message = RawHtmlMessage {
        url: page.canonical_url,
        fetched_at: Utc::now(),
        status: page.status,
        content_type: page.content_type,
        depth: task.depth,
        parent_url: task.parent.clone(),
        body: page.body,
    };

    match ctx.bus.publish(&message).await {
        Ok(PublishOutcome::Delivered) => {
            ctx.metrics.increment_bus_ok();
            Ok(page.links)
        }
        Ok(PublishOutcome::Rejected(reason)) => {
            ctx.metrics.increment_bus_failed();
            Err(CrawlerError::Bus(reason))
        }
        Err(e) => {
            ctx.metrics.increment_bus_errored();
            Err(e)
        }
    }
}

async fn read_capped(response: reqwest::Response, max_size: usize) -> Result<String, CrawlerError> {
    let mut stream = response.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| CrawlerError::Network(e.to_string()))?;
        if buf.len() + chunk.len() > max_size {
            return Err(CrawlerError::BodyTooLarge {
                size: buf.len() + chunk.len(),
                max: max_size,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn validator() -> UrlValidator {
        UrlValidator::new(vec![], vec![])
    }

    #[tokio::test]
    async fn rejects_non_2xx_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let v = validator();
        let url = format!("{}/missing", server.uri());
        let err = fetch_page(&http, &v, 1_000_000, None, 0, &url).await.unwrap_err();
        assert!(matches!(err, CrawlerError::Rejected(_)));
    }

    #[tokio::test]
    async fn rejects_non_html_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/json").set_body_string("{}"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let v = validator();
        let url = format!("{}/data.json", server.uri());
        let err = fetch_page(&http, &v, 1_000_000, None, 0, &url).await.unwrap_err();
        assert!(matches!(err, CrawlerError::Rejected(_)));
    }

    #[tokio::test]
    async fn caps_body_size() {
        let server = MockServer::start().await;
        let big_body = "x".repeat(2048);
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html").set_body_string(big_body))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let v = validator();
        let url = format!("{}/big", server.uri());
        let err = fetch_page(&http, &v, 1024, None, 0, &url).await.unwrap_err();
        assert!(matches!(err, CrawlerError::BodyTooLarge { .. }));
    }

    #[tokio::test]
    async fn resolves_links_against_final_redirected_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/final/"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/final/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(r#"<a href="next">next</a>"#),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let v = validator();
        let url = format!("{}/start", server.uri());
        let page = fetch_page(&http, &v, 1_000_000, None, 0, &url).await.unwrap();

        assert!(page.canonical_url.ends_with("/final"));
        assert_eq!(page.links.len(), 1);
        assert!(page.links[0].as_str().ends_with("/final/next"));
    }
}
