use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crawler_core::config::BusConfig;
use crawler_core::{CrawlerError, RawHtmlMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// A conditional, non-retryable rejection (e.g. oversize payload).
    Rejected(String),
}

/// Wraps an `rdkafka` producer configured for leader-ack durability with a
/// compressed payload encoding. Safe to share across workers: `FutureProducer`
/// clones cheaply and is safe for concurrent sends.
pub struct BusProducer {
    producer: FutureProducer,
    topic: String,
    retry_max: u32,
}

impl BusProducer {
    pub fn new(config: &BusConfig) -> Result<Self, CrawlerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("message.timeout.ms", "30000")
            .set("acks", "1")
            .set("compression.type", "lz4")
            .create()
            .map_err(|e| CrawlerError::Bus(e.to_string()))?;

        Ok(Self {
            producer,
            topic: config.topic.clone(),
            retry_max: config.retry_max,
        })
    }

    /// Attempt to produce, retrying transient transport failures up to
    /// `retry_max` times. A broker-side conditional rejection (e.g. message
    /// too large) is never retried.
    pub async fn publish(&self, message: &RawHtmlMessage) -> Result<PublishOutcome, CrawlerError> {
        let payload = serde_json::to_vec(message).map_err(|e| CrawlerError::Bus(e.to_string()))?;

        let mut attempt = 0u32;
        loop {
            let record = FutureRecord::to(&self.topic)
                .key(message.url.as_str())
                .payload(&payload);

            match self.producer.send(record, Duration::from_secs(10)).await {
                Ok(_) => return Ok(PublishOutcome::Delivered),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::MessageSizeTooLarge), _)) => {
                    return Ok(PublishOutcome::Rejected(
                        "payload exceeds broker-side message size limit".into(),
                    ));
                }
                Err((_, _)) if attempt < self.retry_max => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    continue;
                }
                Err((err, _)) => return Err(CrawlerError::Bus(err.to_string())),
            }
        }
    }

    pub async fn flush(&self, timeout: Duration) -> Result<(), CrawlerError> {
        self.producer
            .flush(timeout)
            .map_err(|e| CrawlerError::Bus(e.to_string()))
    }

    /// Cheap liveness probe used by the `/health` endpoint: fetch broker
    /// metadata rather than maintaining a separate connection.
    pub fn health_check(&self) -> Result<(), CrawlerError> {
        self.producer
            .client()
            .fetch_metadata(None, Duration::from_secs(2))
            .map(|_| ())
            .map_err(|e| CrawlerError::Bus(e.to_string()))
    }
}
