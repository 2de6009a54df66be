use thiserror::Error;

/// A single offending configuration field, reported with enough context
/// that an operator can fix the environment without reading the source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid config field `{field}` = `{value}`: {reason} (example: {example})")]
pub struct ConfigError {
    pub field: String,
    pub value: String,
    pub reason: String,
    pub example: String,
}

impl ConfigError {
    pub fn new(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
        example: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            example: example.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CrawlerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// A fetched response that is syntactically fine but not a crawl
    /// candidate (bad status, non-HTML content-type). Never retried.
    #[error("response rejected: {0}")]
    Rejected(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("coordination store error: {0}")]
    Kv(String),

    #[error("message bus error: {0}")]
    Bus(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
