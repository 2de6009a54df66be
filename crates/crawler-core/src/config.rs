use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub brokers: String,
    pub topic: String,
    pub retry_max: u32,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub password: Option<String>,
    pub timeout: Duration,
    pub retry_max: u32,
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u64,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub request_delay: Duration,
    pub max_content_size: usize,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub user_agent: String,
    pub debug: bool,
    pub monitor_port: u16,
}

/// Every operational parameter the crawler needs, built once at startup and
/// shared by reference from then on. See `from_env` for the environment
/// variable names and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub bus: BusConfig,
    pub kv: KvConfig,
    pub crawl: CrawlConfig,
    pub performance: PerformanceConfig,
    pub app: AppConfig,
}

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load and validate configuration from the process environment.
    /// Returns the first offending field on failure; never partially valid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bus = BusConfig {
            brokers: env_string("BUS_BROKERS", "localhost:9092"),
            topic: env_string("BUS_TOPIC", "raw-html"),
            retry_max: env_parsed("BUS_RETRY_MAX", 3),
        };
        validate_bus(&bus)?;

        let kv = KvConfig {
            host: env_string("KV_HOST", "localhost"),
            port: env_parsed("KV_PORT", 6379),
            db: env_parsed("KV_DB", 0),
            password: std::env::var("KV_PASSWORD").ok().filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(env_parsed("KV_TIMEOUT_SECONDS", 5)),
            retry_max: env_parsed("KV_RETRY_MAX", 3),
        };
        validate_kv(&kv)?;

        let crawl = CrawlConfig {
            seeds: env_list("SEED_URLS"),
            max_depth: env_parsed("CRAWL_DEPTH", 3),
            max_pages: env_parsed("MAX_PAGES", 1_000),
            whitelist: env_list("WHITELIST"),
            blacklist: env_list("BLACKLIST"),
        };
        validate_crawl(&crawl)?;

        let performance = PerformanceConfig {
            max_concurrency: env_parsed("MAX_CONCURRENCY", 16),
            request_timeout: Duration::from_secs(env_parsed("REQUEST_TIMEOUT_SECONDS", 30)),
            request_delay: Duration::from_millis(env_parsed("REQUEST_DELAY_MS", 0)),
            max_content_size: env_parsed("MAX_CONTENT_SIZE_BYTES", 10 * MIB as u64) as usize,
        };
        validate_performance(&performance)?;

        let app = AppConfig {
            log_level: env_string("LOG_LEVEL", "info"),
            user_agent: env_string("USER_AGENT", "webcrawler/0.1 (+https://example.invalid/bot)"),
            debug: env_parsed("DEBUG", false),
            monitor_port: env_parsed("MONITOR_PORT", 9090),
        };
        validate_app(&app)?;

        Ok(Self {
            bus,
            kv,
            crawl,
            performance,
            app,
        })
    }
}

fn validate_bus(c: &BusConfig) -> Result<(), ConfigError> {
    if c.brokers.trim().is_empty() {
        return Err(ConfigError::new(
            "BUS_BROKERS",
            &c.brokers,
            "must be non-empty",
            "localhost:9092",
        ));
    }
    let topic_ok = !c.topic.is_empty()
        && c.topic
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'));
    if !topic_ok {
        return Err(ConfigError::new(
            "BUS_TOPIC",
            &c.topic,
            "must be non-empty and match [A-Za-z0-9._-]+",
            "raw-html",
        ));
    }
    if c.retry_max > 10 {
        return Err(ConfigError::new(
            "BUS_RETRY_MAX",
            c.retry_max.to_string(),
            "must be between 0 and 10",
            "3",
        ));
    }
    Ok(())
}

fn validate_kv(c: &KvConfig) -> Result<(), ConfigError> {
    if c.host.trim().is_empty() {
        return Err(ConfigError::new("KV_HOST", &c.host, "must be non-empty", "localhost"));
    }
    if c.port == 0 {
        return Err(ConfigError::new(
            "KV_PORT",
            c.port.to_string(),
            "must be between 1 and 65535",
            "6379",
        ));
    }
    if c.db > 15 {
        return Err(ConfigError::new(
            "KV_DB",
            c.db.to_string(),
            "must be between 0 and 15",
            "0",
        ));
    }
    if c.timeout < Duration::from_secs(1) || c.timeout > Duration::from_secs(600) {
        return Err(ConfigError::new(
            "KV_TIMEOUT_SECONDS",
            c.timeout.as_secs().to_string(),
            "must be between 1s and 10m",
            "5",
        ));
    }
    if c.retry_max > 10 {
        return Err(ConfigError::new(
            "KV_RETRY_MAX",
            c.retry_max.to_string(),
            "must be between 0 and 10",
            "3",
        ));
    }
    Ok(())
}

fn validate_crawl(c: &CrawlConfig) -> Result<(), ConfigError> {
    if c.seeds.is_empty() {
        return Err(ConfigError::new(
            "SEED_URLS",
            "",
            "must be non-empty",
            "https://example.com/",
        ));
    }
    for seed in &c.seeds {
        if Url::parse(seed).is_err() {
            return Err(ConfigError::new(
                "SEED_URLS",
                seed,
                "each entry must be a syntactically valid absolute URL",
                "https://example.com/",
            ));
        }
    }
    if c.max_depth < 1 || c.max_depth > 20 {
        return Err(ConfigError::new(
            "CRAWL_DEPTH",
            c.max_depth.to_string(),
            "must be between 1 and 20",
            "3",
        ));
    }
    if c.max_pages < 1 || c.max_pages > 1_000_000 {
        return Err(ConfigError::new(
            "MAX_PAGES",
            c.max_pages.to_string(),
            "must be between 1 and 1,000,000",
            "1000",
        ));
    }
    Ok(())
}

fn validate_performance(c: &PerformanceConfig) -> Result<(), ConfigError> {
    if c.max_concurrency < 1 || c.max_concurrency > 1000 {
        return Err(ConfigError::new(
            "MAX_CONCURRENCY",
            c.max_concurrency.to_string(),
            "must be between 1 and 1000",
            "16",
        ));
    }
    if c.request_timeout < Duration::from_secs(1) || c.request_timeout > Duration::from_secs(300) {
        return Err(ConfigError::new(
            "REQUEST_TIMEOUT_SECONDS",
            c.request_timeout.as_secs().to_string(),
            "must be between 1s and 5m",
            "30",
        ));
    }
    if c.request_delay > Duration::from_secs(30) {
        return Err(ConfigError::new(
            "REQUEST_DELAY_MS",
            c.request_delay.as_millis().to_string(),
            "must be between 0 and 30s",
            "0",
        ));
    }
    if c.max_content_size < KIB || c.max_content_size > 100 * MIB {
        return Err(ConfigError::new(
            "MAX_CONTENT_SIZE_BYTES",
            c.max_content_size.to_string(),
            "must be between 1 KiB and 100 MiB",
            "10485760",
        ));
    }
    Ok(())
}

fn validate_app(c: &AppConfig) -> Result<(), ConfigError> {
    const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal", "panic"];
    if !LEVELS.contains(&c.log_level.to_lowercase().as_str()) {
        return Err(ConfigError::new(
            "LOG_LEVEL",
            &c.log_level,
            "must be one of trace/debug/info/warn/error/fatal/panic",
            "info",
        ));
    }
    if c.user_agent.trim().is_empty() {
        return Err(ConfigError::new(
            "USER_AGENT",
            &c.user_agent,
            "must be non-empty",
            "webcrawler/0.1",
        ));
    }
    if c.monitor_port < 1024 {
        return Err(ConfigError::new(
            "MONITOR_PORT",
            c.monitor_port.to_string(),
            "must be between 1024 and 65535",
            "9090",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_bus() -> BusConfig {
        BusConfig {
            brokers: "localhost:9092".into(),
            topic: "raw-html".into(),
            retry_max: 3,
        }
    }

    #[test]
    fn rejects_empty_brokers() {
        let mut bus = valid_bus();
        bus.brokers = "".into();
        let err = validate_bus(&bus).unwrap_err();
        assert_eq!(err.field, "BUS_BROKERS");
    }

    #[test]
    fn rejects_bad_topic_chars() {
        let mut bus = valid_bus();
        bus.topic = "raw html!".into();
        assert!(validate_bus(&bus).is_err());
    }

    #[test]
    fn accepts_valid_bus() {
        assert!(validate_bus(&valid_bus()).is_ok());
    }

    #[test]
    fn rejects_kv_db_out_of_range() {
        let kv = KvConfig {
            host: "localhost".into(),
            port: 6379,
            db: 16,
            password: None,
            timeout: Duration::from_secs(5),
            retry_max: 3,
        };
        let err = validate_kv(&kv).unwrap_err();
        assert_eq!(err.field, "KV_DB");
    }

    #[test]
    fn rejects_missing_seeds() {
        let crawl = CrawlConfig {
            seeds: vec![],
            max_depth: 3,
            max_pages: 10,
            whitelist: vec![],
            blacklist: vec![],
        };
        let err = validate_crawl(&crawl).unwrap_err();
        assert_eq!(err.field, "SEED_URLS");
    }

    #[test]
    fn rejects_unparseable_seed() {
        let crawl = CrawlConfig {
            seeds: vec!["not a url".into()],
            max_depth: 3,
            max_pages: 10,
            whitelist: vec![],
            blacklist: vec![],
        };
        assert!(validate_crawl(&crawl).is_err());
    }

    #[test]
    fn rejects_request_delay_over_30s() {
        let perf = PerformanceConfig {
            max_concurrency: 16,
            request_timeout: Duration::from_secs(30),
            request_delay: Duration::from_secs(31),
            max_content_size: MIB,
        };
        let err = validate_performance(&perf).unwrap_err();
        assert_eq!(err.field, "REQUEST_DELAY_MS");
    }

    #[test]
    fn rejects_unknown_log_level() {
        let app = AppConfig {
            log_level: "verbose".into(),
            user_agent: "x".into(),
            debug: false,
            monitor_port: 9090,
        };
        let err = validate_app(&app).unwrap_err();
        assert_eq!(err.field, "LOG_LEVEL");
    }
}
