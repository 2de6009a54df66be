use anyhow::{Context, Result};
use tracing::{error, info};

// mimalloc avoids glibc malloc's tendency to hold onto memory under the
// high-fanout allocation churn of concurrent fetch/parse workers.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use crawler_core::Config;
use crawler_engine::Engine;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(32)
        .thread_stack_size(8 * 1024 * 1024)
        .max_blocking_threads(512)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let config = Config::from_env().context("configuration invalid")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.app.log_level.clone())),
        )
        .init();

    info!(
        seeds = config.crawl.seeds.len(),
        max_depth = config.crawl.max_depth,
        max_pages = config.crawl.max_pages,
        concurrency = config.performance.max_concurrency,
        "starting crawl"
    );

    let engine = match Engine::bootstrap(config).await {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to bootstrap engine");
            return Err(e.into());
        }
    };

    if let Err(e) = engine.run().await {
        error!(error = %e, "crawl exited with error");
        return Err(e.into());
    }

    Ok(())
}
