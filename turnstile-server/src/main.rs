use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use turnstile::{AdmissionController, BucketStore};

use turnstile_server::config::Config;
use turnstile_server::janitor;
use turnstile_server::metrics::Metrics;
use turnstile_server::middleware::AdmissionState;
use turnstile_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("turnstile={}", config.log_level).parse()?)
                .add_directive(format!("turnstile_server={}", config.log_level).parse()?),
        )
        .init();

    let cleanup_interval = Duration::from_secs(config.store.cleanup_interval);
    let mut builder = BucketStore::builder()
        .max_entries(config.store.max_entries)
        .idle_timeout(Duration::from_secs(config.store.idle_timeout))
        .cleanup_interval(cleanup_interval);
    if config.store.shards > 0 {
        builder = builder.shards(config.store.shards);
    }
    let store = Arc::new(builder.build());

    let quotas = config.quota_table()?;
    let controller = Arc::new(AdmissionController::new(
        config.classifier(),
        quotas,
        Arc::clone(&store),
    ));
    let metrics = Arc::new(Metrics::new());
    let state = AdmissionState::new(controller, Arc::clone(&metrics));

    let mut tasks = JoinSet::new();

    let sweeper = janitor::spawn(Arc::clone(&store), metrics, cleanup_interval);

    let transport = HttpTransport::new(&config.http.host, config.http.port)?;
    tasks.spawn(async move {
        tracing::info!("Starting HTTP transport on {}", transport.addr());
        transport.start(state).await
    });

    tracing::info!(
        "Turnstile started: {} shards, max {} entries, idle timeout {}s",
        store.shard_count(),
        store.max_entries(),
        config.store.idle_timeout
    );
    for class in turnstile::TrafficClass::ALL {
        let policy = quotas.policy(class);
        tracing::info!(
            "{} quota: {} per {:?}",
            class,
            policy.capacity(),
            policy.refill_period()
        );
    }

    // The transport runs until it fails
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                sweeper.abort();
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                sweeper.abort();
                return Err(anyhow::anyhow!("Transport task panicked"));
            }
        }
    }

    sweeper.abort();
    Ok(())
}
