//! Observability setup: structured logging and Prometheus metrics for the
//! merge engine.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with structured logging.
/// `RUST_LOG` wins over the built-in filter.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shardmerge=debug"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Initialize Prometheus metrics exporter listening on `listen_addr`.
pub fn init_metrics(listen_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let addr: std::net::SocketAddr = listen_addr.parse()?;
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("Prometheus metrics endpoint on http://{}/metrics", addr);
    Ok(())
}

/// Record one composed merge. `strategy` is the base merger, `decorator`
/// the pagination wrapper ("none" when absent).
pub fn record_merge(strategy: &str, decorator: &str, shard_count: usize) {
    metrics::counter!(
        "shardmerge_merges_total",
        "strategy" => strategy.to_string(),
        "decorator" => decorator.to_string()
    )
    .increment(1);
    metrics::histogram!("shardmerge_merge_shards").record(shard_count as f64);
}

/// Rows drained into memory by one group-by / aggregation merge.
pub fn record_rows_buffered(rows: usize, groups: usize) {
    metrics::histogram!("shardmerge_rows_buffered").record(rows as f64);
    metrics::histogram!("shardmerge_groups_emitted").record(groups as f64);
}

/// Record a failed merge. `kind` is the error classification.
pub fn record_merge_failure(kind: &str) {
    metrics::counter!("shardmerge_merge_failures_total", "kind" => kind.to_string()).increment(1);
}
