mod fixture;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use shardmerge_common::config::MergeConfig;
use shardmerge_common::datum::Datum;
use shardmerge_engine::{describe_chain, MergeEngine, MergedResult, QueryResult, QueryShape};

#[derive(Parser, Debug)]
#[command(
    name = "shardmerge",
    about = "Merge per-shard result fixtures into one logical result",
    version
)]
struct Cli {
    /// Merge config file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Query shape as JSON: group_by, order_by, aggregations, pagination.
    #[arg(short, long)]
    plan: Option<PathBuf>,

    /// Shard fixture (JSON); repeat once per shard, in submission order.
    #[arg(short, long = "shard", value_name = "FILE")]
    shards: Vec<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090).
    #[arg(long)]
    metrics_addr: Option<String>,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Header line, then one tuple per row.
    Plain,
    /// One JSON array per row.
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_default_config {
        println!("{}", MergeConfig::default().to_toml_string()?);
        return Ok(());
    }

    shardmerge_observability::init_tracing();
    if let Some(addr) = &cli.metrics_addr {
        start_metrics(addr)?;
    }

    let config = match &cli.config {
        Some(path) => MergeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MergeConfig::default(),
    };
    let shape: QueryShape = match &cli.plan {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading plan {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing plan {}", path.display()))?
        }
        None => QueryShape::default(),
    };

    let mut shards: Vec<Box<dyn QueryResult>> = Vec::with_capacity(cli.shards.len());
    for path in &cli.shards {
        shards.push(Box::new(fixture::load_shard(path)?));
    }
    tracing::info!(
        shards = shards.len(),
        dialect = ?config.dialect,
        "merging shard fixtures"
    );

    let mut merged = MergeEngine::new(config).merge(shards, &shape)?;
    let chain: Vec<&str> = describe_chain(merged.as_ref())
        .iter()
        .map(|k| k.name())
        .collect();
    tracing::debug!(chain = %chain.join(" <- "), "merge chain");

    let printed = print_rows(merged.as_mut(), cli.format)?;
    tracing::info!(rows = printed, "merge complete");
    Ok(())
}

fn start_metrics(addr: &str) -> Result<()> {
    shardmerge_observability::init_metrics(addr)
        .map_err(|e| anyhow::anyhow!("starting metrics endpoint on {}: {}", addr, e))
}

fn print_rows(merged: &mut dyn MergedResult, format: OutputFormat) -> Result<usize> {
    let columns = merged.metadata().columns().to_vec();
    if format == OutputFormat::Plain {
        let labels: Vec<&str> = columns.iter().map(|c| c.label.as_str()).collect();
        println!("{}", labels.join("\t"));
    }
    let mut count = 0;
    while merged.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            values.push(merged.get_value(column.index, column.data_type)?);
        }
        match format {
            OutputFormat::Plain => {
                let cells: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                println!("{}", cells.join("\t"));
            }
            OutputFormat::Json => {
                let cells: Vec<serde_json::Value> = values.iter().map(datum_to_json).collect();
                println!("{}", serde_json::Value::Array(cells));
            }
        }
        count += 1;
    }
    Ok(count)
}

fn datum_to_json(datum: &Datum) -> serde_json::Value {
    use serde_json::Value;
    match datum {
        Datum::Null => Value::Null,
        Datum::Boolean(b) => Value::Bool(*b),
        Datum::Int32(v) => Value::from(*v),
        Datum::Int64(v) => Value::from(*v),
        Datum::Float64(v) => Value::from(*v),
        other => Value::String(other.to_string()),
    }
}
