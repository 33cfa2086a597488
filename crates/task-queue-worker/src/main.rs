use task_queue_broker::RedisQueue;
use task_queue_protocol::WireFormat;
use task_queue_worker::{OperationRegistry, Worker, WorkerConfig, WorkerMetrics, WorkerReport};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tq-worker")]
#[command(about = "Task Queue Worker", long_about = None)]
struct Args {
    /// Broker host
    #[arg(long, env = "REDIS_HOST")]
    host: Option<String>,

    /// Broker port
    #[arg(long, env = "REDIS_PORT")]
    port: Option<u16>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Number of worker loops
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Wire format: json or bincode
    #[arg(long)]
    format: Option<WireFormat>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Print Prometheus metrics on shutdown
    #[arg(long)]
    print_metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if let Some(host) = args.host {
        config.broker.host = host;
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }
    anyhow::ensure!(config.concurrency > 0, "concurrency must be at least 1");

    let registry = OperationRegistry::with_builtins();
    tracing::info!("Registered operations: {:?}", registry.names());

    let queue = RedisQueue::open(&config.broker.url())?;
    let metrics = Arc::new(WorkerMetrics::new()?);
    let worker = Worker::new(&config, Arc::new(queue), registry).with_metrics(metrics.clone());

    tracing::info!(
        "Worker {} connecting to {}:{} with {} loops ({})",
        worker.worker_id(),
        config.broker.host,
        config.broker.port,
        config.concurrency,
        config.format
    );

    // Handle shutdown signals
    let stop = CancellationToken::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        signal.cancel();
    });

    let mut handles = Vec::with_capacity(config.concurrency);
    for index in 0..config.concurrency {
        let replica = worker.replica(index);
        let token = stop.clone();
        handles.push(tokio::spawn(async move { replica.run(token).await }));
    }

    let mut total = WorkerReport::default();
    for handle in handles {
        total.merge(&handle.await?);
    }

    tracing::info!(
        "All loops stopped: {} processed, {} replied, {} dropped",
        total.processed,
        total.replied,
        total.dropped
    );

    if args.print_metrics {
        println!("{}", metrics.render()?);
    }

    Ok(())
}
