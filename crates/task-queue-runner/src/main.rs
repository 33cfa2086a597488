use clap::Parser;
use comfy_table::{presets::UTF8_FULL, Table};
use std::sync::Arc;
use task_queue_broker::{MemoryQueue, QueueClient, RedisQueue};
use task_queue_protocol::WireFormat;
use task_queue_runner::{RunReport, Runner, RunnerConfig, ThroughputSummary, Workload};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tq-runner")]
#[command(about = "Task Queue throughput runner", long_about = None)]
struct Args {
    /// Broker host
    #[arg(long, env = "REDIS_HOST")]
    host: Option<String>,

    /// Broker port
    #[arg(long, env = "REDIS_PORT")]
    port: Option<u16>,

    /// Tasks per run
    #[arg(short = 'n', long)]
    tasks: Option<usize>,

    /// Number of runs
    #[arg(short, long)]
    repeats: Option<usize>,

    /// Worker loops to start inside this process
    #[arg(short = 'w', long)]
    local_workers: Option<usize>,

    /// Use an in-process broker instead of Redis
    #[arg(long)]
    memory: bool,

    /// Submit tasks without waiting for results
    #[arg(long)]
    fire_and_forget: bool,

    /// Wire format: json or bincode
    #[arg(long)]
    wire_format: Option<WireFormat>,

    /// Abort a run after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    output: String,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = if let Some(config_path) = &args.config {
        RunnerConfig::from_file(config_path)?
    } else {
        RunnerConfig::default()
    };

    if let Some(host) = args.host {
        config.broker.host = host;
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }
    if let Some(tasks) = args.tasks {
        config.tasks = tasks;
    }
    if let Some(repeats) = args.repeats {
        config.repeats = repeats;
    }
    if let Some(local_workers) = args.local_workers {
        config.local_workers = local_workers;
    }
    if let Some(format) = args.wire_format {
        config.worker.format = format;
    }
    if args.deadline_secs.is_some() {
        config.deadline_secs = args.deadline_secs;
    }
    if args.memory && config.local_workers == 0 {
        // Nothing else can reach an in-process broker.
        config.local_workers = 2;
    }
    anyhow::ensure!(config.repeats > 0, "repeats must be at least 1");

    let queue: Arc<dyn QueueClient> = if args.memory {
        Arc::new(MemoryQueue::new())
    } else {
        Arc::new(RedisQueue::connect(&config.broker.url()).await?)
    };

    let workload = if args.fire_and_forget {
        Workload::additions(config.tasks).without_results()
    } else {
        Workload::additions(config.tasks)
    };

    let runner = Runner::new(queue, config.clone());
    let pool = (config.local_workers > 0).then(|| runner.spawn_workers(config.local_workers));

    println!(
        "Testing {} tasks ({}), {} repeats",
        config.tasks, config.worker.format, config.repeats
    );

    let mut reports = Vec::with_capacity(config.repeats);
    for _ in 0..config.repeats {
        reports.push(runner.run(&workload).await?);
    }

    if let Some(pool) = pool {
        pool.shutdown().await?;
    }

    let samples: Vec<f64> = reports.iter().map(RunReport::throughput).collect();
    let Some(summary) = ThroughputSummary::from_samples(&samples) else {
        return Ok(());
    };

    match args.output.as_str() {
        "json" => {
            let runs: Vec<_> = reports
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "submitted": r.submitted,
                        "resolved": r.resolved,
                        "elapsed_secs": r.elapsed.as_secs_f64(),
                        "tasks_per_sec": r.throughput(),
                        "timed_out": r.timed_out,
                    })
                })
                .collect();
            let doc = serde_json::json!({
                "runs": runs,
                "best": summary.best,
                "worst": summary.worst,
                "mean": summary.mean,
                "stdev": summary.stdev,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        _ => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Run", "Submitted", "Resolved", "Elapsed", "Tasks/s"]);
            for (i, report) in reports.iter().enumerate() {
                table.add_row(vec![
                    (i + 1).to_string(),
                    report.submitted.to_string(),
                    report.resolved.to_string(),
                    format!("{:.3}s", report.elapsed.as_secs_f64()),
                    format!("{:.02}", report.throughput()),
                ]);
            }
            println!("{table}");

            let mut totals = Table::new();
            totals.load_preset(UTF8_FULL);
            totals.set_header(vec!["Metric", "Tasks/s"]);
            totals.add_row(vec!["best".to_string(), format!("{:.02}", summary.best)]);
            totals.add_row(vec!["worst".to_string(), format!("{:.02}", summary.worst)]);
            totals.add_row(vec!["stdev".to_string(), format!("{:.02}", summary.stdev)]);
            println!("{totals}");
        }
    }

    let incomplete = reports.iter().filter(|r| !r.is_complete()).count();
    if incomplete > 0 {
        eprintln!("{} of {} runs finished with missing results", incomplete, reports.len());
    }

    Ok(())
}
