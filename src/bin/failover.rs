use std::time::Duration;

use clap::Parser;
use failover::{Address, Coordinator, FailoverReport, Replica};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// Surviving replicas, in priority order for breaking ties.
    #[clap(long, value_delimiter = ',', env = "FAILOVER_REPLICAS")]
    replicas: Vec<Address>,

    /// Wait up to this many seconds for every replica to drain before selecting.
    #[clap(long)]
    drain_timeout: Option<i64>,

    #[clap(long, default_value = "3000")]
    connect_timeout_ms: u64,

    #[clap(long, default_value = "info", env = "FAILOVER_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,

    #[clap(long, default_value = "text")]
    format: Format,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.log_level)
        .with_writer(std::io::stderr)
        .init();

    info!(
        "failover version: {}, replicas: {}",
        env!("CARGO_PKG_VERSION"),
        app.replicas.len()
    );

    let timeout = Duration::from_millis(app.connect_timeout_ms);
    let mut replicas = Vec::with_capacity(app.replicas.len());
    for address in app.replicas {
        replicas.push(Replica::connect(address, Some(timeout)).await?);
    }

    let mut coordinator = Coordinator::new();
    if let Some(seconds) = app.drain_timeout {
        coordinator = coordinator.with_drain_wait(seconds);
    }

    let report = match coordinator.run_failover(&mut replicas).await {
        Ok(report) => report,
        Err(e) => {
            error!("Failover failed: {e}");
            return Err(e.into());
        }
    };

    match app.format {
        Format::Text => print_report(&report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn print_report(report: &FailoverReport) {
    println!("promoted {}", report.primary);
    for follower in &report.repointed {
        println!("repointed {} -> {}", follower, report.primary);
    }
}
