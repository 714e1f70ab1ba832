use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use diagwatch::{logging, ListenerSource, ReportSource, Settings, SnapshotServer, StreamSource};
use diagwatch_core::transport::{FanoutTransport, FileTransport, LatchedTopic};
use diagwatch_core::Aggregator;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "diagwatch")]
#[command(about = "Aggregates diagnostic status reports into a latched, change-only health summary")]
struct Args {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read newline-delimited JSON report batches from stdin
    #[arg(long)]
    stdin: bool,

    /// Accept producers on a TCP address (host:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Serve snapshots as JSON lines on a TCP address (host:port)
    #[arg(short, long)]
    serve: Option<String>,

    /// Keep the latest snapshot in a JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Name of the latched output topic
    #[arg(long)]
    topic: Option<String>,

    /// Age after which a report counts as stale (e.g. "5s")
    #[arg(long)]
    staleness_timeout: Option<String>,

    /// Evaluation period (e.g. "1s", "500ms")
    #[arg(long)]
    evaluation_period: Option<String>,

    /// Ignore a namespace and everything below it (repeatable)
    #[arg(long = "exclude", value_name = "NAMESPACE")]
    exclusions: Vec<String>,

    /// Read stdin to the end, print one summary to stdout and exit
    #[arg(long, requires = "stdin", conflicts_with_all = ["listen", "serve"])]
    once: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags win over the file and the environment.
    fn apply(&self, settings: &mut Settings) {
        if let Some(listen) = &self.listen {
            settings.listen = Some(listen.clone());
        }
        if let Some(serve) = &self.serve {
            settings.serve = Some(serve.clone());
        }
        if let Some(output) = &self.output {
            settings.output = Some(output.clone());
        }
        if let Some(topic) = &self.topic {
            settings.topic = topic.clone();
        }
        if let Some(timeout) = &self.staleness_timeout {
            settings.staleness_timeout = timeout.clone();
        }
        if let Some(period) = &self.evaluation_period {
            settings.evaluation_period = period.clone();
        }
        settings.namespace_exclusions.extend(self.exclusions.iter().cloned());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    let config = settings.aggregator_config()?;
    info!("{}", settings.describe()?);

    let topic = LatchedTopic::new(&settings.topic, config.history_depth);
    let mut transport = FanoutTransport::new().with(topic.clone());
    if let Some(path) = &settings.output {
        transport = transport.with(FileTransport::new(path));
    }
    let aggregator = Aggregator::builder()
        .config(config)
        .transport(transport)
        .build()?;

    if args.once {
        return run_once(aggregator, topic).await;
    }

    let handle = aggregator.ingest_handle();
    let mut sources: Vec<Box<dyn ReportSource>> = Vec::new();
    if args.stdin {
        sources.push(Box::new(StreamSource::spawn(tokio::io::stdin(), "stdin", handle.clone())));
    }
    if let Some(addr) = &settings.listen {
        let listener = ListenerSource::bind(addr.as_str(), handle.clone())
            .await
            .with_context(|| format!("failed to listen on {}", addr))?;
        sources.push(Box::new(listener));
    }
    if sources.is_empty() {
        bail!("no input configured: use --stdin or --listen");
    }

    let server = match &settings.serve {
        Some(addr) => Some(
            SnapshotServer::bind(addr.as_str(), topic.clone())
                .await
                .with_context(|| format!("failed to serve on {}", addr))?,
        ),
        None => None,
    };

    let driver = aggregator.start();
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Some(server) = &server {
        server.abort();
    }
    let aggregator = driver.stop().await?;
    for source in &sources {
        info!(
            source = source.description(),
            stats = ?source.stats(),
            error = ?source.last_error(),
            "source totals"
        );
    }
    let stats = aggregator.publish_stats();
    info!(
        cycles = stats.cycles,
        published = stats.published,
        failed = stats.failed,
        "aggregator totals"
    );
    Ok(())
}

/// Ingest all of stdin, evaluate once and print the summary.
async fn run_once(mut aggregator: Aggregator, topic: LatchedTopic) -> Result<()> {
    StreamSource::spawn(tokio::io::stdin(), "stdin", aggregator.ingest_handle())
        .join()
        .await;

    let outcome = aggregator.evaluate();
    if let diagwatch_core::CycleOutcome::Failed(e) = outcome {
        return Err(e).context("failed to publish summary");
    }

    let snapshot = topic.latest().context("no summary was published")?;
    println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
    Ok(())
}
