use clap::Parser;
use mobility_config::ConfigLoader;
use mobility_generator::EventGenerator;
use mobility_shutdown::SignalHandler;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Publishes synthetic mobility events", long_about = None)]
struct Args {
    /// TOML config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker endpoint, e.g. mqtt://localhost:1883
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Topic to publish to
    #[arg(short, long)]
    topic: Option<String>,

    /// Interval between events in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop after this many events (0 = unbounded)
    #[arg(short, long)]
    max_events: Option<u64>,

    /// Seed for reproducible event streams
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        if let Some(endpoint) = &self.endpoint {
            loader = loader.with_override("broker.endpoint", endpoint);
        }
        if let Some(topic) = &self.topic {
            loader = loader.with_override("generator.topic", topic);
        }
        if let Some(interval_ms) = self.interval_ms {
            loader = loader.with_override("generator.interval_ms", interval_ms);
        }
        if let Some(max_events) = self.max_events {
            loader = loader.with_override("generator.max_events", max_events);
        }
        if let Some(seed) = self.seed {
            loader = loader.with_override("generator.seed", seed);
        }
        loader
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.loader().load()?;

    mobility_logging::init(&config.logging)?;
    tracing::info!(endpoint = %config.broker.endpoint, "Starting event generator service");

    let transport = mobility_core::connect_with_config(&config.broker).await?;

    let (signals, listener) = SignalHandler::new();
    let signal_task = {
        let signals = signals.clone();
        tokio::spawn(async move { signals.wait_for_system_signal().await })
    };

    let mut generator = EventGenerator::new(transport, config.generator.clone());
    let summary = generator.run(listener).await?;
    signal_task.abort();

    tracing::info!(
        emitted = summary.emitted,
        failed = summary.failed,
        state = %summary.state,
        "Event generator service exited"
    );
    Ok(())
}
