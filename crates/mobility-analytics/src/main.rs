use clap::Parser;
use mobility_analytics::{LoggingHandler, PipelineRunner};
use mobility_config::ConfigLoader;
use mobility_shutdown::SignalHandler;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Consumes mobility events and logs them", long_about = None)]
struct Args {
    /// TOML config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker endpoint, e.g. mqtt://localhost:1883
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Topic to consume
    #[arg(short, long)]
    topic: Option<String>,

    /// Shutdown grace period in milliseconds
    #[arg(long)]
    shutdown_grace_ms: Option<u64>,
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
            loader = loader.with_override("processor.topic", topic);
        }
        if let Some(grace) = self.shutdown_grace_ms {
            loader = loader.with_override("processor.shutdown_grace_ms", grace);
        }
        loader
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.loader().load()?;

    mobility_logging::init(&config.logging)?;
    tracing::info!(endpoint = %config.broker.endpoint, "Starting analytics engine");

    let transport = mobility_core::connect_with_config(&config.broker).await?;

    let (signals, listener) = SignalHandler::new();
    let signal_task = {
        let signals = signals.clone();
        tokio::spawn(async move { signals.wait_for_system_signal().await })
    };

    let runner = PipelineRunner::from_config(transport, &config.processor, Arc::new(LoggingHandler));
    let result = runner.run_blocking(listener).await;
    signal_task.abort();

    let summary = result?;
    tracing::info!(
        received = summary.received,
        handled = summary.handled,
        failed = summary.failed,
        "Analytics engine exited"
    );
    Ok(())
}
