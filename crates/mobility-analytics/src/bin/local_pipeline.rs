//! 单进程运行生成器和分析引擎，通过进程内 broker 连接

use clap::Parser;
use mobility_analytics::{LoggingHandler, PipelineRunner};
use mobility_config::ConfigLoader;
use mobility_core::MemoryBroker;
use mobility_generator::EventGenerator;
use mobility_shutdown::SignalHandler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs generator and analytics over an in-memory broker", long_about = None)]
struct Args {
    /// TOML config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// In-memory broker name
    #[arg(long, default_value = "local")]
    broker: String,

    /// Topic shared by generator and analytics
    #[arg(short, long)]
    topic: Option<String>,

    /// Interval between events in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop after this many events (0 = until Ctrl-C)
    #[arg(short, long)]
    max_events: Option<u64>,

    /// Seed for reproducible event streams
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new()
            .with_override("broker.endpoint", format!("memory://{}", self.broker));
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        if let Some(topic) = &self.topic {
            loader = loader
                .with_override("generator.topic", topic)
                .with_override("processor.topic", topic);
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
    tracing::info!(broker = %args.broker, topic = %config.processor.topic, "Starting local pipeline");

    let broker = MemoryBroker::shared(&args.broker, config.broker.channel_capacity);

    let (signals, listener) = SignalHandler::new();
    let signal_task = {
        let signals = signals.clone();
        tokio::spawn(async move { signals.wait_for_system_signal().await })
    };

    let runner = PipelineRunner::from_config(
        Arc::new(broker.clone()),
        &config.processor,
        Arc::new(LoggingHandler),
    );
    let pipeline = {
        let listener = listener.clone();
        tokio::spawn(async move { runner.run_blocking(listener).await })
    };

    // 订阅建立前发布的记录会被丢弃
    let topic = config.processor.topic.clone();
    tokio::time::timeout(config.broker.connect_timeout(), async {
        while broker.subscriber_count(&topic) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("analytics did not subscribe to '{}' in time", topic))?;

    let mut generator = EventGenerator::new(Arc::new(broker), config.generator.clone());
    let generated = generator.run(listener).await?;
    tracing::info!(emitted = generated.emitted, state = %generated.state, "Generator finished");

    signals.trigger_shutdown();
    let processed = pipeline.await??;
    signal_task.abort();

    tracing::info!(
        emitted = generated.emitted,
        received = processed.received,
        failed = processed.failed,
        "Local pipeline exited"
    );
    Ok(())
}
