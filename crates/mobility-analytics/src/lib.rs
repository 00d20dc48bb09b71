pub mod consumer;
pub mod handler;
pub mod pipeline;

pub use consumer::{ConsumerSummary, StreamConsumer};
pub use handler::{FnHandler, LoggingHandler, RecordHandler};
pub use pipeline::PipelineRunner;
