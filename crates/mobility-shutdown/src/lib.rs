pub mod drain;
pub mod signal;

pub use drain::{drain_with_grace, DrainError};
pub use signal::{ShutdownListener, ShutdownSignal, SignalHandler};
