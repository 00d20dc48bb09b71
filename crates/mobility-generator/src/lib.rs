pub mod factory;
pub mod generator;

pub use factory::{Clock, EventFactory, FixedClock, SystemClock};
pub use generator::{EventGenerator, GeneratorState, RunSummary, StopHandle};
