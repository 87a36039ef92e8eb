pub mod pool;
pub mod progress;

pub use pool::WorkerPool;
pub use progress::{NoopProgress, ProgressSink};
