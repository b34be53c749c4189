//! Task dispatch and progress tracking.

pub mod dispatcher;
pub mod progress;

pub use dispatcher::{DispatchConfig, Dispatcher, Task, TaskFuture, DEFAULT_TASK_TIMEOUT_SECS};
pub use progress::ProgressTracker;
