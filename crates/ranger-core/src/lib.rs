pub mod error;
pub use error::CoreError;

pub mod collab;
pub mod config;
pub mod coordinator;
pub use coordinator::{Coordinator, RunMode, RunRequest};
pub mod executor;
pub use executor::{ExecOutcome, Executor, IterationOutput, IterationRequest};
pub mod lock;
pub mod matrix;
pub use matrix::SlotFilter;
pub mod pool;
pub use pool::WorkerPool;
pub mod progress;
pub use progress::{LogProgress, ProgressEvent, ProgressSink};
pub mod state;
pub use state::StateDir;
pub mod store;
pub use store::{RecordWriter, ResultStore};
pub mod warmup;
