//! A Tokio-based scheduler that races batches of tasks on a bounded worker
//! pool: the first task in a batch to succeed cooperatively cancels its
//! siblings, and the batch handle resolves once every task is accounted for.

mod batch;
mod error;
mod group;
mod outcome;
mod scheduler;
mod task;

pub use batch::Batch;
pub use error::SchedulerError;
pub use outcome::{
  Payload, TaskError, TaskOutcome, APP_FAILURE, APP_OK, PROTOCOL_INTERNAL_ERROR, PROTOCOL_OK,
};
pub use scheduler::Scheduler;
pub use task::{ResultSink, Task, TaskFuture, TaskId};
