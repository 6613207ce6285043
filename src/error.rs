use thiserror::Error;

/// Errors that can occur within the `batch_race` scheduler.
#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
  #[error("Scheduler is stopping or already stopped, cannot accept new batches")]
  SchedulerStopping,

  #[error("Scheduler's internal task queue (sender side) was closed unexpectedly")]
  QueueSendChannelClosed,

  #[error("Submitted task panicked during execution")]
  TaskPanicked,
}
