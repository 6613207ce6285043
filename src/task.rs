use crate::group::BatchGroup;
use crate::outcome::{TaskError, TaskOutcome};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// A task identifier, used only for diagnostics. Uniqueness is not required.
pub type TaskId = String;

/// The future a task callback produces.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static>>;

/// The boxed form of a task's execution callback. The callback receives the
/// batch group's cancellation token at execution time.
pub(crate) type TaskFn = Box<dyn FnOnce(CancellationToken) -> TaskFuture + Send + 'static>;

/// A caller-owned destination for one task's outcome.
///
/// The scheduler writes exactly one outcome per task into its sink; the
/// caller creates the channel (`kanal::bounded_async`) and drains it.
pub type ResultSink = kanal::AsyncSender<TaskOutcome>;

/// A unit of work to submit as part of a batch.
///
/// The execution callback is handed the batch's cancellation token and is
/// expected to check it at its natural suspension points; cancellation is
/// cooperative, never preemptive.
pub struct Task {
  pub(crate) id: TaskId,
  pub(crate) execute: TaskFn,
  pub(crate) result_sink: Option<ResultSink>,
}

impl Task {
  pub fn new<F, Fut>(id: impl Into<TaskId>, execute: F) -> Self
  where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static,
  {
    Self {
      id: id.into(),
      execute: Box::new(move |token| Box::pin(execute(token))),
      result_sink: None,
    }
  }

  /// Attaches a result sink for this task's outcome.
  ///
  /// Delivery is guaranteed, not best-effort: a full sink blocks the
  /// execution slot that ran this task until the caller drains it. Size the
  /// channel accordingly (a buffer of one suffices for a single task).
  pub fn with_result_sink(mut self, sink: ResultSink) -> Self {
    self.result_sink = Some(sink);
    self
  }

  pub fn id(&self) -> &str {
    &self.id
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Task")
      .field("id", &self.id)
      .field("has_result_sink", &self.result_sink.is_some())
      .finish_non_exhaustive()
  }
}

/// Internal representation of a task after submission, carrying its group.
/// A task belongs to exactly one group for its entire lifetime.
pub(crate) struct QueuedTask {
  pub(crate) id: TaskId,
  pub(crate) execute: TaskFn,
  pub(crate) result_sink: Option<ResultSink>,
  pub(crate) group: Arc<BatchGroup>,
}

impl fmt::Debug for QueuedTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueuedTask")
      .field("id", &self.id)
      .field("batch_id", &self.group.batch_id())
      .finish_non_exhaustive()
  }
}
