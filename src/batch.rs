use crate::group::BatchGroup;
use crate::task::TaskId;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

/// A handle to one submitted batch of tasks.
///
/// Allows waiting for the whole group to finish and querying whether any
/// member task succeeded. Read-only after construction; the shared group
/// state is updated by the executing tasks.
pub struct Batch {
  task_ids: Vec<TaskId>,
  group: Arc<BatchGroup>,
}

impl Batch {
  pub(crate) fn new(task_ids: Vec<TaskId>, group: Arc<BatchGroup>) -> Self {
    Self { task_ids, group }
  }

  /// The scheduler-assigned id of this batch.
  pub fn id(&self) -> u64 {
    self.group.batch_id()
  }

  /// The ids of the submitted tasks, in submission order.
  pub fn task_ids(&self) -> &[TaskId] {
    &self.task_ids
  }

  pub fn len(&self) -> usize {
    self.task_ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.task_ids.is_empty()
  }

  /// Blocks until every member task has executed to completion, success or
  /// not. An empty batch resolves immediately.
  pub async fn wait(&self) {
    self.group.wait().await;
  }

  /// Whether any member task has satisfied the success predicate so far.
  ///
  /// May be queried while tasks are still running; the value observed after
  /// [`Batch::wait`] returns is stable and authoritative.
  pub fn is_success(&self) -> bool {
    self.group.has_succeeded()
  }

  /// Requests cooperative cancellation of every task in this batch.
  ///
  /// Does not mark the batch successful. Tasks must check the token they
  /// were handed; ones that ignore it run to completion.
  pub fn cancel(&self) {
    debug!(batch_id = self.group.batch_id(), "Batch: Cancellation requested by caller.");
    self.group.token().cancel();
  }

  /// Whether cancellation has been triggered for this batch, either by a
  /// first success or by [`Batch::cancel`].
  pub fn is_cancelled(&self) -> bool {
    self.group.token().is_cancelled()
  }

  /// The number of member tasks not yet accounted for.
  pub fn outstanding(&self) -> usize {
    self.group.outstanding()
  }
}

impl fmt::Debug for Batch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Batch")
      .field("batch_id", &self.group.batch_id())
      .field("task_count", &self.task_ids.len())
      .field("outstanding", &self.group.outstanding())
      .field("is_success", &self.group.has_succeeded())
      .finish()
  }
}
