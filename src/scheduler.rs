use crate::batch::Batch;
use crate::error::SchedulerError;
use crate::group::BatchGroup;
use crate::outcome::TaskOutcome;
use crate::task::{QueuedTask, Task, TaskId};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use futures::FutureExt;
use kanal;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{self, debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_BATCH_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A bounded-concurrency task executor with race-style batch semantics.
///
/// Tasks are admitted through one shared bounded queue and run on at most
/// `pool_size` concurrent execution slots. Each submission forms a batch:
/// the first task in a batch whose outcome satisfies the success predicate
/// cancels its siblings cooperatively. Batches sharing the scheduler never
/// affect each other beyond FIFO admission into the queue.
pub struct Scheduler {
  scheduler_name: Arc<String>,
  semaphore: Arc<Semaphore>,
  task_queue_tx: kanal::AsyncSender<QueuedTask>,
  tracker: TaskTracker,
  shutdown_token: CancellationToken,
  dispatcher_join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
  /// Constructs a scheduler with `pool_size` concurrent execution slots and
  /// a task queue capacity of `queue_size`, and starts its dispatch loop on
  /// `tokio_handle` immediately. Non-positive capacities are clamped to 1.
  pub fn new(
    pool_size: usize,
    queue_size: usize,
    tokio_handle: TokioHandle,
    scheduler_name: &str,
  ) -> Arc<Self> {
    let (tx, rx) = kanal::bounded_async(queue_size.max(1));
    let shutdown_token = CancellationToken::new();
    let tracker = TaskTracker::new();

    let scheduler = Arc::new(Self {
      scheduler_name: Arc::new(scheduler_name.to_string()),
      semaphore: Arc::new(Semaphore::new(pool_size.max(1))),
      task_queue_tx: tx,
      tracker: tracker.clone(),
      shutdown_token,
      dispatcher_join_handle: Mutex::new(None),
    });

    let dispatcher_name = scheduler.scheduler_name.clone();
    let dispatcher_semaphore = scheduler.semaphore.clone();
    let dispatcher_tokio_handle = tokio_handle.clone();

    let dispatcher_join_handle = tokio_handle.spawn(
      async move {
        Self::run_dispatch_loop(
          dispatcher_name,
          dispatcher_semaphore,
          rx,
          dispatcher_tokio_handle,
          tracker,
        )
        .await;
      }
      .instrument(info_span!("dispatch_loop", scheduler = %scheduler_name)),
    );

    *scheduler.dispatcher_join_handle.lock() = Some(dispatcher_join_handle);

    scheduler
  }

  pub fn name(&self) -> &str {
    &self.scheduler_name
  }

  /// The number of executions currently running or spawned and not yet done.
  pub fn active_task_count(&self) -> usize {
    self.tracker.len()
  }

  /// The number of tasks waiting in the admission queue.
  pub fn queued_task_count(&self) -> usize {
    self.task_queue_tx.len()
  }

  /// Submits one batch of tasks and returns its handle immediately.
  ///
  /// Every task is assigned to a single fresh batch group with its own
  /// cancellation token. Enqueueing blocks while the queue is full
  /// (backpressure, never drop); submitting to a stopping scheduler fails
  /// fast with [`SchedulerError::SchedulerStopping`]. An empty task list is
  /// a degenerate batch that is already resolved.
  pub async fn submit_batch(&self, tasks: Vec<Task>) -> Result<Batch, SchedulerError> {
    let root = CancellationToken::new();
    self.submit_batch_with_parent(&root, tasks).await
  }

  /// Like [`Scheduler::submit_batch`], but derives the batch's cancellation
  /// token from `parent`. Cancelling the parent (say, from a deadline) is
  /// observed by every task in the batch.
  pub async fn submit_batch_with_parent(
    &self,
    parent: &CancellationToken,
    tasks: Vec<Task>,
  ) -> Result<Batch, SchedulerError> {
    if self.shutdown_token.is_cancelled() || self.task_queue_tx.is_closed() {
      warn!(
        scheduler = %self.scheduler_name,
        "Submit: Attempted to submit batch to a scheduler that is stopping or stopped."
      );
      return Err(SchedulerError::SchedulerStopping);
    }

    let batch_id = NEXT_BATCH_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let total = tasks.len();
    let group = BatchGroup::new(batch_id, parent.child_token(), total);
    let task_ids: Vec<TaskId> = tasks.iter().map(|task| task.id.clone()).collect();

    debug!(
      scheduler = %self.scheduler_name,
      %batch_id,
      task_count = total,
      "Submitting batch to queue."
    );

    for (enqueued, task) in tasks.into_iter().enumerate() {
      let queued = QueuedTask {
        id: task.id,
        execute: task.execute,
        result_sink: task.result_sink,
        group: group.clone(),
      };

      // A stop while this send is parked on a full queue closes the
      // channel, which fails the send without having enqueued the task.
      if let Err(send_error) = self.task_queue_tx.send(queued).await {
        error!(
          scheduler = %self.scheduler_name,
          %batch_id,
          enqueued,
          "Submit: Failed to send task to queue: {:?}",
          send_error
        );
        // Tasks never enqueued still count down so the enqueued part of
        // the batch can resolve.
        for _ in enqueued..total {
          group.task_finished();
        }
        return Err(if self.shutdown_token.is_cancelled() || self.task_queue_tx.is_closed() {
          SchedulerError::SchedulerStopping
        } else {
          SchedulerError::QueueSendChannelClosed
        });
      }
    }

    Ok(Batch::new(task_ids, group))
  }

  /// Blocks until every execution ever dispatched by this scheduler has
  /// finished. Resolves only once [`Scheduler::stop`] has been initiated;
  /// the intended use is as a barrier before process shutdown.
  pub async fn wait(&self) {
    self.tracker.wait().await;
  }

  /// Stops the scheduler: rejects new submissions, lets the dispatch loop
  /// drain already-queued tasks, then waits for the loop and every
  /// in-flight execution to finish.
  ///
  /// Queued-but-undispatched tasks are executed, not dropped, so every
  /// outstanding batch still resolves. Safe to call more than once; later
  /// calls find the shutdown already initiated and simply wait for it.
  pub async fn stop(&self) {
    if !self.shutdown_token.is_cancelled() {
      info!(scheduler = %self.scheduler_name, "Initiating scheduler stop.");
      self.shutdown_token.cancel();
      // Closing the producer lets the dispatch loop drain the queue and
      // exit once it is empty.
      let _ = self.task_queue_tx.close();
    } else {
      info!(scheduler = %self.scheduler_name, "Stop already in progress or completed.");
    }

    let handle_to_await: Option<JoinHandle<()>> = self.dispatcher_join_handle.lock().take();

    if let Some(handle) = handle_to_await {
      info!(scheduler = %self.scheduler_name, "Waiting for dispatch loop to join.");
      match handle.await {
        Ok(()) => info!(scheduler = %self.scheduler_name, "Dispatch loop joined."),
        Err(join_error) => {
          error!(
            scheduler = %self.scheduler_name,
            "Error joining dispatch loop during stop: {:?}",
            join_error
          );
        }
      }
    } else {
      trace!(
        scheduler = %self.scheduler_name,
        "Dispatch loop handle already taken by a concurrent stop call."
      );
    }

    self.tracker.close();
    self.tracker.wait().await;
    info!(scheduler = %self.scheduler_name, "Scheduler stop complete.");
  }

  async fn run_dispatch_loop(
    scheduler_name: Arc<String>,
    semaphore: Arc<Semaphore>,
    task_queue_rx: kanal::AsyncReceiver<QueuedTask>,
    tasks_tokio_handle: TokioHandle,
    tracker: TaskTracker,
  ) {
    info!(scheduler = %*scheduler_name, "Dispatch loop started.");

    loop {
      let queued = match task_queue_rx.recv().await {
        Ok(task) => task,
        Err(_) => {
          info!(
            scheduler = %*scheduler_name,
            "Task queue closed and drained. Dispatch loop terminating."
          );
          break;
        }
      };

      let permit = match semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
          error!(scheduler = %*scheduler_name, "Semaphore closed. Dispatch loop exiting.");
          // The task already pulled from the queue will never run; keep the
          // group countdown honest.
          queued.group.task_finished();
          break;
        }
      };
      trace!(
        scheduler = %*scheduler_name,
        "Acquired execution slot. Available: {}",
        semaphore.available_permits()
      );

      debug!(
        scheduler = %*scheduler_name,
        task_id = %queued.id,
        batch_id = queued.group.batch_id(),
        "Dequeued task. Spawning with permit."
      );

      let task_span = info_span!(
        "batch_task",
        scheduler = %*scheduler_name,
        task_id = %queued.id,
        batch_id = queued.group.batch_id()
      );
      tracker.spawn_on(
        Self::execute_task(scheduler_name.clone(), queued, permit).instrument(task_span),
        &tasks_tokio_handle,
      );
    }

    info!(
      scheduler = %*scheduler_name,
      "Dispatch loop stopped. Executions still in flight: {}",
      tracker.len()
    );
  }

  /// Runs one dispatched task to completion: execute the callback under the
  /// group token, normalize the outcome, race for the group's success flag,
  /// deliver to the task's sink, then release the slot and count down.
  async fn execute_task(
    scheduler_name: Arc<String>,
    queued: QueuedTask,
    permit: OwnedSemaphorePermit,
  ) {
    let QueuedTask {
      id: task_id,
      execute,
      result_sink,
      group,
    } = queued;

    let token = group.token().clone();
    // The async block keeps the callback invocation itself inside the
    // unwind fence, not just the returned future.
    let raw_result = AssertUnwindSafe(async move { execute(token).await })
      .catch_unwind()
      .await;

    let outcome = match raw_result {
      Ok(result) => TaskOutcome::from_execution(result),
      Err(_panic_payload) => {
        error!(
          scheduler = %*scheduler_name,
          %task_id,
          "Task panicked during execution."
        );
        TaskOutcome::from_execution(Err(Box::new(SchedulerError::TaskPanicked)))
      }
    };

    if outcome.is_success() {
      if group.record_success() {
        debug!(
          scheduler = %*scheduler_name,
          %task_id,
          batch_id = group.batch_id(),
          "Task won the batch."
        );
      }
    } else {
      trace!(
        scheduler = %*scheduler_name,
        %task_id,
        "Task finished without success: {}",
        outcome
      );
    }

    if let Some(sink) = result_sink {
      // Guaranteed delivery: a full sink blocks this slot until the caller
      // drains it.
      if sink.send(outcome).await.is_err() {
        warn!(
          scheduler = %*scheduler_name,
          %task_id,
          "Result sink receiver was dropped. Task outcome may have been lost."
        );
      }
    }

    drop(permit);
    group.task_finished();
  }
}

impl Drop for Scheduler {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      info!(
        scheduler = %*self.scheduler_name,
        "Scheduler dropped without explicit stop. Signaling shutdown without blocking."
      );
      // Same signals as stop(), minus the joins: the dispatch loop drains
      // the closed queue and winds down on its own.
      self.shutdown_token.cancel();
      let _ = self.task_queue_tx.close();
    } else {
      trace!(
        scheduler = %*self.scheduler_name,
        "Drop: Shutdown already in progress or completed."
      );
    }
  }
}
