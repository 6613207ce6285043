use batch_race::{Scheduler, Task, TaskOutcome, APP_FAILURE, PROTOCOL_OK};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

// A stand-in for an upstream call: sleeps, then succeeds or fails. Checks
// the batch token so a sibling's win lets it bail out early.
async fn mock_request(id: String, delay_ms: u64, succeeds: bool, token: CancellationToken) -> Result<TaskOutcome, batch_race::TaskError> {
  tokio::select! {
    _ = token.cancelled() => {
      info!("{} observed batch cancellation, abandoning work.", id);
      Err(format!("{} cancelled", id).into())
    }
    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
      if succeeds {
        info!("{} succeeded after {}ms.", id, delay_ms);
        Ok(TaskOutcome::ok())
      } else {
        info!("{} failed after {}ms.", id, delay_ms);
        Ok(TaskOutcome::failure(PROTOCOL_OK, APP_FAILURE))
      }
    }
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Race Example ---");

  let scheduler = Scheduler::new(10, 100, Handle::current(), "basic_race");

  // Five tasks with staggered delays; only task-3 will succeed. As soon as
  // it does, the remaining tasks are signaled to stop.
  let mut tasks = Vec::new();
  for i in 0..5u64 {
    let id = format!("task-{}", i);
    let succeeds = i == 3;
    let delay_ms = (i + 1) * 200;
    let task_id = id.clone();
    tasks.push(Task::new(id, move |token| mock_request(task_id, delay_ms, succeeds, token)));
  }

  let batch = scheduler.submit_batch(tasks).await.expect("submission failed");
  info!("Submitted batch {} with {} tasks. Waiting...", batch.id(), batch.len());

  batch.wait().await;

  if batch.is_success() {
    info!("One task succeeded; the rest of the batch was cancelled.");
  } else {
    info!("Every task in the batch failed.");
  }

  scheduler.stop().await;
  info!("--- Basic Race Example End ---");
}
