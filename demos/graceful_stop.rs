use batch_race::{Scheduler, Task, TaskOutcome, APP_FAILURE, PROTOCOL_OK};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Graceful Stop Example ---");

  // Pool of one so most of the batch is still queued when stop is called.
  let scheduler = Scheduler::new(1, 10, Handle::current(), "graceful_stop");

  let mut tasks = Vec::new();
  for i in 0..4u64 {
    tasks.push(Task::new(format!("task-{}", i), move |_token| async move {
      info!("task-{} starting.", i);
      tokio::time::sleep(Duration::from_millis(250)).await;
      info!("task-{} finished.", i);
      Ok(TaskOutcome::failure(PROTOCOL_OK, APP_FAILURE))
    }));
  }

  let batch = scheduler.submit_batch(tasks).await.expect("submission failed");
  info!(
    "Submitted {} tasks; {} queued behind the single slot. Stopping immediately.",
    batch.len(),
    scheduler.queued_task_count()
  );

  // Stop rejects new submissions but drains the queue: every task below
  // still runs before stop() returns.
  scheduler.stop().await;
  info!("Stop returned. Batch outstanding = {}", batch.outstanding());

  batch.wait().await;
  info!("Batch resolved. is_success = {}", batch.is_success());

  match scheduler
    .submit_batch(vec![Task::new("late", |_token| async { Ok(TaskOutcome::ok()) })])
    .await
  {
    Err(e) => info!("Submission after stop correctly failed: {}", e),
    Ok(_) => info!("Unexpected: submission accepted after stop."),
  }

  info!("--- Graceful Stop Example End ---");
}
