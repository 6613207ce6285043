use batch_race::{Payload, Scheduler, Task, TaskOutcome, APP_FAILURE, PROTOCOL_OK};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Result Sinks Example ---");

  let scheduler = Scheduler::new(4, 16, Handle::current(), "result_sinks");

  // One sink per task, each with a buffer of one so delivery never blocks
  // the execution slot.
  let mut sinks = Vec::new();
  let mut tasks = Vec::new();
  for i in 0..3u64 {
    let (tx, rx) = kanal::bounded_async::<TaskOutcome>(1);
    sinks.push((format!("task-{}", i), rx));

    let delay_ms = 100 + i * 50;
    tasks.push(
      Task::new(format!("task-{}", i), move |_token| async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        if i == 1 {
          Ok(TaskOutcome::ok_with(Payload::Text(format!("payload from task-{}", i))))
        } else {
          Ok(TaskOutcome::failure(PROTOCOL_OK, APP_FAILURE)
            .with_payload(Payload::Json(serde_json::json!({ "attempt": i }))))
        }
      })
      .with_result_sink(tx),
    );
  }

  let batch = scheduler.submit_batch(tasks).await.expect("submission failed");
  batch.wait().await;
  info!("Batch resolved. is_success = {}", batch.is_success());

  for (id, rx) in sinks {
    match rx.recv().await {
      Ok(outcome) => info!("{} delivered: {} payload={:?}", id, outcome, outcome.payload),
      Err(e) => info!("{} sink closed without an outcome: {}", id, e),
    }
  }

  scheduler.stop().await;
  info!("--- Result Sinks Example End ---");
}
