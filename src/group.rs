use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared state for one submitted batch: the group cancellation token, the
/// write-once "someone already succeeded" flag, and the countdown of tasks
/// still outstanding.
///
/// Ownership is shared between the [`Batch`](crate::Batch) handle and the
/// tasks currently queued or executing; the scheduler holds no reference
/// past submission.
pub(crate) struct BatchGroup {
  batch_id: u64,
  token: CancellationToken,
  succeeded: AtomicBool,
  outstanding: watch::Sender<usize>,
}

impl BatchGroup {
  /// `token` must be freshly derived for this group; it is cancelled at most
  /// once, the first time a member task succeeds.
  pub(crate) fn new(batch_id: u64, token: CancellationToken, task_count: usize) -> Arc<Self> {
    let (outstanding, _) = watch::channel(task_count);
    Arc::new(Self {
      batch_id,
      token,
      succeeded: AtomicBool::new(false),
      outstanding,
    })
  }

  pub(crate) fn batch_id(&self) -> u64 {
    self.batch_id
  }

  pub(crate) fn token(&self) -> &CancellationToken {
    &self.token
  }

  /// Records that a member task satisfied the success predicate.
  ///
  /// Exactly one caller per group ever wins the flag transition; the winner
  /// triggers the group cancellation and gets `true` back. Losers are
  /// no-ops and complete normally.
  pub(crate) fn record_success(&self) -> bool {
    let won = self
      .succeeded
      .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
      .is_ok();
    if won {
      debug!(batch_id = self.batch_id, "First success in batch. Cancelling sibling tasks.");
      self.token.cancel();
    }
    won
  }

  pub(crate) fn has_succeeded(&self) -> bool {
    self.succeeded.load(AtomicOrdering::Acquire)
  }

  /// Decrements the outstanding counter. Called exactly once per member
  /// task, on every completion path.
  pub(crate) fn task_finished(&self) {
    self.outstanding.send_modify(|outstanding| {
      debug_assert!(*outstanding > 0, "group countdown underflow");
      *outstanding -= 1;
    });
  }

  pub(crate) fn outstanding(&self) -> usize {
    *self.outstanding.borrow()
  }

  /// Resolves once every member task has been accounted for.
  pub(crate) async fn wait(&self) {
    let mut rx = self.outstanding.subscribe();
    // Cannot fail: the sender lives in `self` for the duration of the await.
    let _ = rx.wait_for(|outstanding| *outstanding == 0).await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn group_of(task_count: usize) -> Arc<BatchGroup> {
    BatchGroup::new(0, CancellationToken::new(), task_count)
  }

  #[test]
  fn exactly_one_success_wins_under_contention() {
    let group = group_of(8);
    let mut handles = Vec::new();
    for _ in 0..8 {
      let group = group.clone();
      handles.push(std::thread::spawn(move || group.record_success()));
    }
    let wins: usize = handles.into_iter().map(|h| h.join().unwrap() as usize).sum();
    assert_eq!(wins, 1);
    assert!(group.has_succeeded());
    assert!(group.token().is_cancelled());
  }

  #[test]
  fn success_is_not_recorded_until_a_task_wins() {
    let group = group_of(2);
    assert!(!group.has_succeeded());
    assert!(!group.token().is_cancelled());
  }

  #[tokio::test]
  async fn wait_resolves_after_all_tasks_finish() {
    let group = group_of(3);
    assert_eq!(group.outstanding(), 3);

    let waiter = {
      let group = group.clone();
      tokio::spawn(async move { group.wait().await })
    };

    group.task_finished();
    group.task_finished();
    // Two of three accounted for; the waiter must still be pending.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    group.task_finished();
    tokio::time::timeout(Duration::from_secs(1), waiter)
      .await
      .expect("group wait should resolve once the countdown hits zero")
      .unwrap();
    assert_eq!(group.outstanding(), 0);
  }

  #[tokio::test]
  async fn empty_group_is_immediately_resolved() {
    let group = group_of(0);
    tokio::time::timeout(Duration::from_millis(100), group.wait())
      .await
      .expect("an empty group must resolve without any task finishing");
    assert!(!group.has_succeeded());
  }
}
