use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol-level code for a successful task.
pub const PROTOCOL_OK: u16 = 200;
/// Protocol-level code synthesized for a task that failed without setting one.
pub const PROTOCOL_INTERNAL_ERROR: u16 = 500;
/// Application-level code for a successful task.
pub const APP_OK: i32 = 0;
/// Application-level code synthesized for a task that failed without setting one.
pub const APP_FAILURE: i32 = 1;

/// The error type task callbacks may return or attach to an outcome.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// An opaque payload carried by a [`TaskOutcome`].
///
/// Tagged so that consumers always know what they are holding; there is no
/// untyped catch-all variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
  Text(String),
  Json(serde_json::Value),
  Bytes(Vec<u8>),
}

/// The result of executing one task: a coarse protocol-level code, a finer
/// application-level code, an optional error, and an optional payload.
///
/// A task succeeded if and only if [`TaskOutcome::is_success`] holds; no
/// other success signal exists anywhere in the scheduler.
#[derive(Debug, Default)]
pub struct TaskOutcome {
  pub protocol_code: u16,
  pub app_code: i32,
  pub error: Option<TaskError>,
  pub payload: Option<Payload>,
}

impl TaskOutcome {
  /// A successful outcome with no payload.
  pub fn ok() -> Self {
    Self {
      protocol_code: PROTOCOL_OK,
      app_code: APP_OK,
      error: None,
      payload: None,
    }
  }

  /// A successful outcome carrying a payload.
  pub fn ok_with(payload: Payload) -> Self {
    Self {
      payload: Some(payload),
      ..Self::ok()
    }
  }

  /// A failure outcome with explicit codes.
  pub fn failure(protocol_code: u16, app_code: i32) -> Self {
    Self {
      protocol_code,
      app_code,
      error: None,
      payload: None,
    }
  }

  /// Attaches an error to this outcome.
  pub fn with_error(mut self, error: impl Into<TaskError>) -> Self {
    self.error = Some(error.into());
    self
  }

  /// Attaches a payload to this outcome.
  pub fn with_payload(mut self, payload: Payload) -> Self {
    self.payload = Some(payload);
    self
  }

  /// The success predicate: protocol code is [`PROTOCOL_OK`] and the
  /// application code is [`APP_OK`].
  pub fn is_success(&self) -> bool {
    self.protocol_code == PROTOCOL_OK && self.app_code == APP_OK
  }

  /// Normalizes a raw callback result into a delivered outcome.
  ///
  /// An errored execution gets the failure defaults filled in, but only for
  /// the fields the task left at their zero value; codes the task set
  /// explicitly are preserved.
  pub(crate) fn from_execution(result: Result<Self, TaskError>) -> Self {
    match result {
      Ok(mut outcome) => {
        if outcome.error.is_some() {
          outcome.fill_failure_defaults();
        }
        outcome
      }
      Err(error) => {
        let mut outcome = Self {
          error: Some(error),
          ..Self::default()
        };
        outcome.fill_failure_defaults();
        outcome
      }
    }
  }

  fn fill_failure_defaults(&mut self) {
    if self.protocol_code == 0 {
      self.protocol_code = PROTOCOL_INTERNAL_ERROR;
    }
    if self.app_code == 0 {
      self.app_code = APP_FAILURE;
    }
  }
}

impl fmt::Display for TaskOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "protocol={} app={} error={}",
      self.protocol_code,
      self.app_code,
      self.error.as_ref().map_or("none".to_string(), |e| e.to_string())
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("simulated error")]
  struct SimulatedError;

  #[test]
  fn success_predicate() {
    assert!(TaskOutcome::ok().is_success());
    assert!(!TaskOutcome::failure(PROTOCOL_OK, APP_FAILURE).is_success());
    assert!(!TaskOutcome::failure(PROTOCOL_INTERNAL_ERROR, APP_OK).is_success());
    assert!(!TaskOutcome::default().is_success());
  }

  #[test]
  fn plain_error_synthesizes_failure_outcome() {
    let outcome = TaskOutcome::from_execution(Err(Box::new(SimulatedError)));
    assert_eq!(outcome.protocol_code, PROTOCOL_INTERNAL_ERROR);
    assert_eq!(outcome.app_code, APP_FAILURE);
    assert_eq!(outcome.error.unwrap().to_string(), "simulated error");
    assert!(outcome.payload.is_none());
  }

  #[test]
  fn explicit_codes_survive_error_normalization() {
    let raw = TaskOutcome::failure(404, APP_OK).with_error(SimulatedError);
    let outcome = TaskOutcome::from_execution(Ok(raw));
    // Only the zero-valued app code is filled in.
    assert_eq!(outcome.protocol_code, 404);
    assert_eq!(outcome.app_code, APP_FAILURE);
    assert!(outcome.error.is_some());
  }

  #[test]
  fn clean_outcome_passes_through_untouched() {
    let outcome = TaskOutcome::from_execution(Ok(TaskOutcome::ok()));
    assert!(outcome.is_success());
    assert!(outcome.error.is_none());
  }

  #[test]
  fn payload_serializes_with_kind_tag() {
    let json = serde_json::to_value(Payload::Text("hello".into())).unwrap();
    assert_eq!(json["kind"], "text");
    assert_eq!(json["value"], "hello");

    let back: Payload = serde_json::from_value(json).unwrap();
    assert_eq!(back, Payload::Text("hello".into()));
  }
}
