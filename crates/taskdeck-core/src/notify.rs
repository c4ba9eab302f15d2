use parking_lot::Mutex;
use tracing::{
  info,
  warn
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
)]
pub enum Severity {
  Info,
  Error
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title:       String,
  pub description: String,
  pub severity:    Severity
}

impl Notification {
  pub fn info(
    title: &str,
    description: &str
  ) -> Self {
    Self {
      title:       title.to_string(),
      description: description
        .to_string(),
      severity:    Severity::Info
    }
  }

  pub fn error(
    title: &str,
    description: &str
  ) -> Self {
    Self {
      title:       title.to_string(),
      description: description
        .to_string(),
      severity:    Severity::Error
    }
  }
}

pub trait Notifier: Send + Sync {
  fn notify(
    &self,
    notification: Notification
  );
}

/// Routes notifications into the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(
    &self,
    notification: Notification
  ) {
    match notification.severity {
      | Severity::Info => {
        info!(
          title = %notification.title,
          description = %notification.description,
          "notification"
        );
      }
      | Severity::Error => {
        warn!(
          title = %notification.title,
          description = %notification.description,
          "notification"
        );
      }
    }
  }
}

/// Keeps every notification; used by
/// tests to assert on outcomes.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
  seen: Mutex<Vec<Notification>>
}

impl RecordingNotifier {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn titles(&self) -> Vec<String> {
    self
      .seen
      .lock()
      .iter()
      .map(|n| n.title.clone())
      .collect()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(
    &self,
    notification: Notification
  ) {
    self.seen.lock().push(notification);
  }
}
