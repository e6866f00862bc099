use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors that stop the harness before any workload runs.
#[derive(Debug, Error)]
pub enum SetupError {
  #[error("{0}")]
  Configuration(String),
  #[error("failed to compile {path:?}: {message}")]
  Compilation { path: PathBuf, message: String },
}

/// Errors local to a single repetition. These never abort the matrix, the
/// sampler records them and moves on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
  #[error("{message}")]
  Execution { message: String, stderr: String },
  #[error("timed out after {0:?}")]
  Timeout(Duration),
  #[error("expected {expected}, got {actual}")]
  Correctness { expected: f64, actual: f64 },
}

impl RunError {
  pub fn execution(message: impl Into<String>) -> Self {
    Self::Execution {
      message: message.into(),
      stderr: String::new(),
    }
  }
}

/// A single non-fatal failure, tagged with where it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
  pub workload: String,
  pub label: String,
  pub message: String,
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.workload, self.label, self.message)
  }
}

/// Append-only collection of failures for one run. A non-empty log makes the
/// process exit with a non-zero status once the report is out.
#[derive(Debug, Default)]
pub struct ErrorLog {
  failures: Vec<Failure>,
}

impl ErrorLog {
  pub fn push(&mut self, workload: &str, label: &str, error: &RunError) {
    let mut message = error.to_string();

    if let RunError::Execution { stderr, .. } = error {
      let stderr = stderr.trim();
      if !stderr.is_empty() {
        message = format!("{message}: {stderr}");
      }
    }

    self.failures.push(Failure {
      workload: workload.to_string(),
      label: label.to_string(),
      message,
    });
  }

  pub fn is_empty(&self) -> bool {
    self.failures.is_empty()
  }

  pub fn len(&self) -> usize {
    self.failures.len()
  }

  pub fn failures(&self) -> &[Failure] {
    &self.failures
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn failure_is_tagged_with_workload_and_label() {
    let mut log = ErrorLog::default();
    assert!(log.is_empty());

    log.push("nbody", "walrus jit", &RunError::Correctness { expected: 1.0, actual: 2.0 });

    assert_eq!(log.len(), 1);
    assert_eq!(log.failures()[0].to_string(), "nbody walrus jit expected 1, got 2");
  }

  #[test]
  fn execution_failure_carries_stderr() {
    let mut log = ErrorLog::default();
    log.push(
      "prime",
      "1 interpreter",
      &RunError::Execution {
        message: "exited with non-zero status exit status: 3".to_string(),
        stderr: "trap: unreachable\n".to_string(),
      },
    );

    assert_eq!(
      log.failures()[0].message,
      "exited with non-zero status exit status: 3: trap: unreachable"
    );
  }
}
