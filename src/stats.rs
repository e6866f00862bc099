use std::{collections::BTreeMap, fmt};

use crate::{error::RunError, mode::Mode};

/// How a failed or undefined measurement is rendered.
pub const SENTINEL: &str = "-1";

/// The mean of a set of repetitions, or the sentinel if any of them failed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate(Option<f64>);

impl Aggregate {
  pub const FAILED: Aggregate = Aggregate(None);

  pub fn new(value: f64) -> Self {
    Self(Some(value))
  }

  /// A failed repetition (`None`) poisons the whole aggregate rather than
  /// being left out of the mean. No repetitions at all is also a failure.
  pub fn from_samples(samples: &[Option<f64>]) -> Self {
    if samples.is_empty() {
      return Self::FAILED;
    }

    let mut sum = 0.0;
    for sample in samples {
      match sample {
        Some(value) if *value >= 0.0 => sum += value,
        _ => return Self::FAILED,
      }
    }

    Self(Some(sum / samples.len() as f64))
  }

  pub fn value(self) -> Option<f64> {
    self.0
  }

  pub fn is_failed(self) -> bool {
    self.0.is_none()
  }

  pub fn map(self, f: impl FnOnce(f64) -> f64) -> Self {
    Self(self.0.map(f))
  }
}

/// Renders the value with the formatter's precision, or the sentinel.
impl fmt::Display for Aggregate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.0, f.precision()) {
      (Some(value), Some(precision)) => write!(f, "{value:.precision$}"),
      (Some(value), None) => write!(f, "{value}"),
      (None, _) => f.write_str(SENTINEL),
    }
  }
}

/// One repetition of one (workload, engine, mode) combination. Measurements
/// are `None` when the repetition failed or memory was not measured.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
  pub workload: usize,
  pub engine: usize,
  pub mode: Mode,
  pub repetition: usize,
  pub duration_nanos: Option<u64>,
  pub peak_memory_bytes: Option<u64>,
  /// The first failure of this repetition, timed run or memory run.
  pub error: Option<RunError>,
}

impl RunOutcome {
  pub fn new(workload: usize, engine: usize, mode: Mode, repetition: usize) -> Self {
    Self {
      workload,
      engine,
      mode,
      repetition,
      duration_nanos: None,
      peak_memory_bytes: None,
      error: None,
    }
  }


  pub fn success(&self) -> bool {
    self.duration_nanos.is_some()
  }
}

/// Aggregated statistics for one (workload, engine, mode) combination.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Record {
  /// Mean wall-clock seconds.
  pub duration: Aggregate,
  /// Mean peak RSS in bytes.
  pub memory: Aggregate,
}

impl Record {
  pub fn from_outcomes(outcomes: &[RunOutcome]) -> Self {
    let durations = outcomes
      .iter()
      .map(|o| o.duration_nanos.map(|ns| ns as f64 / 1e9))
      .collect::<Vec<_>>();
    let memory = outcomes
      .iter()
      .map(|o| o.peak_memory_bytes.map(|b| b as f64))
      .collect::<Vec<_>>();

    Self {
      duration: Aggregate::from_samples(&durations),
      memory: Aggregate::from_samples(&memory),
    }
  }
}

/// Aggregates keyed by engine index and mode.
pub type Combinations = BTreeMap<(usize, Mode), Record>;

/// Benchmarking results for every workload, in workload order.
#[derive(Debug, Default)]
pub struct Stats {
  pub workloads: Vec<(String, Combinations)>,
}

impl Stats {
  pub fn record(&self, workload: usize, engine: usize, mode: Mode) -> Record {
    self.workloads[workload].1.get(&(engine, mode)).copied().unwrap_or_default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mean_of_successful_samples() {
    let aggregate = Aggregate::from_samples(&[Some(5.0), Some(6.0), Some(7.0)]);
    assert_eq!(aggregate.value(), Some(6.0));
  }

  #[test]
  fn one_failure_poisons_the_aggregate() {
    let aggregate = Aggregate::from_samples(&[Some(5.0), None, Some(7.0)]);

    assert!(aggregate.is_failed());
    assert_eq!(aggregate.to_string(), "-1");
    assert_eq!(format!("{aggregate:.3}"), "-1");
  }

  #[test]
  fn negative_raw_measurement_is_a_failure() {
    assert!(Aggregate::from_samples(&[Some(5.0), Some(-1.0), Some(7.0)]).is_failed());
  }

  #[test]
  fn no_samples_is_a_failure() {
    assert!(Aggregate::from_samples(&[]).is_failed());
  }

  #[test]
  fn duration_and_memory_fail_independently() {
    let outcomes = [
      RunOutcome {
        duration_nanos: Some(1_000_000_000),
        ..RunOutcome::new(0, 0, Mode::Jit, 0)
      },
      RunOutcome {
        duration_nanos: Some(3_000_000_000),
        peak_memory_bytes: Some(4096),
        ..RunOutcome::new(0, 0, Mode::Jit, 1)
      },
    ];

    let record = Record::from_outcomes(&outcomes);

    assert_eq!(record.duration.value(), Some(2.0));
    assert!(record.memory.is_failed());
    assert!(outcomes.iter().all(RunOutcome::success));
  }

  #[test]
  fn missing_combination_is_failed() {
    let stats = Stats {
      workloads: vec![("prime".to_string(), Combinations::new())],
    };

    assert!(stats.record(0, 0, Mode::Jit).duration.is_failed());
  }
}
