use std::time::{Duration, Instant};

use crate::{
  catalog::Workload,
  engine::{Engine, Labels},
  error::{ErrorLog, RunError},
  mode::Mode,
  run::{self, MemoryWrapper},
  stats::{Combinations, Record, RunOutcome, Stats},
  validate,
};

/// State shared by every stage of one run: engine labels, assigned once, and
/// the failures collected along the way.
#[derive(Debug, Default)]
pub struct RunContext {
  pub labels: Labels,
  pub errors: ErrorLog,
}

impl RunContext {
  pub fn new(labels: Labels) -> Self {
    Self {
      labels,
      errors: ErrorLog::default(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct Options {
  /// Repetitions per combination.
  pub iterations: usize,
  /// Modes to run every engine in.
  pub modes: Vec<Mode>,
  /// Upper bound of a single engine process.
  pub timeout: Duration,
  /// Set when peak memory should be measured.
  pub memory: Option<MemoryWrapper>,
}

pub struct Bench {
  engines: Vec<Engine>,
  workloads: Vec<Workload>,
  options: Options,
  pub context: RunContext,
  /// Statistics collected for each workload.
  pub stats: Stats,
}

impl Bench {
  /// Every engine gets its label here, before anything runs, so headers and
  /// the legend exist even when there is nothing to run.
  pub fn new(engines: Vec<Engine>, workloads: Vec<Workload>, options: Options, mut context: RunContext) -> Self {
    for engine in &engines {
      context.labels.assign(engine);
    }

    Self {
      engines,
      workloads,
      options,
      context,
      stats: Stats::default(),
    }
  }

  pub fn engines(&self) -> &[Engine] {
    &self.engines
  }

  /// Runs the whole matrix, one process at a time: every workload, every
  /// engine, every mode, every repetition. Failures end up in the context's
  /// error log, never abort the matrix.
  pub fn bench(&mut self) {
    for workload in 0..self.workloads.len() {
      eprintln!("running {}", self.workloads[workload].name);

      let mut combinations = Combinations::new();

      for engine in 0..self.engines.len() {
        for mode in self.options.modes.clone() {
          let record = self.sample(engine, mode, workload);
          combinations.insert((engine, mode), record);
        }
      }

      let name = self.workloads[workload].name.clone();
      self.stats.workloads.push((name, combinations));
    }
  }

  /// Repeats one combination and reduces the repetitions to a [`Record`].
  pub fn sample(&mut self, engine_id: usize, mode: Mode, workload_id: usize) -> Record {
    eprintln!("  {}", self.label(engine_id, mode));

    let outcomes = (0..self.options.iterations)
      .map(|repetition| self.repeat(engine_id, mode, workload_id, repetition))
      .collect::<Vec<_>>();

    let failed = outcomes.iter().filter(|outcome| outcome.error.is_some()).count();
    if failed > 0 {
      eprintln!("    {failed} of {} round(s) failed", outcomes.len());
    }

    Record::from_outcomes(&outcomes)
  }

  /// Runs one repetition: the timed run, then, if it succeeded and memory is
  /// measured, the wrapped run. Failures are logged as they happen.
  pub fn repeat(&mut self, engine_id: usize, mode: Mode, workload_id: usize, repetition: usize) -> RunOutcome {
    let engine = &self.engines[engine_id];
    let workload = &self.workloads[workload_id];
    let label = self.label(engine_id, mode);
    let mut outcome = RunOutcome::new(workload_id, engine_id, mode, repetition);

    eprintln!("    round {}", outcome.repetition + 1);

    match measure_time(engine, mode, workload, self.options.timeout) {
      Ok(nanos) => outcome.duration_nanos = Some(nanos),
      Err(err) => {
        self.context.errors.push(&workload.name, &label, &err);
        outcome.error = Some(err);
      }
    }

    if let (true, Some(wrapper)) = (outcome.success(), &self.options.memory) {
      match wrapper.peak_memory(engine, mode, workload, self.options.timeout) {
        Ok(bytes) => outcome.peak_memory_bytes = Some(bytes),
        Err(err) => {
          self.context.errors.push(&workload.name, &label, &err);
          outcome.error = Some(err);
        }
      }
    }

    outcome
  }

  /// `"<engine label> <mode>"`, used in progress output and failures.
  fn label(&self, engine_id: usize, mode: Mode) -> String {
    format!("{} {mode}", self.context.labels.get(&self.engines[engine_id]))
      .trim()
      .to_string()
  }
}

/// Times a single run and checks its result. Validation happens after the
/// clock stops.
fn measure_time(engine: &Engine, mode: Mode, workload: &Workload, timeout: Duration) -> Result<u64, RunError> {
  let start = Instant::now();
  let output = run::run(engine, mode, workload, timeout)?;
  let elapsed = start.elapsed();

  validate::validate(&output.stdout, workload).map_err(|err| match err {
    RunError::Execution { message, .. } => RunError::Execution {
      message,
      stderr: output.stderr.clone(),
    },
    err => err,
  })?;

  Ok(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
}
