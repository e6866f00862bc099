use std::{path::Path, process::Command, time::Duration};

use crate::{
  catalog::Workload,
  engine::{self, Engine},
  error::{RunError, SetupError},
  ext::{CommandExt, ExitStatusExt},
  mode::Mode,
};

/// Line of the wrapper's combined output holding the peak RSS.
const MEMORY_LINE: usize = 1;

/// What a finished engine process wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
  pub stdout: String,
  pub stderr: String,
}

/// Appends `<mode flags> <artifact> [-- <args>]` to an engine invocation.
fn push_invocation(command: &mut Command, mode: Mode, workload: &Workload) {
  command.args(mode.flags()).arg(&workload.artifact);

  if !workload.args.is_empty() {
    command.arg("--").args(&workload.args);
  }
}

/// `<engine> <mode flags> <artifact> [-- <args>]`.
pub fn command(engine: &Engine, mode: Mode, workload: &Workload) -> Command {
  let mut command = engine.command();
  push_invocation(&mut command, mode, workload);

  command
}

/// Runs the command to completion and captures its output.
///
/// # Errors
///
/// Returns a [`RunError`] if:
/// - the process could not be spawned,
/// - it did not exit within `timeout`,
/// - the exit status is non-zero.
fn execute(mut command: Command, timeout: Duration) -> Result<RunOutput, RunError> {
  let output = command
    .output_timeout(timeout)
    .map_err(|err| RunError::execution(format!("{err:#}")))?
    .ok_or(RunError::Timeout(timeout))?;

  let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

  if let Err(err) = output.status.check_success() {
    return Err(RunError::Execution {
      message: err.to_string(),
      stderr,
    });
  }

  Ok(RunOutput { stdout, stderr })
}

/// Runs one engine + mode + workload combination, blocking until it exits.
pub fn run(engine: &Engine, mode: Mode, workload: &Workload, timeout: Duration) -> Result<RunOutput, RunError> {
  execute(command(engine, mode, workload), timeout)
}

/// A command prefix that reports the peak RSS of what it runs, e.g.
/// `/usr/bin/time -f %M`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWrapper {
  program: String,
  args: Vec<String>,
}

impl MemoryWrapper {
  pub fn parse(command: &str) -> Option<Self> {
    let mut tokens = command.split_whitespace().map(str::to_string);

    Some(Self {
      program: tokens.next()?,
      args: tokens.collect(),
    })
  }

  /// Checks that the wrapper binary exists, either as a path or on `$PATH`.
  pub fn check_exists(&self) -> Result<(), SetupError> {
    if engine::locate(Path::new(&self.program)).is_none() {
      return Err(SetupError::Configuration(format!("memory wrapper {:?} not found", self.program)));
    }

    Ok(())
  }

  fn command(&self, engine: &Engine, mode: Mode, workload: &Workload) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args).arg(engine.program()).args(engine.args());
    push_invocation(&mut command, mode, workload);

    command
  }

  /// Re-runs the workload under the wrapper and returns the peak resident set
  /// size in bytes. The wrapper reports KiB on the second line of the combined
  /// stdout + stderr stream, the first being the engine's own result.
  pub fn peak_memory(
    &self,
    engine: &Engine,
    mode: Mode,
    workload: &Workload,
    timeout: Duration,
  ) -> Result<u64, RunError> {
    let output = execute(self.command(engine, mode, workload), timeout)?;
    let combined = format!("{}{}", output.stdout, output.stderr);

    let line = combined
      .lines()
      .nth(MEMORY_LINE)
      .ok_or_else(|| RunError::execution(format!("no memory usage in wrapper output {combined:?}")))?;
    let kib = line
      .trim()
      .parse::<u64>()
      .map_err(|err| RunError::execution(format!("invalid memory usage {line:?}: {err}")))?;

    kib
      .checked_mul(1024)
      .ok_or_else(|| RunError::execution(format!("memory usage {kib} KiB out of range")))
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use tempfile::TempDir;

  use super::*;
  use crate::testing::stub;

  const TIMEOUT: Duration = Duration::from_secs(10);

  fn workload(args: &[&str]) -> Workload {
    Workload {
      name: "fibonacci".to_string(),
      artifact: PathBuf::from("wasm/fibonacci.wasm"),
      expected: 63245986.0,
      tolerance: 1e-7,
      args: args.iter().map(|a| a.to_string()).collect(),
    }
  }

  fn args(command: &Command) -> Vec<String> {
    command.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
  }

  #[test]
  fn builds_invocation_in_order() {
    let engine = Engine::parse("./walrus --run-export runtime").unwrap();

    let command = command(&engine, Mode::JitNoRegAlloc, &workload(&[]));
    assert_eq!(command.get_program(), "./walrus");
    assert_eq!(
      args(&command),
      ["--run-export", "runtime", "--jit", "--jit-no-reg-alloc", "wasm/fibonacci.wasm"]
    );

    let command = super::command(&engine, Mode::Interpreter, &workload(&["30", "x"]));
    assert_eq!(
      args(&command),
      ["--run-export", "runtime", "wasm/fibonacci.wasm", "--", "30", "x"]
    );
  }

  #[test]
  fn captures_output() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "echo 42; echo warm >&2").to_str().unwrap()).unwrap();

    let output = run(&engine, Mode::Jit, &workload(&[]), TIMEOUT).unwrap();

    assert_eq!(output.stdout, "42\n");
    assert_eq!(output.stderr, "warm\n");
  }

  #[test]
  fn non_zero_exit_is_an_execution_error() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "echo trap >&2; exit 2").to_str().unwrap()).unwrap();

    let err = run(&engine, Mode::Jit, &workload(&[]), TIMEOUT).unwrap_err();

    match err {
      RunError::Execution { stderr, .. } => assert_eq!(stderr, "trap\n"),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn hung_engine_times_out() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "exec sleep 5").to_str().unwrap()).unwrap();

    let err = run(&engine, Mode::Jit, &workload(&[]), Duration::from_millis(100)).unwrap_err();

    assert!(matches!(err, RunError::Timeout(_)));
  }

  #[test]
  fn reads_peak_memory_from_second_line() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "echo 63245986").to_str().unwrap()).unwrap();
    // Runs the engine, then reports like `/usr/bin/time -f %M`.
    let wrapper = stub(dir.path(), "time", r#""$@"; echo 2048 >&2"#);
    let wrapper = MemoryWrapper::parse(wrapper.to_str().unwrap()).unwrap();

    let bytes = wrapper.peak_memory(&engine, Mode::Interpreter, &workload(&[]), TIMEOUT).unwrap();

    assert_eq!(bytes, 2048 * 1024);
  }

  #[test]
  fn garbage_memory_line_is_an_execution_error() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "echo 1").to_str().unwrap()).unwrap();
    let wrapper = stub(dir.path(), "time", r#""$@"; echo lots >&2"#);
    let wrapper = MemoryWrapper::parse(wrapper.to_str().unwrap()).unwrap();

    let err = wrapper.peak_memory(&engine, Mode::Interpreter, &workload(&[]), TIMEOUT).unwrap_err();

    assert!(matches!(err, RunError::Execution { .. }));
  }

  #[test]
  fn overflowing_memory_line_is_an_execution_error() {
    let dir = TempDir::new().unwrap();
    let engine = Engine::parse(stub(dir.path(), "engine", "echo 1").to_str().unwrap()).unwrap();
    let wrapper = stub(dir.path(), "time", &format!(r#""$@"; echo {} >&2"#, u64::MAX));
    let wrapper = MemoryWrapper::parse(wrapper.to_str().unwrap()).unwrap();

    let err = wrapper.peak_memory(&engine, Mode::Interpreter, &workload(&[]), TIMEOUT).unwrap_err();

    assert!(matches!(err, RunError::Execution { .. }));
  }

  #[test]
  fn missing_wrapper_is_a_configuration_error() {
    let wrapper = MemoryWrapper::parse("/definitely/not/here/time -f %M").unwrap();
    assert!(matches!(wrapper.check_exists(), Err(SetupError::Configuration(_))));

    let dir = TempDir::new().unwrap();
    let wrapper = stub(dir.path(), "time", r#""$@""#);
    assert!(MemoryWrapper::parse(wrapper.to_str().unwrap()).unwrap().check_exists().is_ok());
  }
}
