use std::{
  io::{self, Read},
  path::Path,
  process::{Child, Command, ExitStatus, Output, Stdio},
  thread::{self, JoinHandle},
  time::Duration,
};

use anyhow::{Context, Result};
use tempfile::{Builder, NamedTempFile};
use wait_timeout::ChildExt as WaitExt;

#[extend::ext]
pub impl ExitStatus {
  fn check_success(&self) -> Result<()> {
    if !self.success() {
      anyhow::bail!("exited with non-zero status {self}");
    }

    Ok(())
  }
}

#[extend::ext]
pub impl Child {
  /// Waits for the child for at most `timeout`. On timeout the child is killed
  /// and reaped, and `Ok(None)` is returned.
  fn wait_or_kill(&mut self, timeout: Duration) -> Result<Option<ExitStatus>> {
    let Some(status) = self.wait_timeout(timeout).context("wait")? else {
      self.kill().context("kill after timeout")?;
      self.wait().context("wait after kill")?;

      return Ok(None);
    };

    Ok(Some(status))
  }
}

#[extend::ext]
pub impl Command {
  fn check_success(&mut self) -> Result<()> {
    self.status().context("status")?.check_success()
  }

  /// Runs the command, capturing stdout and stderr, or `Ok(None)` on timeout.
  /// The exit status is returned as-is, callers decide what a failure means.
  fn output_timeout(&mut self, timeout: Duration) -> Result<Option<Output>> {
    let mut child = self
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .context("spawn")?;

    // NOTE: both pipes are drained on their own threads, otherwise a chatty
    // engine fills the pipe buffer and never exits.
    let stdout = drain(child.stdout.take().context("stdout")?);
    let stderr = drain(child.stderr.take().context("stderr")?);

    let Some(status) = child.wait_or_kill(timeout)? else {
      return Ok(None);
    };

    Ok(Some(Output {
      status,
      stdout: join(stdout).context("read stdout")?,
      stderr: join(stderr).context("read stderr")?,
    }))
  }
}

#[extend::ext]
pub impl NamedTempFile {
  fn in_dir_with_suffix<P: AsRef<Path>>(dir: P, suffix: &str) -> Result<NamedTempFile> {
    Builder::new().suffix(suffix).tempfile_in(dir).context("tempfile")
  }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
  thread::spawn(move || {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;

    Ok(buf)
  })
}

fn join(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
  handle
    .join()
    .map_err(|_| anyhow::anyhow!("reader thread panicked"))?
    .context("read")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn captures_both_streams() {
    let output = Command::new("sh")
      .args(["-c", "echo out; echo err >&2; exit 3"])
      .output_timeout(Duration::from_secs(10))
      .unwrap()
      .unwrap();

    assert_eq!(output.stdout, b"out\n");
    assert_eq!(output.stderr, b"err\n");
    assert!(output.status.check_success().is_err());
  }

  #[test]
  fn times_out() {
    let output = Command::new("sh")
      .args(["-c", "exec sleep 5"])
      .output_timeout(Duration::from_millis(100))
      .unwrap();

    assert!(output.is_none());
  }

  #[test]
  fn temp_file_gets_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let file = NamedTempFile::in_dir_with_suffix(dir.path(), ".wasm").unwrap();

    assert_eq!(file.path().extension().unwrap(), "wasm");
    assert!(file.path().starts_with(dir.path()));
  }
}
