use std::{
  path::{Path, PathBuf},
  process::Command,
};

use anyhow::Context;
use tempfile::NamedTempFile;

use crate::{
  engine,
  error::SetupError,
  ext::{CommandExt, NamedTempFileExt},
};

/// Turns a workload source into a runnable artifact.
pub trait Compiler {
  fn compile(&self, source: &Path, artifact: &Path) -> Result<(), SetupError>;
}

/// Compiles C workloads to standalone wasm modules exporting `runtime`.
pub struct Emcc {
  path: PathBuf,
}

impl Emcc {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  fn command(&self, source: &Path, output: &Path) -> Command {
    let mut emcc = Command::new(&self.path);
    emcc
      .arg(source)
      .args(["--no-entry", "-s", "WASM=1"])
      .args(["-s", "EXPORTED_FUNCTIONS=_runtime"])
      .args(["-s", "EXPORTED_RUNTIME_METHODS=ccall,cwrap"])
      .arg("-o")
      .arg(output);

    emcc
  }
}

impl Compiler for Emcc {
  /// The artifact is written to a temporary file next to its destination and
  /// only renamed into place once emcc succeeds.
  fn compile(&self, source: &Path, artifact: &Path) -> Result<(), SetupError> {
    if engine::locate(&self.path).is_none() {
      return Err(SetupError::Configuration(format!("emcc not found at {:?}", self.path)));
    }

    let failed = |err: anyhow::Error| SetupError::Compilation {
      path: source.to_path_buf(),
      message: format!("{err:#}"),
    };

    let dir = artifact.parent().unwrap_or(Path::new("."));
    let output = NamedTempFile::in_dir_with_suffix(dir, ".wasm").map_err(failed)?;

    self
      .command(source, output.path())
      .check_success()
      .context("emcc")
      .map_err(failed)?;

    output
      .persist(artifact)
      .with_context(|| format!("persist {artifact:?}"))
      .map_err(failed)?;

    Ok(())
  }
}
