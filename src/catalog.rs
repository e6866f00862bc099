use std::{
  collections::{BTreeMap, BTreeSet},
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{compile::Compiler, error::SetupError};

/// Default absolute tolerance when comparing a workload's result.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

const ARTIFACT_DIR: &str = "wasm";
const SOURCE_EXT: &str = "c";
const ARTIFACT_EXT: &str = "wasm";

/// Expected results of the bundled workloads.
const EXPECTED: &[(&str, f64)] = &[
  ("change", 4.0),
  ("factorial", 30.0),
  ("fannkuch", 120.0),
  ("fibonacci", 63245986.0),
  ("gregory", 3.141592640),
  ("hanoi", 0.0),
  ("heapsort", 0.0),
  ("kNucleotide", 1.0),
  ("mandelbrot", 2091942736.0),
  ("nbody", -0.169083713),
  ("nqueens", 0.0),
  ("prime", 48611.0),
  ("quick_sort", 0.0),
  ("redBlack", 4000000.0),
  ("salesman", 840.0),
];

/// https://benchmarksgame-team.pages.debian.net/benchmarksgame/description/simple.html#simple
const GAME: &[&str] = &["mandelbrot", "nbody", "gregory", "fannkuch", "kNucleotide"];

/// A compiled program together with the result it must produce.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
  pub name: String,
  pub artifact: PathBuf,
  pub expected: f64,
  pub tolerance: f64,
  /// Passed to the program after `--`.
  pub args: Vec<String>,
}

/// What is known about a workload before it has an artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
  pub expected: f64,
  #[serde(default)]
  pub tolerance: Option<f64>,
  #[serde(default)]
  pub args: Vec<String>,
  #[serde(default)]
  pub game: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
  entries: BTreeMap<String, Entry>,
}

impl Catalog {
  pub fn builtin() -> Self {
    let entries = EXPECTED
      .iter()
      .map(|&(name, expected)| {
        let entry = Entry {
          expected,
          tolerance: None,
          args: Vec::new(),
          game: GAME.contains(&name),
        };

        (name.to_string(), entry)
      })
      .collect();

    Self { entries }
  }

  /// Adds or replaces entries from a JSON object of `name -> entry`.
  pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_context(|| format!("read {path:?}"))?;
    let entries: BTreeMap<String, Entry> = serde_json::from_str(&text).with_context(|| format!("parse {path:?}"))?;

    self.entries.extend(entries);

    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Entry> {
    self.entries.get(name)
  }
}

/// Which workloads to pick up from the test directory.
#[derive(Debug, Clone, Default)]
pub struct Filter {
  pub only_game: bool,
  pub run: Option<String>,
}

impl Filter {
  fn accepts(&self, name: &str, entry: &Entry) -> bool {
    if self.only_game && !entry.game {
      return false;
    }

    self.run.as_deref().map_or(true, |run| run == name)
  }
}

pub struct Discovery<'a> {
  pub test_dir: &'a Path,
  pub catalog: &'a Catalog,
  pub filter: &'a Filter,
  pub tolerance: f64,
  pub compile_anyway: bool,
}

impl Discovery<'_> {
  /// Finds every workload in the test directory, compiling sources whose
  /// artifact is missing. Sources are `<dir>/*.c`; prebuilt artifacts in
  /// `<dir>/wasm/*.wasm` are picked up even without a source.
  pub fn discover(&self, compiler: &dyn Compiler) -> Result<Vec<Workload>> {
    if !self.test_dir.is_dir() {
      return Err(SetupError::Configuration(format!("invalid path for tests {:?}", self.test_dir)).into());
    }

    let artifact_dir = self.test_dir.join(ARTIFACT_DIR);
    fs::create_dir_all(&artifact_dir).with_context(|| format!("create_dir {artifact_dir:?}"))?;

    let sources = stems(self.test_dir, SOURCE_EXT).context("sources")?;
    let artifacts = stems(&artifact_dir, ARTIFACT_EXT).context("artifacts")?;

    let mut workloads = Vec::new();

    for name in sources.union(&artifacts) {
      let Some(entry) = self.catalog.get(name) else {
        eprintln!("no expected value for {name:?}; skipped");
        continue;
      };

      if !self.filter.accepts(name, entry) {
        continue;
      }

      let artifact = artifact_dir.join(format!("{name}.{ARTIFACT_EXT}"));
      let source = self.test_dir.join(format!("{name}.{SOURCE_EXT}"));

      if sources.contains(name) && (self.compile_anyway || !artifact.exists()) {
        eprintln!("compiling {name}");
        compiler
          .compile(&source, &artifact)
          .with_context(|| format!("compile {name}"))?;
      } else {
        eprintln!("{name}: target file found; compilation skipped");
      }

      workloads.push(Workload {
        name: name.clone(),
        artifact,
        expected: entry.expected,
        tolerance: entry.tolerance.unwrap_or(self.tolerance),
        args: entry.args.clone(),
      });
    }

    if let Some(run) = &self.filter.run {
      if workloads.is_empty() {
        return Err(SetupError::Configuration(format!("no workload named {run:?}")).into());
      }
    }

    Ok(workloads)
  }
}

/// File stems of every `*.ext` file directly inside `dir`, sorted.
fn stems(dir: &Path, ext: &str) -> Result<BTreeSet<String>> {
  let mut stems = BTreeSet::new();

  for entry in fs::read_dir(dir).with_context(|| format!("read dir {dir:?}"))? {
    let path = entry.context("dir entry")?.path();
    if path.is_file() && path.extension().is_some_and(|e| e == ext) {
      if let Some(stem) = path.file_stem() {
        stems.insert(stem.to_string_lossy().into_owned());
      }
    }
  }

  Ok(stems)
}
