use std::{fmt, str::FromStr};

use anyhow::{Context, Result};

/// An operating configuration of the engine under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
  Interpreter,
  Jit,
  JitNoRegAlloc,
}

impl Mode {
  pub const ALL: [Mode; 3] = [Mode::Interpreter, Mode::Jit, Mode::JitNoRegAlloc];

  /// Flags passed to the engine, in the order they appear on the command line.
  pub fn flags(self) -> &'static [&'static str] {
    match self {
      Mode::Interpreter => &[],
      Mode::Jit => &["--jit"],
      Mode::JitNoRegAlloc => &["--jit", "--jit-no-reg-alloc"],
    }
  }

  pub fn code(self) -> &'static str {
    match self {
      Mode::Interpreter => "i",
      Mode::Jit => "j",
      Mode::JitNoRegAlloc => "jnr",
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Mode::Interpreter => "interpreter",
      Mode::Jit => "jit",
      Mode::JitNoRegAlloc => "jit-no-reg-alloc",
    }
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Mode {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    Mode::ALL
      .into_iter()
      .find(|mode| mode.code() == s || mode.name() == s)
      .with_context(|| format!("unknown mode {s:?}, expected one of i, j, jnr"))
  }
}

/// A directed pair of modes. The cell shows the `subject` aggregate followed by
/// how many times faster it is than `baseline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
  pub subject: Mode,
  pub baseline: Mode,
}

impl Comparison {
  pub fn new(subject: Mode, baseline: Mode) -> Result<Self> {
    if subject == baseline {
      anyhow::bail!("cannot compare {subject} against itself");
    }

    Ok(Self { subject, baseline })
  }
}

impl fmt::Display for Comparison {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.subject, self.baseline)
  }
}

/// One requested report column, repeated for every engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
  /// Mean wall-clock seconds of a mode.
  Time(Mode),
  /// Mean peak resident memory of a mode.
  Memory(Mode),
  Compare(Comparison),
  /// Mean wall-clock seconds of a mode against the same mode of the first
  /// engine.
  Relative(Mode),
}

impl Selector {
  pub fn modes(&self) -> Vec<Mode> {
    match *self {
      Selector::Time(mode) | Selector::Memory(mode) | Selector::Relative(mode) => vec![mode],
      Selector::Compare(Comparison { subject, baseline }) => vec![subject, baseline],
    }
  }

  pub fn is_memory(&self) -> bool {
    matches!(self, Selector::Memory(_))
  }
}

impl FromStr for Selector {
  type Err = anyhow::Error;

  /// Accepts `j`, `jit`, `j-mem`, `j-rel`, `j/i`, `jit/interpreter` and so on.
  fn from_str(s: &str) -> Result<Self> {
    if let Some((subject, baseline)) = s.split_once('/') {
      return Ok(Selector::Compare(Comparison::new(subject.parse()?, baseline.parse()?)?));
    }

    if let Some(mode) = s.strip_suffix("-mem") {
      return Ok(Selector::Memory(mode.parse()?));
    }

    if let Some(mode) = s.strip_suffix("-rel") {
      return Ok(Selector::Relative(mode.parse()?));
    }

    Ok(Selector::Time(s.parse()?))
  }
}
