use std::{
  collections::BTreeMap,
  env,
  path::{Path, PathBuf},
  process::Command,
  str::FromStr,
};

use anyhow::{Context, Result};

use crate::error::SetupError;

/// An engine under test: a binary plus the arguments it always receives, e.g.
/// `./walrus --run-export runtime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Engine {
  pub command: String,
  program: PathBuf,
  args: Vec<String>,
}

impl Engine {
  pub fn parse(command: &str) -> Result<Self, SetupError> {
    let mut tokens = command.split_whitespace();
    let program = tokens
      .next()
      .ok_or_else(|| SetupError::Configuration("empty engine command".to_string()))?;

    Ok(Self {
      command: command.trim().to_string(),
      program: PathBuf::from(program),
      args: tokens.map(str::to_string).collect(),
    })
  }

  /// Checks that the engine binary exists, either as a path or on `$PATH`.
  pub fn check_exists(&self) -> Result<(), SetupError> {
    if locate(&self.program).is_none() {
      return Err(SetupError::Configuration(format!("{:?} not found", self.program)));
    }

    Ok(())
  }

  /// The engine invocation without any mode flags or workload.
  pub fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args);

    command
  }

  pub fn program(&self) -> &Path {
    &self.program
  }

  pub fn args(&self) -> &[String] {
    &self.args
  }
}

/// Resolves a program the way a shell would: paths are checked directly, bare
/// names are searched for on `$PATH`.
pub fn locate(program: &Path) -> Option<PathBuf> {
  if program.components().count() > 1 {
    return program.is_file().then(|| program.to_path_buf());
  }

  env::split_paths(&env::var_os("PATH")?)
    .map(|dir| dir.join(program))
    .find(|candidate| candidate.is_file())
}

/// How engines are named in column headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPolicy {
  /// The raw command.
  #[default]
  Full,
  /// An empty label, for single-engine reports.
  Hidden,
  /// The last `n` path components of the binary, followed by its arguments.
  Suffix(usize),
  /// `1`, `2`, ... in the order engines are first seen, with a legend.
  Serial,
}

impl FromStr for LabelPolicy {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "full" => Ok(LabelPolicy::Full),
      "hidden" => Ok(LabelPolicy::Hidden),
      "serial" => Ok(LabelPolicy::Serial),
      _ => {
        let depth = s
          .strip_prefix("suffix:")
          .with_context(|| format!("unknown label policy {s:?}, expected full, hidden, serial or suffix:N"))?;
        let depth = depth.parse::<usize>().with_context(|| format!("invalid suffix depth {depth:?}"))?;
        if depth == 0 {
          anyhow::bail!("suffix depth must be at least 1");
        }

        Ok(LabelPolicy::Suffix(depth))
      }
    }
  }
}

/// Engine labels for one run. A label is assigned the first time an engine is
/// seen and never changes afterwards.
#[derive(Debug, Default)]
pub struct Labels {
  policy: LabelPolicy,
  assigned: BTreeMap<String, String>,
  /// `(label, command)` in assignment order.
  order: Vec<(String, String)>,
}

impl Labels {
  pub fn new(policy: LabelPolicy) -> Self {
    Self {
      policy,
      ..Self::default()
    }
  }

  pub fn assign(&mut self, engine: &Engine) -> &str {
    if !self.assigned.contains_key(&engine.command) {
      let label = match self.policy {
        LabelPolicy::Full => engine.command.clone(),
        LabelPolicy::Hidden => String::new(),
        LabelPolicy::Suffix(depth) => suffix(engine, depth),
        LabelPolicy::Serial => (self.order.len() + 1).to_string(),
      };

      self.order.push((label.clone(), engine.command.clone()));
      self.assigned.insert(engine.command.clone(), label);
    }

    &self.assigned[&engine.command]
  }

  /// The label of an engine, or the empty string if it was never assigned.
  pub fn get(&self, engine: &Engine) -> &str {
    self.assigned.get(&engine.command).map_or("", String::as_str)
  }

  /// Serial number to full command, only when labels are serial numbers.
  pub fn legend(&self) -> Option<&[(String, String)]> {
    (self.policy == LabelPolicy::Serial).then_some(self.order.as_slice())
  }
}

fn suffix(engine: &Engine, depth: usize) -> String {
  let components = engine.program.components().collect::<Vec<_>>();
  let start = components.len().saturating_sub(depth);

  let mut label = components[start..]
    .iter()
    .collect::<PathBuf>()
    .to_string_lossy()
    .into_owned();
  for arg in &engine.args {
    label.push(' ');
    label.push_str(arg);
  }

  label
}

#[cfg(test)]
mod tests {
  use super::*;

  fn engine(command: &str) -> Engine {
    Engine::parse(command).unwrap()
  }

  #[test]
  fn splits_program_and_arguments() {
    let walrus = engine("  ./out/walrus --run-export runtime ");

    assert_eq!(walrus.command, "./out/walrus --run-export runtime");
    assert_eq!(walrus.program(), Path::new("./out/walrus"));
    assert_eq!(walrus.args(), ["--run-export", "runtime"]);
    assert!(Engine::parse("   ").is_err());
  }

  #[test]
  fn missing_binary_is_a_configuration_error() {
    let err = engine("/definitely/not/here/walrus").check_exists().unwrap_err();
    assert!(matches!(err, SetupError::Configuration(_)));
  }

  #[test]
  fn parses_policies() {
    assert_eq!("full".parse::<LabelPolicy>().unwrap(), LabelPolicy::Full);
    assert_eq!("hidden".parse::<LabelPolicy>().unwrap(), LabelPolicy::Hidden);
    assert_eq!("serial".parse::<LabelPolicy>().unwrap(), LabelPolicy::Serial);
    assert_eq!("suffix:2".parse::<LabelPolicy>().unwrap(), LabelPolicy::Suffix(2));
    assert!("suffix:0".parse::<LabelPolicy>().is_err());
    assert!("short".parse::<LabelPolicy>().is_err());
  }

  #[test]
  fn suffix_keeps_last_components_and_arguments() {
    let mut labels = Labels::new(LabelPolicy::Suffix(2));
    assert_eq!(
      labels.assign(&engine("/opt/walrus/release/walrus --run-export runtime")),
      "release/walrus --run-export runtime"
    );
    assert_eq!(labels.assign(&engine("walrus")), "walrus");
    assert!(labels.legend().is_none());
  }

  #[test]
  fn deep_suffix_keeps_the_whole_path() {
    let mut labels = Labels::new(LabelPolicy::Suffix(5));
    assert_eq!(labels.assign(&engine("/a/walrus")), "/a/walrus");
    assert_eq!(labels.assign(&engine("./out/walrus -v")), "./out/walrus -v");
  }

  #[test]
  fn serial_labels_are_assigned_once() {
    let mut labels = Labels::new(LabelPolicy::Serial);
    let a = engine("/a/walrus");
    let b = engine("/b/walrus");

    assert_eq!(labels.assign(&a), "1");
    assert_eq!(labels.assign(&b), "2");
    assert_eq!(labels.assign(&a), "1");
    assert_eq!(labels.get(&b), "2");

    assert_eq!(
      labels.legend().unwrap(),
      [
        ("1".to_string(), "/a/walrus".to_string()),
        ("2".to_string(), "/b/walrus".to_string())
      ]
    );
  }

  #[test]
  fn hidden_labels_are_empty() {
    let mut labels = Labels::new(LabelPolicy::Hidden);
    assert_eq!(labels.assign(&engine("walrus")), "");
  }
}
