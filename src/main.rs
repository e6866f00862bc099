mod bench;
mod catalog;
mod compare;
mod compile;
mod engine;
mod error;
mod ext;
mod format;
mod mode;
mod run;
mod stats;
#[cfg(test)]
mod testing;
mod validate;

use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use self::{
  bench::{Bench, Options, RunContext},
  catalog::{Catalog, Discovery, Filter, DEFAULT_TOLERANCE},
  compile::Emcc,
  engine::{Engine, LabelPolicy, Labels},
  format::{Format, Table},
  mode::{Mode, Selector},
  run::MemoryWrapper,
};

#[derive(Parser)]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Runs every workload on every engine and mode and reports the timings.
  Bench {
    /// Directory holding the C workloads; artifacts go to its `wasm/`.
    #[arg(long, default_value = "./ctests")]
    test_dir: PathBuf,
    /// Engine commands to benchmark. Arguments after the binary are kept.
    #[arg(long, num_args = 1.., default_value = "walrus --run-export runtime")]
    engine: Vec<String>,
    /// How many times each combination runs.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    iterations: u64,
    /// Report columns, repeated per engine: a mode (`i`, `j`, `jnr`), a
    /// mode's memory (`j-mem`), a comparison (`j/i`) or a mode against the
    /// first engine (`j-rel`).
    #[arg(long, value_delimiter = ',', default_value = "i")]
    columns: Vec<Selector>,
    /// Adds a memory column after every timing column.
    #[arg(long)]
    mem: bool,
    /// Command prefix reporting peak RSS in KiB on the second output line.
    #[arg(long, default_value = "/usr/bin/time -f %M")]
    mem_wrapper: String,
    /// Appends a row of column means.
    #[arg(long)]
    summary: bool,
    /// Writes the report here instead of stdout; `.csv` and `.json` select
    /// the format, anything else is markdown.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Engine names in headers: `full`, `hidden`, `suffix:N` or `serial`.
    #[arg(long, default_value = "full")]
    label: LabelPolicy,
    /// Seconds before a single engine run is killed.
    #[arg(long, default_value_t = 600)]
    timeout: u64,
    /// Absolute tolerance for workloads that do not set their own.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,
    /// JSON file adding or overriding expected values.
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Path to emcc.
    #[arg(long, default_value = "./emsdk/upstream/emscripten/emcc")]
    emcc: PathBuf,
    /// Compiles the workloads even if their artifacts exist.
    #[arg(long)]
    compile_anyway: bool,
    /// Only runs The Benchmarks Game workloads.
    #[arg(long)]
    only_game: bool,
    /// Only runs this workload.
    #[arg(long)]
    run: Option<String>,
  },
}

/// Inserts a memory column after each timing column that lacks one.
fn with_memory_columns(columns: Vec<Selector>) -> Vec<Selector> {
  let mut out = Vec::with_capacity(columns.len() * 2);

  for selector in &columns {
    out.push(*selector);
    if let Selector::Time(mode) = *selector {
      if !columns.contains(&Selector::Memory(mode)) {
        out.push(Selector::Memory(mode));
      }
    }
  }

  out
}

/// Every mode some column needs, in registry order.
fn modes(columns: &[Selector]) -> Vec<Mode> {
  Mode::ALL
    .into_iter()
    .filter(|mode| columns.iter().any(|selector| selector.modes().contains(mode)))
    .collect()
}

fn main() -> Result<ExitCode> {
  match Args::parse().command {
    Command::Bench {
      test_dir,
      engine,
      iterations,
      columns,
      mem,
      mem_wrapper,
      summary,
      report,
      label,
      timeout,
      tolerance,
      catalog: catalog_file,
      emcc,
      compile_anyway,
      only_game,
      run,
    } => {
      let engines = engine
        .iter()
        .map(String::as_str)
        .map(Engine::parse)
        .collect::<Result<Vec<_>, _>>()
        .context("engine")?;
      for engine in &engines {
        engine.check_exists().context("check engines")?;
      }
      eprintln!("checks done");

      let columns = if mem { with_memory_columns(columns) } else { columns };
      let memory = if columns.iter().any(Selector::is_memory) {
        let wrapper = MemoryWrapper::parse(&mem_wrapper).context("empty memory wrapper")?;
        wrapper.check_exists().context("check memory wrapper")?;
        Some(wrapper)
      } else {
        None
      };

      let mut catalog = Catalog::builtin();
      if let Some(path) = &catalog_file {
        catalog.extend_from_file(path).context("catalog")?;
      }

      let filter = Filter { only_game, run };
      let workloads = Discovery {
        test_dir: &test_dir,
        catalog: &catalog,
        filter: &filter,
        tolerance,
        compile_anyway,
      }
      .discover(&Emcc::new(emcc))
      .context("discover workloads")?;

      let options = Options {
        iterations: usize::try_from(iterations).context("iterations")?,
        modes: modes(&columns),
        timeout: Duration::from_secs(timeout),
        memory,
      };

      let mut bench = Bench::new(engines, workloads, options, RunContext::new(Labels::new(label)));
      bench.bench();

      let table = Table::build(&bench.stats, bench.engines(), &bench.context.labels, &columns);

      match &report {
        Some(path) => {
          let text = format::render(&table, Format::from_path(path), summary).context("format")?;
          fs::write(path, text).with_context(|| format!("write {path:?}"))?;
        }
        None => println!("{}", format::render(&table, Format::Markdown, summary).context("format")?),
      }

      let errors = &bench.context.errors;
      if !errors.is_empty() {
        eprintln!("{} run(s) failed:", errors.len());
        for failure in errors.failures() {
          eprintln!("  {failure}");
        }

        return Ok(ExitCode::FAILURE);
      }
    }
  }

  Ok(ExitCode::SUCCESS)
}
