use std::{fmt::Write, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
  compare::{self, SECONDS_PRECISION},
  engine::{Engine, Labels},
  mode::Selector,
  stats::{Aggregate, Stats},
};

const NAME_HEADER: &str = "test";
const CSV_SEPARATOR: char = ';';
const SUMMARY_MARKER: &str = "*";
const SUMMARY_NAME: &str = "MEAN";
const MEMORY_PRECISION: usize = 2;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  Markdown,
  Csv,
  Json,
}

impl Format {
  /// Picks the format from a report path's extension, markdown by default.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|ext| ext.to_str()) {
      Some("csv") => Format::Csv,
      Some("json") => Format::Json,
      _ => Format::Markdown,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
  pub test: String,
  pub cells: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
  pub serial: String,
  pub command: String,
}

/// A report: one row per workload, columns in the order they were requested.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Table {
  pub columns: Vec<String>,
  pub rows: Vec<Row>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub legend: Vec<LegendEntry>,
}

fn header(label: &str, selector: &Selector) -> String {
  let column = match selector {
    Selector::Time(mode) => format!("{mode} [s]"),
    Selector::Memory(mode) => format!("{mode} [MiB]"),
    Selector::Compare(comparison) => comparison.to_string(),
    Selector::Relative(mode) => format!("{mode} vs first"),
  };

  if label.is_empty() {
    column
  } else {
    format!("{label} {column}")
  }
}

impl Table {
  /// Lays out `stats` with one column per engine and selector, engines in the
  /// order given and selectors in the order requested.
  pub fn build(stats: &Stats, engines: &[Engine], labels: &Labels, selectors: &[Selector]) -> Self {
    let mut columns = Vec::new();
    let mut cells = vec![Vec::new(); stats.workloads.len()];

    for (engine_id, engine) in engines.iter().enumerate() {
      for selector in selectors {
        columns.push(header(labels.get(engine), selector));

        let column: Vec<String> = match *selector {
          Selector::Time(mode) => (0..stats.workloads.len())
            .map(|w| format!("{:.SECONDS_PRECISION$}", stats.record(w, engine_id, mode).duration))
            .collect(),
          Selector::Memory(mode) => (0..stats.workloads.len())
            .map(|w| {
              let mib = stats.record(w, engine_id, mode).memory.map(|b| b / BYTES_PER_MIB);
              format!("{mib:.MEMORY_PRECISION$}")
            })
            .collect(),
          Selector::Compare(comparison) => compare::compare(stats, engine_id, comparison),
          Selector::Relative(mode) => compare::relative(stats, engine_id, mode),
        };

        for (row, cell) in cells.iter_mut().zip(column) {
          row.push(cell);
        }
      }
    }

    let rows = stats
      .workloads
      .iter()
      .zip(cells)
      .map(|((name, _), cells)| Row {
        test: name.clone(),
        cells,
      })
      .collect();

    let legend = labels
      .legend()
      .unwrap_or_default()
      .iter()
      .map(|(serial, command)| LegendEntry {
        serial: serial.clone(),
        command: command.clone(),
      })
      .collect();

    Self { columns, rows, legend }
  }
}

/// The leading number of a cell, ignoring a trailing `(<ratio>x)`.
fn leading_token(cell: &str) -> Option<&str> {
  let cell = cell.trim();
  let value = match cell.strip_suffix("x)").and_then(|rest| rest.rsplit_once('(')) {
    Some((value, _)) => value,
    None => cell,
  };

  value.split_whitespace().next()
}

fn leading_number(cell: &str) -> Option<f64> {
  leading_token(cell)?.parse().ok()
}

fn decimals(token: &str) -> usize {
  token.split_once('.').map_or(0, |(_, fraction)| fraction.len())
}

/// Mean of a column, printed with as many decimals as its cells. Empty if any
/// cell is not numeric, the sentinel if any cell is the sentinel.
fn column_mean<'a, I: IntoIterator<Item = &'a str>>(cells: I) -> String {
  let mut values = Vec::new();
  let mut precision = 0;
  for cell in cells {
    let Some(value) = leading_number(cell) else {
      return String::new();
    };
    precision = leading_token(cell).map_or(precision, |token| precision.max(decimals(token)));
    values.push(Some(value));
  }

  if values.is_empty() {
    return String::new();
  }

  format!("{:.precision$}", Aggregate::from_samples(&values))
}

/// The `*` separator row and the `MEAN` row.
fn summary(table: &Table) -> [Row; 2] {
  let separator = Row {
    test: SUMMARY_MARKER.to_string(),
    cells: vec![SUMMARY_MARKER.to_string(); table.columns.len()],
  };

  let means = (0..table.columns.len())
    .map(|i| column_mean(table.rows.iter().map(|row| row.cells[i].as_str())))
    .collect();

  [
    separator,
    Row {
      test: SUMMARY_NAME.to_string(),
      cells: means,
    },
  ]
}

fn format_markdown(header: &[&str], rows: &[Row]) -> Result<String> {
  let widths = header
    .iter()
    .enumerate()
    .map(|(i, col)| {
      rows
        .iter()
        .map(|row| if i == 0 { row.test.len() } else { row.cells[i - 1].len() })
        .chain([col.len(), 3])
        .max()
        .unwrap_or_default()
    })
    .collect::<Vec<_>>();

  // Numbers are right-aligned, names and headers left-aligned.
  let line = |cols: Vec<&str>, is_header: bool| {
    let cols = cols
      .iter()
      .zip(&widths)
      .enumerate()
      .map(|(i, (col, &width))| {
        if i == 0 || is_header || leading_number(col).is_none() {
          format!("{col:<width$}")
        } else {
          format!("{col:>width$}")
        }
      })
      .collect::<Vec<_>>();

    format!("| {} |", cols.join(" | "))
  };

  let mut table = String::new();

  writeln!(table, "{}", line(header.to_vec(), true))?;

  let separator = widths.iter().map(|&width| "-".repeat(width)).collect::<Vec<_>>();
  writeln!(table, "{}", line(separator.iter().map(String::as_str).collect(), true))?;

  for row in rows {
    let cols = [row.test.as_str()]
      .into_iter()
      .chain(row.cells.iter().map(String::as_str))
      .collect();
    writeln!(table, "{}", line(cols, false))?;
  }

  Ok(table)
}

fn format_csv(header: &[&str], rows: &[Row]) -> Result<String> {
  let sep = CSV_SEPARATOR.to_string();
  let mut table = String::new();

  writeln!(table, "{}", header.join(&sep))?;
  for row in rows {
    writeln!(table, "{}{sep}{}", row.test, row.cells.join(&sep))?;
  }

  Ok(table)
}

#[derive(Serialize)]
struct JsonReport<'a> {
  #[serde(flatten)]
  table: &'a Table,
  #[serde(skip_serializing_if = "Option::is_none")]
  summary: Option<&'a Row>,
}

/// Serializes a table. With `summary`, a `*` separator row and a `MEAN` row of
/// column means follow the workload rows.
pub fn render(table: &Table, format: Format, summary: bool) -> Result<String> {
  let summary = summary.then(|| self::summary(table));

  if format == Format::Json {
    let report = JsonReport {
      table,
      summary: summary.as_ref().map(|[_, means]| means),
    };

    return serde_json::to_string_pretty(&report).context("json");
  }

  let mut rows = table.rows.clone();
  rows.extend(summary.into_iter().flatten());

  let mut header = vec![NAME_HEADER];
  header.extend(table.columns.iter().map(String::as_str));

  let legend = table
    .legend
    .iter()
    .map(|entry| Row {
      test: entry.serial.clone(),
      cells: vec![entry.command.clone()],
    })
    .collect::<Vec<_>>();

  let mut out = match format {
    Format::Markdown => format_markdown(&header, &rows)?,
    _ => format_csv(&header, &rows)?,
  };

  if !legend.is_empty() {
    let header = ["serial", "command"];
    writeln!(out)?;
    out.push_str(&match format {
      Format::Markdown => format_markdown(&header, &legend)?,
      _ => format_csv(&header, &legend)?,
    });
  }

  Ok(out)
}
