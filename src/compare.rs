use crate::{
  mode::{Comparison, Mode},
  stats::{Aggregate, Stats, SENTINEL},
};

/// Decimal places of seconds in result cells.
pub const SECONDS_PRECISION: usize = 3;

/// How many times faster `subject` is than `baseline`, i.e.
/// `baseline / subject`. Failed when either side failed or the subject took
/// no measurable time.
pub fn ratio(subject: Aggregate, baseline: Aggregate) -> Aggregate {
  match (subject.value(), baseline.value()) {
    (Some(subject), Some(baseline)) if subject > 0.0 => Aggregate::new(baseline / subject),
    _ => Aggregate::FAILED,
  }
}

/// `"<subject> (<ratio>x)"`. Both parts are the sentinel on failure, so a
/// failed comparison reads `-1 (-1x)`.
pub fn cell(subject: Aggregate, baseline: Aggregate) -> String {
  let ratio = ratio(subject, baseline);

  if subject.is_failed() || ratio.is_failed() {
    return format!("{subject:.SECONDS_PRECISION$} ({SENTINEL}x)");
  }

  format!("{subject:.SECONDS_PRECISION$} ({ratio:.2}x)")
}

/// The comparison cells of one engine, one per workload in table order.
pub fn compare(stats: &Stats, engine: usize, comparison: Comparison) -> Vec<String> {
  (0..stats.workloads.len())
    .map(|workload| {
      let subject = stats.record(workload, engine, comparison.subject).duration;
      let baseline = stats.record(workload, engine, comparison.baseline).duration;

      cell(subject, baseline)
    })
    .collect()
}

/// One engine's cells for `mode` against the same mode of the first engine,
/// which is always `1.00x` of itself.
pub fn relative(stats: &Stats, engine: usize, mode: Mode) -> Vec<String> {
  (0..stats.workloads.len())
    .map(|workload| {
      let subject = stats.record(workload, engine, mode).duration;
      let first = stats.record(workload, 0, mode).duration;

      cell(subject, first)
    })
    .collect()
}
