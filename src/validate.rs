use crate::{catalog::Workload, error::RunError};

/// Decimal digits kept before comparing against the expected value.
const PRECISION: i32 = 8;

/// Magnitude past which an `f64` no longer carries `PRECISION` decimals.
const EXACT_LIMIT: f64 = (1u64 << 52) as f64;

/// Rounds to `PRECISION` decimal digits.
pub fn round(value: f64) -> f64 {
  let scale = 10f64.powi(PRECISION);
  let scaled = value * scale;

  if !scaled.is_finite() || scaled.abs() >= EXACT_LIMIT {
    return value;
  }

  scaled.round() / scale
}

/// Parses the single number an engine prints. Anything besides that number
/// and surrounding whitespace makes the output unparseable.
pub fn parse_output(stdout: &str) -> Result<f64, RunError> {
  let mut tokens = stdout.split_whitespace();
  let token = tokens.next().ok_or_else(|| RunError::execution("no output"))?;

  if tokens.next().is_some() {
    return Err(RunError::execution(format!("unexpected output {:?}", stdout.trim())));
  }

  token
    .parse::<f64>()
    .map_err(|err| RunError::execution(format!("unparseable output {token:?}: {err}")))
}

/// Checks an engine's stdout against the workload's expected value, returning
/// the rounded result.
///
/// # Errors
///
/// - [`RunError::Execution`] if the output is not a number,
/// - [`RunError::Correctness`] if it is further than the tolerance from the
///   expected value.
pub fn validate(stdout: &str, workload: &Workload) -> Result<f64, RunError> {
  let actual = round(parse_output(stdout)?);

  if (actual - workload.expected).abs() > workload.tolerance || actual.is_nan() {
    return Err(RunError::Correctness {
      expected: workload.expected,
      actual,
    });
  }

  Ok(actual)
}
