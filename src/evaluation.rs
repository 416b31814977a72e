//! evaluation — negative log predictive density of a forecast run.
//!
//! [`nlpd`] scores one Gaussian forecast against the realised value;
//! [`mean_nlpd`] averages it over a forecast CSV written by
//! [`crate::io::RecordWriter`] and [`summarize`] over in-memory records.
//! Columns are located by header name, so extra columns (hyperparameters)
//! can be in any order.
use std::io::BufRead;

use crate::warping::{
    errors::{WarpError, WarpResult},
    models::forecast::ForecastRecord,
};

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// `½(ln 2π + (y − μ)²/σ² + ln σ²)`.
pub fn nlpd(y: f64, mean: f64, std: f64) -> f64 {
    let var = std * std;
    let d = y - mean;
    0.5 * (LN_2PI + d * d / var + var.ln())
}

/// Options for [`mean_nlpd`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlpdOptions {
    /// Leading records to ignore (early, small-window forecasts).
    pub skip: usize,
    /// Add the recorded observation noise to the predictive variance.
    pub with_noise: bool,
    /// Field separator.
    pub comma: char,
}

impl Default for NlpdOptions {
    fn default() -> Self {
        Self { skip: 0, with_noise: false, comma: ',' }
    }
}

/// Average NLPD and how many records contributed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NlpdSummary {
    pub mean: f64,
    pub count: usize,
    /// Records after `skip` whose forecast was missing or degenerate.
    pub invalid: usize,
}

#[derive(Debug, Default)]
struct Accumulator {
    sum: f64,
    count: usize,
    invalid: usize,
}

impl Accumulator {
    fn push(&mut self, y: f64, mean: f64, std: f64, noise_std: Option<f64>) {
        let std = match noise_std {
            Some(noise) => (std * std + noise * noise).sqrt(),
            None => std,
        };
        if !mean.is_finite() || !std.is_finite() || std <= 0.0 {
            self.invalid += 1;
            return;
        }
        self.sum += nlpd(y, mean, std);
        self.count += 1;
    }

    fn finish(self) -> NlpdSummary {
        let mean = if self.count > 0 { self.sum / self.count as f64 } else { f64::NAN };
        NlpdSummary { mean, count: self.count, invalid: self.invalid }
    }
}

/// Average [`nlpd`] over forecast records; `opts.comma` is ignored.
/// Records without a forecast count as invalid.
pub fn summarize(records: &[ForecastRecord], opts: &NlpdOptions) -> NlpdSummary {
    let mut acc = Accumulator::default();
    for record in records.iter().skip(opts.skip) {
        match record.forecast {
            Some(f) => {
                let noise = opts.with_noise.then_some(f.noise_std);
                acc.push(record.actual, f.mean, f.std, noise);
            }
            None => acc.invalid += 1,
        }
    }
    acc.finish()
}

/// Average [`nlpd`] over a forecast CSV.
///
/// Records whose mean or standard deviation is not finite, or whose
/// standard deviation is zero, are counted as invalid and left out.
///
/// # Errors
/// - `WarpError::Io` for reader failures.
/// - `WarpError::MalformedRecord` for a missing header, a missing column
///   (`y`, `mean`, `std`, and `noise_std` with `with_noise`), or an
///   unparseable field.
pub fn mean_nlpd<R: BufRead>(reader: R, opts: &NlpdOptions) -> WarpResult<NlpdSummary> {
    let mut lines = reader.lines().enumerate().filter(|(_, l)| match l {
        Ok(s) => !s.trim().is_empty(),
        Err(_) => true,
    });
    let header = match lines.next() {
        Some((_, line)) => line?,
        None => {
            return Err(WarpError::MalformedRecord { line: 1, reason: "missing header".into() });
        }
    };
    let names: Vec<&str> = header.split(opts.comma).map(str::trim).collect();
    let column = |name: &str| {
        names.iter().position(|n| *n == name).ok_or_else(|| WarpError::MalformedRecord {
            line: 1,
            reason: format!("no '{name}' column in header"),
        })
    };
    let (iy, imean, istd) = (column("y")?, column("mean")?, column("std")?);
    let inoise = if opts.with_noise { Some(column("noise_std")?) } else { None };

    let mut acc = Accumulator::default();
    for (k, (i, line)) in lines.enumerate() {
        let line = line?;
        if k < opts.skip {
            continue;
        }
        let fields: Vec<&str> = line.split(opts.comma).map(str::trim).collect();
        let field = |j: usize| -> WarpResult<f64> {
            let raw = fields.get(j).ok_or_else(|| WarpError::MalformedRecord {
                line: i + 1,
                reason: format!("expected at least {} fields, found {}", j + 1, fields.len()),
            })?;
            raw.parse::<f64>().map_err(|e| WarpError::MalformedRecord {
                line: i + 1,
                reason: format!("'{raw}': {e}"),
            })
        };
        let noise = match inoise {
            Some(j) => Some(field(j)?),
            None => None,
        };
        acc.push(field(iy)?, field(imean)?, field(istd)?, noise);
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The closed form at the mean with unit variance.
    // - Averaging with skip, noise inflation, invalid rows, and a custom
    //   separator.
    // - Header errors.
    // - In-memory summaries agree with the CSV path.
    // -------------------------------------------------------------------------

    const CSV: &str = "x,y,mean,std,ll0,ll,c,noise_std\n\
                       1,0.0,0.0,1.0,-1,-1,1,0.5\n\
                       2,1.0,0.0,1.0,-1,-1,1,0.5\n\
                       3,1.0,NaN,NaN,-1,-1,1,NaN\n";

    #[test]
    // Purpose
    // -------
    // At the mean with unit variance only the normalising constant is left.
    //
    // Given
    // -----
    // - y = μ = 0, σ = 1.
    //
    // Expect
    // ------
    // - ½ ln 2π.
    fn nlpd_closed_form() {
        assert_abs_diff_eq!(nlpd(0.0, 0.0, 1.0), 0.5 * LN_2PI, epsilon = 1e-15);
        assert_abs_diff_eq!(nlpd(1.0, 0.0, 1.0), 0.5 * LN_2PI + 0.5, epsilon = 1e-15);
    }

    #[test]
    // Purpose
    // -------
    // Averages skip leading rows and leave out invalid forecasts.
    //
    // Given
    // -----
    // - Two valid rows (NLPD ½ln2π and ½ln2π + ½) and one NaN row.
    //
    // Expect
    // ------
    // - Mean ½ln2π + ¼ over 2 rows, 1 invalid; with skip 1 only the second.
    fn averages_valid_rows() {
        let all = mean_nlpd(CSV.as_bytes(), &NlpdOptions::default()).expect("parse");
        assert_eq!((all.count, all.invalid), (2, 1));
        assert_abs_diff_eq!(all.mean, 0.5 * LN_2PI + 0.25, epsilon = 1e-12);

        let skipped =
            mean_nlpd(CSV.as_bytes(), &NlpdOptions { skip: 1, ..NlpdOptions::default() })
                .expect("parse");
        assert_eq!(skipped.count, 1);
        assert_abs_diff_eq!(skipped.mean, 0.5 * LN_2PI + 0.5, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Noise inflation adds variances; separators are configurable.
    //
    // Given
    // -----
    // - The same data separated by ';', with noise_std 0.5.
    //
    // Expect
    // ------
    // - σ² = 1.25 in both valid rows.
    fn noise_and_separator() {
        let text = CSV.replace(',', ";");
        let opts = NlpdOptions { with_noise: true, comma: ';', ..NlpdOptions::default() };
        let s = mean_nlpd(text.as_bytes(), &opts).expect("parse");
        let expected = 0.5 * (nlpd(0.0, 0.0, 1.25f64.sqrt()) + nlpd(1.0, 0.0, 1.25f64.sqrt()));
        assert_abs_diff_eq!(s.mean, expected, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Missing header or column is a malformed record.
    //
    // Given
    // -----
    // - Empty input; a header without `std`.
    //
    // Expect
    // ------
    // - `MalformedRecord { line: 1 }` both times.
    fn header_errors() {
        assert!(matches!(
            mean_nlpd("".as_bytes(), &NlpdOptions::default()),
            Err(WarpError::MalformedRecord { line: 1, .. })
        ));
        assert!(matches!(
            mean_nlpd("y,mean\n1,1\n".as_bytes(), &NlpdOptions::default()),
            Err(WarpError::MalformedRecord { line: 1, .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // Record summaries treat a missing forecast like a NaN row.
    //
    // Given
    // -----
    // - Records mirroring the CSV fixture.
    //
    // Expect
    // ------
    // - Same mean, count, and invalid count as `mean_nlpd`.
    fn summarize_matches_csv() {
        use crate::warping::models::composite::Forecast;

        // Arrange
        let record = |actual: f64, forecast: Option<Forecast>| ForecastRecord {
            end: 1,
            input: 0.0,
            actual,
            forecast,
            ll0: -1.0,
            ll: -1.0,
            hyper: vec![1.0],
            iterations: 0,
            status: String::new(),
            converged: false,
        };
        let f = Forecast { mean: 0.0, std: 1.0, noise_std: 0.5 };
        let records = vec![record(0.0, Some(f)), record(1.0, Some(f)), record(1.0, None)];

        // Act
        let opts = NlpdOptions { with_noise: true, ..NlpdOptions::default() };
        let from_records = summarize(&records, &opts);
        let from_csv = mean_nlpd(CSV.as_bytes(), &opts).expect("parse");

        // Assert
        assert_eq!((from_records.count, from_records.invalid), (2, 1));
        assert_abs_diff_eq!(from_records.mean, from_csv.mean, epsilon = 1e-12);
    }
}
