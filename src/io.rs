//! io — CSV input of series and CSV output of forecast records.
//!
//! Purpose
//! -------
//! Read `x,y` series for the forecasting loop and write one line per
//! [`ForecastRecord`].
//!
//! Key behaviors
//! -------------
//! - [`load_series`] reads comma-separated `x,y` lines, skipping blank
//!   lines. Any unparseable field or wrong field count aborts the load with
//!   `WarpError::MalformedRecord` (1-based line number): downstream
//!   windowing cannot work around gaps. The result is validated as a
//!   [`Series`].
//! - [`RecordWriter`] writes the header
//!   `x,y,mean,std,ll0,ll,<hyperparameter names>,noise_std` once, then one
//!   line per record. Steps without a forecast write `NaN` in the forecast
//!   columns.
//!
//! Conventions
//! -----------
//! - Numbers are written with Rust's shortest round-trip `Display`, so
//!   [`crate::evaluation`] reads back exactly what was written.
use std::io::{BufRead, Write};

use crate::warping::{
    core::data::Series,
    errors::{WarpError, WarpResult},
    models::forecast::ForecastRecord,
};

/// Parse an `x,y` series.
///
/// # Errors
/// - `WarpError::Io` for reader failures.
/// - `WarpError::MalformedRecord` for a line that is not two numbers.
/// - Any [`Series::new`] validation error.
pub fn load_series<R: BufRead>(reader: R) -> WarpResult<Series> {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if fields.len() != 2 {
            return Err(WarpError::MalformedRecord {
                line: i + 1,
                reason: format!("expected 2 fields, found {}", fields.len()),
            });
        }
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|e| WarpError::MalformedRecord {
                line: i + 1,
                reason: format!("'{s}': {e}"),
            })
        };
        x.push(parse(fields[0])?);
        y.push(parse(fields[1])?);
    }
    Series::new(x, y)
}

/// Streaming CSV writer for forecast records.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    out: W,
    hyper_names: Vec<&'static str>,
    header_written: bool,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, hyper_names: Vec<&'static str>) -> Self {
        Self { out, hyper_names, header_written: false }
    }

    pub fn header(&self) -> String {
        let mut cols = vec!["x", "y", "mean", "std", "ll0", "ll"];
        cols.extend(self.hyper_names.iter().copied());
        cols.push("noise_std");
        cols.join(",")
    }

    /// Write one record, preceded by the header on the first call.
    ///
    /// # Errors
    /// - `WarpError::Io` on write failure.
    /// - `WarpError::ParamLengthMismatch` if the record carries a different
    ///   number of hyperparameters than the header names.
    pub fn write(&mut self, record: &ForecastRecord) -> WarpResult<()> {
        if record.hyper.len() != self.hyper_names.len() {
            return Err(WarpError::ParamLengthMismatch {
                expected: self.hyper_names.len(),
                found: record.hyper.len(),
            });
        }
        if !self.header_written {
            writeln!(self.out, "{}", self.header())?;
            self.header_written = true;
        }
        let (mean, std, noise_std) = match record.forecast {
            Some(f) => (f.mean, f.std, f.noise_std),
            None => (f64::NAN, f64::NAN, f64::NAN),
        };
        let mut line =
            format!("{},{},{},{},{},{}", record.input, record.actual, mean, std, record.ll0, record.ll);
        for h in &record.hyper {
            line.push(',');
            line.push_str(&h.to_string());
        }
        line.push(',');
        line.push_str(&noise_std.to_string());
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    pub fn flush(&mut self) -> WarpResult<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
