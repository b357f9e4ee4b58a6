use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, ArrayView1};

use crate::errors::{Result, RsgisError};

/// Day number of `date`, counting 0001-01-01 as day 1.
pub fn ordinal_day(date: NaiveDate) -> i64 {
    i64::from(date.num_days_from_ce())
}

/// Multi-band observations of one pixel over time.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelTimeSeries {
    /// Ordinal day number of each observation.
    pub dates: Vec<i64>,
    /// `(date, band)` values.
    pub values: Array2<f64>,
    /// Sentinel marking missing observations; NaN is always missing.
    pub no_data: Option<f64>,
}

impl PixelTimeSeries {
    pub fn new(dates: Vec<i64>, values: Array2<f64>, no_data: Option<f64>) -> Result<Self> {
        if values.nrows() != dates.len() {
            return Err(RsgisError::InvalidParameter {
                name: "values",
                value: format!("{:?}", values.dim()),
                reason: format!("expected one row per date ({} dates)", dates.len()),
            });
        }
        Ok(PixelTimeSeries {
            dates,
            values,
            no_data,
        })
    }

    pub fn from_dates(dates: &[NaiveDate], values: Array2<f64>, no_data: Option<f64>) -> Result<Self> {
        PixelTimeSeries::new(dates.iter().map(|&d| ordinal_day(d)).collect(), values, no_data)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn band_count(&self) -> usize {
        self.values.ncols()
    }

    pub fn band(&self, band: usize) -> ArrayView1<'_, f64> {
        self.values.column(band)
    }

    pub fn is_valid(&self, value: f64) -> bool {
        !value.is_nan() && Some(value) != self.no_data
    }

    /// Positions, dates and values of the valid observations of `band`.
    pub fn valid_observations(&self, band: usize) -> (Vec<usize>, Vec<f64>, Vec<f64>) {
        let mut positions = Vec::new();
        let mut dates = Vec::new();
        let mut values = Vec::new();
        for (i, (&date, &value)) in self.dates.iter().zip(self.band(band)).enumerate() {
            if self.is_valid(value) {
                positions.push(i);
                dates.push(date as f64);
                values.push(value);
            }
        }
        (positions, dates, values)
    }
}
