use std::f64::consts::PI;

use ndarray::Array2;

/// Length of the seasonal cycle in days.
pub const ANNUAL_PERIOD_DAYS: f64 = 365.25;

/// Number of whole years covered by `dates` (ordinal days), rounded up and
/// at least 1.
pub fn years_spanned(dates: &[f64]) -> f64 {
    let (min, max) = dates
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| {
            (lo.min(d), hi.max(d))
        });
    if min > max {
        return 1.0;
    }
    ((max - min) / ANNUAL_PERIOD_DAYS).ceil().max(1.0)
}

/// Seasonal design matrix, one row per date.
///
/// Columns are a constant, the annual cosine and sine, and a cosine and
/// sine at `1/N` of the annual frequency where `N` is [`years_spanned`].
/// Series spanning a single year get only the first three columns.
pub fn design_matrix(dates: &[f64]) -> Array2<f64> {
    let years = years_spanned(dates);
    let columns = if years > 1.0 { 5 } else { 3 };
    let w = 2.0 * PI / ANNUAL_PERIOD_DAYS;
    Array2::from_shape_fn((dates.len(), columns), |(i, j)| {
        let t = dates[i];
        match j {
            0 => 1.0,
            1 => (w * t).cos(),
            2 => (w * t).sin(),
            3 => (w * t / years).cos(),
            _ => (w * t / years).sin(),
        }
    })
}
