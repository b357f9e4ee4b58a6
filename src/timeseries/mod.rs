//! Per-pixel outlier screening of image time series
//!
//! Each band of a pixel's time series is fitted against a seasonal harmonic
//! model with a robust Tukey biweight estimator. Observations far from the
//! fit are flagged as low or high outliers:
//!
//! ```
//! use ndarray::Array2;
//! use rsgis::timeseries::{OutlierFlag, OutlierScreen, PixelTimeSeries};
//!
//! let dates: Vec<i64> = (0..24).map(|i| 730_000 + 30 * i).collect();
//! let mut values = Array2::from_shape_fn((24, 1), |(i, _)| {
//!     let t = dates[i] as f64 * 2.0 * std::f64::consts::PI / 365.25;
//!     100.0 + 20.0 * t.cos()
//! });
//! values[[5, 0]] += 80.0;
//!
//! let series = PixelTimeSeries::new(dates, values, None)?;
//! let (flags, stats) = OutlierScreen::default().screen(&series);
//! assert_eq!(flags[[5, 0]], OutlierFlag::High.value());
//! assert_eq!(stats.fits, 1);
//! # Ok::<(), rsgis::RsgisError>(())
//! ```

mod driver;
mod harmonic;
mod robust;
mod screen;
mod series;

pub use driver::{screen_image_series, tmask_image_series, DatedImage};
pub use harmonic::{design_matrix, years_spanned, ANNUAL_PERIOD_DAYS};
pub use robust::{RobustModelFit, TukeyBiweight};
pub use screen::{
    OutlierFlag, OutlierScreen, ResidualLimit, ScreenStats, TmaskBands, TmaskClass, TmaskScreen,
};
pub use series::{ordinal_day, PixelTimeSeries};

#[cfg(test)]
mod tests;
