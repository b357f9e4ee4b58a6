use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::errors::{Result, RsgisError};
use crate::raster::{DataType, RasterWindow};

/// Affine geo-transform coefficients, in GDAL order.
///
/// x of the top-left corner, pixel width, row rotation, y of the top-left
/// corner, column rotation, pixel height (typically negative).
pub type GeoTransform = [f64; 6];

/// Summary statistics of one band, computed over pixels that are not no-data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub valid_count: usize,
}

impl BandStatistics {
    /// Statistics of `values`, skipping NaN and `no_data`.
    ///
    /// Returns `None` when no valid pixel remains.
    pub fn from_values<'a>(
        values: impl IntoIterator<Item = &'a f64>,
        no_data: Option<f64>,
    ) -> Option<Self> {
        let mut acc = StatisticsAccumulator::new(no_data);
        acc.extend(values);
        acc.finish()
    }
}

/// Running [`BandStatistics`] over pixels fed in pieces.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StatisticsAccumulator {
    no_data: Option<f64>,
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl StatisticsAccumulator {
    pub(crate) fn new(no_data: Option<f64>) -> Self {
        StatisticsAccumulator {
            no_data,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    pub(crate) fn extend<'a>(&mut self, values: impl IntoIterator<Item = &'a f64>) {
        for &v in values {
            if v.is_nan() || Some(v) == self.no_data {
                continue;
            }
            self.count += 1;
            self.min = self.min.min(v);
            self.max = self.max.max(v);
            self.sum += v;
            self.sum_sq += v * v;
        }
    }

    pub(crate) fn finish(self) -> Option<BandStatistics> {
        if self.count == 0 {
            return None;
        }
        let mean = self.sum / self.count as f64;
        let variance = (self.sum_sq / self.count as f64 - mean * mean).max(0.0);
        Some(BandStatistics {
            min: self.min,
            max: self.max,
            mean,
            std_dev: variance.sqrt(),
            valid_count: self.count,
        })
    }
}

/// Read access to a raster.
///
/// Band indices are 1-based, as in GDAL. Pixel values are exchanged as `f64`
/// whatever the stored [`DataType`].
pub trait RasterDataset: Send {
    fn path(&self) -> &Path;

    /// `(width, height)` in pixels.
    fn raster_size(&self) -> (usize, usize);

    fn band_count(&self) -> usize;

    fn data_type(&self) -> DataType;

    fn no_data_value(&self, band: usize) -> Option<f64>;

    fn geo_transform(&self) -> Option<GeoTransform>;

    fn projection(&self) -> Option<String>;

    /// Read one band over `window` as a `(rows, cols)` array.
    fn read_window(&self, band: usize, window: &RasterWindow) -> Result<Array2<f64>>;

    /// Fail unless `band` exists and `window` lies inside the raster.
    fn check_access(&self, band: usize, window: &RasterWindow) -> Result<()> {
        if band == 0 || band > self.band_count() {
            return Err(RsgisError::InvalidBandIndex {
                path: self.path().to_path_buf(),
                band,
                count: self.band_count(),
            });
        }
        window.check_within(self.raster_size())
    }
}

/// Write access to a raster created through a [`Driver`](crate::raster::Driver).
pub trait RasterDatasetMut: RasterDataset {
    /// Write `data` (shape `(window.height, window.width)`) into `band`.
    fn write_window(&mut self, band: usize, window: &RasterWindow, data: ArrayView2<f64>)
        -> Result<()>;

    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()>;

    fn set_band_description(&mut self, band: usize, description: &str) -> Result<()>;

    fn set_geo_transform(&mut self, transform: &GeoTransform) -> Result<()>;

    fn set_projection(&mut self, projection: &str) -> Result<()>;

    /// Compute, store where the format allows, and return band statistics.
    fn compute_statistics(&mut self, band: usize) -> Result<Option<BandStatistics>>;

    /// Build reduced resolution overviews. Returns `false` when the format
    /// has no overview support.
    fn build_overviews(&mut self, levels: &[usize]) -> Result<bool>;

    /// Persist pending writes.
    fn flush(&mut self) -> Result<()>;
}

/// Check `data` has the shape of `window`, for writers.
pub(crate) fn check_block_shape(
    name: &str,
    window: &RasterWindow,
    data: &ArrayView2<f64>,
) -> Result<()> {
    if data.dim() != window.shape() {
        return Err(RsgisError::WindowShape {
            name: name.to_string(),
            expected: window.shape(),
            found: data.dim(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_skip_no_data() {
        let values = [1.0, 2.0, 3.0, -9999.0, f64::NAN];
        let stats = BandStatistics::from_values(&values, Some(-9999.0)).unwrap();
        assert_eq!(stats.valid_count, 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
        assert!((stats.std_dev - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn statistics_of_nothing() {
        assert!(BandStatistics::from_values(&[0.0, 0.0], Some(0.0)).is_none());
    }
}
