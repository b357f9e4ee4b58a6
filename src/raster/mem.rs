use std::path::{Path, PathBuf};

use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::errors::Result;
use crate::raster::dataset::check_block_shape;
use crate::raster::{
    BandStatistics, DataType, GeoTransform, RasterDataset, RasterDatasetMut, RasterWindow,
};

/// A raster held entirely in memory, band-major `(band, row, col)`, as
/// created by the `MEM` driver.
#[derive(Debug, Clone)]
pub struct MemRaster {
    path: PathBuf,
    data_type: DataType,
    pixels: Array3<f64>,
    no_data: Vec<Option<f64>>,
    descriptions: Vec<String>,
    geo_transform: Option<GeoTransform>,
    projection: Option<String>,
}

impl MemRaster {
    /// A zero filled raster of `size` `(width, height)`.
    pub fn new(
        path: impl Into<PathBuf>,
        size: (usize, usize),
        band_count: usize,
        data_type: DataType,
    ) -> Self {
        MemRaster {
            path: path.into(),
            data_type,
            pixels: Array3::zeros((band_count, size.1, size.0)),
            no_data: vec![None; band_count],
            descriptions: vec![String::new(); band_count],
            geo_transform: None,
            projection: None,
        }
    }

    /// Wrap existing `(band, row, col)` pixels, converting them to `data_type`.
    pub fn from_array(path: impl Into<PathBuf>, pixels: Array3<f64>, data_type: DataType) -> Self {
        let band_count = pixels.len_of(Axis(0));
        let pixels = pixels.mapv(|v| data_type.store(v));
        MemRaster {
            path: path.into(),
            data_type,
            pixels,
            no_data: vec![None; band_count],
            descriptions: vec![String::new(); band_count],
            geo_transform: None,
            projection: None,
        }
    }

    /// Single band convenience constructor from a `(rows, cols)` array.
    pub fn from_band(path: impl Into<PathBuf>, band: Array2<f64>, data_type: DataType) -> Self {
        MemRaster::from_array(path, band.insert_axis(Axis(0)), data_type)
    }

    pub fn with_no_data(mut self, no_data: Option<f64>) -> Self {
        self.no_data.iter_mut().for_each(|v| *v = no_data);
        self
    }

    pub fn band(&self, band: usize) -> ArrayView2<'_, f64> {
        self.pixels.index_axis(Axis(0), band - 1)
    }

    pub fn band_description(&self, band: usize) -> Option<&str> {
        self.descriptions.get(band.wrapping_sub(1)).map(String::as_str)
    }
}

impl RasterDataset for MemRaster {
    fn path(&self) -> &Path {
        &self.path
    }

    fn raster_size(&self) -> (usize, usize) {
        let (_, rows, cols) = self.pixels.dim();
        (cols, rows)
    }

    fn band_count(&self) -> usize {
        self.pixels.len_of(Axis(0))
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        self.no_data.get(band.wrapping_sub(1)).copied().flatten()
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    fn projection(&self) -> Option<String> {
        self.projection.clone()
    }

    fn read_window(&self, band: usize, window: &RasterWindow) -> Result<Array2<f64>> {
        self.check_access(band, window)?;
        Ok(self
            .pixels
            .slice(s![
                band - 1,
                window.y_offset..window.y_end(),
                window.x_offset..window.x_end()
            ])
            .to_owned())
    }
}

impl RasterDatasetMut for MemRaster {
    fn write_window(
        &mut self,
        band: usize,
        window: &RasterWindow,
        data: ArrayView2<f64>,
    ) -> Result<()> {
        self.check_access(band, window)?;
        check_block_shape(&self.path.to_string_lossy(), window, &data)?;
        let data_type = self.data_type;
        let mut target = self.pixels.slice_mut(s![
            band - 1,
            window.y_offset..window.y_end(),
            window.x_offset..window.x_end()
        ]);
        target.zip_mut_with(&data, |t, &v| *t = data_type.store(v));
        Ok(())
    }

    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        self.check_access(band, &RasterWindow::default())?;
        self.no_data[band - 1] = no_data;
        Ok(())
    }

    fn set_band_description(&mut self, band: usize, description: &str) -> Result<()> {
        self.check_access(band, &RasterWindow::default())?;
        self.descriptions[band - 1] = description.to_string();
        Ok(())
    }

    fn set_geo_transform(&mut self, transform: &GeoTransform) -> Result<()> {
        self.geo_transform = Some(*transform);
        Ok(())
    }

    fn set_projection(&mut self, projection: &str) -> Result<()> {
        self.projection = Some(projection.to_string());
        Ok(())
    }

    fn compute_statistics(&mut self, band: usize) -> Result<Option<BandStatistics>> {
        self.check_access(band, &RasterWindow::default())?;
        Ok(BandStatistics::from_values(
            self.band(band).iter(),
            self.no_data[band - 1],
        ))
    }

    fn build_overviews(&mut self, _levels: &[usize]) -> Result<bool> {
        Ok(false)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn write_then_read_window() {
        let mut raster = MemRaster::new("mem", (4, 3), 2, DataType::Int16);
        let window = RasterWindow::new(1, 1, 2, 2);
        raster
            .write_window(2, &window, array![[1.4, -2.6], [3.0, 4.0]].view())
            .unwrap();
        let back = raster.read_window(2, &window).unwrap();
        assert_eq!(back, array![[1.0, -3.0], [3.0, 4.0]]);
        assert_eq!(raster.read_window(1, &window).unwrap(), Array2::<f64>::zeros((2, 2)));
    }

    #[test]
    fn rejects_bad_band_and_shape() {
        let mut raster = MemRaster::new("mem", (4, 3), 1, DataType::Float32);
        let window = RasterWindow::new(0, 0, 2, 2);
        assert!(raster.read_window(2, &window).is_err());
        assert!(raster.read_window(0, &window).is_err());
        assert!(raster
            .write_window(1, &window, Array2::zeros((3, 2)).view())
            .is_err());
        assert!(raster
            .read_window(1, &RasterWindow::new(3, 0, 2, 2))
            .is_err());
    }

    #[test]
    fn statistics_respect_no_data() {
        let mut raster =
            MemRaster::from_band("mem", array![[0.0, 2.0], [4.0, 0.0]], DataType::UInt8);
        raster.set_no_data_value(1, Some(0.0)).unwrap();
        raster.set_band_description(1, "counts").unwrap();
        assert_eq!(raster.band_description(1), Some("counts"));
        let stats = raster.compute_statistics(1).unwrap().unwrap();
        assert_eq!(stats.valid_count, 2);
        assert_eq!(stats.mean, 3.0);
    }
}
