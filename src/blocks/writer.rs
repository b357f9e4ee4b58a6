use std::path::PathBuf;

use bitflags::bitflags;
use log::{debug, info, warn};
use ndarray::{ArrayView3, Axis};

use crate::blocks::{BandSourceBinder, BatchData, BlockData};
use crate::errors::{Result, RsgisError};
use crate::raster::{
    BandStatistics, DataType, Driver, GeoTransform, RasterDataset, RasterDatasetMut,
    RasterWindow,
};

/// Declares an output raster written through an [`OutputImageWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputImageSpec {
    pub name: String,
    pub path: PathBuf,
    pub band_count: usize,
    pub no_data: Option<f64>,
    /// Format name resolved with [`Driver::by_name`].
    pub format: String,
    pub data_type: DataType,
    /// Band descriptions, empty or one per band.
    pub band_names: Vec<String>,
}

impl OutputImageSpec {
    /// A Float32 GTiff output without no-data value.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, band_count: usize) -> Self {
        OutputImageSpec {
            name: name.into(),
            path: path.into(),
            band_count,
            no_data: None,
            format: "GTiff".to_string(),
            data_type: DataType::Float32,
            band_names: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = Some(no_data);
        self
    }

    pub fn with_band_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.band_names = names.into_iter().map(Into::into).collect();
        self
    }
}

bitflags! {
    /// Work done once per output by [`OutputImageWriter::finalize`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FinaliseOptions: u32 {
        /// Compute and store per-band statistics.
        const STATISTICS = 0x1;
        /// Build overviews where the format supports them.
        const PYRAMIDS = 0x2;
    }
}

/// Result of finalizing one output.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalisedOutput {
    pub name: String,
    pub path: PathBuf,
    /// Per band, `None` when statistics were not requested or every pixel
    /// is no-data.
    pub statistics: Vec<Option<BandStatistics>>,
    pub overviews: bool,
}

enum OutputState {
    Pending,
    Open(Box<dyn RasterDatasetMut>),
    Finalised,
}

struct OutputSlot {
    spec: OutputImageSpec,
    driver: Driver,
    state: OutputState,
}

/// Writes blocks to output rasters, creating each raster on its first block.
///
/// Rasters are created at the full raster extent given on construction, so
/// blocks can arrive in any order and land at their own window offsets.
pub struct OutputImageWriter {
    raster_size: (usize, usize),
    geo_transform: Option<GeoTransform>,
    projection: Option<String>,
    outputs: Vec<OutputSlot>,
}

impl OutputImageWriter {
    /// Resolve the format of every spec up front; an unknown format or an
    /// inconsistent spec fails here, before anything is written.
    pub fn new(raster_size: (usize, usize), specs: Vec<OutputImageSpec>) -> Result<Self> {
        let mut outputs: Vec<OutputSlot> = Vec::with_capacity(specs.len());
        for spec in specs {
            if outputs.iter().any(|o| o.spec.name == spec.name) {
                return Err(RsgisError::DuplicateName(spec.name));
            }
            if spec.band_count == 0 {
                return Err(RsgisError::InvalidParameter {
                    name: "band_count",
                    value: "0".to_string(),
                    reason: format!("output '{}' needs at least one band", spec.name),
                });
            }
            if !spec.band_names.is_empty() && spec.band_names.len() != spec.band_count {
                return Err(RsgisError::InvalidParameter {
                    name: "band_names",
                    value: format!("{:?}", spec.band_names),
                    reason: format!(
                        "output '{}' declares {} band(s)",
                        spec.name, spec.band_count
                    ),
                });
            }
            let driver = Driver::by_name(&spec.format)?;
            outputs.push(OutputSlot {
                spec,
                driver,
                state: OutputState::Pending,
            });
        }
        Ok(OutputImageWriter {
            raster_size,
            geo_transform: None,
            projection: None,
            outputs,
        })
    }

    /// A writer sized to the grid of `binder`, inheriting the georeferencing
    /// of its first source.
    pub fn for_binder(binder: &BandSourceBinder, specs: Vec<OutputImageSpec>) -> Result<Self> {
        let size = binder.validate()?;
        let mut writer = OutputImageWriter::new(size, specs)?;
        if let Some(reference) = binder.reference() {
            writer.copy_georeference(reference);
        }
        Ok(writer)
    }

    /// Copy the geo-transform and projection of `reference` onto every
    /// output created from now on.
    pub fn copy_georeference(&mut self, reference: &dyn RasterDataset) {
        self.geo_transform = reference.geo_transform();
        self.projection = reference.projection().filter(|p| !p.is_empty());
    }

    pub fn raster_size(&self) -> (usize, usize) {
        self.raster_size
    }

    /// Write every array in `data` to the output of the same name.
    pub fn write_block(&mut self, window: &RasterWindow, data: &BlockData) -> Result<()> {
        for (name, array) in data.iter() {
            self.write_array(name, window, array.view())?;
        }
        Ok(())
    }

    /// Write a batch; the batch axis of every array indexes `windows`.
    pub fn write_batch(&mut self, windows: &[RasterWindow], data: &BatchData) -> Result<()> {
        for (name, array) in data.iter() {
            let (bands, batch, _, _) = array.dim();
            if batch != windows.len() {
                return Err(RsgisError::InvalidParameter {
                    name: "batch",
                    value: batch.to_string(),
                    reason: format!(
                        "'{name}' holds {batch} block(s) of {bands} band(s) for {} window(s)",
                        windows.len()
                    ),
                });
            }
            for (window, block) in windows.iter().zip(array.axis_iter(Axis(1))) {
                self.write_array(name, window, block)?;
            }
        }
        Ok(())
    }

    fn write_array(&mut self, name: &str, window: &RasterWindow, array: ArrayView3<f64>) -> Result<()> {
        window.check_within(self.raster_size)?;
        let raster_size = self.raster_size;
        let geo_transform = self.geo_transform;
        let projection = self.projection.as_deref();
        let slot = self
            .outputs
            .iter_mut()
            .find(|o| o.spec.name == name)
            .ok_or_else(|| RsgisError::UnknownName(name.to_string()))?;

        let (bands, rows, cols) = array.dim();
        if bands != slot.spec.band_count {
            return Err(RsgisError::BlockShape {
                name: name.to_string(),
                expected: slot.spec.band_count,
                found: bands,
            });
        }
        if (rows, cols) != window.shape() {
            return Err(RsgisError::WindowShape {
                name: name.to_string(),
                expected: window.shape(),
                found: (rows, cols),
            });
        }

        if let OutputState::Finalised = slot.state {
            return Err(RsgisError::AlreadyFinalized(name.to_string()));
        }
        if let OutputState::Pending = slot.state {
            let dataset = create_output(
                &slot.spec,
                &slot.driver,
                raster_size,
                geo_transform.as_ref(),
                projection,
            )?;
            slot.state = OutputState::Open(dataset);
        }
        let OutputState::Open(dataset) = &mut slot.state else {
            return Ok(());
        };
        for (band, values) in array.axis_iter(Axis(0)).enumerate() {
            dataset.write_window(band + 1, window, values)?;
        }
        Ok(())
    }

    /// Finalize every output: optional statistics and overviews, then flush.
    ///
    /// An output that never received a block is an error, as is finalizing
    /// twice.
    pub fn finalize(&mut self, options: FinaliseOptions) -> Result<Vec<FinalisedOutput>> {
        let names: Vec<String> = self.outputs.iter().map(|o| o.spec.name.clone()).collect();
        names
            .iter()
            .map(|name| self.finalize_output(name, options))
            .collect()
    }

    /// Finalize the output called `name`.
    pub fn finalize_output(&mut self, name: &str, options: FinaliseOptions) -> Result<FinalisedOutput> {
        let slot = self
            .outputs
            .iter_mut()
            .find(|o| o.spec.name == name)
            .ok_or_else(|| RsgisError::UnknownName(name.to_string()))?;
        let mut dataset = match std::mem::replace(&mut slot.state, OutputState::Finalised) {
            OutputState::Open(dataset) => dataset,
            OutputState::Pending => {
                slot.state = OutputState::Pending;
                return Err(RsgisError::NothingWritten(name.to_string()));
            }
            OutputState::Finalised => return Err(RsgisError::AlreadyFinalized(name.to_string())),
        };

        let mut statistics = vec![None; slot.spec.band_count];
        if options.contains(FinaliseOptions::STATISTICS) {
            for (band, stats) in statistics.iter_mut().enumerate() {
                *stats = dataset.compute_statistics(band + 1)?;
            }
        }
        let mut overviews = false;
        if options.contains(FinaliseOptions::PYRAMIDS) {
            let levels = overview_levels(self.raster_size);
            overviews = dataset.build_overviews(&levels)?;
            if !overviews && !levels.is_empty() {
                warn!(
                    "Format {} of '{}' does not support overviews",
                    slot.driver.short_name(),
                    slot.spec.path.display()
                );
            }
        }
        dataset.flush()?;
        info!("Finalised output '{}' at '{}'", name, slot.spec.path.display());

        Ok(FinalisedOutput {
            name: name.to_string(),
            path: slot.spec.path.clone(),
            statistics,
            overviews,
        })
    }
}

fn create_output(
    spec: &OutputImageSpec,
    driver: &Driver,
    raster_size: (usize, usize),
    geo_transform: Option<&GeoTransform>,
    projection: Option<&str>,
) -> Result<Box<dyn RasterDatasetMut>> {
    debug!(
        "Creating {} output '{}' at '{}' ({}x{}, {} band(s) of {})",
        driver.short_name(),
        spec.name,
        spec.path.display(),
        raster_size.0,
        raster_size.1,
        spec.band_count,
        spec.data_type
    );
    let mut dataset = driver.create(&spec.path, raster_size, spec.band_count, spec.data_type)?;
    for band in 1..=spec.band_count {
        dataset.set_no_data_value(band, spec.no_data)?;
        if let Some(description) = spec.band_names.get(band - 1) {
            dataset.set_band_description(band, description)?;
        }
    }
    if let Some(gt) = geo_transform {
        dataset.set_geo_transform(gt)?;
    }
    if let Some(projection) = projection {
        dataset.set_projection(projection)?;
    }
    Ok(dataset)
}

/// Power of two overview factors down to roughly 256 pixels on the shorter side.
fn overview_levels(raster_size: (usize, usize)) -> Vec<usize> {
    let shorter = raster_size.0.min(raster_size.1);
    let mut levels = Vec::new();
    let mut factor = 2;
    while shorter / factor >= 256 || (levels.is_empty() && shorter / factor >= 1) {
        levels.push(factor);
        factor *= 2;
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_levels_stop_near_256() {
        assert_eq!(overview_levels((4096, 2048)), vec![2, 4, 8]);
        assert_eq!(overview_levels((300, 300)), vec![2]);
        assert!(overview_levels((1, 1)).is_empty());
    }
}
