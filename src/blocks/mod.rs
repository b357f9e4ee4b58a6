//! Block streaming
//!
//! Named input rasters are bound with a [`BandSourceBinder`], read window by
//! window through a [`BlockIterator`] (or [`BatchIterator`]) and results are
//! written back through an [`OutputImageWriter`]. [`process_blocks`] wires
//! the three together around a per-block callback:
//!
//! ```
//! # use ndarray::Array2;
//! # use rsgis::raster::DataType;
//! # use rsgis::test_utils::{write_test_band, TempFixture};
//! use rsgis::blocks::{process_blocks, BandSourceBinder, BlockData, ImageBandSource, OutputImageSpec};
//! use rsgis::config::ProcessingConfig;
//!
//! # let fixture = TempFixture::empty("input.tif");
//! # write_test_band(fixture.path(), &Array2::ones((20, 30)), DataType::UInt8, None).unwrap();
//! let mut binder = BandSourceBinder::new();
//! binder.add_image(ImageBandSource::new("image", fixture.path(), vec![1]))?;
//!
//! let output = OutputImageSpec::new("doubled", fixture.sibling("doubled.tif"), 1);
//! let config = ProcessingConfig::default().with_tile_size(16, 16);
//! process_blocks(&binder, vec![output], &config, |step| {
//!     let mut out = BlockData::new();
//!     out.insert("doubled", &step.data["image"] * 2.0);
//!     Ok(out)
//! })?;
//! # Ok::<(), rsgis::RsgisError>(())
//! ```

mod binder;
mod iterator;
mod writer;

pub use binder::{BandSourceBinder, ImageBandSource};
pub use iterator::{BatchData, BatchIterator, BatchStep, BlockData, BlockIterator, BlockStep};
pub use writer::{FinalisedOutput, FinaliseOptions, OutputImageSpec, OutputImageWriter};

use log::info;

use crate::config::ProcessingConfig;
use crate::errors::Result;

/// Stream every window of `binder` through `callback` and write what it
/// returns to `outputs`, matched by name.
///
/// Windows come in row-major order at the tile size of `config`. Outputs
/// are finalised with statistics once every window is done.
pub fn process_blocks<F>(
    binder: &BandSourceBinder,
    outputs: Vec<OutputImageSpec>,
    config: &ProcessingConfig,
    mut callback: F,
) -> Result<Vec<FinalisedOutput>>
where
    F: FnMut(&BlockStep) -> Result<BlockData>,
{
    config.validate()?;
    let mut writer = OutputImageWriter::for_binder(binder, outputs)?;
    let blocks = BlockIterator::new(binder, config.tile_width, config.tile_height)?;
    let total = blocks.planner().len();

    config.progress.start("Processing blocks", total);
    for step in blocks {
        let step = step?;
        let result = callback(&step)?;
        writer.write_block(&step.window, &result)?;
        config.progress.advance(1);
    }
    config.progress.finish();

    info!("Processed {} block(s)", total);
    writer.finalize(FinaliseOptions::STATISTICS)
}

/// Like [`process_blocks`], delivering up to `config.batch_size` windows of
/// equal shape per call.
pub fn process_batches<F>(
    binder: &BandSourceBinder,
    outputs: Vec<OutputImageSpec>,
    config: &ProcessingConfig,
    mut callback: F,
) -> Result<Vec<FinalisedOutput>>
where
    F: FnMut(&BatchStep) -> Result<BatchData>,
{
    config.validate()?;
    let mut writer = OutputImageWriter::for_binder(binder, outputs)?;
    let batches = BatchIterator::new(
        binder,
        config.tile_width,
        config.tile_height,
        config.batch_size,
    )?;
    let total = batches.planner().len();

    config.progress.start("Processing batches", total);
    for step in batches {
        let step = step?;
        let result = callback(&step)?;
        writer.write_batch(&step.windows, &result)?;
        config.progress.advance(step.windows.len());
    }
    config.progress.finish();

    info!("Processed {} block(s) in batches of up to {}", total, config.batch_size);
    writer.finalize(FinaliseOptions::STATISTICS)
}
