use std::path::PathBuf;

use chrono::NaiveDate;
use log::{debug, info};
use ndarray::{Array2, Array3};
use rayon::prelude::*;

use super::screen::{OutlierScreen, ScreenStats, TmaskScreen};
use super::series::{ordinal_day, PixelTimeSeries};
use crate::blocks::{
    BandSourceBinder, BlockData, BlockIterator, FinaliseOptions, ImageBandSource,
    OutputImageSpec, OutputImageWriter,
};
use crate::config::ProcessingConfig;
use crate::errors::{Result, RsgisError};
use crate::raster::{DataType, Driver};

/// One raster of an image time series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedImage {
    pub date: NaiveDate,
    pub path: PathBuf,
}

impl DatedImage {
    pub fn new(date: NaiveDate, path: impl Into<PathBuf>) -> Self {
        DatedImage {
            date,
            path: path.into(),
        }
    }
}

fn input_name(index: usize) -> String {
    format!("t{index}")
}

fn bind_series(
    images: &[DatedImage],
    bands: &[usize],
    outputs: &[PathBuf],
) -> Result<BandSourceBinder> {
    if images.is_empty() {
        return Err(RsgisError::InvalidParameter {
            name: "images",
            value: "0".to_string(),
            reason: "at least one dated image is required".to_string(),
        });
    }
    if outputs.len() != images.len() {
        return Err(RsgisError::InvalidParameter {
            name: "outputs",
            value: outputs.len().to_string(),
            reason: format!("expected one output per image ({})", images.len()),
        });
    }
    let mut binder = BandSourceBinder::new();
    for (index, image) in images.iter().enumerate() {
        binder.add_image(ImageBandSource::new(input_name(index), &image.path, bands.to_vec()))?;
    }
    binder.validate()?;
    let expected = binder.bands(&input_name(0))?.len();
    for (index, image) in images.iter().enumerate().skip(1) {
        let found = binder.bands(&input_name(index))?.len();
        if found != expected {
            return Err(RsgisError::InvalidParameter {
                name: "bands",
                value: image.path.display().to_string(),
                reason: format!("expected {expected} band(s) like the first image, found {found}"),
            });
        }
    }
    Ok(binder)
}

/// No-data value of the first bound band.
fn series_no_data(binder: &BandSourceBinder) -> Result<Option<f64>> {
    let name = input_name(0);
    let band = binder.bands(&name)?.first().copied().unwrap_or(1);
    Ok(binder.dataset(&name)?.no_data_value(band))
}

/// Pixel series of `(row, col)` across every date of a block.
fn pixel_series(
    block: &BlockData,
    dates: &[i64],
    band_count: usize,
    no_data: Option<f64>,
    (row, col): (usize, usize),
) -> Result<PixelTimeSeries> {
    let mut values = Array2::zeros((dates.len(), band_count));
    for (t, mut observation) in values.outer_iter_mut().enumerate() {
        let image = &block[input_name(t).as_str()];
        for band in 0..band_count {
            observation[band] = image[[band, row, col]];
        }
    }
    PixelTimeSeries::new(dates.to_vec(), values, no_data)
}

/// Run `classify` over every pixel of every block and write one UInt8 raster
/// of `out_bands` bands per date.
#[allow(clippy::too_many_arguments)]
fn run_series<F>(
    label: &str,
    images: &[DatedImage],
    binder: &BandSourceBinder,
    outputs: &[PathBuf],
    format: &str,
    out_bands: usize,
    config: &ProcessingConfig,
    classify: F,
) -> Result<ScreenStats>
where
    F: Fn(&PixelTimeSeries, &mut ScreenStats) -> Result<Array2<u8>> + Sync,
{
    config.validate()?;
    let dates: Vec<i64> = images.iter().map(|image| ordinal_day(image.date)).collect();
    let band_count = binder.bands(&input_name(0))?.len();
    let no_data = series_no_data(binder)?;

    let specs = outputs
        .iter()
        .enumerate()
        .map(|(t, path)| {
            OutputImageSpec::new(format!("flags{t}"), path, out_bands)
                .with_format(format)
                .with_data_type(DataType::UInt8)
        })
        .collect();
    let mut writer = OutputImageWriter::for_binder(binder, specs)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count)
        .build()?;

    let blocks = BlockIterator::new(binder, config.tile_width, config.tile_height)?;
    let mut stats = ScreenStats::default();
    config.progress.start(label, blocks.planner().len());
    for step in blocks {
        let step = step?;
        let (rows, cols) = step.window.shape();
        let pixels: Vec<(Array2<u8>, ScreenStats)> = pool.install(|| {
            (0..rows * cols)
                .into_par_iter()
                .map(|index| {
                    let position = (index / cols, index % cols);
                    let series = pixel_series(&step.data, &dates, band_count, no_data, position)?;
                    let mut pixel_stats = ScreenStats::default();
                    let flags = classify(&series, &mut pixel_stats)?;
                    Ok((flags, pixel_stats))
                })
                .collect::<Result<_>>()
        })?;

        let mut out: Vec<Array3<f64>> = vec![Array3::zeros((out_bands, rows, cols)); dates.len()];
        for (index, (flags, pixel_stats)) in pixels.into_iter().enumerate() {
            stats += pixel_stats;
            let (row, col) = (index / cols, index % cols);
            for ((t, band), &flag) in flags.indexed_iter() {
                out[t][[band, row, col]] = f64::from(flag);
            }
        }
        let result: BlockData = out
            .into_iter()
            .enumerate()
            .map(|(t, array)| (format!("flags{t}"), array))
            .collect();
        writer.write_block(&step.window, &result)?;
        debug!("Screened block at ({}, {})", step.x_offset(), step.y_offset());
        config.progress.advance(1);
    }
    config.progress.finish();
    writer.finalize(FinaliseOptions::empty())?;

    info!(
        "{}: {} fit(s), {} with too few observations, {} singular",
        label, stats.fits, stats.insufficient, stats.singular
    );
    Ok(stats)
}

/// Screen a dated image series for seasonal outliers.
///
/// `bands` selects the screened bands of every image (empty for all) and
/// `outputs` receives one [`OutlierFlag`](super::OutlierFlag) raster per
/// image, in the same order, written in `format`. Missing observations
/// follow the no-data value of the first image.
pub fn screen_image_series(
    images: &[DatedImage],
    bands: &[usize],
    outputs: &[PathBuf],
    format: &str,
    screen: &OutlierScreen,
    config: &ProcessingConfig,
) -> Result<ScreenStats> {
    Driver::for_file_output(format)?;
    let binder = bind_series(images, bands, outputs)?;
    let out_bands = binder.bands(&input_name(0))?.len();
    run_series(
        "Screening outliers",
        images,
        &binder,
        outputs,
        format,
        out_bands,
        config,
        |series, stats| {
            let (flags, pixel_stats) = screen.screen(series);
            *stats += pixel_stats;
            Ok(flags)
        },
    )
}

/// Cloud and shadow screen of a dated image series; one single band
/// [`TmaskClass`](super::TmaskClass) raster per image, written in `format`.
pub fn tmask_image_series(
    images: &[DatedImage],
    outputs: &[PathBuf],
    format: &str,
    screen: &TmaskScreen,
    config: &ProcessingConfig,
) -> Result<ScreenStats> {
    Driver::for_file_output(format)?;
    let binder = bind_series(images, &[], outputs)?;
    screen.check(binder.bands(&input_name(0))?.len())?;
    run_series(
        "Screening clouds",
        images,
        &binder,
        outputs,
        format,
        1,
        config,
        |series, stats| {
            let classes = screen.tmask(series, stats)?;
            Ok(Array2::from_shape_fn((classes.len(), 1), |(t, _)| classes[t].value()))
        },
    )
}
