use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info};
use ndarray::{s, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use tempfile::TempDir;

use crate::clump::{
    ClumpCriterion, ClumpRelabel, ConnectedComponentLabeler, Connectivity, TileEdges,
    TwoPassLabeler,
};
use crate::config::ProcessingConfig;
use crate::errors::{Result, RsgisError};
use crate::raster::native::{read_tiff_bands, write_tiff_band};
use crate::raster::{
    open_raster, DataType, Driver, GeoTransform, RasterDataset, RasterDatasetMut, RasterWindow,
    WindowPlanner,
};

/// Outcome of a tiled clump run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClumpSummary {
    /// Number of clumps in the output, labelled `1..=clump_count`.
    pub clump_count: u32,
    pub tile_count: usize,
}

/// Georeferencing copied from the input onto the clump raster.
struct Georef {
    geo_transform: Option<GeoTransform>,
    projection: Option<String>,
}

impl Georef {
    fn of(dataset: &dyn RasterDataset) -> Self {
        Georef {
            geo_transform: dataset.geo_transform(),
            projection: dataset.projection(),
        }
    }
}

/// Clumps rasters tile by tile and merges labels across tile borders.
///
/// Tiles are labelled on a pool of [`ProcessingConfig::worker_count`]
/// threads. For file based runs each worker writes its local labels to a
/// temporary TIFF, which the merge step reads back once every tile has
/// finished; the temporary directory is removed whether the run succeeds or
/// not.
///
/// Memory use follows the tile size: tiles are read through windows, each
/// worker holds one tile, and only the per-tile border strips stay resident
/// for the merge. The native TIFF output stages its pixels in a scratch file
/// beside the output until the final flush.
#[derive(Debug, Clone)]
pub struct TiledClumper {
    config: ProcessingConfig,
    criterion: ClumpCriterion,
}

impl TiledClumper {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;
        Ok(TiledClumper {
            config,
            criterion: ClumpCriterion::Foreground,
        })
    }

    pub fn with_criterion(mut self, criterion: ClumpCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    fn labeler(&self) -> TwoPassLabeler {
        TwoPassLabeler::new(self.criterion, self.config.background)
    }

    fn pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count)
            .build()?)
    }

    fn planner(&self, size: (usize, usize)) -> Result<WindowPlanner> {
        WindowPlanner::new(size.0, size.1, self.config.tile_width, self.config.tile_height)
    }

    /// Clump an in-memory `(rows, cols)` array with the same tiling and merge
    /// as [`clump_raster`](Self::clump_raster).
    ///
    /// Returns the label array and the clump count.
    pub fn clump_array(&self, data: ArrayView2<f64>) -> Result<(Array2<u32>, u32)> {
        let (rows, cols) = data.dim();
        let planner = self.planner((cols, rows))?;
        let labeler = self.labeler();
        let connectivity = self.config.connectivity;
        let progress = &self.config.progress;

        progress.start("Clumping tiles", planner.len());
        let tiles: Vec<(Array2<u32>, u32, TileEdges)> = self.pool()?.install(|| {
            (0..planner.len())
                .into_par_iter()
                .map(|index| {
                    let window = planner.window(index);
                    let values = data.slice(s![
                        window.y_offset..window.y_end(),
                        window.x_offset..window.x_end()
                    ]);
                    let tile = label_tile(&labeler, connectivity, values);
                    progress.advance(1);
                    tile
                })
                .collect()
        });
        progress.finish();

        let summaries: Vec<(u32, TileEdges)> = tiles
            .iter()
            .map(|(_, count, edges)| (*count, edges.clone()))
            .collect();
        let relabel = ClumpRelabel::build(&planner, &summaries, connectivity, self.criterion)?;

        let mut output = Array2::<u32>::zeros((rows, cols));
        for (index, (mut labels, _, _)) in tiles.into_iter().enumerate() {
            let window = planner.window(index);
            relabel.apply(index, &mut labels);
            output
                .slice_mut(s![
                    window.y_offset..window.y_end(),
                    window.x_offset..window.x_end()
                ])
                .assign(&labels);
        }
        Ok((output, relabel.count()))
    }

    /// Clump `band` of the raster at `input` into a new UInt32 raster at
    /// `output` in `format`, no-data 0.
    pub fn clump_raster(
        &self,
        input: &Path,
        band: usize,
        output: &Path,
        format: &str,
    ) -> Result<ClumpSummary> {
        let driver = Driver::for_file_output(format)?;
        let dataset = open_raster(input)?;
        dataset.check_access(band, &RasterWindow::default())?;
        let size = dataset.raster_size();
        let georef = Georef::of(&*dataset);
        info!(
            "Clumping band {} of '{}' ({}x{}), {} connectivity",
            band,
            input.display(),
            size.0,
            size.1,
            self.config.connectivity
        );

        let dataset = Mutex::new(dataset);
        let read_tile = |window: &RasterWindow| -> Result<Array2<f64>> {
            lock(&dataset)?.read_window(band, window)
        };
        self.run_tiled(
            size,
            read_tile,
            &self.labeler(),
            self.criterion,
            &georef,
            output,
            &driver,
        )
    }

    /// Clump the union of two clump (or mask) rasters: a pixel is
    /// foreground when it is foreground in either input.
    ///
    /// Band 1 of both inputs is used and their sizes must match.
    pub fn clump_union(
        &self,
        input_a: &Path,
        input_b: &Path,
        output: &Path,
        format: &str,
    ) -> Result<ClumpSummary> {
        let driver = Driver::for_file_output(format)?;
        let dataset_a = open_raster(input_a)?;
        let dataset_b = open_raster(input_b)?;
        let size = dataset_a.raster_size();
        if dataset_b.raster_size() != size {
            return Err(RsgisError::DimensionMismatch {
                name: input_b.display().to_string(),
                expected: size,
                found: dataset_b.raster_size(),
            });
        }
        let georef = Georef::of(&*dataset_a);
        info!(
            "Clumping union of '{}' and '{}' ({}x{})",
            input_a.display(),
            input_b.display(),
            size.0,
            size.1
        );

        let background = self.config.background;
        let criterion = ClumpCriterion::Foreground;
        let datasets = Mutex::new((dataset_a, dataset_b));
        let read_tile = |window: &RasterWindow| -> Result<Array2<f64>> {
            let (a, b) = {
                let guard = lock(&datasets)?;
                (guard.0.read_window(1, window)?, guard.1.read_window(1, window)?)
            };
            Ok(ndarray::Zip::from(&a).and(&b).map_collect(|&a, &b| {
                let foreground = criterion.is_foreground(a, background)
                    || criterion.is_foreground(b, background);
                if foreground {
                    1.0
                } else {
                    0.0
                }
            }))
        };
        self.run_tiled(
            size,
            read_tile,
            &TwoPassLabeler::new(criterion, 0.0),
            criterion,
            &georef,
            output,
            &driver,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run_tiled<F>(
        &self,
        size: (usize, usize),
        read_tile: F,
        labeler: &TwoPassLabeler,
        criterion: ClumpCriterion,
        georef: &Georef,
        output: &Path,
        driver: &Driver,
    ) -> Result<ClumpSummary>
    where
        F: Fn(&RasterWindow) -> Result<Array2<f64>> + Sync,
    {
        let planner = self.planner(size)?;
        let connectivity = self.config.connectivity;
        let progress = &self.config.progress;
        let temp_dir = self.temp_dir()?;
        debug!(
            "Tile hand-off directory '{}', {} tile(s) on {} worker(s)",
            temp_dir.path().display(),
            planner.len(),
            self.config.worker_count
        );

        progress.start("Clumping tiles", planner.len());
        let tiles: Vec<(u32, TileEdges)> = self.pool()?.install(|| {
            (0..planner.len())
                .into_par_iter()
                .map(|index| {
                    let window = planner.window(index);
                    let values = read_tile(&window)?;
                    let (labels, count, edges) = label_tile(labeler, connectivity, values.view());
                    write_tiff_band(
                        tile_path(temp_dir.path(), index),
                        labels.mapv(f64::from).view(),
                        DataType::UInt32,
                        Some(0.0),
                    )?;
                    debug!("Tile {} at {:?}: {} clump(s)", index, window, count);
                    progress.advance(1);
                    Ok((count, edges))
                })
                .collect::<Result<Vec<_>>>()
        })?;
        progress.finish();

        let relabel = ClumpRelabel::build(&planner, &tiles, connectivity, criterion)?;

        let mut dataset = driver.create(output, size, 1, DataType::UInt32)?;
        dataset.set_no_data_value(1, Some(0.0))?;
        dataset.set_band_description(1, "clumps")?;
        if let Some(gt) = &georef.geo_transform {
            dataset.set_geo_transform(gt)?;
        }
        if let Some(projection) = &georef.projection {
            dataset.set_projection(projection)?;
        }
        write_merged(&mut *dataset, &planner, &relabel, temp_dir.path())?;
        dataset.flush()?;

        let temp_path = temp_dir.path().to_path_buf();
        temp_dir
            .close()
            .map_err(|e| RsgisError::io(temp_path, e))?;

        info!(
            "Wrote {} clump(s) from {} tile(s) to '{}'",
            relabel.count(),
            planner.len(),
            output.display()
        );
        Ok(ClumpSummary {
            clump_count: relabel.count(),
            tile_count: planner.len(),
        })
    }

    fn temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rsgis_clump_");
        match &self.config.temp_dir {
            Some(parent) => builder
                .tempdir_in(parent)
                .map_err(|e| RsgisError::io(parent, e)),
            None => builder
                .tempdir()
                .map_err(|e| RsgisError::io(std::env::temp_dir(), e)),
        }
    }
}

/// Read every tile's local labels back from `dir` and write them, relabelled,
/// into band 1 of `dataset`. A missing tile file is fatal.
fn write_merged(
    dataset: &mut dyn RasterDatasetMut,
    planner: &WindowPlanner,
    relabel: &ClumpRelabel,
    dir: &Path,
) -> Result<()> {
    for (index, window) in planner.windows().enumerate() {
        let path = tile_path(dir, index);
        if !path.exists() {
            return Err(RsgisError::MissingTileOutput(path));
        }
        let local = read_tiff_bands(&path)?;
        let global = local
            .index_axis(Axis(0), 0)
            .mapv(|l| f64::from(relabel.global(index, l as u32)));
        dataset.write_window(1, &window, global.view())?;
    }
    Ok(())
}

fn label_tile(
    labeler: &TwoPassLabeler,
    connectivity: Connectivity,
    values: ArrayView2<f64>,
) -> (Array2<u32>, u32, TileEdges) {
    let (labels, count) = labeler.label(values, connectivity);
    let edges = TileEdges::from_tile(labels.view(), values);
    (labels, count, edges)
}

/// Deterministic, per-tile path of a worker's local labels.
fn tile_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("tile_{index:06}.tif"))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RsgisError::WorkerPool("a tile worker panicked while reading".to_string()))
}
