use std::path::PathBuf;

use log::debug;
use ndarray::{Array3, Axis};

use crate::blocks::BlockData;
use crate::errors::{Result, RsgisError};
use crate::raster::{open_raster, RasterDataset, RasterWindow};

/// A raster bound under a logical name, with the bands to read from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBandSource {
    pub name: String,
    pub path: PathBuf,
    /// 1-based band indices, in delivery order. Empty means every band.
    pub bands: Vec<usize>,
}

impl ImageBandSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, bands: Vec<usize>) -> Self {
        ImageBandSource {
            name: name.into(),
            path: path.into(),
            bands,
        }
    }

    /// Bind every band of the raster.
    pub fn all_bands(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        ImageBandSource::new(name, path, Vec::new())
    }
}

struct BoundSource {
    name: String,
    dataset: Box<dyn RasterDataset>,
    bands: Vec<usize>,
}

/// Named input rasters read together, window by window.
///
/// Sources are checked as they are added (unique names, valid band
/// indices); [`validate`](Self::validate) checks that they share one pixel
/// grid and runs before any block is read.
#[derive(Default)]
pub struct BandSourceBinder {
    sources: Vec<BoundSource>,
}

impl BandSourceBinder {
    pub fn new() -> Self {
        BandSourceBinder::default()
    }

    /// Open the raster of `source` and bind it.
    pub fn add_image(&mut self, source: ImageBandSource) -> Result<&mut Self> {
        self.check_name(&source.name)?;
        let dataset = open_raster(&source.path)?;
        self.add_dataset(source.name, dataset, source.bands)
    }

    /// Bind an already opened dataset. An empty `bands` binds every band.
    pub fn add_dataset(
        &mut self,
        name: impl Into<String>,
        dataset: Box<dyn RasterDataset>,
        bands: Vec<usize>,
    ) -> Result<&mut Self> {
        let name = name.into();
        self.check_name(&name)?;
        let bands = if bands.is_empty() {
            (1..=dataset.band_count()).collect()
        } else {
            bands
        };
        if bands.is_empty() {
            return Err(RsgisError::InvalidParameter {
                name: "bands",
                value: dataset.path().display().to_string(),
                reason: "the raster has no bands".to_string(),
            });
        }
        for (i, &band) in bands.iter().enumerate() {
            if band == 0 || band > dataset.band_count() {
                return Err(RsgisError::InvalidBandIndex {
                    path: dataset.path().to_path_buf(),
                    band,
                    count: dataset.band_count(),
                });
            }
            if bands[..i].contains(&band) {
                return Err(RsgisError::InvalidParameter {
                    name: "bands",
                    value: format!("{bands:?}"),
                    reason: format!("band {band} is listed more than once for '{name}'"),
                });
            }
        }
        debug!(
            "Bound '{}' to '{}', bands {:?}",
            name,
            dataset.path().display(),
            bands
        );
        self.sources.push(BoundSource {
            name,
            dataset,
            bands,
        });
        Ok(self)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.sources.iter().any(|s| s.name == name) {
            return Err(RsgisError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Check every source shares the pixel grid of the first one and return
    /// its `(width, height)`.
    pub fn validate(&self) -> Result<(usize, usize)> {
        let first = self.sources.first().ok_or_else(|| RsgisError::InvalidParameter {
            name: "sources",
            value: "0".to_string(),
            reason: "at least one input raster must be bound".to_string(),
        })?;
        let expected = first.dataset.raster_size();
        for source in &self.sources[1..] {
            let found = source.dataset.raster_size();
            if found != expected {
                return Err(RsgisError::DimensionMismatch {
                    name: source.name.clone(),
                    expected,
                    found,
                });
            }
        }
        Ok(expected)
    }

    pub fn raster_size(&self) -> Option<(usize, usize)> {
        self.sources.first().map(|s| s.dataset.raster_size())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }

    /// The dataset bound under `name`.
    pub fn dataset(&self, name: &str) -> Result<&dyn RasterDataset> {
        self.source(name).map(|s| s.dataset.as_ref())
    }

    /// The bands delivered for `name`.
    pub fn bands(&self, name: &str) -> Result<&[usize]> {
        self.source(name).map(|s| s.bands.as_slice())
    }

    /// The first bound dataset, whose georeferencing outputs inherit.
    pub fn reference(&self) -> Option<&dyn RasterDataset> {
        self.sources.first().map(|s| s.dataset.as_ref())
    }

    fn source(&self, name: &str) -> Result<&BoundSource> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| RsgisError::UnknownName(name.to_string()))
    }

    /// Read every bound source over `window` as `(band, row, col)` arrays.
    pub fn read_block(&self, window: &RasterWindow) -> Result<BlockData> {
        let mut data = BlockData::new();
        for source in &self.sources {
            let mut block = Array3::zeros((source.bands.len(), window.height, window.width));
            for (i, &band) in source.bands.iter().enumerate() {
                let values = source.dataset.read_window(band, window)?;
                block.index_axis_mut(Axis(0), i).assign(&values);
            }
            data.insert(source.name.clone(), block);
        }
        Ok(data)
    }
}

impl std::fmt::Debug for BandSourceBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.sources
                    .iter()
                    .map(|s| (&s.name, s.dataset.path(), &s.bands)),
            )
            .finish()
    }
}
