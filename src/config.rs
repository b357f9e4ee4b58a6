//! Processing configuration
//!
//! Every component takes its options from an explicit [`ProcessingConfig`]
//! instead of module level state. The builder style setters consume and
//! return the configuration:
//!
//! ```
//! use rsgis::clump::Connectivity;
//! use rsgis::config::ProcessingConfig;
//!
//! let config = ProcessingConfig::default()
//!     .with_tile_size(256, 256)
//!     .with_workers(4)
//!     .with_connectivity(Connectivity::Four);
//! assert!(config.validate().is_ok());
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::clump::Connectivity;
use crate::errors::{Result, RsgisError};
use crate::progress::{NoProgress, ProgressReporter};

pub const DEFAULT_TILE_SIZE: usize = 512;

#[derive(Clone)]
pub struct ProcessingConfig {
    pub tile_width: usize,
    pub tile_height: usize,
    /// Size of the worker pool used for per-tile and per-pixel jobs.
    pub worker_count: usize,
    pub connectivity: Connectivity,
    /// Number of consecutive windows grouped by the batch iterator.
    pub batch_size: usize,
    /// Parent directory for temporary tile files, the system default when `None`.
    pub temp_dir: Option<PathBuf>,
    /// Pixel value treated as background by the clump engine.
    pub background: f64,
    pub progress: Arc<dyn ProgressReporter>,
}

impl ProcessingConfig {
    pub fn with_tile_size(mut self, width: usize, height: usize) -> Self {
        self.tile_width = width;
        self.tile_height = height;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    pub fn with_background(mut self, background: f64) -> Self {
        self.background = background;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Check the options, before any raster is touched.
    pub fn validate(&self) -> Result<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(RsgisError::InvalidTileSize {
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        if self.worker_count == 0 {
            return Err(RsgisError::InvalidParameter {
                name: "worker_count",
                value: self.worker_count.to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(RsgisError::InvalidParameter {
                name: "batch_size",
                value: self.batch_size.to_string(),
                reason: "a batch holds at least one window".to_string(),
            });
        }
        if self.background.is_nan() {
            return Err(RsgisError::InvalidParameter {
                name: "background",
                value: "NaN".to_string(),
                reason: "NaN is always treated as background".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ProcessingConfig {
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            worker_count,
            connectivity: Connectivity::Eight,
            batch_size: 1,
            temp_dir: None,
            background: 0.0,
            progress: Arc::new(NoProgress),
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .field("worker_count", &self.worker_count)
            .field("connectivity", &self.connectivity)
            .field("batch_size", &self.batch_size)
            .field("temp_dir", &self.temp_dir)
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = ProcessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tile_width, DEFAULT_TILE_SIZE);
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn zero_tile_is_rejected() {
        let err = ProcessingConfig::default()
            .with_tile_size(0, 64)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            RsgisError::InvalidTileSize {
                width: 0,
                height: 64
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = ProcessingConfig::default()
            .with_workers(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, RsgisError::InvalidParameter { name: "worker_count", .. }));
    }

    #[test]
    fn nan_background_is_rejected() {
        assert!(ProcessingConfig::default()
            .with_background(f64::NAN)
            .validate()
            .is_err());
    }
}
