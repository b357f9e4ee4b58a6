//! Block streaming, tiled clumping and robust time-series screening for
//! remote sensing rasters.
//!
//! Large rasters are processed through fixed-size windows: the
//! [`blocks`] module binds named input rasters, streams their pixels block by
//! block and writes results back out lazily. [`clump`] labels connected
//! regions tile by tile and merges labels across tile borders, and
//! [`timeseries`] flags per-pixel outliers against a robust harmonic fit.
//!
//! ## Use
//!
//! ```
//! use ndarray::array;
//! use rsgis::clump::TiledClumper;
//! use rsgis::config::ProcessingConfig;
//!
//! let config = ProcessingConfig::default().with_tile_size(2, 2).with_workers(2);
//! let clumper = TiledClumper::new(config).unwrap();
//! let input = array![
//!     [1.0, 1.0, 0.0, 0.0],
//!     [0.0, 1.0, 1.0, 0.0],
//!     [0.0, 0.0, 0.0, 0.0],
//!     [3.0, 0.0, 0.0, 2.0],
//! ];
//! let (labels, count) = clumper.clump_array(input.view()).unwrap();
//! assert_eq!(count, 3);
//! assert_eq!(labels[[0, 0]], labels[[1, 2]]);
//! ```
//!
//! ## Raster backends
//!
//! Without features, rasters are read and written as TIFF through the `tiff`
//! crate, or kept in memory with the `MEM` format. The `gdal` feature routes
//! every format through GDAL.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod blocks;
pub mod clump;
pub mod config;
pub mod errors;
pub mod progress;
pub mod raster;
pub mod timeseries;

#[doc(hidden)]
pub mod test_utils;

pub use errors::{Result, RsgisError};
