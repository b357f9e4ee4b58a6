//! Raster access
//!
//! Windows, pixel types and the dataset traits the block and tile
//! machinery read and write through. Backends: in-memory (`MEM`), native
//! TIFF (`GTiff` without GDAL) and GDAL behind the `gdal` feature.

mod dataset;
mod driver;
#[cfg(feature = "gdal")]
pub mod gdal;
pub mod mem;
pub mod native;
mod types;
mod window;

pub use dataset::{BandStatistics, GeoTransform, RasterDataset, RasterDatasetMut};
pub use driver::{open_raster, Driver};
pub use mem::MemRaster;
pub use native::TiffRaster;
pub use types::DataType;
pub use window::{RasterWindow, WindowPlanner, Windows};

#[cfg(test)]
mod tests;
