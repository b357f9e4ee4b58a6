use std::path::Path;

use crate::errors::{Result, RsgisError};
use crate::raster::mem::MemRaster;
use crate::raster::native::TiffRaster;
use crate::raster::{DataType, RasterDataset, RasterDatasetMut};

#[cfg(feature = "gdal")]
use crate::raster::gdal::{driver_exists, GdalRaster};

/// Backend that creates rasters for a caller supplied format name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    /// In-memory raster, nothing is written to disk.
    Mem,
    /// TIFF written by the `tiff` crate.
    NativeTiff,
    /// Any GDAL driver, by short name.
    #[cfg(feature = "gdal")]
    Gdal(String),
}

impl Driver {
    /// Resolve a format name such as `GTiff`, `KEA` or `MEM`.
    ///
    /// Unknown formats are a configuration error, raised before any raster
    /// is created.
    pub fn by_name(format: &str) -> Result<Driver> {
        if format.eq_ignore_ascii_case("MEM") {
            return Ok(Driver::Mem);
        }
        #[cfg(feature = "gdal")]
        {
            if driver_exists(format) {
                return Ok(Driver::Gdal(format.to_string()));
            }
        }
        if format.eq_ignore_ascii_case("GTiff") {
            return Ok(Driver::NativeTiff);
        }
        Err(RsgisError::UnsupportedFormat(format.to_string()))
    }

    /// Resolve `format` for an output whose only product is the file at its
    /// path. `MEM` is refused, since nothing would reach the path.
    pub fn for_file_output(format: &str) -> Result<Driver> {
        match Driver::by_name(format)? {
            Driver::Mem => Err(RsgisError::UnsupportedFormat(format!(
                "{format} (in-memory rasters cannot be written to a path)"
            ))),
            driver => Ok(driver),
        }
    }

    pub fn short_name(&self) -> &str {
        match self {
            Driver::Mem => "MEM",
            Driver::NativeTiff => "GTiff",
            #[cfg(feature = "gdal")]
            Driver::Gdal(name) => name,
        }
    }

    /// Create a new raster of `size` `(width, height)`.
    pub fn create(
        &self,
        path: &Path,
        size: (usize, usize),
        band_count: usize,
        data_type: DataType,
    ) -> Result<Box<dyn RasterDatasetMut>> {
        let dataset: Box<dyn RasterDatasetMut> = match self {
            Driver::Mem => Box::new(MemRaster::new(path, size, band_count, data_type)),
            Driver::NativeTiff => Box::new(TiffRaster::create(path, size, band_count, data_type)?),
            #[cfg(feature = "gdal")]
            Driver::Gdal(name) => {
                Box::new(GdalRaster::create(name, path, size, band_count, data_type)?)
            }
        };
        Ok(dataset)
    }
}

/// Open an existing raster for reading.
///
/// With the `gdal` feature any GDAL readable file is accepted; otherwise
/// only TIFF files are.
pub fn open_raster(path: impl AsRef<Path>) -> Result<Box<dyn RasterDataset>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RsgisError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such raster"),
        ));
    }
    #[cfg(feature = "gdal")]
    {
        Ok(Box::new(GdalRaster::open(path)?))
    }
    #[cfg(not(feature = "gdal"))]
    {
        let is_tiff = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
        if !is_tiff {
            return Err(RsgisError::UnsupportedFormat(path.display().to_string()));
        }
        Ok(Box::new(TiffRaster::open(path)?))
    }
}
