//! GDAL backend, enabled by the `gdal` feature
//!
//! A thin safe wrapper over `gdal-sys` that gives true windowed reads and
//! writes, band statistics and overviews for every GDAL raster driver.

use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr::{null, null_mut};
use std::sync::Once;

use gdal_sys::{
    self, CPLErr, GDALAccess, GDALDataType, GDALDatasetH, GDALRWFlag, GDALRasterBandH,
};
use log::{debug, warn};
use ndarray::{Array2, ArrayView2};

use crate::errors::{Result, RsgisError};
use crate::raster::dataset::check_block_shape;
use crate::raster::{
    BandStatistics, DataType, GeoTransform, RasterDataset, RasterDatasetMut, RasterWindow,
};

static REGISTER: Once = Once::new();

fn register_drivers() {
    REGISTER.call_once(|| unsafe { gdal_sys::GDALAllRegister() });
}

fn _string(raw_ptr: *const c_char) -> Option<String> {
    if raw_ptr.is_null() {
        return None;
    }
    let c_str = unsafe { CStr::from_ptr(raw_ptr) };
    Some(c_str.to_string_lossy().into_owned())
}

fn _last_cpl_err(cpl_err_class: CPLErr::Type) -> RsgisError {
    let last_err_no = unsafe { gdal_sys::CPLGetLastErrorNo() };
    let last_err_msg = _string(unsafe { gdal_sys::CPLGetLastErrorMsg() }).unwrap_or_default();
    unsafe { gdal_sys::CPLErrorReset() };
    RsgisError::CplError {
        class: cpl_err_class,
        number: last_err_no,
        msg: last_err_msg,
    }
}

fn _last_null_pointer_err(method_name: &'static str) -> RsgisError {
    let last_err_msg = _string(unsafe { gdal_sys::CPLGetLastErrorMsg() }).unwrap_or_default();
    unsafe { gdal_sys::CPLErrorReset() };
    RsgisError::NullPointer {
        method_name,
        msg: last_err_msg,
    }
}

fn _path_to_c_string(path: &Path) -> Result<CString> {
    Ok(CString::new(path.to_string_lossy().as_ref())?)
}

fn check(rv: CPLErr::Type) -> Result<()> {
    if rv != CPLErr::CE_None {
        return Err(_last_cpl_err(rv));
    }
    Ok(())
}

fn to_gdal_type(data_type: DataType) -> GDALDataType::Type {
    match data_type {
        DataType::UInt8 => GDALDataType::GDT_Byte,
        DataType::UInt16 => GDALDataType::GDT_UInt16,
        DataType::UInt32 => GDALDataType::GDT_UInt32,
        DataType::Int16 => GDALDataType::GDT_Int16,
        DataType::Int32 => GDALDataType::GDT_Int32,
        DataType::Float32 => GDALDataType::GDT_Float32,
        DataType::Float64 => GDALDataType::GDT_Float64,
    }
}

fn from_gdal_type(gdal_type: GDALDataType::Type) -> DataType {
    match gdal_type {
        GDALDataType::GDT_Byte => DataType::UInt8,
        GDALDataType::GDT_UInt16 => DataType::UInt16,
        GDALDataType::GDT_UInt32 => DataType::UInt32,
        GDALDataType::GDT_Int16 => DataType::Int16,
        GDALDataType::GDT_Int32 => DataType::Int32,
        GDALDataType::GDT_Float32 => DataType::Float32,
        _ => DataType::Float64,
    }
}

/// True when GDAL has a driver registered under `name`.
pub fn driver_exists(name: &str) -> bool {
    register_drivers();
    let Ok(c_name) = CString::new(name) else {
        return false;
    };
    !unsafe { gdal_sys::GDALGetDriverByName(c_name.as_ptr()) }.is_null()
}

/// A raster dataset opened or created through GDAL.
pub struct GdalRaster {
    c_dataset: GDALDatasetH,
    path: PathBuf,
}

// A dataset handle is only ever used from the thread that owns the value.
unsafe impl Send for GdalRaster {}

impl GdalRaster {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        register_drivers();
        let path = path.into();
        let c_filename = _path_to_c_string(&path)?;
        let c_dataset =
            unsafe { gdal_sys::GDALOpen(c_filename.as_ptr(), GDALAccess::GA_ReadOnly) };
        if c_dataset.is_null() {
            return Err(_last_null_pointer_err("GDALOpen"));
        }
        Ok(GdalRaster { c_dataset, path })
    }

    pub fn create(
        driver_name: &str,
        path: impl Into<PathBuf>,
        size: (usize, usize),
        band_count: usize,
        data_type: DataType,
    ) -> Result<Self> {
        register_drivers();
        let path = path.into();
        let c_name = CString::new(driver_name)?;
        let c_driver = unsafe { gdal_sys::GDALGetDriverByName(c_name.as_ptr()) };
        if c_driver.is_null() {
            return Err(_last_null_pointer_err("GDALGetDriverByName"));
        }
        let c_filename = _path_to_c_string(&path)?;
        let c_dataset = unsafe {
            gdal_sys::GDALCreate(
                c_driver,
                c_filename.as_ptr(),
                size.0 as c_int,
                size.1 as c_int,
                band_count as c_int,
                to_gdal_type(data_type),
                null_mut::<*mut c_char>() as _,
            )
        };
        if c_dataset.is_null() {
            return Err(_last_null_pointer_err("GDALCreate"));
        }
        debug!(
            "Created {} dataset '{}' ({}x{}, {} band(s) of {})",
            driver_name,
            path.display(),
            size.0,
            size.1,
            band_count,
            data_type
        );
        Ok(GdalRaster { c_dataset, path })
    }

    fn rasterband(&self, band: usize) -> Result<GDALRasterBandH> {
        let c_band = unsafe { gdal_sys::GDALGetRasterBand(self.c_dataset, band as c_int) };
        if c_band.is_null() {
            return Err(_last_null_pointer_err("GDALGetRasterBand"));
        }
        Ok(c_band)
    }
}

impl Drop for GdalRaster {
    fn drop(&mut self) {
        let _ = unsafe { gdal_sys::GDALClose(self.c_dataset) };
    }
}

impl RasterDataset for GdalRaster {
    fn path(&self) -> &Path {
        &self.path
    }

    fn raster_size(&self) -> (usize, usize) {
        let size_x = unsafe { gdal_sys::GDALGetRasterXSize(self.c_dataset) } as usize;
        let size_y = unsafe { gdal_sys::GDALGetRasterYSize(self.c_dataset) } as usize;
        (size_x, size_y)
    }

    fn band_count(&self) -> usize {
        (unsafe { gdal_sys::GDALGetRasterCount(self.c_dataset) }) as usize
    }

    fn data_type(&self) -> DataType {
        match self.rasterband(1) {
            Ok(c_band) => from_gdal_type(unsafe { gdal_sys::GDALGetRasterDataType(c_band) }),
            Err(_) => DataType::Float64,
        }
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        let c_band = self.rasterband(band).ok()?;
        let mut pb_success = 1;
        let no_data = unsafe { gdal_sys::GDALGetRasterNoDataValue(c_band, &mut pb_success) };
        (pb_success == 1).then_some(no_data)
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        let mut transformation = GeoTransform::default();
        let rv = unsafe {
            gdal_sys::GDALGetGeoTransform(self.c_dataset, transformation.as_mut_ptr())
        };
        if rv != CPLErr::CE_None {
            unsafe { gdal_sys::CPLErrorReset() };
            return None;
        }
        Some(transformation)
    }

    fn projection(&self) -> Option<String> {
        _string(unsafe { gdal_sys::GDALGetProjectionRef(self.c_dataset) }).filter(|p| !p.is_empty())
    }

    fn read_window(&self, band: usize, window: &RasterWindow) -> Result<Array2<f64>> {
        self.check_access(band, window)?;
        let c_band = self.rasterband(band)?;
        let mut data = vec![0.0f64; window.pixel_count()];
        let rv = unsafe {
            gdal_sys::GDALRasterIO(
                c_band,
                GDALRWFlag::GF_Read,
                window.x_offset as c_int,
                window.y_offset as c_int,
                window.width as c_int,
                window.height as c_int,
                data.as_mut_ptr() as *mut c_void,
                window.width as c_int,
                window.height as c_int,
                GDALDataType::GDT_Float64,
                0,
                0,
            )
        };
        check(rv)?;
        Ok(Array2::from_shape_vec(window.shape(), data)?)
    }
}

impl RasterDatasetMut for GdalRaster {
    fn write_window(
        &mut self,
        band: usize,
        window: &RasterWindow,
        data: ArrayView2<f64>,
    ) -> Result<()> {
        self.check_access(band, window)?;
        check_block_shape(&self.path.to_string_lossy(), window, &data)?;
        let c_band = self.rasterband(band)?;
        let data = data.as_standard_layout();
        let rv = unsafe {
            gdal_sys::GDALRasterIO(
                c_band,
                GDALRWFlag::GF_Write,
                window.x_offset as c_int,
                window.y_offset as c_int,
                window.width as c_int,
                window.height as c_int,
                data.as_ptr() as *mut c_void,
                window.width as c_int,
                window.height as c_int,
                GDALDataType::GDT_Float64,
                0,
                0,
            )
        };
        check(rv)
    }

    fn set_no_data_value(&mut self, band: usize, no_data: Option<f64>) -> Result<()> {
        let c_band = self.rasterband(band)?;
        let rv = match no_data {
            Some(value) => unsafe { gdal_sys::GDALSetRasterNoDataValue(c_band, value) },
            None => unsafe { gdal_sys::GDALDeleteRasterNoDataValue(c_band) },
        };
        check(rv)
    }

    fn set_band_description(&mut self, band: usize, description: &str) -> Result<()> {
        let c_band = self.rasterband(band)?;
        let c_description = CString::new(description)?;
        unsafe { gdal_sys::GDALSetDescription(c_band, c_description.as_ptr()) };
        Ok(())
    }

    fn set_geo_transform(&mut self, transform: &GeoTransform) -> Result<()> {
        let mut transform = *transform;
        let rv =
            unsafe { gdal_sys::GDALSetGeoTransform(self.c_dataset, transform.as_mut_ptr() as _) };
        check(rv)
    }

    fn set_projection(&mut self, projection: &str) -> Result<()> {
        let c_projection = CString::new(projection)?;
        let rv = unsafe { gdal_sys::GDALSetProjection(self.c_dataset, c_projection.as_ptr()) };
        check(rv)
    }

    fn compute_statistics(&mut self, band: usize) -> Result<Option<BandStatistics>> {
        let c_band = self.rasterband(band)?;
        let (mut min, mut max, mut mean, mut std_dev) = (0.0, 0.0, 0.0, 0.0);
        let rv = unsafe {
            gdal_sys::GDALComputeRasterStatistics(
                c_band,
                0,
                &mut min,
                &mut max,
                &mut mean,
                &mut std_dev,
                None,
                null_mut(),
            )
        };
        if rv != CPLErr::CE_None {
            // GDAL fails when every pixel is no-data.
            warn!(
                "No statistics for band {} of '{}': {}",
                band,
                self.path.display(),
                _last_cpl_err(rv)
            );
            return Ok(None);
        }
        let (width, height) = self.raster_size();
        let pixels = (width * height) as f64;
        let c_key = CString::new("STATISTICS_VALID_PERCENT")?;
        let valid_percent =
            _string(unsafe { gdal_sys::GDALGetMetadataItem(c_band, c_key.as_ptr(), null()) })
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(100.0);
        Ok(Some(BandStatistics {
            min,
            max,
            mean,
            std_dev,
            valid_count: (pixels * valid_percent / 100.0).round() as usize,
        }))
    }

    fn build_overviews(&mut self, levels: &[usize]) -> Result<bool> {
        if levels.is_empty() {
            return Ok(true);
        }
        let resampling = CString::new("NEAREST")?;
        let mut c_levels: Vec<c_int> = levels.iter().map(|&l| l as c_int).collect();
        let rv = unsafe {
            gdal_sys::GDALBuildOverviews(
                self.c_dataset,
                resampling.as_ptr(),
                c_levels.len() as c_int,
                c_levels.as_mut_ptr() as _,
                0,
                null_mut::<c_int>() as _,
                None,
                null_mut(),
            )
        };
        check(rv)?;
        Ok(true)
    }

    fn flush(&mut self) -> Result<()> {
        let _ = unsafe { gdal_sys::GDALFlushCache(self.c_dataset) };
        Ok(())
    }
}
