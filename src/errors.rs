use std::path::PathBuf;

use thiserror::Error;

#[cfg(feature = "gdal")]
use gdal_sys::CPLErr;

pub type Result<T> = std::result::Result<T, RsgisError>;

#[derive(Debug, Error)]
pub enum RsgisError {
    #[error("Raster '{name}' is {found:?} pixels but the bound rasters are {expected:?}")]
    DimensionMismatch {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Invalid tile size {width}x{height}: both dimensions must be positive")]
    InvalidTileSize { width: usize, height: usize },
    #[error("Unsupported raster format '{0}'")]
    UnsupportedFormat(String),
    #[error("Invalid connectivity {0}: expected 4 or 8")]
    InvalidConnectivity(u8),
    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("Name '{0}' is already bound")]
    DuplicateName(String),
    #[error("No raster bound under the name '{0}'")]
    UnknownName(String),
    #[error("Band {band} is not valid for '{path}' which has {count} band(s)")]
    InvalidBandIndex {
        path: PathBuf,
        band: usize,
        count: usize,
    },
    #[error("Block for '{name}' has {found} band(s), expected {expected}")]
    BlockShape {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Block for '{name}' is {found:?} (rows, cols) but the window is {expected:?}")]
    WindowShape {
        name: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Window at ({x_offset}, {y_offset}) of {width}x{height} lies outside a {raster_width}x{raster_height} raster")]
    WindowOutOfBounds {
        x_offset: usize,
        y_offset: usize,
        width: usize,
        height: usize,
        raster_width: usize,
        raster_height: usize,
    },
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TIFF error on '{path}': {msg}")]
    Tiff { path: PathBuf, msg: String },
    #[error("Expected tile output '{0}' is missing")]
    MissingTileOutput(PathBuf),
    #[error("Output '{0}' was finalized without any block being written")]
    NothingWritten(String),
    #[error("Output '{0}' has already been finalized")]
    AlreadyFinalized(String),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[cfg(feature = "gdal")]
    #[error("CPL error class: '{class:?}', error number: '{number}', error msg: '{msg}'")]
    CplError {
        class: CPLErr::Type,
        number: i32,
        msg: String,
    },
    #[cfg(feature = "gdal")]
    #[error("GDAL method '{method_name}' returned a NULL pointer. Error msg: '{msg}'")]
    NullPointer {
        method_name: &'static str,
        msg: String,
    },
    #[cfg(feature = "gdal")]
    #[error("FFI NUL error: {0}")]
    FfiNulError(#[from] std::ffi::NulError),
}

impl RsgisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RsgisError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised while validating inputs, before any pixel I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RsgisError::DimensionMismatch { .. }
                | RsgisError::InvalidTileSize { .. }
                | RsgisError::UnsupportedFormat(_)
                | RsgisError::InvalidConnectivity(_)
                | RsgisError::InvalidParameter { .. }
                | RsgisError::DuplicateName(_)
                | RsgisError::UnknownName(_)
                | RsgisError::InvalidBandIndex { .. }
        )
    }
}

impl From<rayon::ThreadPoolBuildError> for RsgisError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        RsgisError::WorkerPool(e.to_string())
    }
}
